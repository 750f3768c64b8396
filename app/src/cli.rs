use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use engine::session::ConnectRequest;

use crate::config::ViewerConfig;

pub const USAGE: &str =
    "usage: auction-watch [config.json] [--admin | --address 0x..] [--dashboard] [--memory]";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub admin: bool,
    pub address: Option<String>,
    pub dashboard: bool,
    /// Use the in-process demo ledger instead of a node.
    pub memory: bool,
}

impl CliArgs {
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut out = CliArgs::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--admin" => out.admin = true,
                "--address" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--address needs a value\n{USAGE}"))?;
                    out.address = Some(value);
                }
                "--dashboard" => out.dashboard = true,
                "--memory" => out.memory = true,
                flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
                path => {
                    if out.config_path.is_some() {
                        bail!("unexpected argument {path}\n{USAGE}");
                    }
                    out.config_path = Some(PathBuf::from(path));
                }
            }
        }
        if out.admin && out.address.is_some() {
            bail!("--admin and --address are exclusive\n{USAGE}");
        }
        Ok(out)
    }

    /// Command line wins over the config file's viewer section.
    pub fn connect_request(&self, file: &ViewerConfig) -> Result<ConnectRequest> {
        if self.admin {
            return Ok(ConnectRequest::Admin);
        }
        if let Some(address) = &self.address {
            return Ok(ConnectRequest::Participant {
                address: address.clone(),
            });
        }
        if file.admin {
            return Ok(ConnectRequest::Admin);
        }
        file.address
            .clone()
            .map(|address| ConnectRequest::Participant { address })
            .ok_or_else(|| anyhow!("no identity: pass --admin or --address\n{USAGE}"))
    }
}
