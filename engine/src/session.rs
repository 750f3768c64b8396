use alloy_primitives::Address;
use engine_core::{AccountDirectory, AuctionReader, ConnectionError, Role, ViewerContext};
use tracing::info;

/// How the viewer asks to be identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectRequest {
    /// Act as the ledger's first account with the administrator view.
    Admin,
    /// Act as a typed address, which must be one of the ledger's accounts.
    Participant { address: String },
}

/// Resolves the session identity. Any failure here ends the session.
pub async fn connect<D, R>(
    directory: &D,
    reader: &R,
    request: &ConnectRequest,
    dashboard: bool,
) -> Result<ViewerContext, ConnectionError>
where
    D: AccountDirectory + ?Sized,
    R: AuctionReader + ?Sized,
{
    let viewer = match request {
        ConnectRequest::Admin => {
            let accounts = directory.accounts().await?;
            let address = *accounts.first().ok_or(ConnectionError::NoAccounts)?;
            let admin = reader.admin().await?;
            if admin != address {
                info!(target: "session", %address, %admin, "connected account is not the contract admin");
            }
            ViewerContext::new(address, Role::Administrator).with_ledger_admin(admin == address)
        }
        ConnectRequest::Participant { address } => {
            let parsed = parse_address(address)?;
            let accounts = directory.accounts().await?;
            if !accounts.contains(&parsed) {
                return Err(ConnectionError::UnknownAccount(address.trim().to_string()));
            }
            ViewerContext::new(parsed, Role::Participant)
        }
    };
    info!(target: "session", address = %viewer.address(), role = ?viewer.role(), dashboard, "session connected");
    Ok(viewer.with_dashboard(dashboard))
}

/// Accepts `0x`-prefixed 20-byte hex in any letter case.
pub fn parse_address(text: &str) -> Result<Address, ConnectionError> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| ConnectionError::InvalidAddress(trimmed.to_string()))?;
    if digits.len() != 40 {
        return Err(ConnectionError::InvalidAddress(trimmed.to_string()));
    }
    digits
        .parse::<Address>()
        .map_err(|_| ConnectionError::InvalidAddress(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem_ledger::InMemoryLedger;
    use engine_core::ManualClock;
    use std::sync::Arc;

    fn ledger(accounts: Vec<Address>) -> InMemoryLedger {
        InMemoryLedger::new(accounts, Arc::new(ManualClock::new(0)))
    }

    #[tokio::test]
    async fn admin_mode_uses_first_account() {
        let l = ledger(vec![Address::repeat_byte(1), Address::repeat_byte(2)]);
        let viewer = connect(&l, &l, &ConnectRequest::Admin, false).await.unwrap();
        assert_eq!(viewer.address(), Address::repeat_byte(1));
        assert!(viewer.is_admin_view());
        assert!(viewer.is_ledger_admin());
        assert!(!viewer.wants_dashboard());
    }

    #[tokio::test]
    async fn admin_mode_without_accounts_fails() {
        let l = ledger(Vec::new());
        let err = connect(&l, &l, &ConnectRequest::Admin, false).await.unwrap_err();
        assert_eq!(err, ConnectionError::NoAccounts);
    }

    #[tokio::test]
    async fn participant_address_matches_case_insensitively() {
        let account = Address::repeat_byte(0xab);
        let l = ledger(vec![Address::repeat_byte(1), account]);
        let typed = format!("0x{}", "AB".repeat(20));
        let request = ConnectRequest::Participant { address: typed };
        let viewer = connect(&l, &l, &request, true).await.unwrap();
        assert_eq!(viewer.address(), account);
        assert_eq!(viewer.role(), Role::Participant);
        assert!(!viewer.is_ledger_admin());
        assert!(viewer.wants_dashboard());
    }

    #[tokio::test]
    async fn participant_must_be_a_ledger_account() {
        let l = ledger(vec![Address::repeat_byte(1)]);
        let request = ConnectRequest::Participant {
            address: format!("0x{}", "cd".repeat(20)),
        };
        assert!(matches!(
            connect(&l, &l, &request, false).await,
            Err(ConnectionError::UnknownAccount(_))
        ));
    }

    #[test]
    fn rejects_malformed_addresses() {
        for text in ["", "0x1234", "abababababababababababababababababababab", "0xzz"] {
            assert!(
                matches!(parse_address(text), Err(ConnectionError::InvalidAddress(_))),
                "{text:?} accepted"
            );
        }
        assert_eq!(
            parse_address(&format!(" 0x{} ", "01".repeat(20))).unwrap(),
            Address::repeat_byte(1)
        );
    }
}
