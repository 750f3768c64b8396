use crate::model::AuctionId;
use thiserror::Error;

/// Failure talking to the ledger collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger unreachable: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed ledger reply: {0}")]
    Malformed(String),

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("auction {0} not found")]
    AuctionNotFound(AuctionId),

    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl LedgerError {
    /// Reason text to surface when a write is rejected.
    pub fn reason(&self) -> String {
        match self {
            LedgerError::Rpc { message, .. } => revert_reason(message).to_string(),
            LedgerError::Reverted(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// Strips the node's boilerplate prefix from a revert message.
pub fn revert_reason(message: &str) -> &str {
    const PREFIXES: [&str; 3] = [
        "VM Exception while processing transaction: revert ",
        "execution reverted: ",
        "VM Exception while processing transaction: ",
    ];
    for prefix in PREFIXES {
        if let Some(rest) = message.strip_prefix(prefix) {
            return rest.trim();
        }
    }
    message
}

/// Session could not resolve a usable identity. Fatal for the session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),

    #[error("wallet address {0} not found among ledger accounts")]
    UnknownAccount(String),

    #[error("ledger exposes no accounts")]
    NoAccounts,

    #[error("ledger unreachable: {0}")]
    Ledger(#[from] LedgerError),
}

/// A read cycle failed; no snapshot was produced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("read auction count: {0}")]
    Count(#[source] LedgerError),

    #[error("read auction {id}: {source}")]
    Auction {
        id: AuctionId,
        #[source]
        source: LedgerError,
    },

    #[error("read won auctions: {0}")]
    Won(#[source] LedgerError),

    #[error("inconsistent snapshot: {0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Create,
    Bid,
    End,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Bid => "bid",
            ActionKind::End => "end",
        }
    }
}

/// A ledger write was rejected. The reason is opaque and only displayed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{} rejected{}: {reason}", .kind.as_str(), .auction_id.map(|id| format!(" for auction #{id}")).unwrap_or_default())]
pub struct ContractError {
    pub kind: ActionKind,
    pub auction_id: Option<AuctionId>,
    pub reason: String,
}

impl ContractError {
    pub fn from_ledger(kind: ActionKind, auction_id: Option<AuctionId>, err: &LedgerError) -> Self {
        Self {
            kind,
            auction_id,
            reason: err.reason(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strips_revert_prefix() {
        let err = LedgerError::Rpc {
            code: -32000,
            message: "VM Exception while processing transaction: revert Auction ended".into(),
        };
        assert_eq!(err.reason(), "Auction ended");
    }

    #[test]
    fn contract_error_names_the_auction() {
        let err = ContractError::from_ledger(
            ActionKind::Bid,
            Some(7),
            &LedgerError::Reverted("auction ended".into()),
        );
        assert_eq!(err.to_string(), "bid rejected for auction #7: auction ended");
    }
}
