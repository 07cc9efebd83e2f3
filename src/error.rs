use rust_decimal::Decimal;
use thiserror::Error;

/// Typed failures for every ledger operation. Validation errors leave the
/// domain state untouched; `Storage` means the mutation was not durably
/// committed and must not be reported as applied.
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("Unknown redeem code: {0}")]
    UnknownCode(String),
    #[error("Code {0} already redeemed by this account")]
    AlreadyRedeemed(String),
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },
    #[error("Withdrawal {0} not found")]
    WithdrawalNotFound(String),
    #[error("Withdrawal {0} belongs to a different account")]
    OwnershipMismatch(String),
    #[error("Access denied")]
    AccessDenied,
    #[error("Balance must not be negative, got {0}")]
    NegativeBalance(Decimal),
    #[error("Code {0} already exists")]
    DuplicateCode(String),
    #[error("Code value must be positive, got {0}")]
    NonPositiveValue(Decimal),
    #[error("User {0} not found")]
    UserNotFound(String),
    #[error("Earn link {0} not found")]
    LinkNotFound(usize),
    #[error("Cannot remove the last admin")]
    LastAdminProtected,
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}
