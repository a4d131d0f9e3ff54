use ethers::types::Address;
use thiserror::Error;

use crate::domain::repositories::share_ledger::LedgerError;
use crate::domain::repositories::wallet::WalletError;
use crate::domain::value_objects::ether_amount::AmountError;
use crate::domain::value_objects::ids::{RequestId, TradeId};

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Failure of a trading workflow operation.
///
/// The first four variants are local precondition failures: they are detected
/// before anything is submitted to the ledger.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Invalid quantity {quantity}: allowed range is {min}..={max}")]
    InvalidQuantity { quantity: u64, min: u64, max: u64 },

    #[error("Insufficient holding: requested {requested}, held {held}")]
    InsufficientHolding { requested: u64, held: u64 },

    #[error("Invalid bidder {bidder:?} for request {request_id}")]
    InvalidBidder { request_id: RequestId, bidder: Address },

    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Transaction rejected: {reason}")]
    TransactionRejected { reason: String },
}

impl WorkflowError {
    pub fn is_local_precondition(&self) -> bool {
        matches!(
            self,
            WorkflowError::InvalidQuantity { .. }
                | WorkflowError::InsufficientHolding { .. }
                | WorkflowError::InvalidBidder { .. }
                | WorkflowError::InvalidAmount(_)
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WorkflowError::InvalidQuantity { .. } => ErrorSeverity::Minor,
            WorkflowError::InvalidAmount(_) => ErrorSeverity::Minor,
            WorkflowError::InsufficientHolding { .. } => ErrorSeverity::Minor,
            WorkflowError::InvalidBidder { .. } => ErrorSeverity::Moderate,
            WorkflowError::TransactionRejected { .. } => ErrorSeverity::Moderate,
            WorkflowError::LedgerUnavailable(_) => ErrorSeverity::Critical,
        }
    }

    /// Short stable code for logs and API payloads.
    pub fn error_code(&self) -> &'static str {
        match self {
            WorkflowError::InvalidQuantity { .. } => "ERR_INVALID_QUANTITY",
            WorkflowError::InsufficientHolding { .. } => "ERR_INSUFFICIENT_HOLDING",
            WorkflowError::InvalidBidder { .. } => "ERR_INVALID_BIDDER",
            WorkflowError::InvalidAmount(_) => "ERR_INVALID_AMOUNT",
            WorkflowError::LedgerUnavailable(_) => "ERR_LEDGER_UNAVAILABLE",
            WorkflowError::TransactionRejected { .. } => "ERR_TRANSACTION_REJECTED",
        }
    }
}

impl From<LedgerError> for WorkflowError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::Unavailable(reason) => WorkflowError::LedgerUnavailable(reason),
            LedgerError::Rejected(reason) => WorkflowError::TransactionRejected { reason },
        }
    }
}

impl From<WalletError> for WorkflowError {
    fn from(error: WalletError) -> Self {
        WorkflowError::LedgerUnavailable(error.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Minor,
    Moderate,
    Critical,
}

/// Illegal move on a sell request or trade state record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("request {request_id} is {state}, expected {expected}")]
    InvalidRequestState {
        request_id: RequestId,
        state: &'static str,
        expected: &'static str,
    },

    #[error("trade {trade_id} is {state}, expected {expected}")]
    InvalidTradeState {
        trade_id: TradeId,
        state: &'static str,
        expected: &'static str,
    },

    #[error("{bidder:?} has no bid on request {request_id}")]
    UnknownBidder { request_id: RequestId, bidder: Address },
}
