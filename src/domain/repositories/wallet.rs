//! Wallet / signer collaborator.
//!
//! The wallet decides which account the user acts as. It hands out accounts,
//! announces when the active account changes, and produces ledger handles that
//! sign as a given account.

use async_trait::async_trait;
use ethers::types::Address;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use crate::domain::repositories::share_ledger::ShareLedger;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("wallet unavailable: {0}")]
    Unavailable(String),

    #[error("wallet returned no accounts")]
    NoAccounts,

    #[error("account {requested:?} is not the wallet's active account {active:?}")]
    AccountMismatch {
        requested: Address,
        active: Option<Address>,
    },

    #[error("signer error: {0}")]
    Signer(String),
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Ask the wallet for the accounts the user allows; the first is active.
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;

    /// Channel carrying the currently active account, `None` once the wallet
    /// locks or disconnects. Every change is an account-changed event.
    fn accounts_changed(&self) -> watch::Receiver<Option<Address>>;

    /// A ledger handle whose calls are signed by `account`.
    async fn connect_ledger(&self, account: Address) -> Result<Arc<dyn ShareLedger>, WalletError>;
}
