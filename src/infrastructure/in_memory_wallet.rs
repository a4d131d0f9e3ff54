//! Wallet backed by an [`InMemoryLedger`], with the active account under the
//! caller's control.

use async_trait::async_trait;
use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::domain::repositories::share_ledger::ShareLedger;
use crate::domain::repositories::wallet::{WalletError, WalletProvider};
use crate::infrastructure::in_memory_ledger::InMemoryLedger;

pub struct InMemoryWallet {
    ledger: InMemoryLedger,
    active: watch::Sender<Option<Address>>,
}

impl InMemoryWallet {
    pub fn new(ledger: InMemoryLedger, account: Address) -> Self {
        let (active, _) = watch::channel(Some(account));
        InMemoryWallet { ledger, active }
    }

    pub fn active_account(&self) -> Option<Address> {
        *self.active.borrow()
    }

    /// Make `account` the active account, as if the user switched in the wallet.
    pub fn switch_account(&self, account: Address) {
        info!(%account, "Wallet switched account");
        self.active.send_replace(Some(account));
    }

    /// Lock the wallet; no account is active until the next switch.
    pub fn lock(&self) {
        info!("Wallet locked");
        self.active.send_replace(None);
    }
}

#[async_trait]
impl WalletProvider for InMemoryWallet {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.active_account()
            .map(|account| vec![account])
            .ok_or(WalletError::NoAccounts)
    }

    fn accounts_changed(&self) -> watch::Receiver<Option<Address>> {
        self.active.subscribe()
    }

    async fn connect_ledger(&self, account: Address) -> Result<Arc<dyn ShareLedger>, WalletError> {
        let active = self.active_account();
        if active != Some(account) {
            return Err(WalletError::AccountMismatch {
                requested: account,
                active,
            });
        }
        Ok(self.ledger.handle(account))
    }
}
