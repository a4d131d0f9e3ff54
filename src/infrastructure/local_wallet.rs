//! Wallet backed by a local private key.
//!
//! Holds one `LocalWallet` at a time. Replacing the key with
//! [`LocalWalletProvider::switch_key`] changes the active account and notifies
//! every `accounts_changed` subscriber, the same event a browser wallet raises
//! when the user picks another account.

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Provider, Ws};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::info;
use zeroize::Zeroizing;

use crate::config::MarketConfig;
use crate::domain::repositories::share_ledger::ShareLedger;
use crate::domain::repositories::wallet::{WalletError, WalletProvider};
use crate::infrastructure::company_shares_client::CompanySharesClient;

pub struct LocalWalletProvider {
    provider: Provider<Ws>,
    contract_address: Address,
    chain_id: u64,
    confirmations: usize,
    signer: RwLock<LocalWallet>,
    active: watch::Sender<Option<Address>>,
}

impl LocalWalletProvider {
    /// Open the websocket connection and load the signer.
    pub async fn connect(config: &MarketConfig, key: &str) -> Result<Self, WalletError> {
        let signer = parse_signer(key, config.chain_id)?;
        let provider = Provider::<Ws>::connect(config.rpc_url.as_str())
            .await
            .map_err(|e| WalletError::Unavailable(format!("{}: {}", config.rpc_url, e)))?;

        info!(
            rpc = %config.rpc_url,
            account = ?signer.address(),
            chain_id = config.chain_id,
            "Local wallet connected"
        );
        let (active, _) = watch::channel(Some(signer.address()));
        Ok(Self {
            provider,
            contract_address: config.contract_address,
            chain_id: config.chain_id,
            confirmations: config.confirmations,
            signer: RwLock::new(signer),
            active,
        })
    }

    /// Replace the signing key; returns the new active account.
    pub async fn switch_key(&self, key: &str) -> Result<Address, WalletError> {
        let signer = parse_signer(key, self.chain_id)?;
        let account = signer.address();
        *self.signer.write().await = signer;
        self.active.send_replace(Some(account));
        info!(account = ?account, "Signer key switched");
        Ok(account)
    }
}

/// Parse a hex private key into a wallet bound to `chain_id`.
pub fn parse_signer(key: &str, chain_id: u64) -> Result<LocalWallet, WalletError> {
    let hex = Zeroizing::new(key.trim().trim_start_matches("0x").to_string());
    let wallet: LocalWallet = hex
        .parse()
        .map_err(|e| WalletError::Signer(format!("invalid private key: {}", e)))?;
    Ok(wallet.with_chain_id(chain_id))
}

#[async_trait]
impl WalletProvider for LocalWalletProvider {
    fn name(&self) -> &str {
        "local-key"
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        Ok(vec![self.signer.read().await.address()])
    }

    fn accounts_changed(&self) -> watch::Receiver<Option<Address>> {
        self.active.subscribe()
    }

    async fn connect_ledger(&self, account: Address) -> Result<Arc<dyn ShareLedger>, WalletError> {
        let signer = self.signer.read().await.clone();
        if signer.address() != account {
            return Err(WalletError::AccountMismatch {
                requested: account,
                active: Some(signer.address()),
            });
        }

        let client = Arc::new(SignerMiddleware::new(self.provider.clone(), signer));
        Ok(Arc::new(CompanySharesClient::new(
            client,
            self.contract_address,
            self.confirmations,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANVIL_KEY_0: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const ANVIL_KEY_1: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    #[test]
    fn test_parse_signer_derives_address_and_chain() {
        let wallet = parse_signer(ANVIL_KEY_0, 31337).unwrap();
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(wallet.address(), expected);
        assert_eq!(wallet.chain_id(), 31337);
    }

    #[test]
    fn test_parse_signer_accepts_unprefixed_key() {
        let wallet = parse_signer(ANVIL_KEY_1, 1).unwrap();
        let expected: Address = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".parse().unwrap();
        assert_eq!(wallet.address(), expected);
    }

    #[test]
    fn test_parse_signer_rejects_garbage() {
        assert!(matches!(parse_signer("not-a-key", 1), Err(WalletError::Signer(_))));
    }
}
