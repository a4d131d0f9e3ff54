//! # CompanyShares Contract Client
//!
//! `ShareLedger` implementation talking to the `CompanyShares` contract over a
//! websocket JSON-RPC connection. Calls are signed by a `LocalWallet` through
//! `SignerMiddleware`.
//!
//! Submitting a transaction returns as soon as the node has accepted it into
//! the mempool; settlement waits for the configured number of confirmations
//! and checks the receipt status. Revert reasons are decoded from the standard
//! `Error(string)` payload and passed through unchanged.
//!
//! `createSellRequest` and `finalizeSale` return the new id from the contract
//! call, which a transaction receipt does not carry. The id is read by
//! simulating the call against the latest block just before sending it.

use async_trait::async_trait;
use chrono::Utc;
use ethers::contract::{abigen, ContractCall, ContractError};
use ethers::abi::Detokenize;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Middleware, MiddlewareError, PendingTransaction, Provider, Ws};
use ethers::signers::LocalWallet;
use ethers::types::{Address, U256, U64};
use futures_util::FutureExt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::entities::bid::Bid;
use crate::domain::entities::sell_request::RequestState;
use crate::domain::repositories::share_ledger::{
    LedgerError, LedgerResult, PendingSubmission, SellRequestView, Settlement, ShareLedger,
};
use crate::domain::value_objects::ether_amount::EtherAmount;
use crate::domain::value_objects::ids::{RequestId, TradeId};
use crate::domain::value_objects::quantity::{Holding, ShareQuantity};

abigen!(
    CompanyShares,
    r#"[
        function getSharesOwned() external view returns (uint256)
        function buyShares(uint256 quantity) external payable
        function createSellRequest(uint256 quantity) external returns (uint256)
        struct ListedBid { address bidder; uint256 amount; bool confirmed; }
        function getMyRequest() external view returns (uint256, uint256, ListedBid[])
        function placeBid(uint256 requestId, uint256 amount) external
        function finalizeSale(uint256 requestId, address bidder) external returns (uint256)
        function payForTrade(uint256 tradeId) external payable
    ]"#
);

pub type SignedClient = SignerMiddleware<Provider<Ws>, LocalWallet>;

/// `getMyRequest` output: request id, quantity and the bids on it.
type MyRequest = (U256, U256, Vec<ListedBid>);

pub struct CompanySharesClient {
    contract: CompanyShares<SignedClient>,
    client: Arc<SignedClient>,
    confirmations: usize,
}

impl CompanySharesClient {
    pub fn new(client: Arc<SignedClient>, contract_address: Address, confirmations: usize) -> Self {
        Self {
            contract: CompanyShares::new(contract_address, Arc::clone(&client)),
            client,
            confirmations,
        }
    }

    /// Read the value `call` would return if mined now.
    async fn simulate<D>(&self, operation: &'static str, call: &ContractCall<SignedClient, D>) -> LedgerResult<D>
    where
        D: Detokenize,
    {
        call.call().await.map_err(|e| contract_failure(operation, e))
    }

    /// Send `call` and hand back a submission that settles once the
    /// transaction has the configured confirmations.
    async fn submit<D, T>(
        &self,
        operation: &'static str,
        call: ContractCall<SignedClient, D>,
        output: T,
    ) -> LedgerResult<PendingSubmission<T>>
    where
        D: Detokenize,
        T: Send + 'static,
    {
        let tx_hash = {
            let pending = call.send().await.map_err(|e| contract_failure(operation, e))?;
            pending.tx_hash()
        };
        debug!(operation, tx = ?tx_hash, "Transaction submitted");

        let provider = self.client.provider().clone();
        let confirmations = self.confirmations;
        let settlement = async move {
            let receipt = PendingTransaction::new(tx_hash, &provider)
                .confirmations(confirmations)
                .await
                .map_err(|e| LedgerError::Unavailable(format!("{} receipt: {}", operation, e)))?
                .ok_or_else(|| {
                    LedgerError::Unavailable(format!("{} transaction {:?} was dropped", operation, tx_hash))
                })?;

            if receipt.status == Some(U64::zero()) {
                warn!(operation, tx = ?tx_hash, "Transaction reverted after submission");
                return Err(LedgerError::Rejected(format!("{} reverted", operation)));
            }
            Ok(Settlement {
                tx_hash,
                block_number: receipt.block_number.map(|block| block.as_u64()),
                settled_at: Utc::now(),
            })
        }
        .boxed();

        Ok(PendingSubmission::new(tx_hash, output, settlement))
    }
}

#[async_trait]
impl ShareLedger for CompanySharesClient {
    fn account(&self) -> Address {
        self.client.address()
    }

    async fn get_shares_owned(&self) -> LedgerResult<Holding> {
        let shares = self
            .contract
            .get_shares_owned()
            .call()
            .await
            .map_err(|e| contract_failure("getSharesOwned", e))?;
        Ok(Holding::new(word_to_u64(shares, "share count")?))
    }

    async fn buy_shares(
        &self,
        quantity: ShareQuantity,
        value: EtherAmount,
    ) -> LedgerResult<PendingSubmission<()>> {
        let call = self
            .contract
            .buy_shares(U256::from(quantity.value()))
            .value(value.base_units());
        self.submit("buyShares", call, ()).await
    }

    async fn create_sell_request(
        &self,
        quantity: ShareQuantity,
    ) -> LedgerResult<PendingSubmission<RequestId>> {
        let call = self.contract.create_sell_request(U256::from(quantity.value()));
        let word = self.simulate("createSellRequest", &call).await?;
        let request_id = RequestId::from_word(word)
            .ok_or_else(|| LedgerError::Unavailable(format!("request id {} out of range", word)))?;
        self.submit("createSellRequest", call, request_id).await
    }

    async fn get_my_requests(&self) -> LedgerResult<Vec<SellRequestView>> {
        let call: ContractCall<SignedClient, MyRequest> = self
            .contract
            .method("getMyRequest", ())
            .map_err(|e| LedgerError::Unavailable(format!("getMyRequest binding: {}", e)))?;
        let (request_id, quantity, bids) = call
            .call()
            .await
            .map_err(|e| contract_failure("getMyRequest", e))?;
        request_views(self.account(), request_id, quantity, bids)
    }

    async fn place_bid(
        &self,
        request_id: RequestId,
        amount: EtherAmount,
    ) -> LedgerResult<PendingSubmission<()>> {
        let call = self.contract.place_bid(request_id.as_word(), amount.base_units());
        self.submit("placeBid", call, ()).await
    }

    async fn finalize_sale(
        &self,
        request_id: RequestId,
        bidder: Address,
    ) -> LedgerResult<PendingSubmission<TradeId>> {
        let call = self.contract.finalize_sale(request_id.as_word(), bidder);
        let word = self.simulate("finalizeSale", &call).await?;
        let trade_id = TradeId::from_word(word)
            .ok_or_else(|| LedgerError::Unavailable(format!("trade id {} out of range", word)))?;
        self.submit("finalizeSale", call, trade_id).await
    }

    async fn pay_for_trade(
        &self,
        trade_id: TradeId,
        value: EtherAmount,
    ) -> LedgerResult<PendingSubmission<()>> {
        let call = self
            .contract
            .pay_for_trade(trade_id.as_word())
            .value(value.base_units());
        self.submit("payForTrade", call, ()).await
    }
}

fn word_to_u64(word: U256, what: &str) -> LedgerResult<u64> {
    if word > U256::from(u64::MAX) {
        return Err(LedgerError::Unavailable(format!("{} {} out of range", what, word)));
    }
    Ok(word.as_u64())
}

/// Turn the `getMyRequest` tuple into request views. A zero quantity means the
/// caller has no active request.
fn request_views(
    seller: Address,
    request_id: U256,
    quantity: U256,
    bids: Vec<ListedBid>,
) -> LedgerResult<Vec<SellRequestView>> {
    if quantity.is_zero() {
        return Ok(Vec::new());
    }
    let request_id = RequestId::from_word(request_id)
        .ok_or_else(|| LedgerError::Unavailable(format!("request id {} out of range", request_id)))?;
    let quantity = ShareQuantity::new(word_to_u64(quantity, "request quantity")?)
        .map_err(LedgerError::Unavailable)?;

    let bids: Vec<Bid> = bids
        .into_iter()
        .map(|bid| {
            Bid::new(request_id, bid.bidder, EtherAmount::from_base_units(bid.amount), bid.confirmed)
        })
        .collect();
    let state = match bids.iter().find(|bid| bid.confirmed) {
        Some(bid) => RequestState::BuyerConfirmed { buyer: bid.bidder },
        None => RequestState::Open,
    };

    Ok(vec![SellRequestView {
        request_id,
        seller,
        quantity,
        state,
        bids,
    }])
}

/// Classify a failed contract interaction. Reverts and node-side JSON-RPC
/// errors are rejections; anything else means the ledger could not be reached.
fn contract_failure(operation: &str, error: ContractError<SignedClient>) -> LedgerError {
    if let Some(reason) = error.decode_revert::<String>() {
        return LedgerError::Rejected(reason);
    }
    if error.is_revert() {
        return LedgerError::Rejected(format!("{} reverted", operation));
    }

    let rpc_message = match &error {
        ContractError::MiddlewareError { e } => e.as_error_response().map(|r| r.message.clone()),
        ContractError::ProviderError { e } => e.as_error_response().map(|r| r.message.clone()),
        _ => None,
    };
    match rpc_message {
        Some(message) => LedgerError::Rejected(message),
        None => LedgerError::Unavailable(format!("{} failed: {}", operation, error)),
    }
}
