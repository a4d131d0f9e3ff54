//! In-process share ledger.
//!
//! Mirrors the rules of the `CompanyShares` contract closely enough to run the
//! full workflow without a chain: primary sales from a fixed supply at one
//! display unit per share, sell requests that lock the listed shares, bids
//! while a request is open, seller-only buyer confirmation, and buyer-only
//! payment of exactly the agreed amount.
//!
//! Calls take effect when submitted, like a development chain that mines every
//! transaction immediately. Every call, accepted or not, is appended to a
//! journal so callers can check what reached the ledger.

use async_trait::async_trait;
use chrono::Utc;
use ethers::types::{Address, TxHash};
use futures_util::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::entities::bid::Bid;
use crate::domain::entities::sell_request::RequestState;
use crate::domain::entities::trade::TradeState;
use crate::domain::repositories::share_ledger::{
    LedgerError, LedgerResult, PendingSubmission, SellRequestView, Settlement, ShareLedger,
};
use crate::domain::value_objects::ether_amount::EtherAmount;
use crate::domain::value_objects::ids::{RequestId, TradeId};
use crate::domain::value_objects::quantity::{Holding, ShareQuantity, MAX_BUY_QUANTITY};

/// A call as it reached the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    GetSharesOwned { caller: Address },
    BuyShares { caller: Address, quantity: u64, value: EtherAmount },
    CreateSellRequest { caller: Address, quantity: u64 },
    GetMyRequests { caller: Address },
    PlaceBid { caller: Address, request_id: RequestId, amount: EtherAmount },
    FinalizeSale { caller: Address, request_id: RequestId, bidder: Address },
    PayForTrade { caller: Address, trade_id: TradeId, value: EtherAmount },
}

/// Ledger-side record of a trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTrade {
    pub trade_id: TradeId,
    pub request_id: RequestId,
    pub seller: Address,
    pub buyer: Address,
    pub amount: EtherAmount,
    pub state: TradeState,
}

struct LedgerRequest {
    seller: Address,
    quantity: ShareQuantity,
    state: RequestState,
    bids: Vec<Bid>,
}

struct LedgerState {
    available_supply: u64,
    shares: HashMap<Address, u64>,
    locked: HashMap<Address, u64>,
    balances: HashMap<Address, EtherAmount>,
    treasury: EtherAmount,
    requests: BTreeMap<RequestId, LedgerRequest>,
    trades: BTreeMap<TradeId, LedgerTrade>,
    next_request_id: u64,
    next_trade_id: u64,
    block_number: u64,
    journal: Vec<LedgerCall>,
    offline: bool,
}

impl LedgerState {
    fn ensure_online(&self) -> LedgerResult<()> {
        if self.offline {
            Err(LedgerError::Unavailable("in-memory ledger is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn shares_of(&self, account: Address) -> u64 {
        self.shares.get(&account).copied().unwrap_or(0)
    }

    fn unlocked_shares_of(&self, account: Address) -> u64 {
        self.shares_of(account) - self.locked.get(&account).copied().unwrap_or(0)
    }

    fn balance_of(&self, account: Address) -> EtherAmount {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    fn debit(&mut self, account: Address, value: EtherAmount) -> LedgerResult<()> {
        let remaining = self
            .balance_of(account)
            .checked_sub(value)
            .ok_or_else(|| rejected("Insufficient funds"))?;
        self.balances.insert(account, remaining);
        Ok(())
    }

    /// Move `value` between accounts. Both balances are checked before
    /// either changes.
    fn transfer(&mut self, from: Address, to: Address, value: EtherAmount) -> LedgerResult<()> {
        let remaining = self
            .balance_of(from)
            .checked_sub(value)
            .ok_or_else(|| rejected("Insufficient funds"))?;
        let total = self
            .balance_of(to)
            .checked_add(value)
            .ok_or_else(|| rejected("Balance overflow"))?;
        if from != to {
            self.balances.insert(from, remaining);
            self.balances.insert(to, total);
        }
        Ok(())
    }

    /// Mine a block for an accepted call.
    fn commit<T: Send + 'static>(&mut self, output: T) -> PendingSubmission<T> {
        self.block_number += 1;
        let settlement = Settlement {
            tx_hash: TxHash::from_low_u64_be(self.block_number),
            block_number: Some(self.block_number),
            settled_at: Utc::now(),
        };
        PendingSubmission::new(
            settlement.tx_hash,
            output,
            futures_util::future::ready(Ok(settlement)).boxed(),
        )
    }
}

fn rejected(reason: &str) -> LedgerError {
    LedgerError::Rejected(reason.to_string())
}

/// Shared in-process ledger; clones refer to the same state.
#[derive(Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new(initial_supply: u64) -> Self {
        InMemoryLedger {
            state: Arc::new(Mutex::new(LedgerState {
                available_supply: initial_supply,
                shares: HashMap::new(),
                locked: HashMap::new(),
                balances: HashMap::new(),
                treasury: EtherAmount::default(),
                requests: BTreeMap::new(),
                trades: BTreeMap::new(),
                next_request_id: 1,
                next_trade_id: 1,
                block_number: 0,
                journal: Vec::new(),
                offline: false,
            })),
        }
    }

    /// A ledger handle signing as `account`.
    pub fn handle(&self, account: Address) -> Arc<dyn ShareLedger> {
        Arc::new(InMemoryLedgerHandle {
            account,
            state: Arc::clone(&self.state),
        })
    }

    pub async fn fund(&self, account: Address, amount: EtherAmount) {
        let mut state = self.state.lock().await;
        let total = state.balance_of(account).checked_add(amount).unwrap_or(amount);
        state.balances.insert(account, total);
    }

    /// Assign shares outside the primary sale, e.g. founder allocations.
    pub async fn grant_shares(&self, account: Address, shares: u64) {
        let mut state = self.state.lock().await;
        *state.shares.entry(account).or_insert(0) += shares;
    }

    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    pub async fn calls(&self) -> Vec<LedgerCall> {
        self.state.lock().await.journal.clone()
    }

    pub async fn shares_of(&self, account: Address) -> u64 {
        self.state.lock().await.shares_of(account)
    }

    pub async fn balance_of(&self, account: Address) -> EtherAmount {
        self.state.lock().await.balance_of(account)
    }

    pub async fn available_supply(&self) -> u64 {
        self.state.lock().await.available_supply
    }

    pub async fn request_state(&self, request_id: RequestId) -> Option<RequestState> {
        let state = self.state.lock().await;
        state.requests.get(&request_id).map(|request| request.state.clone())
    }

    pub async fn bids_on(&self, request_id: RequestId) -> Vec<Bid> {
        let state = self.state.lock().await;
        state
            .requests
            .get(&request_id)
            .map(|request| request.bids.clone())
            .unwrap_or_default()
    }

    pub async fn trade(&self, trade_id: TradeId) -> Option<LedgerTrade> {
        self.state.lock().await.trades.get(&trade_id).cloned()
    }
}

struct InMemoryLedgerHandle {
    account: Address,
    state: Arc<Mutex<LedgerState>>,
}

#[async_trait]
impl ShareLedger for InMemoryLedgerHandle {
    fn account(&self) -> Address {
        self.account
    }

    async fn get_shares_owned(&self) -> LedgerResult<Holding> {
        let mut state = self.state.lock().await;
        state.journal.push(LedgerCall::GetSharesOwned { caller: self.account });
        state.ensure_online()?;
        Ok(Holding::new(state.shares_of(self.account)))
    }

    async fn buy_shares(
        &self,
        quantity: ShareQuantity,
        value: EtherAmount,
    ) -> LedgerResult<PendingSubmission<()>> {
        let mut state = self.state.lock().await;
        state.journal.push(LedgerCall::BuyShares {
            caller: self.account,
            quantity: quantity.value(),
            value,
        });
        state.ensure_online()?;

        if quantity.value() > MAX_BUY_QUANTITY {
            return Err(rejected("Can only buy between 1 and 5 shares"));
        }
        if value != EtherAmount::for_shares(quantity) {
            return Err(rejected("Incorrect value sent for shares"));
        }
        if state.available_supply < quantity.value() {
            return Err(rejected("Not enough shares available"));
        }
        state.debit(self.account, value)?;

        state.treasury = state.treasury.checked_add(value).unwrap_or(state.treasury);
        state.available_supply -= quantity.value();
        *state.shares.entry(self.account).or_insert(0) += quantity.value();
        debug!(buyer = ?self.account, %quantity, "In-memory ledger sold shares");
        Ok(state.commit(()))
    }

    async fn create_sell_request(
        &self,
        quantity: ShareQuantity,
    ) -> LedgerResult<PendingSubmission<RequestId>> {
        let mut state = self.state.lock().await;
        state.journal.push(LedgerCall::CreateSellRequest {
            caller: self.account,
            quantity: quantity.value(),
        });
        state.ensure_online()?;

        if state.unlocked_shares_of(self.account) < quantity.value() {
            return Err(rejected("Not enough shares to sell"));
        }

        let request_id = RequestId(state.next_request_id);
        state.next_request_id += 1;
        *state.locked.entry(self.account).or_insert(0) += quantity.value();
        state.requests.insert(
            request_id,
            LedgerRequest {
                seller: self.account,
                quantity,
                state: RequestState::Open,
                bids: Vec::new(),
            },
        );
        Ok(state.commit(request_id))
    }

    async fn get_my_requests(&self) -> LedgerResult<Vec<SellRequestView>> {
        let mut state = self.state.lock().await;
        state.journal.push(LedgerCall::GetMyRequests { caller: self.account });
        state.ensure_online()?;

        Ok(state
            .requests
            .iter()
            .filter(|(_, request)| request.seller == self.account)
            .filter(|(_, request)| {
                matches!(
                    request.state,
                    RequestState::Open | RequestState::BuyerConfirmed { .. }
                )
            })
            .map(|(request_id, request)| SellRequestView {
                request_id: *request_id,
                seller: request.seller,
                quantity: request.quantity,
                state: request.state.clone(),
                bids: request.bids.clone(),
            })
            .collect())
    }

    async fn place_bid(
        &self,
        request_id: RequestId,
        amount: EtherAmount,
    ) -> LedgerResult<PendingSubmission<()>> {
        let mut state = self.state.lock().await;
        state.journal.push(LedgerCall::PlaceBid {
            caller: self.account,
            request_id,
            amount,
        });
        state.ensure_online()?;

        let bidder = self.account;
        let request = state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| rejected("Sell request does not exist"))?;
        if request.state != RequestState::Open {
            return Err(rejected("Sell request is not open for bids"));
        }
        if request.seller == bidder {
            return Err(rejected("Seller cannot bid on own request"));
        }
        if amount.is_zero() {
            return Err(rejected("Bid amount must be positive"));
        }

        match request.bids.iter_mut().find(|bid| bid.bidder == bidder) {
            Some(existing) => existing.amount = amount,
            None => request.bids.push(Bid::new(request_id, bidder, amount, false)),
        }
        Ok(state.commit(()))
    }

    async fn finalize_sale(
        &self,
        request_id: RequestId,
        bidder: Address,
    ) -> LedgerResult<PendingSubmission<TradeId>> {
        let mut state = self.state.lock().await;
        state.journal.push(LedgerCall::FinalizeSale {
            caller: self.account,
            request_id,
            bidder,
        });
        state.ensure_online()?;

        let trade_id = TradeId(state.next_trade_id);
        let request = state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| rejected("Sell request does not exist"))?;
        if request.seller != self.account {
            return Err(rejected("Only the seller can confirm a buyer"));
        }
        if request.state != RequestState::Open {
            return Err(rejected("Sell request is not open"));
        }
        let bid = request
            .bids
            .iter_mut()
            .find(|bid| bid.bidder == bidder)
            .ok_or_else(|| rejected("Bidder has no bid on this request"))?;

        bid.confirmed = true;
        let amount = bid.amount;
        request.state = RequestState::BuyerConfirmed { buyer: bidder };
        let seller = request.seller;

        state.next_trade_id += 1;
        state.trades.insert(
            trade_id,
            LedgerTrade {
                trade_id,
                request_id,
                seller,
                buyer: bidder,
                amount,
                state: TradeState::BuyerConfirmed,
            },
        );
        Ok(state.commit(trade_id))
    }

    async fn pay_for_trade(
        &self,
        trade_id: TradeId,
        value: EtherAmount,
    ) -> LedgerResult<PendingSubmission<()>> {
        let mut state = self.state.lock().await;
        state.journal.push(LedgerCall::PayForTrade {
            caller: self.account,
            trade_id,
            value,
        });
        state.ensure_online()?;

        let trade = state
            .trades
            .get(&trade_id)
            .cloned()
            .ok_or_else(|| rejected("Trade does not exist"))?;
        if trade.buyer != self.account {
            return Err(rejected("Only the confirmed buyer can pay"));
        }
        if trade.state != TradeState::BuyerConfirmed {
            return Err(rejected("Trade is not awaiting payment"));
        }
        if value != trade.amount {
            return Err(rejected("Incorrect payment amount"));
        }
        let quantity = state
            .requests
            .get(&trade.request_id)
            .map(|request| request.quantity.value())
            .ok_or_else(|| rejected("Sell request does not exist"))?;

        state.transfer(trade.buyer, trade.seller, value)?;
        if let Some(shares) = state.shares.get_mut(&trade.seller) {
            *shares -= quantity;
        }
        if let Some(locked) = state.locked.get_mut(&trade.seller) {
            *locked -= quantity;
        }
        *state.shares.entry(trade.buyer).or_insert(0) += quantity;
        if let Some(request) = state.requests.get_mut(&trade.request_id) {
            request.state = RequestState::Completed { buyer: trade.buyer };
        }
        if let Some(record) = state.trades.get_mut(&trade_id) {
            record.state = TradeState::Completed;
        }
        debug!(%trade_id, buyer = ?trade.buyer, "In-memory ledger completed trade");
        Ok(state.commit(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;

    fn alice() -> Address {
        Address::from_low_u64_be(0xa11ce)
    }

    fn bob() -> Address {
        Address::from_low_u64_be(0xb0b)
    }

    fn qty(n: u64) -> ShareQuantity {
        ShareQuantity::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_buy_moves_supply_and_funds() {
        let ledger = InMemoryLedger::new(10);
        ledger.fund(alice(), EtherAmount::from_whole_units(5)).await;
        let handle = ledger.handle(alice());

        let pending = handle.buy_shares(qty(3), EtherAmount::from_whole_units(3)).await.unwrap();
        let settled = pending.settle().await.unwrap();
        assert_eq!(settled.settlement.block_number, Some(1));

        assert_eq!(ledger.shares_of(alice()).await, 3);
        assert_eq!(ledger.available_supply().await, 7);
        assert_eq!(ledger.balance_of(alice()).await, EtherAmount::from_whole_units(2));
    }

    #[tokio::test]
    async fn test_buy_rejects_wrong_value_and_short_supply() {
        let ledger = InMemoryLedger::new(2);
        ledger.fund(alice(), EtherAmount::from_whole_units(10)).await;
        let handle = ledger.handle(alice());

        let err = handle.buy_shares(qty(2), EtherAmount::from_whole_units(1)).await.unwrap_err();
        assert_eq!(err, LedgerError::Rejected("Incorrect value sent for shares".into()));

        let err = handle.buy_shares(qty(3), EtherAmount::from_whole_units(3)).await.unwrap_err();
        assert_eq!(err, LedgerError::Rejected("Not enough shares available".into()));
        assert_eq!(ledger.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_buy_without_funds_is_rejected() {
        let ledger = InMemoryLedger::new(10);
        let err = ledger
            .handle(alice())
            .buy_shares(qty(1), EtherAmount::from_whole_units(1))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Rejected("Insufficient funds".into()));
        assert_eq!(ledger.available_supply().await, 10);
    }

    #[tokio::test]
    async fn test_listed_shares_are_locked() {
        let ledger = InMemoryLedger::new(0);
        ledger.grant_shares(alice(), 3).await;
        let handle = ledger.handle(alice());

        handle.create_sell_request(qty(2)).await.unwrap();
        let err = handle.create_sell_request(qty(2)).await.unwrap_err();
        assert_eq!(err, LedgerError::Rejected("Not enough shares to sell".into()));
    }

    #[tokio::test]
    async fn test_bids_only_while_open_and_not_by_seller() {
        let ledger = InMemoryLedger::new(0);
        ledger.grant_shares(alice(), 2).await;
        let seller = ledger.handle(alice());
        let buyer = ledger.handle(bob());
        let request_id = seller.create_sell_request(qty(2)).await.unwrap().settle().await.unwrap().output;

        let one = EtherAmount::from_whole_units(1);
        assert!(seller.place_bid(request_id, one).await.is_err());
        buyer.place_bid(request_id, one).await.unwrap();
        seller.finalize_sale(request_id, bob()).await.unwrap();

        let err = buyer.place_bid(request_id, one).await.unwrap_err();
        assert_eq!(err, LedgerError::Rejected("Sell request is not open for bids".into()));
    }

    #[tokio::test]
    async fn test_rebid_replaces_amount() {
        let ledger = InMemoryLedger::new(0);
        ledger.grant_shares(alice(), 1).await;
        let request_id = ledger
            .handle(alice())
            .create_sell_request(qty(1))
            .await
            .unwrap()
            .settle()
            .await
            .unwrap()
            .output;
        let buyer = ledger.handle(bob());
        buyer.place_bid(request_id, EtherAmount::from_whole_units(1)).await.unwrap();
        buyer.place_bid(request_id, EtherAmount::from_whole_units(2)).await.unwrap();

        let bids = ledger.bids_on(request_id).await;
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].amount, EtherAmount::from_whole_units(2));
    }

    #[tokio::test]
    async fn test_only_seller_confirms() {
        let ledger = InMemoryLedger::new(0);
        ledger.grant_shares(alice(), 1).await;
        let request_id = ledger
            .handle(alice())
            .create_sell_request(qty(1))
            .await
            .unwrap()
            .settle()
            .await
            .unwrap()
            .output;
        let buyer = ledger.handle(bob());
        buyer.place_bid(request_id, EtherAmount::from_whole_units(1)).await.unwrap();

        let err = buyer.finalize_sale(request_id, bob()).await.unwrap_err();
        assert_eq!(err, LedgerError::Rejected("Only the seller can confirm a buyer".into()));
        assert_eq!(ledger.request_state(request_id).await, Some(RequestState::Open));
    }

    #[tokio::test]
    async fn test_payment_transfers_shares_and_funds() {
        let ledger = InMemoryLedger::new(0);
        ledger.grant_shares(alice(), 3).await;
        ledger.fund(bob(), EtherAmount::from_whole_units(5)).await;
        let seller = ledger.handle(alice());
        let buyer = ledger.handle(bob());

        let request_id = seller.create_sell_request(qty(2)).await.unwrap().settle().await.unwrap().output;
        let price = EtherAmount::parse_display("1.5").unwrap();
        buyer.place_bid(request_id, price).await.unwrap();
        let trade_id = seller.finalize_sale(request_id, bob()).await.unwrap().settle().await.unwrap().output;

        buyer.pay_for_trade(trade_id, price).await.unwrap();

        assert_eq!(ledger.shares_of(alice()).await, 1);
        assert_eq!(ledger.shares_of(bob()).await, 2);
        assert_eq!(ledger.balance_of(alice()).await, price);
        assert_eq!(
            ledger.request_state(request_id).await,
            Some(RequestState::Completed { buyer: bob() })
        );
        assert_eq!(ledger.trade(trade_id).await.unwrap().state, TradeState::Completed);
        assert!(seller.get_my_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_payment_leaves_balances_untouched() {
        let ledger = InMemoryLedger::new(0);
        ledger.grant_shares(alice(), 2).await;
        ledger.fund(bob(), EtherAmount::from_whole_units(5)).await;
        let seller = ledger.handle(alice());
        let buyer = ledger.handle(bob());

        let request_id = seller.create_sell_request(qty(1)).await.unwrap().settle().await.unwrap().output;
        let price = EtherAmount::from_whole_units(1);
        buyer.place_bid(request_id, price).await.unwrap();
        let trade_id = seller.finalize_sale(request_id, bob()).await.unwrap().settle().await.unwrap().output;

        // The seller's balance cannot take the payment.
        let headroom = EtherAmount::from_base_units(U256::MAX - U256::one());
        ledger.fund(alice(), headroom).await;

        let err = buyer.pay_for_trade(trade_id, price).await.unwrap_err();
        assert_eq!(err, LedgerError::Rejected("Balance overflow".into()));
        assert_eq!(ledger.balance_of(bob()).await, EtherAmount::from_whole_units(5));
        assert_eq!(ledger.balance_of(alice()).await, headroom);
        assert_eq!(ledger.shares_of(bob()).await, 0);
        assert_eq!(ledger.trade(trade_id).await.unwrap().state, TradeState::BuyerConfirmed);
    }

    #[tokio::test]
    async fn test_offline_ledger_reports_unavailable() {
        let ledger = InMemoryLedger::new(0);
        ledger.set_offline(true).await;
        let err = ledger.handle(alice()).get_shares_owned().await.unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(_)));
    }
}
