//! Share Ledger Trait
//!
//! This module defines the `ShareLedger` trait, the workflow's only way to
//! reach the authoritative store of share ownership, sell requests, bids and
//! trades. Implementations bind to one signing account.
//!
//! Mutating calls are two-phase. Submitting returns a [`PendingSubmission`]
//! once the ledger has accepted the call into a pending state; awaiting
//! [`PendingSubmission::settle`] resolves when the ledger has committed or
//! rejected it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::{Address, TxHash};
use futures_util::future::BoxFuture;
use std::fmt;
use thiserror::Error;

use crate::domain::entities::bid::Bid;
use crate::domain::entities::sell_request::{RequestState, SellRequest};
use crate::domain::value_objects::ether_amount::EtherAmount;
use crate::domain::value_objects::ids::{RequestId, TradeId};
use crate::domain::value_objects::quantity::{Holding, ShareQuantity};

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger could not be reached or did not answer.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The ledger declined the call; the reason is passed through as given.
    #[error("{0}")]
    Rejected(String),
}

/// Proof that a submission was committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub settled_at: DateTime<Utc>,
}

/// Outcome of a settled submission together with any value the ledger
/// assigned when the call was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled<T> {
    pub output: T,
    pub settlement: Settlement,
}

/// A submission accepted by the ledger but not yet final.
pub struct PendingSubmission<T> {
    tx_hash: TxHash,
    output: T,
    settlement: BoxFuture<'static, LedgerResult<Settlement>>,
}

impl<T> PendingSubmission<T> {
    pub fn new(
        tx_hash: TxHash,
        output: T,
        settlement: BoxFuture<'static, LedgerResult<Settlement>>,
    ) -> Self {
        PendingSubmission {
            tx_hash,
            output,
            settlement,
        }
    }

    pub fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    /// Wait for the ledger to commit or reject the submission.
    pub async fn settle(self) -> LedgerResult<Settled<T>> {
        let settlement = self.settlement.await?;
        Ok(Settled {
            output: self.output,
            settlement,
        })
    }
}

impl<T: fmt::Debug> fmt::Debug for PendingSubmission<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSubmission")
            .field("tx_hash", &self.tx_hash)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// A sell request owned by the calling account, as read from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellRequestView {
    pub request_id: RequestId,
    pub seller: Address,
    pub quantity: ShareQuantity,
    pub state: RequestState,
    pub bids: Vec<Bid>,
}

impl From<SellRequestView> for SellRequest {
    fn from(view: SellRequestView) -> Self {
        SellRequest::from_ledger(view.request_id, view.seller, view.quantity, view.state, view.bids)
    }
}

/// Ledger operations available to one signing account.
#[async_trait]
pub trait ShareLedger: Send + Sync {
    /// The account every call is signed by.
    fn account(&self) -> Address;

    async fn get_shares_owned(&self) -> LedgerResult<Holding>;

    /// Buy `quantity` new shares, attaching `value` as payment.
    async fn buy_shares(
        &self,
        quantity: ShareQuantity,
        value: EtherAmount,
    ) -> LedgerResult<PendingSubmission<()>>;

    /// List shares for sale; the submission carries the new request id.
    async fn create_sell_request(
        &self,
        quantity: ShareQuantity,
    ) -> LedgerResult<PendingSubmission<RequestId>>;

    /// Requests listed by the calling account, with their current bids.
    async fn get_my_requests(&self) -> LedgerResult<Vec<SellRequestView>>;

    async fn place_bid(
        &self,
        request_id: RequestId,
        amount: EtherAmount,
    ) -> LedgerResult<PendingSubmission<()>>;

    /// Accept `bidder` as buyer; the submission carries the new trade id.
    async fn finalize_sale(
        &self,
        request_id: RequestId,
        bidder: Address,
    ) -> LedgerResult<PendingSubmission<TradeId>>;

    async fn pay_for_trade(
        &self,
        trade_id: TradeId,
        value: EtherAmount,
    ) -> LedgerResult<PendingSubmission<()>>;
}
