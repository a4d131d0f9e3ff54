use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::Serialize;

use crate::domain::errors::TransitionError;
use crate::domain::value_objects::{ether_amount::EtherAmount, ids::RequestId, ids::TradeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeState {
    BuyerConfirmed,
    Completed,
}

impl TradeState {
    pub fn name(&self) -> &'static str {
        match self {
            TradeState::BuyerConfirmed => "buyer_confirmed",
            TradeState::Completed => "completed",
        }
    }
}

/// A realized transaction between a seller and a confirmed buyer.
///
/// The seller's session learns about a trade when `confirm_buyer` settles and
/// knows the request it came from. A buyer paying by trade id may only know
/// the id and what it paid, so `request_id` is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trade {
    trade_id: TradeId,
    request_id: Option<RequestId>,
    buyer: Address,
    amount: EtherAmount,
    state: TradeState,
    confirmed_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Trade {
    pub fn confirmed(
        trade_id: TradeId,
        request_id: RequestId,
        buyer: Address,
        amount: EtherAmount,
    ) -> Self {
        Trade {
            trade_id,
            request_id: Some(request_id),
            buyer,
            amount,
            state: TradeState::BuyerConfirmed,
            confirmed_at: Utc::now(),
            completed_at: None,
        }
    }

    /// A trade first seen through a settled payment.
    pub fn paid(trade_id: TradeId, buyer: Address, amount: EtherAmount) -> Self {
        let now = Utc::now();
        Trade {
            trade_id,
            request_id: None,
            buyer,
            amount,
            state: TradeState::Completed,
            confirmed_at: now,
            completed_at: Some(now),
        }
    }

    pub fn trade_id(&self) -> TradeId {
        self.trade_id
    }

    pub fn request_id(&self) -> Option<RequestId> {
        self.request_id
    }

    pub fn buyer(&self) -> Address {
        self.buyer
    }

    pub fn amount(&self) -> EtherAmount {
        self.amount
    }

    pub fn state(&self) -> TradeState {
        self.state
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn complete(&mut self) -> Result<(), TransitionError> {
        if self.state != TradeState::BuyerConfirmed {
            return Err(TransitionError::InvalidTradeState {
                trade_id: self.trade_id,
                state: self.state.name(),
                expected: TradeState::BuyerConfirmed.name(),
            });
        }
        self.state = TradeState::Completed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}
