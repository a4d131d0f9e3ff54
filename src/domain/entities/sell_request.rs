//! Sell Request Entity
//!
//! A seller's offer of shares, modelled as an explicit state record:
//!
//! ```text
//! Open --confirm_buyer--> BuyerConfirmed --complete--> Completed
//! ```
//!
//! `Cancelled` is a ledger-side state; no client operation produces it.
//!
//! Fields are private; the only way to move a request forward is through the
//! transition methods, which the workflow calls once the ledger has settled
//! the corresponding operation.

use ethers::types::Address;
use serde::Serialize;

use crate::domain::entities::bid::Bid;
use crate::domain::errors::TransitionError;
use crate::domain::value_objects::{ids::RequestId, quantity::ShareQuantity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RequestState {
    Open,
    BuyerConfirmed { buyer: Address },
    Completed { buyer: Address },
    Cancelled,
}

impl RequestState {
    pub fn name(&self) -> &'static str {
        match self {
            RequestState::Open => "open",
            RequestState::BuyerConfirmed { .. } => "buyer_confirmed",
            RequestState::Completed { .. } => "completed",
            RequestState::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SellRequest {
    request_id: RequestId,
    seller: Address,
    quantity: ShareQuantity,
    state: RequestState,
    bids: Vec<Bid>,
}

impl SellRequest {
    /// A freshly listed request with no bids yet.
    pub fn open(request_id: RequestId, seller: Address, quantity: ShareQuantity) -> Self {
        SellRequest {
            request_id,
            seller,
            quantity,
            state: RequestState::Open,
            bids: Vec::new(),
        }
    }

    /// Rebuild a request from an authoritative ledger read.
    pub fn from_ledger(
        request_id: RequestId,
        seller: Address,
        quantity: ShareQuantity,
        state: RequestState,
        bids: Vec<Bid>,
    ) -> Self {
        SellRequest {
            request_id,
            seller,
            quantity,
            state,
            bids,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn seller(&self) -> Address {
        self.seller
    }

    pub fn quantity(&self) -> ShareQuantity {
        self.quantity
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    pub fn bids(&self) -> &[Bid] {
        &self.bids
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, RequestState::Open)
    }

    pub fn bid_from(&self, bidder: Address) -> Option<&Bid> {
        self.bids.iter().find(|bid| bid.bidder == bidder)
    }

    pub fn confirm_buyer(&mut self, buyer: Address) -> Result<(), TransitionError> {
        if !self.is_open() {
            return Err(self.wrong_state("open"));
        }
        if self.bid_from(buyer).is_none() {
            return Err(TransitionError::UnknownBidder {
                request_id: self.request_id,
                bidder: buyer,
            });
        }
        self.state = RequestState::BuyerConfirmed { buyer };
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), TransitionError> {
        match self.state {
            RequestState::BuyerConfirmed { buyer } => {
                self.state = RequestState::Completed { buyer };
                Ok(())
            }
            _ => Err(self.wrong_state("buyer_confirmed")),
        }
    }

    fn wrong_state(&self, expected: &'static str) -> TransitionError {
        TransitionError::InvalidRequestState {
            request_id: self.request_id,
            state: self.state.name(),
            expected,
        }
    }
}
