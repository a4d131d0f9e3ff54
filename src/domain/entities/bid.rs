use ethers::types::Address;
use serde::Serialize;

use crate::domain::value_objects::{ether_amount::EtherAmount, ids::RequestId};

/// An offer of `amount` against a sell request, as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bid {
    pub request_id: RequestId,
    pub bidder: Address,
    pub amount: EtherAmount,
    pub confirmed: bool,
}

impl Bid {
    pub fn new(request_id: RequestId, bidder: Address, amount: EtherAmount, confirmed: bool) -> Self {
        Bid {
            request_id,
            bidder,
            amount,
            confirmed,
        }
    }
}
