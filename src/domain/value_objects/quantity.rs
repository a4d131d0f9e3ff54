use serde::{Deserialize, Serialize};

/// Per-transaction cap on shares bought from the primary supply.
pub const MAX_BUY_QUANTITY: u64 = 5;

/// A whole, strictly positive number of shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareQuantity(u64);

impl ShareQuantity {
    pub fn new(value: u64) -> Result<Self, String> {
        if value >= 1 {
            Ok(ShareQuantity(value))
        } else {
            Err("Share quantity must be at least 1".to_string())
        }
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Quantity accepted by a single purchase: `1..=MAX_BUY_QUANTITY`.
    pub fn for_purchase(value: u64) -> Option<Self> {
        if (1..=MAX_BUY_QUANTITY).contains(&value) {
            Some(ShareQuantity(value))
        } else {
            None
        }
    }
}

impl std::fmt::Display for ShareQuantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shares owned by an account as last reported by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Holding(u64);

impl Holding {
    pub fn new(shares: u64) -> Self {
        Holding(shares)
    }

    pub fn shares(&self) -> u64 {
        self.0
    }

    pub fn covers(&self, quantity: ShareQuantity) -> bool {
        quantity.value() <= self.0
    }
}
