use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger-assigned identifier of a sell request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

/// Ledger-assigned identifier of a trade created when a buyer is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeId(pub u64);

macro_rules! ledger_id {
    ($name:ident) => {
        impl $name {
            /// Narrow a ledger word to an id; `None` if it does not fit in 64 bits.
            pub fn from_word(word: U256) -> Option<Self> {
                if word > U256::from(u64::MAX) {
                    None
                } else {
                    Some($name(word.low_u64()))
                }
            }

            pub fn as_word(&self) -> U256 {
                U256::from(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                $name(value)
            }
        }
    };
}

ledger_id!(RequestId);
ledger_id!(TradeId);
