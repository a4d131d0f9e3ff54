pub mod ether_amount;
pub mod ids;
pub mod quantity;
