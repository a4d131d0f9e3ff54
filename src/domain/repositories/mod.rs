pub mod share_ledger;
pub mod wallet;
