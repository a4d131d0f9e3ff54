pub mod company_shares_client;
pub mod in_memory_ledger;
pub mod in_memory_wallet;
pub mod local_wallet;
