pub mod bid;
pub mod sell_request;
pub mod trade;
