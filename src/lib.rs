//! Share Market Client Library
//!
//! Client-side workflow for trading company shares on a ledger: buying from
//! the primary supply, listing shares for sale, bidding, confirming a buyer
//! and paying for the trade.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod secrets;
