pub mod trade_handler;
