pub mod trade_workflow;
