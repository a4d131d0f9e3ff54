//! Share Trading End-to-End Tests
//!
//! Drives two traders through the public API against one in-memory ledger:
//! a seller buys from the primary supply, lists part of the holding, a second
//! trader bids, the seller confirms that bidder and the bidder pays.

use ethers::types::Address;
use std::sync::Arc;

use share_market::domain::entities::sell_request::RequestState;
use share_market::domain::entities::trade::TradeState;
use share_market::domain::errors::WorkflowError;
use share_market::domain::services::trade_workflow::TradeWorkflow;
use share_market::domain::value_objects::ether_amount::EtherAmount;
use share_market::domain::value_objects::quantity::Holding;
use share_market::infrastructure::in_memory_ledger::{InMemoryLedger, LedgerCall};
use share_market::infrastructure::in_memory_wallet::InMemoryWallet;

struct Trader {
    account: Address,
    wallet: Arc<InMemoryWallet>,
    workflow: TradeWorkflow,
}

async fn trader(ledger: &InMemoryLedger, id: u64, funds: u64) -> Trader {
    let account = Address::from_low_u64_be(id);
    ledger.fund(account, EtherAmount::from_whole_units(funds)).await;
    let wallet = Arc::new(InMemoryWallet::new(ledger.clone(), account));
    let workflow = TradeWorkflow::new(wallet.clone());
    workflow.connect().await.expect("connect");
    Trader {
        account,
        wallet,
        workflow,
    }
}

#[tokio::test]
async fn test_primary_sale_to_secondary_trade() {
    let ledger = InMemoryLedger::new(1000);
    let alice = trader(&ledger, 0xa1, 10).await;
    let bob = trader(&ledger, 0xb0, 10).await;

    // Primary sale: five shares in two purchases, each limited to five.
    alice.workflow.buy(3).await.unwrap();
    alice.workflow.buy(2).await.unwrap();
    assert_eq!(alice.workflow.load_holdings().await.unwrap(), Holding::new(5));
    assert_eq!(ledger.balance_of(alice.account).await, EtherAmount::from_whole_units(5));
    assert_eq!(ledger.available_supply().await, 995);

    // Listing two of them.
    let request_id = alice.workflow.sell(2).await.unwrap();
    assert_eq!(ledger.request_state(request_id).await, Some(RequestState::Open));

    // Bob bids 1.5 and Alice sees it after refreshing her requests.
    bob.workflow.place_bid(request_id, "1.5").await.unwrap();
    let requests = alice.workflow.list_my_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].bids().len(), 1);
    assert_eq!(requests[0].bids()[0].bidder, bob.account);
    assert_eq!(requests[0].bids()[0].amount.to_display(), "1.5");
    assert!(!requests[0].bids()[0].confirmed);

    // An address that never bid cannot be confirmed.
    let stranger = Address::from_low_u64_be(0x5);
    let err = alice.workflow.confirm_buyer(request_id, stranger).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidBidder { .. }));
    assert_eq!(ledger.request_state(request_id).await, Some(RequestState::Open));

    let trade_id = alice.workflow.confirm_buyer(request_id, bob.account).await.unwrap();
    assert_eq!(
        ledger.request_state(request_id).await,
        Some(RequestState::BuyerConfirmed { buyer: bob.account })
    );

    // Underpaying is the ledger's call to reject; the trade stays payable.
    let err = bob.workflow.pay_for_trade(trade_id, "1").await.unwrap_err();
    assert_eq!(
        err,
        WorkflowError::TransactionRejected {
            reason: "Incorrect payment amount".to_string()
        }
    );
    assert_eq!(ledger.trade(trade_id).await.unwrap().state, TradeState::BuyerConfirmed);

    bob.workflow.pay_for_trade(trade_id, "1.5").await.unwrap();
    assert_eq!(ledger.trade(trade_id).await.unwrap().state, TradeState::Completed);
    assert_eq!(bob.workflow.trade(trade_id).await.unwrap().state(), TradeState::Completed);

    assert_eq!(alice.workflow.load_holdings().await.unwrap(), Holding::new(3));
    assert_eq!(bob.workflow.load_holdings().await.unwrap(), Holding::new(2));
    assert_eq!(
        ledger.balance_of(alice.account).await,
        EtherAmount::parse_display("6.5").unwrap()
    );
    assert_eq!(
        ledger.balance_of(bob.account).await,
        EtherAmount::parse_display("8.5").unwrap()
    );
}

#[tokio::test]
async fn test_switching_accounts_mid_session() {
    let ledger = InMemoryLedger::new(1000);
    let alice = trader(&ledger, 0xa1, 10).await;
    let other = Address::from_low_u64_be(0xc0);
    ledger.grant_shares(other, 4).await;

    alice.workflow.buy(1).await.unwrap();
    alice.workflow.load_holdings().await.unwrap();

    alice.wallet.switch_account(other);
    let calls = ledger.calls().await.len();
    let err = alice.workflow.buy(1).await.unwrap_err();
    assert!(matches!(err, WorkflowError::LedgerUnavailable(_)));
    assert!(alice.workflow.cached_holding().await.is_none());
    assert_eq!(ledger.calls().await.len(), calls);

    assert_eq!(alice.workflow.connect().await.unwrap(), other);
    assert_eq!(alice.workflow.load_holdings().await.unwrap(), Holding::new(4));
    assert!(matches!(
        ledger.calls().await.last(),
        Some(LedgerCall::GetSharesOwned { caller }) if *caller == other
    ));
}
