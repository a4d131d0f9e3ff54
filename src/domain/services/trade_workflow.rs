//! Trade Workflow
//!
//! Client side of the share market. Every operation follows the same shape:
//! validate local preconditions, submit one ledger call, wait for the ledger
//! to settle it, then reconcile the local view from the ledger's answer.
//!
//! The local view is a cache. The holding is only replaced by an explicit
//! [`TradeWorkflow::load_holdings`], the request list only by
//! [`TradeWorkflow::list_my_requests`], and state records only move after the
//! ledger has settled the matching operation.
//!
//! A session binds the workflow to one wallet account. If the wallet reports a
//! different account the session is dropped and every operation fails with
//! `LedgerUnavailable` until `connect` is called again.

use ethers::types::Address;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::entities::sell_request::SellRequest;
use crate::domain::entities::trade::Trade;
use crate::domain::errors::{WorkflowError, WorkflowResult};
use crate::domain::repositories::share_ledger::{LedgerError, Settlement, ShareLedger};
use crate::domain::repositories::wallet::WalletProvider;
use crate::domain::value_objects::ether_amount::EtherAmount;
use crate::domain::value_objects::ids::{RequestId, TradeId};
use crate::domain::value_objects::quantity::{Holding, ShareQuantity, MAX_BUY_QUANTITY};

struct Session {
    epoch: u64,
    account: Address,
    ledger: Arc<dyn ShareLedger>,
    account_watch: watch::Receiver<Option<Address>>,
    listener: JoinHandle<()>,
}

impl Session {
    /// The account the wallet now reports, if it differs from ours.
    fn account_drift(&self) -> Option<Option<Address>> {
        let current = *self.account_watch.borrow();
        if current == Some(self.account) {
            None
        } else {
            Some(current)
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[derive(Default)]
struct LocalView {
    holding: Option<Holding>,
    requests: BTreeMap<RequestId, SellRequest>,
    trades: BTreeMap<TradeId, Trade>,
}

struct ActiveSession {
    epoch: u64,
    account: Address,
    ledger: Arc<dyn ShareLedger>,
}

/// Share-trading workflow bound to a wallet.
pub struct TradeWorkflow {
    wallet: Arc<dyn WalletProvider>,
    session: Arc<RwLock<Option<Session>>>,
    view: Arc<RwLock<LocalView>>,
    next_epoch: AtomicU64,
}

impl TradeWorkflow {
    pub fn new(wallet: Arc<dyn WalletProvider>) -> Self {
        TradeWorkflow {
            wallet,
            session: Arc::new(RwLock::new(None)),
            view: Arc::new(RwLock::new(LocalView::default())),
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Bind a session to the wallet's active account.
    ///
    /// Replaces any previous session and clears the local view, since cached
    /// holdings and requests belong to the previous identity.
    pub async fn connect(&self) -> WorkflowResult<Address> {
        let accounts = self.wallet.request_accounts().await?;
        let account = *accounts.first().ok_or_else(|| {
            WorkflowError::LedgerUnavailable("wallet returned no accounts".to_string())
        })?;

        let ledger = self.wallet.connect_ledger(account).await?;
        let account_watch = self.wallet.accounts_changed();
        if *account_watch.borrow() != Some(account) {
            warn!(%account, "Wallet account changed while connecting");
            return Err(WorkflowError::LedgerUnavailable(
                "wallet account changed while connecting".to_string(),
            ));
        }

        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst);
        let listener = self.spawn_account_listener(epoch, account, account_watch.clone());

        let mut session = self.session.write().await;
        let mut view = self.view.write().await;
        *view = LocalView::default();
        *session = Some(Session {
            epoch,
            account,
            ledger,
            account_watch,
            listener,
        });

        info!(%account, wallet = self.wallet.name(), epoch, "Session connected");
        Ok(account)
    }

    /// End the session explicitly.
    pub async fn disconnect(&self) {
        let mut session = self.session.write().await;
        if let Some(ended) = session.take() {
            *self.view.write().await = LocalView::default();
            info!(account = %ended.account, "Session disconnected");
        }
    }

    pub async fn session_account(&self) -> Option<Address> {
        self.active_session().await.ok().map(|active| active.account)
    }

    /// Refresh the cached holding from the ledger.
    pub async fn load_holdings(&self) -> WorkflowResult<Holding> {
        let active = self.active_session().await?;
        let holding = active
            .ledger
            .get_shares_owned()
            .await
            .map_err(|e| Self::ledger_failure("get_shares_owned", e))?;

        self.reconcile(active.epoch, |view| view.holding = Some(holding))
            .await;
        debug!(account = %active.account, shares = holding.shares(), "Holding loaded");
        Ok(holding)
    }

    /// Buy `quantity` shares at one display unit each.
    ///
    /// The cached holding is left as is; call `load_holdings` afterwards.
    pub async fn buy(&self, quantity: u64) -> WorkflowResult<Settlement> {
        let quantity =
            ShareQuantity::for_purchase(quantity).ok_or(WorkflowError::InvalidQuantity {
                quantity,
                min: 1,
                max: MAX_BUY_QUANTITY,
            })?;
        let value = EtherAmount::for_shares(quantity);
        let active = self.active_session().await?;

        info!(account = %active.account, %quantity, %value, "Submitting share purchase");
        let pending = active
            .ledger
            .buy_shares(quantity, value)
            .await
            .map_err(|e| Self::ledger_failure("buy_shares", e))?;
        let settled = pending
            .settle()
            .await
            .map_err(|e| Self::ledger_failure("buy_shares", e))?;

        info!(
            tx = ?settled.settlement.tx_hash,
            %quantity,
            "Share purchase settled, holding cache stale until reload"
        );
        Ok(settled.settlement)
    }

    /// List `quantity` shares for sale and return the ledger-assigned id.
    pub async fn sell(&self, quantity: u64) -> WorkflowResult<RequestId> {
        let active = self.active_session().await?;
        let held = self.view.read().await.holding.unwrap_or_default();

        let quantity = ShareQuantity::new(quantity).map_err(|_| match held.shares() {
            0 => WorkflowError::InsufficientHolding { requested: quantity, held: 0 },
            max => WorkflowError::InvalidQuantity { quantity, min: 1, max },
        })?;
        if !held.covers(quantity) {
            return Err(WorkflowError::InsufficientHolding {
                requested: quantity.value(),
                held: held.shares(),
            });
        }

        info!(account = %active.account, %quantity, "Submitting sell request");
        let pending = active
            .ledger
            .create_sell_request(quantity)
            .await
            .map_err(|e| Self::ledger_failure("create_sell_request", e))?;
        let settled = pending
            .settle()
            .await
            .map_err(|e| Self::ledger_failure("create_sell_request", e))?;

        let request_id = settled.output;
        let account = active.account;
        self.reconcile(active.epoch, |view| {
            view.requests
                .insert(request_id, SellRequest::open(request_id, account, quantity));
        })
        .await;

        info!(%request_id, tx = ?settled.settlement.tx_hash, "Sell request created");
        Ok(request_id)
    }

    /// Fetch the caller's requests and bids, replacing the cached list.
    pub async fn list_my_requests(&self) -> WorkflowResult<Vec<SellRequest>> {
        let active = self.active_session().await?;
        let views = active
            .ledger
            .get_my_requests()
            .await
            .map_err(|e| Self::ledger_failure("get_my_requests", e))?;

        let requests: Vec<SellRequest> = views.into_iter().map(SellRequest::from).collect();
        let fresh: BTreeMap<RequestId, SellRequest> = requests
            .iter()
            .map(|request| (request.request_id(), request.clone()))
            .collect();
        self.reconcile(active.epoch, |view| view.requests = fresh).await;

        debug!(account = %active.account, count = requests.len(), "Requests loaded");
        Ok(requests)
    }

    /// Bid `amount` (display units) on someone's request.
    ///
    /// Whether the request still takes bids is for the ledger to decide.
    pub async fn place_bid(&self, request_id: RequestId, amount: &str) -> WorkflowResult<Settlement> {
        let amount = EtherAmount::parse_positive(amount)?;
        let active = self.active_session().await?;

        info!(account = %active.account, %request_id, %amount, "Submitting bid");
        let pending = active
            .ledger
            .place_bid(request_id, amount)
            .await
            .map_err(|e| Self::ledger_failure("place_bid", e))?;
        let settled = pending
            .settle()
            .await
            .map_err(|e| Self::ledger_failure("place_bid", e))?;

        info!(%request_id, tx = ?settled.settlement.tx_hash, "Bid placed");
        Ok(settled.settlement)
    }

    /// Accept `bidder` as the buyer of `request_id` and return the trade id.
    ///
    /// `bidder` must be among the bids from the last `list_my_requests`.
    pub async fn confirm_buyer(&self, request_id: RequestId, bidder: Address) -> WorkflowResult<TradeId> {
        let active = self.active_session().await?;
        let bid = self
            .view
            .read()
            .await
            .requests
            .get(&request_id)
            .and_then(|request| request.bid_from(bidder))
            .cloned()
            .ok_or(WorkflowError::InvalidBidder { request_id, bidder })?;

        info!(%request_id, bidder = ?bidder, amount = %bid.amount, "Submitting buyer confirmation");
        let pending = active
            .ledger
            .finalize_sale(request_id, bidder)
            .await
            .map_err(|e| Self::ledger_failure("finalize_sale", e))?;
        let settled = pending
            .settle()
            .await
            .map_err(|e| Self::ledger_failure("finalize_sale", e))?;

        let trade_id = settled.output;
        self.reconcile(active.epoch, |view| {
            if let Some(request) = view.requests.get_mut(&request_id) {
                if let Err(e) = request.confirm_buyer(bidder) {
                    warn!(%request_id, "Ledger confirmed buyer but cached request disagrees: {}", e);
                }
            }
            view.trades
                .insert(trade_id, Trade::confirmed(trade_id, request_id, bidder, bid.amount));
        })
        .await;

        info!(%request_id, %trade_id, "Buyer confirmed, awaiting payment");
        Ok(trade_id)
    }

    /// Pay `amount` (display units) for a trade.
    ///
    /// The amount is sent as entered; a mismatch with the agreed price is the
    /// ledger's to reject.
    pub async fn pay_for_trade(&self, trade_id: TradeId, amount: &str) -> WorkflowResult<Settlement> {
        let value = EtherAmount::parse_display(amount)?;
        let active = self.active_session().await?;

        if let Some(agreed) = self.view.read().await.trades.get(&trade_id).map(Trade::amount) {
            if agreed != value {
                debug!(%trade_id, %agreed, offered = %value, "Payment differs from agreed amount");
            }
        }

        info!(account = %active.account, %trade_id, %value, "Submitting trade payment");
        let pending = active
            .ledger
            .pay_for_trade(trade_id, value)
            .await
            .map_err(|e| Self::ledger_failure("pay_for_trade", e))?;
        let settled = pending
            .settle()
            .await
            .map_err(|e| Self::ledger_failure("pay_for_trade", e))?;

        let account = active.account;
        self.reconcile(active.epoch, |view| {
            let request_id = match view.trades.get_mut(&trade_id) {
                Some(trade) => {
                    if let Err(e) = trade.complete() {
                        warn!(%trade_id, "Ledger settled payment but cached trade disagrees: {}", e);
                    }
                    trade.request_id()
                }
                None => {
                    view.trades.insert(trade_id, Trade::paid(trade_id, account, value));
                    None
                }
            };
            if let Some(request) = request_id.and_then(|id| view.requests.get_mut(&id)) {
                if let Err(e) = request.complete() {
                    warn!(request_id = %request.request_id(), "Cached request not completable: {}", e);
                }
            }
        })
        .await;

        info!(%trade_id, tx = ?settled.settlement.tx_hash, "Trade paid");
        Ok(settled.settlement)
    }

    pub async fn cached_holding(&self) -> Option<Holding> {
        self.view.read().await.holding
    }

    pub async fn cached_request(&self, request_id: RequestId) -> Option<SellRequest> {
        self.view.read().await.requests.get(&request_id).cloned()
    }

    pub async fn cached_requests(&self) -> Vec<SellRequest> {
        self.view.read().await.requests.values().cloned().collect()
    }

    pub async fn trade(&self, trade_id: TradeId) -> Option<Trade> {
        self.view.read().await.trades.get(&trade_id).cloned()
    }

    /// Current session, or `LedgerUnavailable` if there is none or the wallet
    /// account has changed underneath it.
    async fn active_session(&self) -> WorkflowResult<ActiveSession> {
        let drift = {
            let session = self.session.read().await;
            let session = session.as_ref().ok_or_else(|| {
                WorkflowError::LedgerUnavailable("no active session, connect first".to_string())
            })?;
            match session.account_drift() {
                None => {
                    return Ok(ActiveSession {
                        epoch: session.epoch,
                        account: session.account,
                        ledger: Arc::clone(&session.ledger),
                    })
                }
                Some(current) => (session.epoch, session.account, current),
            }
        };

        let (epoch, previous, current) = drift;
        invalidate(&self.session, &self.view, epoch).await;
        warn!(previous = ?previous, current = ?current, "Wallet account changed, session invalidated");
        Err(WorkflowError::LedgerUnavailable(
            "wallet account changed, reconnect required".to_string(),
        ))
    }

    /// Apply a settled outcome to the local view, unless the session it was
    /// submitted under has ended in the meantime.
    async fn reconcile<F>(&self, epoch: u64, apply: F)
    where
        F: FnOnce(&mut LocalView),
    {
        let session = self.session.read().await;
        match session.as_ref() {
            Some(current) if current.epoch == epoch && current.account_drift().is_none() => {
                apply(&mut *self.view.write().await);
            }
            _ => warn!(epoch, "Session ended before settlement was reconciled"),
        }
    }

    fn spawn_account_listener(
        &self,
        epoch: u64,
        account: Address,
        mut account_watch: watch::Receiver<Option<Address>>,
    ) -> JoinHandle<()> {
        let session = Arc::clone(&self.session);
        let view = Arc::clone(&self.view);
        tokio::spawn(async move {
            while account_watch.changed().await.is_ok() {
                let current = *account_watch.borrow_and_update();
                if current != Some(account) {
                    warn!(previous = ?account, current = ?current, "Account changed event");
                    invalidate(&session, &view, epoch).await;
                    return;
                }
            }
        })
    }

    fn ledger_failure(operation: &str, error: LedgerError) -> WorkflowError {
        match &error {
            LedgerError::Rejected(reason) => warn!(operation, reason = %reason, "Ledger rejected call"),
            LedgerError::Unavailable(reason) => warn!(operation, reason = %reason, "Ledger unavailable"),
        }
        error.into()
    }
}

async fn invalidate(session: &RwLock<Option<Session>>, view: &RwLock<LocalView>, epoch: u64) {
    let mut slot = session.write().await;
    if slot.as_ref().map(|s| s.epoch) == Some(epoch) {
        let ended = slot.take();
        *view.write().await = LocalView::default();
        drop(slot);
        // Dropping the session aborts its listener, which may be the caller.
        drop(ended);
    }
}
