use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::domain::entities::sell_request::SellRequest;
use crate::domain::entities::trade::Trade;
use crate::domain::errors::WorkflowError;
use crate::domain::repositories::share_ledger::Settlement;
use crate::domain::services::trade_workflow::TradeWorkflow;
use crate::domain::value_objects::ids::{RequestId, TradeId};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuantityRequest {
    pub quantity: u64,
}

/// Amount in display units, e.g. `"1.5"`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AmountRequest {
    pub amount: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmBuyerRequest {
    pub bidder: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub account: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HoldingResponse {
    pub account: Option<Address>,
    pub shares: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettlementResponse {
    pub tx_hash: String,
    pub block_number: Option<u64>,
    pub settled_at: String,
}

impl From<Settlement> for SettlementResponse {
    fn from(settlement: Settlement) -> Self {
        Self {
            tx_hash: format!("{:?}", settlement.tx_hash),
            block_number: settlement.block_number,
            settled_at: settlement.settled_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SellResponse {
    pub request_id: RequestId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmBuyerResponse {
    pub request_id: RequestId,
    pub trade_id: TradeId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub account: Option<Address>,
}

/// HTTP status for a workflow failure.
pub fn status_for(error: &WorkflowError) -> StatusCode {
    match error {
        WorkflowError::InvalidQuantity { .. } | WorkflowError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        WorkflowError::InsufficientHolding { .. } | WorkflowError::InvalidBidder { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        WorkflowError::TransactionRejected { .. } => StatusCode::CONFLICT,
        WorkflowError::LedgerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn reject(error: WorkflowError) -> (StatusCode, Json<ErrorResponse>) {
    debug!(code = error.error_code(), "Request failed: {}", error);
    (
        status_for(&error),
        Json(ErrorResponse {
            error: error.to_string(),
            code: error.error_code().to_string(),
        }),
    )
}

/// Routes for every workflow operation, sharing one workflow.
pub fn router(workflow: Arc<TradeWorkflow>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/session/connect", post(connect))
        .route("/session", delete(disconnect))
        .route("/holdings", get(load_holdings))
        .route("/shares/buy", post(buy_shares))
        .route("/shares/sell", post(sell_shares))
        .route("/requests", get(list_my_requests))
        .route("/requests/:request_id/bids", post(place_bid))
        .route("/requests/:request_id/confirm", post(confirm_buyer))
        .route("/trades/:trade_id", get(get_trade))
        .route("/trades/:trade_id/pay", post(pay_for_trade))
        .with_state(workflow)
}

pub async fn health_check(State(workflow): State<Arc<TradeWorkflow>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "running".to_string(),
        account: workflow.session_account().await,
    })
}

pub async fn connect(State(workflow): State<Arc<TradeWorkflow>>) -> ApiResult<SessionResponse> {
    let account = workflow.connect().await.map_err(reject)?;
    Ok(Json(SessionResponse { account }))
}

pub async fn disconnect(State(workflow): State<Arc<TradeWorkflow>>) -> StatusCode {
    workflow.disconnect().await;
    StatusCode::NO_CONTENT
}

/// Reload the holding from the ledger and return it
pub async fn load_holdings(State(workflow): State<Arc<TradeWorkflow>>) -> ApiResult<HoldingResponse> {
    let holding = workflow.load_holdings().await.map_err(reject)?;
    Ok(Json(HoldingResponse {
        account: workflow.session_account().await,
        shares: holding.shares(),
    }))
}

pub async fn buy_shares(
    State(workflow): State<Arc<TradeWorkflow>>,
    Json(payload): Json<QuantityRequest>,
) -> ApiResult<SettlementResponse> {
    let settlement = workflow.buy(payload.quantity).await.map_err(reject)?;
    Ok(Json(settlement.into()))
}

pub async fn sell_shares(
    State(workflow): State<Arc<TradeWorkflow>>,
    Json(payload): Json<QuantityRequest>,
) -> ApiResult<SellResponse> {
    let request_id = workflow.sell(payload.quantity).await.map_err(reject)?;
    Ok(Json(SellResponse { request_id }))
}

pub async fn list_my_requests(State(workflow): State<Arc<TradeWorkflow>>) -> ApiResult<Vec<SellRequest>> {
    let requests = workflow.list_my_requests().await.map_err(reject)?;
    Ok(Json(requests))
}

pub async fn place_bid(
    State(workflow): State<Arc<TradeWorkflow>>,
    Path(request_id): Path<u64>,
    Json(payload): Json<AmountRequest>,
) -> ApiResult<SettlementResponse> {
    let settlement = workflow
        .place_bid(RequestId(request_id), &payload.amount)
        .await
        .map_err(reject)?;
    Ok(Json(settlement.into()))
}

pub async fn confirm_buyer(
    State(workflow): State<Arc<TradeWorkflow>>,
    Path(request_id): Path<u64>,
    Json(payload): Json<ConfirmBuyerRequest>,
) -> ApiResult<ConfirmBuyerResponse> {
    let request_id = RequestId(request_id);
    let trade_id = workflow
        .confirm_buyer(request_id, payload.bidder)
        .await
        .map_err(reject)?;
    Ok(Json(ConfirmBuyerResponse { request_id, trade_id }))
}

/// Locally known state of a trade
pub async fn get_trade(
    State(workflow): State<Arc<TradeWorkflow>>,
    Path(trade_id): Path<u64>,
) -> ApiResult<Trade> {
    let trade_id = TradeId(trade_id);
    workflow.trade(trade_id).await.map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Unknown trade: {}", trade_id),
                code: "ERR_UNKNOWN_TRADE".to_string(),
            }),
        )
    })
}

pub async fn pay_for_trade(
    State(workflow): State<Arc<TradeWorkflow>>,
    Path(trade_id): Path<u64>,
    Json(payload): Json<AmountRequest>,
) -> ApiResult<SettlementResponse> {
    let settlement = workflow
        .pay_for_trade(TradeId(trade_id), &payload.amount)
        .await
        .map_err(reject)?;
    Ok(Json(settlement.into()))
}
