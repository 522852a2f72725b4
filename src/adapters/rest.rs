//! Operator REST Surface
//!
//! Read-only endpoints for operator dashboards plus liveness/readiness
//! probes: open orders, order history, and the last balance snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::domain::order::SubOrder;
use crate::ports::store::Store;
use crate::usecases::reconciler::BalanceBook;

/// Shared state of the operator router.
#[derive(Clone)]
pub struct OperatorState {
    store: Arc<dyn Store>,
    balances: Arc<BalanceBook>,
    ready: watch::Receiver<bool>,
}

impl OperatorState {
    pub fn new(
        store: Arc<dyn Store>,
        balances: Arc<BalanceBook>,
        ready: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            balances,
            ready,
        }
    }
}

/// Build the operator router.
pub fn router(state: OperatorState) -> Router {
    Router::new()
        .route("/api/openorders", get(open_orders))
        .route("/api/orderhistory", get(order_history))
        .route("/api/balance", get(balance))
        .route("/live", get(|| async { StatusCode::OK }))
        .route("/ready", get(ready))
        .with_state(state)
}

/// Serve the operator surface until the process exits.
pub async fn serve(state: OperatorState, bind_address: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!(address = bind_address, "Operator REST listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn open_orders(
    State(state): State<OperatorState>,
) -> Result<Json<Vec<SubOrder>>, StatusCode> {
    match state.store.open_sub_orders().await {
        Ok(orders) => Ok(Json(orders)),
        Err(e) => {
            warn!(error = %e, "Open orders query failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn order_history(
    State(state): State<OperatorState>,
) -> Result<Json<Vec<SubOrder>>, StatusCode> {
    match state.store.all_sub_orders().await {
        Ok(orders) => Ok(Json(orders)),
        Err(e) => {
            warn!(error = %e, "Order history query failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn balance(
    State(state): State<OperatorState>,
) -> Json<HashMap<String, HashMap<String, Decimal>>> {
    Json(state.balances.snapshot())
}

async fn ready(State(state): State<OperatorState>) -> StatusCode {
    if *state.ready.borrow() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
