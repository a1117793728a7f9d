//! Operator endpoints: connector diagnostics and manual redeploy.

use super::ApiError;
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tkb_core::{ConnectionState, Reconnector};

/// GET /api/debug – connector health plus a direct total-count probe.
pub(crate) async fn debug(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.connection.snapshot();
    let total_records = match state.connection.current_handle() {
        Some(contract) => match contract.total_records().await {
            Ok(total) => json!({ "ok": total }),
            Err(e) => json!({ "error": e.to_string() }),
        },
        None => Value::Null,
    };

    Json(json!({
        "state": snapshot.state,
        "connected": snapshot.state == ConnectionState::Connected,
        "address": snapshot.address,
        "endpoint": snapshot.endpoint,
        "attempts": snapshot.attempts,
        "lastError": snapshot.last_error,
        "descriptorPath": state.connection.descriptor_path().display().to_string(),
        "rpcEndpoints": state.config.rpc_endpoints,
        "totalRecords": total_records,
        "lastBatch": state.records.last_summary(),
    }))
}

/// POST /api/redeploy – runs the deploy command, then schedules a reconnect.
pub(crate) async fn redeploy(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let deployer = state
        .deployer
        .as_ref()
        .ok_or_else(|| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "no deploy command configured"))?;

    let outcome = deployer.deploy().await.map_err(|e| {
        tracing::error!(target: "tkb::deploy", error = %e, "Manual redeploy failed");
        ApiError::from(e)
    })?;

    if let Err(e) = state.connection.record_deployment(&outcome) {
        tracing::error!(target: "tkb::connector", error = %e, "Deployed address not recorded");
    }

    let delay = state.retry.after_deploy_delay;
    Reconnector::new(Arc::clone(&state.connection), state.retry.clone())
        .with_initial_delay(delay)
        .spawn();
    tracing::info!(
        target: "tkb::connector",
        reconnect_in_ms = delay.as_millis() as u64,
        "Reconnect scheduled after redeploy"
    );

    Ok(Json(json!({
        "status": "redeployed",
        "announcedAddress": outcome.announced_address,
        "reconnectInMs": delay.as_millis() as u64,
    })))
}
