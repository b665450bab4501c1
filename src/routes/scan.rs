// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scan routes for gate devices.

use crate::error::{AppError, Result};
use crate::middleware::GateIdentity;
use crate::models::{CheckInDetails, ClientInfo, ScanLogEntry, ScanOutcome, ScanStats};
use crate::services::{ScanDecision, ScanRequest};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const DEFAULT_LOG_LIMIT: u32 = 50;
const MAX_LOG_LIMIT: u32 = 500;

/// Routes that need an authenticated (and throttled) gate.
/// Identity and rate limit middleware are applied in routes/mod.rs.
pub fn gate_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/scan/verify", post(verify_scan))
}

/// Read-only routes that need an authenticated gate but are not throttled.
pub fn gate_read_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/scan/stats/{event_id}", get(get_scan_stats))
        .route("/api/scan/logs/{event_id}", get(get_scan_logs))
}

/// Routes open to any caller.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/scan/validate", post(validate_scan))
}

// ─── Request / Response ──────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Scanned text; anything malformed is reported as `invalid`, not 400
    #[serde(default)]
    pub token: String,
    #[validate(length(min = 1, max = 64))]
    pub gate_id: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub operator_id: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub target_event_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    #[serde(default)]
    pub token: String,
    #[validate(length(min = 1, max = 128))]
    pub target_event_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct OrderSummary {
    pub code: String,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct HolderSummary {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct EventSummary {
    pub name: String,
    pub venue: String,
}

/// Response to a verify or validate call.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub success: bool,
    pub outcome: ScanOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<HolderSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventSummary>,
    /// Original check-in, only for `already_used`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<CheckInDetails>,
}

impl From<ScanDecision> for ScanResponse {
    fn from(decision: ScanDecision) -> Self {
        let details = decision.already_used_details();
        if !decision.is_success() {
            return Self {
                success: false,
                outcome: decision.outcome,
                order: None,
                user: None,
                event: None,
                details,
            };
        }

        Self {
            success: true,
            outcome: decision.outcome,
            order: decision.order.map(|o| OrderSummary {
                code: o.order_code,
                quantity: o.quantity,
            }),
            user: decision.user.map(|u| HolderSummary {
                name: u.name,
                email: u.email,
            }),
            event: decision.event.map(|e| EventSummary {
                name: e.name,
                venue: e.venue,
            }),
            details: None,
        }
    }
}

impl ScanResponse {
    fn invalid() -> Self {
        Self {
            success: false,
            outcome: ScanOutcome::Invalid,
            order: None,
            user: None,
            event: None,
            details: None,
        }
    }
}

fn scan_reply(decision: ScanDecision) -> (StatusCode, Json<ScanResponse>) {
    let status = match decision.outcome {
        ScanOutcome::InternalError => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(ScanResponse::from(decision)))
}

/// A body that is not the expected JSON shape carries no usable credential.
fn unreadable_body(rejection: JsonRejection) -> (StatusCode, Json<ScanResponse>) {
    tracing::warn!(
        status = rejection.status().as_u16(),
        error = %rejection.body_text(),
        "Rejected unreadable scan body"
    );
    (StatusCode::BAD_REQUEST, Json(ScanResponse::invalid()))
}

fn validation_error(err: validator::ValidationErrors) -> AppError {
    AppError::BadRequest(err.to_string())
}

/// Client address and agent as seen through the load balancer.
fn client_info(headers: &HeaderMap) -> ClientInfo {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    ClientInfo {
        ip_address,
        user_agent,
    }
}

// ─── Handlers ────────────────────────────────────────────────

/// Verify a credential and, if admissible, check it in.
async fn verify_scan(
    State(state): State<Arc<AppState>>,
    Extension(gate): Extension<GateIdentity>,
    headers: HeaderMap,
    payload: std::result::Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ScanResponse>)> {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return Ok(unreadable_body(rejection)),
    };
    body.validate().map_err(validation_error)?;

    if let Some(claimed) = &body.gate_id {
        if claimed != &gate.gate_id {
            tracing::warn!(
                gate_id = %gate.gate_id,
                claimed_gate_id = %claimed,
                "Scan body names a different gate"
            );
            return Err(AppError::BadRequest(
                "gateId does not match x-gate-id".to_string(),
            ));
        }
    }

    let request = ScanRequest {
        token: body.token,
        operator_id: body.operator_id.unwrap_or_else(|| gate.gate_id.clone()),
        target_event_id: body.target_event_id.or(gate.event_id),
        gate_id: gate.gate_id,
        client: client_info(&headers),
    };

    Ok(scan_reply(state.engine.verify(&request).await))
}

/// Preview a credential without consuming it.
async fn validate_scan(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ScanResponse>)> {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return Ok(unreadable_body(rejection)),
    };
    body.validate().map_err(validation_error)?;

    let decision = state
        .engine
        .validate(&body.token, body.target_event_id.as_deref())
        .await;
    Ok(scan_reply(decision))
}

/// Per-event scan counters.
async fn get_scan_stats(
    State(state): State<Arc<AppState>>,
    Extension(gate): Extension<GateIdentity>,
    Path(event_id): Path<String>,
) -> Result<Json<ScanStats>> {
    tracing::debug!(gate_id = %gate.gate_id, event_id = %event_id, "Fetching scan stats");

    if state.store.find_event(&event_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Event {} not found", event_id)));
    }
    Ok(Json(state.store.scan_stats(&event_id).await?))
}

#[derive(Deserialize)]
struct LogsQuery {
    #[serde(default = "default_log_limit")]
    limit: u32,
}

fn default_log_limit() -> u32 {
    DEFAULT_LOG_LIMIT
}

/// One scan log row as returned to gate devices.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct ScanLogView {
    pub scanned: String,
    pub order_code: Option<String>,
    pub event_id: Option<String>,
    pub outcome: ScanOutcome,
    pub gate_id: String,
    pub operator_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: String,
}

impl From<ScanLogEntry> for ScanLogView {
    fn from(entry: ScanLogEntry) -> Self {
        Self {
            scanned: entry.scanned,
            order_code: entry.order_code,
            event_id: entry.event_id,
            outcome: entry.outcome,
            gate_id: entry.gate_id,
            operator_id: entry.operator_id,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct ScanLogsResponse {
    pub event_id: String,
    pub entries: Vec<ScanLogView>,
}

/// Most recent scan log rows for an event, newest first.
async fn get_scan_logs(
    State(state): State<Arc<AppState>>,
    Extension(gate): Extension<GateIdentity>,
    Path(event_id): Path<String>,
    Query(params): Query<LogsQuery>,
) -> Result<Json<ScanLogsResponse>> {
    if params.limit == 0 {
        return Err(AppError::BadRequest(
            "limit must be greater than 0".to_string(),
        ));
    }
    let limit = params.limit.min(MAX_LOG_LIMIT);

    tracing::debug!(
        gate_id = %gate.gate_id,
        event_id = %event_id,
        limit,
        "Fetching scan logs"
    );

    let entries = state
        .store
        .recent_scan_logs(&event_id, limit)
        .await?
        .into_iter()
        .map(ScanLogView::from)
        .collect();
    Ok(Json(ScanLogsResponse { event_id, entries }))
}
