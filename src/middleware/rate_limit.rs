// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-gate scan throttling.
//!
//! Runs after [`super::gate::require_gate`]. Rejections short-circuit with
//! 429 before the catalog store is touched and leave no scan log row.
//! Every admitted request spends budget, including ones whose credential
//! later turns out to be garbage.

use super::gate::GateIdentity;
use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    Extension,
};
use std::sync::Arc;

/// Middleware that enforces `scan_rate_limit_per_minute` per gate.
pub async fn limit_scans(
    State(state): State<Arc<AppState>>,
    Extension(gate): Extension<GateIdentity>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let max = state.config.scan_rate_limit_per_minute;

    match state.rate_limiter.try_acquire(&gate.gate_id, max).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(gate_id = %gate.gate_id, max_per_minute = max, "Gate rate limited");
            return Err(AppError::RateLimited(gate.gate_id));
        }
        Err(err) => {
            // Counter store down: throttling is best-effort, scanning is not.
            tracing::error!(
                error = %err,
                gate_id = %gate.gate_id,
                "Rate limiter unavailable, admitting request"
            );
        }
    }

    Ok(next.run(request).await)
}
