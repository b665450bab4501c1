// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gate identity guard.
//!
//! Scan requests must name a registered, active gate in `x-gate-id`, and
//! present its shared secret in `x-gate-secret` when one is configured.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const GATE_ID_HEADER: &str = "x-gate-id";
pub const GATE_SECRET_HEADER: &str = "x-gate-secret";

/// Authenticated gate, inserted into request extensions by [`require_gate`].
#[derive(Debug, Clone)]
pub struct GateIdentity {
    pub gate_id: String,
    /// Event the gate is bound to, used as the default scan target
    pub event_id: Option<String>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Middleware that requires a recognized, active gate.
pub async fn require_gate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let gate_id = header_str(request.headers(), GATE_ID_HEADER)
        .ok_or(AppError::MissingGateId)?
        .to_string();

    let gate = state.store.find_gate(&gate_id).await?.ok_or_else(|| {
        tracing::warn!(gate_id = %gate_id, "Blocked scan request from unknown gate");
        AppError::InvalidGate
    })?;

    if !gate.is_active {
        tracing::warn!(gate_id = %gate_id, "Blocked scan request from inactive gate");
        return Err(AppError::GateInactive(gate_id));
    }

    if let Some(expected) = &gate.secret {
        let presented = header_str(request.headers(), GATE_SECRET_HEADER).unwrap_or("");
        let matches: bool = expected.as_bytes().ct_eq(presented.as_bytes()).into();
        if !matches {
            tracing::warn!(gate_id = %gate_id, "Blocked scan request: gate secret mismatch");
            return Err(AppError::InvalidGate);
        }
    }

    request.extensions_mut().insert(GateIdentity {
        gate_id,
        event_id: gate.event_id,
    });

    Ok(next.run(request).await)
}
