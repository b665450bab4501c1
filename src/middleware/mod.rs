// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (gate identity, rate limiting, security headers).

pub mod gate;
pub mod rate_limit;
pub mod security;

pub use gate::{require_gate, GateIdentity};
pub use rate_limit::limit_scans;
