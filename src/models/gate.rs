// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Registered scanning gate.

use serde::{Deserialize, Serialize};

/// A physical scanning station, keyed by `gate_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gate {
    /// Gate identifier sent in the `x-gate-id` header (also the document ID)
    pub gate_id: String,
    /// Display name ("Main Entrance North")
    pub name: String,
    /// Shared secret the device must present in `x-gate-secret`, if set
    #[serde(default)]
    pub secret: Option<String>,
    pub is_active: bool,
    /// Event this gate admits to by default
    #[serde(default)]
    pub event_id: Option<String>,
}
