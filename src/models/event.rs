// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admission event model.

use serde::{Deserialize, Serialize};

/// Something a ticket holder can be admitted to: a day, a venue, a talk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event ID (also used as document ID)
    pub id: String,
    pub name: String,
    pub venue: String,
    /// Maximum number of tickets (pending + paid) that may be issued
    pub capacity: u32,
    /// Inactive events admit nobody
    pub is_active: bool,
    /// Access class this event represents (e.g. "DAY_1").
    /// `None` for unrestricted activities.
    #[serde(default)]
    pub scope_token: Option<String>,
    /// Display ordering on scanner devices (lower first)
    #[serde(default)]
    pub scan_order: i32,
    pub created_at: String,
}
