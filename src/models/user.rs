// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ticket holder model.

use serde::{Deserialize, Serialize};

/// Ticket holder stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Durable user ID (also used as document ID)
    pub id: String,
    /// Email address (unique)
    pub email: String,
    /// Display name
    pub name: String,
    pub phone: Option<String>,
    pub college: Option<String>,
    /// When the user was first seen (RFC3339)
    pub created_at: String,
}
