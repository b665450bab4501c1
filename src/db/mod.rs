// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Catalog store: the single source of truth for users, events, orders,
//! gates and the scan log.
//!
//! [`CatalogStore`] is the contract the check-in engine relies on. Two
//! backends implement it: [`FirestoreDb`] for deployments and
//! [`MemoryStore`] for single-instance runs and tests.

pub mod firestore;
pub mod memory;
pub mod seed;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;
pub use seed::CatalogSeed;

use crate::error::AppError;
use crate::models::{Event, Gate, Order, PaymentStatus, ScanLogEntry, ScanStats, User};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const EVENTS: &str = "events";
    pub const GATES: &str = "gates";
    pub const ORDERS: &str = "orders";
    /// Uniqueness index: credential token -> order (keyed by token)
    pub const CREDENTIAL_TOKENS: &str = "credential_tokens";
    /// Uniqueness index: order code -> order (keyed by order code)
    pub const ORDER_CODES: &str = "order_codes";
    pub const SCAN_LOGS: &str = "scan_logs";
    /// Per-gate fixed rate-limit windows (TTL on `expire_at`)
    pub const RATE_WINDOWS: &str = "rate_windows";
}

/// Result of the atomic check-in transition for one order.
///
/// Every variant except `NotFound` carries the order as read inside the
/// transition; for `Committed` that is the state just written.
#[derive(Debug, Clone)]
pub enum CheckInTransition {
    Committed(Order),
    AlreadyUsed(Order),
    NotPaid(Order),
    NotFound,
}

/// Transactional contract consumed by the check-in engine.
///
/// `Err(AppError::Database(_))` always means the store could not be reached
/// or the transaction could not complete; business denials are values.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Exact match on an (already uppercased) credential token.
    async fn find_order_by_token(&self, token: &str) -> Result<Option<Order>, AppError>;

    async fn find_order_by_code(&self, order_code: &str) -> Result<Option<Order>, AppError>;

    async fn find_event(&self, event_id: &str) -> Result<Option<Event>, AppError>;

    async fn find_user(&self, user_id: &str) -> Result<Option<User>, AppError>;

    async fn find_gate(&self, gate_id: &str) -> Result<Option<Gate>, AppError>;

    /// Atomically consume an order.
    ///
    /// Re-reads the order under per-order exclusion, requires `paid` and
    /// not yet checked in, and only then sets the check-in fields.
    /// Linearizable per order: of N concurrent calls for one order, exactly
    /// one returns `Committed`.
    async fn transition_check_in(
        &self,
        order_id: &str,
        gate_id: &str,
        operator_id: &str,
    ) -> Result<CheckInTransition, AppError>;

    /// Append one audit row. Callers treat failure as non-fatal.
    async fn append_scan_log(&self, entry: &ScanLogEntry) -> Result<(), AppError>;

    /// Insert a new order.
    ///
    /// Fails with `AppError::Conflict` if the credential token or order code
    /// is already taken.
    async fn insert_order(&self, order: &Order) -> Result<(), AppError>;

    /// Record the upstream payment result for an order.
    ///
    /// Refuses (`Conflict`) to change a checked-in order.
    async fn set_payment_status(
        &self,
        order_code: &str,
        status: PaymentStatus,
    ) -> Result<Order, AppError>;

    /// Tickets held by pending and paid orders for an event.
    async fn reserved_quantity(&self, event_id: &str) -> Result<u64, AppError>;

    /// Most recent scan log rows for an event, newest first.
    async fn recent_scan_logs(
        &self,
        event_id: &str,
        limit: u32,
    ) -> Result<Vec<ScanLogEntry>, AppError>;

    async fn scan_stats(&self, event_id: &str) -> Result<ScanStats, AppError>;

    async fn upsert_user(&self, user: &User) -> Result<(), AppError>;

    async fn upsert_event(&self, event: &Event) -> Result<(), AppError>;

    async fn upsert_gate(&self, gate: &Gate) -> Result<(), AppError>;
}
