// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process catalog store.
//!
//! Suitable for a single instance (local development, demos) and for tests.
//! The check-in transition runs under the order's map-shard lock, which
//! gives the same per-order linearizability as a Firestore transaction.

use super::{CatalogStore, CheckInTransition};
use crate::error::AppError;
use crate::models::{
    Event, Gate, Order, PaymentStatus, ScanLogEntry, ScanStats, TransitionOutcome, User,
};
use crate::time_utils::now_rfc3339;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// In-memory catalog store.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    events: DashMap<String, Event>,
    gates: DashMap<String, Gate>,
    /// Orders by durable ID
    orders: DashMap<String, Order>,
    /// Credential token -> order ID (uniqueness constraint)
    tokens: DashMap<String, String>,
    /// Order code -> order ID (uniqueness constraint)
    codes: DashMap<String, String>,
    scan_logs: RwLock<Vec<ScanLogEntry>>,
    /// When set, every operation fails as if the backend were unreachable.
    offline: AtomicBool,
    /// Artificial latency for scan log appends (milliseconds)
    scan_log_delay_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) the backend.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Slow down scan log appends, as a congested backend would.
    pub fn set_scan_log_delay(&self, delay: Duration) {
        self.scan_log_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), AppError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Database(
                "Database not connected (offline mode)".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of scan log rows (all events).
    pub async fn scan_log_len(&self) -> usize {
        self.scan_logs.read().await.len()
    }

    /// Fetch an order by durable ID.
    pub fn get_order(&self, order_id: &str) -> Option<Order> {
        self.orders.get(order_id).map(|o| o.clone())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn find_order_by_token(&self, token: &str) -> Result<Option<Order>, AppError> {
        self.ensure_online()?;
        let order_id = match self.tokens.get(token) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        Ok(self.get_order(&order_id))
    }

    async fn find_order_by_code(&self, order_code: &str) -> Result<Option<Order>, AppError> {
        self.ensure_online()?;
        let order_id = match self.codes.get(order_code) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        Ok(self.get_order(&order_id))
    }

    async fn find_event(&self, event_id: &str) -> Result<Option<Event>, AppError> {
        self.ensure_online()?;
        Ok(self.events.get(event_id).map(|e| e.clone()))
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.ensure_online()?;
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn find_gate(&self, gate_id: &str) -> Result<Option<Gate>, AppError> {
        self.ensure_online()?;
        Ok(self.gates.get(gate_id).map(|g| g.clone()))
    }

    async fn transition_check_in(
        &self,
        order_id: &str,
        gate_id: &str,
        operator_id: &str,
    ) -> Result<CheckInTransition, AppError> {
        self.ensure_online()?;

        // Holds the shard write lock until dropped: read-check-write is atomic.
        let Some(mut stored) = self.orders.get_mut(order_id) else {
            return Ok(CheckInTransition::NotFound);
        };

        let mut candidate = stored.clone();
        let outcome = candidate.try_check_in(gate_id, operator_id, &now_rfc3339());
        Ok(match outcome {
            TransitionOutcome::Committed => {
                *stored = candidate.clone();
                CheckInTransition::Committed(candidate)
            }
            TransitionOutcome::AlreadyUsed => CheckInTransition::AlreadyUsed(candidate),
            TransitionOutcome::NotPaid => CheckInTransition::NotPaid(candidate),
        })
    }

    async fn append_scan_log(&self, entry: &ScanLogEntry) -> Result<(), AppError> {
        self.ensure_online()?;
        let delay_ms = self.scan_log_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        self.scan_logs.write().await.push(entry.clone());
        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> Result<(), AppError> {
        self.ensure_online()?;

        match self.tokens.entry(order.credential_token.clone()) {
            Entry::Occupied(_) => {
                return Err(AppError::Conflict(format!(
                    "Credential token already issued for order code {}",
                    order.order_code
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(order.id.clone());
            }
        }

        match self.codes.entry(order.order_code.clone()) {
            Entry::Occupied(_) => {
                // Release the token reservation taken above.
                self.tokens.remove(&order.credential_token);
                return Err(AppError::Conflict(format!(
                    "Order code {} already exists",
                    order.order_code
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(order.id.clone());
            }
        }

        self.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn set_payment_status(
        &self,
        order_code: &str,
        status: PaymentStatus,
    ) -> Result<Order, AppError> {
        self.ensure_online()?;

        let order_id = self
            .codes
            .get(order_code)
            .map(|id| id.clone())
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_code)))?;
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_code)))?;

        if order.checked_in {
            return Err(AppError::Conflict(format!(
                "Order {} is already checked in",
                order_code
            )));
        }

        order.payment_status = status;
        order.updated_at = now_rfc3339();
        Ok(order.clone())
    }

    async fn reserved_quantity(&self, event_id: &str) -> Result<u64, AppError> {
        self.ensure_online()?;
        Ok(self
            .orders
            .iter()
            .filter(|o| o.event_id == event_id)
            .filter(|o| {
                matches!(
                    o.payment_status,
                    PaymentStatus::Pending | PaymentStatus::Paid
                )
            })
            .map(|o| u64::from(o.quantity))
            .sum())
    }

    async fn recent_scan_logs(
        &self,
        event_id: &str,
        limit: u32,
    ) -> Result<Vec<ScanLogEntry>, AppError> {
        self.ensure_online()?;
        let logs = self.scan_logs.read().await;
        // Appends can land out of order; newest timestamp first.
        let mut matching: Vec<ScanLogEntry> = logs
            .iter()
            .rev()
            .filter(|entry| entry.event_id.as_deref() == Some(event_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn scan_stats(&self, event_id: &str) -> Result<ScanStats, AppError> {
        self.ensure_online()?;
        let mut stats = ScanStats::new(event_id);

        for entry in self.scan_logs.read().await.iter() {
            if entry.event_id.as_deref() == Some(event_id) {
                stats.record(entry.outcome);
            }
        }

        for order in self.orders.iter() {
            if order.event_id == event_id && order.is_paid() {
                stats.tickets_sold += u64::from(order.quantity);
                if order.checked_in {
                    stats.tickets_checked_in += u64::from(order.quantity);
                }
            }
        }

        Ok(stats)
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.ensure_online()?;
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn upsert_event(&self, event: &Event) -> Result<(), AppError> {
        self.ensure_online()?;
        self.events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn upsert_gate(&self, gate: &Gate) -> Result<(), AppError> {
        self.ensure_online()?;
        self.gates.insert(gate.gate_id.clone(), gate.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::tests::paid_order;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_insert_enforces_unique_token() {
        let store = MemoryStore::new();
        let first = paid_order("ORD-AAA111", &[]);
        store.insert_order(&first).await.unwrap();

        let mut dup = paid_order("ORD-BBB222", &[]);
        dup.credential_token = first.credential_token.clone();
        let err = store.insert_order(&dup).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(store.find_order_by_code("ORD-BBB222").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_enforces_unique_code_and_releases_token() {
        let store = MemoryStore::new();
        store.insert_order(&paid_order("ORD-AAA111", &[])).await.unwrap();

        let mut dup = paid_order("ORD-AAA111", &[]);
        dup.id = "other-id".to_string();
        dup.credential_token = "FFFFFFFFFFFFFFFF".to_string();
        assert!(matches!(
            store.insert_order(&dup).await,
            Err(AppError::Conflict(_))
        ));
        assert!(store
            .find_order_by_token("FFFFFFFFFFFFFFFF")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_transition_is_linearizable() {
        let store = Arc::new(MemoryStore::new());
        let order = paid_order("ORD-AAA111", &["DAY_1"]);
        store.insert_order(&order).await.unwrap();

        let mut handles = vec![];
        for i in 0..32 {
            let store = store.clone();
            let order_id = order.id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .transition_check_in(&order_id, &format!("G{}", i), "op")
                    .await
                    .unwrap()
            }));
        }

        let mut committed = 0;
        let mut already_used = 0;
        for handle in handles {
            match handle.await.unwrap() {
                CheckInTransition::Committed(_) => committed += 1,
                CheckInTransition::AlreadyUsed(_) => already_used += 1,
                other => panic!("unexpected transition {:?}", other),
            }
        }
        assert_eq!(committed, 1);
        assert_eq!(already_used, 31);
    }

    #[tokio::test]
    async fn test_payment_status_locked_after_check_in() {
        let store = MemoryStore::new();
        let order = paid_order("ORD-AAA111", &[]);
        store.insert_order(&order).await.unwrap();
        store.transition_check_in(&order.id, "M-01", "op").await.unwrap();

        let err = store
            .set_payment_status("ORD-AAA111", PaymentStatus::Refunded)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_offline_store_reports_database_error() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let err = store.find_order_by_token("0123456789ABCDEF").await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
