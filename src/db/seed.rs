// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Catalog seed file: users, events, gates and orders loaded at startup.
//!
//! Needed to run the in-memory store for anything but tests, and handy for
//! priming a Firestore emulator. Applying a seed twice is harmless.

use super::CatalogStore;
use crate::error::AppError;
use crate::models::{Event, Gate, Order, PaymentStatus, User};
use crate::services::CredentialCodec;
use crate::time_utils::now_rfc3339;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Seed file contents.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogSeed {
    pub users: Vec<User>,
    pub events: Vec<Event>,
    pub gates: Vec<Gate>,
    pub orders: Vec<SeedOrder>,
}

/// An order to create. The credential token is derived with the running
/// codec, so the file never carries tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedOrder {
    pub order_code: String,
    pub user_id: String,
    pub event_id: String,
    #[serde(default = "default_payment_status")]
    pub payment_status: PaymentStatus,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Defaults to the event's scope token
    #[serde(default)]
    pub granted_scopes: BTreeSet<String>,
}

fn default_payment_status() -> PaymentStatus {
    PaymentStatus::Paid
}

fn default_quantity() -> u32 {
    1
}

/// Counts of what [`CatalogSeed::apply`] wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub events: usize,
    pub gates: usize,
    pub orders_created: usize,
    /// Orders whose code already existed
    pub orders_skipped: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid seed file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Order {0} references unknown event {1}")]
    UnknownEvent(String, String),

    #[error("Failed to write seed data: {0}")]
    Store(#[from] AppError),
}

impl CatalogSeed {
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Upsert users, events and gates, then create any orders whose code is
    /// not already taken.
    pub async fn apply(
        &self,
        store: &dyn CatalogStore,
        codec: &CredentialCodec,
    ) -> Result<SeedSummary, SeedError> {
        let mut summary = SeedSummary::default();

        for user in &self.users {
            store.upsert_user(user).await?;
            summary.users += 1;
        }
        for event in &self.events {
            store.upsert_event(event).await?;
            summary.events += 1;
        }
        for gate in &self.gates {
            store.upsert_gate(gate).await?;
            summary.gates += 1;
        }

        let scopes: HashMap<&str, Option<&String>> = self
            .events
            .iter()
            .map(|e| (e.id.as_str(), e.scope_token.as_ref()))
            .collect();

        for seed in &self.orders {
            let event_scope = match scopes.get(seed.event_id.as_str()) {
                Some(scope) => scope.cloned(),
                None => match store.find_event(&seed.event_id).await? {
                    Some(event) => event.scope_token,
                    None => {
                        return Err(SeedError::UnknownEvent(
                            seed.order_code.clone(),
                            seed.event_id.clone(),
                        ))
                    }
                },
            };

            if store.find_order_by_code(&seed.order_code).await?.is_some() {
                summary.orders_skipped += 1;
                continue;
            }

            let order = seed.to_order(codec, event_scope);
            match store.insert_order(&order).await {
                Ok(()) => summary.orders_created += 1,
                Err(AppError::Conflict(reason)) => {
                    tracing::warn!(
                        order_code = %seed.order_code,
                        reason = %reason,
                        "Seed order already present"
                    );
                    summary.orders_skipped += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(summary)
    }
}

impl SeedOrder {
    fn to_order(&self, codec: &CredentialCodec, event_scope: Option<String>) -> Order {
        let now = now_rfc3339();
        let granted_scopes = if self.granted_scopes.is_empty() {
            event_scope.into_iter().collect()
        } else {
            self.granted_scopes.clone()
        };

        Order {
            id: format!("seed-{}", self.order_code),
            order_code: self.order_code.clone(),
            credential_token: codec.encode(&self.order_code),
            user_id: self.user_id.clone(),
            event_id: self.event_id.clone(),
            payment_status: self.payment_status,
            quantity: self.quantity,
            granted_scopes,
            checked_in: false,
            checked_in_at: None,
            checked_in_by: None,
            checked_in_gate: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    const EXAMPLE_SEED: &str = include_str!("../../data/catalog_seed.example.json");

    fn codec() -> CredentialCodec {
        CredentialCodec::new(b"seed-test-secret").unwrap()
    }

    #[tokio::test]
    async fn test_example_seed_populates_memory_store() {
        let seed = CatalogSeed::from_json(EXAMPLE_SEED).unwrap();
        let store = MemoryStore::new();
        let codec = codec();

        let summary = seed.apply(&store, &codec).await.unwrap();
        assert_eq!(summary.orders_created, seed.orders.len());
        assert_eq!(summary.orders_skipped, 0);

        let gate = store.find_gate("M-01").await.unwrap().unwrap();
        assert!(gate.is_active);

        let first = &seed.orders[0];
        let order = store
            .find_order_by_code(&first.order_code)
            .await
            .unwrap()
            .unwrap();
        assert!(codec.matches(&order.order_code, &order.credential_token));
        let by_token = store
            .find_order_by_token(&order.credential_token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_token.id, order.id);
    }

    #[tokio::test]
    async fn test_reapplying_seed_skips_existing_orders() {
        let seed = CatalogSeed::from_json(EXAMPLE_SEED).unwrap();
        let store = MemoryStore::new();
        let codec = codec();

        seed.apply(&store, &codec).await.unwrap();
        let again = seed.apply(&store, &codec).await.unwrap();
        assert_eq!(again.orders_created, 0);
        assert_eq!(again.orders_skipped, seed.orders.len());
    }

    #[tokio::test]
    async fn test_order_defaults_to_event_scope() {
        let seed = CatalogSeed::from_json(
            r#"{
                "events": [{"id": "day-1", "name": "Day 1", "venue": "Hall", "capacity": 10,
                            "is_active": true, "scope_token": "DAY_1",
                            "created_at": "2026-01-10T08:00:00.000Z"}],
                "orders": [{"order_code": "ORD-SEED01", "user_id": "u-1", "event_id": "day-1"}]
            }"#,
        )
        .unwrap();
        let store = MemoryStore::new();
        seed.apply(&store, &codec()).await.unwrap();

        let order = store.find_order_by_code("ORD-SEED01").await.unwrap().unwrap();
        assert!(order.is_paid());
        assert_eq!(order.quantity, 1);
        assert!(order.granted_scopes.contains("DAY_1"));
    }

    #[tokio::test]
    async fn test_order_for_unknown_event_is_rejected() {
        let seed = CatalogSeed::from_json(
            r#"{"orders": [{"order_code": "ORD-SEED02", "user_id": "u-1", "event_id": "nope"}]}"#,
        )
        .unwrap();
        let err = seed.apply(&MemoryStore::new(), &codec()).await.unwrap_err();
        assert!(matches!(err, SeedError::UnknownEvent(_, _)));
    }

    #[tokio::test]
    async fn test_load_example_file() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/catalog_seed.example.json");
        let seed = CatalogSeed::load_from_file(path).await.unwrap();
        assert!(seed.gates.iter().any(|g| g.gate_id == "W-01" && g.secret.is_some()));

        let err = CatalogSeed::load_from_file("data/no-such-seed.json").await.unwrap_err();
        assert!(matches!(err, SeedError::Io(_)));
    }

    #[test]
    fn test_malformed_seed_is_parse_error() {
        assert!(matches!(
            CatalogSeed::from_json("{\"gates\": 3}"),
            Err(SeedError::Parse(_))
        ));
    }
}
