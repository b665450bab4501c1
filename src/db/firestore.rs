// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Orders (lookup by token/code, check-in transition, issuance)
//! - Users, Events, Gates (read-mostly catalog)
//! - Scan logs (append-only audit trail)
//! - Rate windows (shared per-gate counters)
//!
//! Every read-modify-write runs inside `run_transaction`, so reads register
//! for conflict detection and Firestore retries the closure with fresh data
//! when a concurrent writer wins.

use super::{collections, CatalogStore, CheckInTransition};
use crate::error::AppError;
use crate::ids;
use crate::models::{
    Event, Gate, Order, PaymentStatus, ScanLogEntry, ScanOutcome, ScanStats, TransitionOutcome,
    User,
};
use crate::time_utils::now_rfc3339;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::errors::{BackoffError, FirestoreError};
use serde::{Deserialize, Serialize};

/// How long a rate window document is kept before the TTL policy removes it.
const RATE_WINDOW_RETENTION_SECS: i64 = 10 * 60;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

/// Uniqueness index document (`credential_tokens/{token}`, `order_codes/{code}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OrderIndex {
    order_id: String,
}

/// Fixed-window scan counter for one gate (`rate_windows/{gate}_{start}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RateWindow {
    gate_id: String,
    /// Window start (unix seconds)
    window_start: i64,
    count: u32,
    /// Firestore TTL policy field
    #[serde(with = "firestore::serialize_as_timestamp")]
    expire_at: DateTime<Utc>,
}

/// Result row of the stats aggregation queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StatsAggregate {
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    tickets: Option<u64>,
}

/// Outcome of the guarded insert transaction.
enum InsertOutcome {
    Inserted,
    TokenTaken,
    CodeTaken,
}

/// Outcome of the guarded payment-status transaction.
enum PaymentUpdate {
    Updated(Box<Order>),
    CheckedIn,
    Missing,
}

fn db_err(context: &str) -> impl Fn(FirestoreError) -> AppError + '_ {
    move |e| AppError::Database(format!("{}: {}", context, e))
}

fn rate_window_doc_id(gate_id: &str, window_start: i64) -> String {
    format!("{}_{}", urlencoding::encode(gate_id), window_start)
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(db_err("Failed to connect to Firestore"))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(db_err("Failed to connect to Firestore Emulator"))?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    async fn get_by_id<T>(&self, collection: &str, id: &str) -> Result<Option<T>, AppError>
    where
        T: for<'de> Deserialize<'de> + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn put<T>(&self, collection: &str, id: &str, value: &T) -> Result<(), AppError>
    where
        T: Serialize + for<'de> Deserialize<'de> + Send + Sync,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(value)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn find_order_by_field(
        &self,
        field: &'static str,
        value: &str,
    ) -> Result<Option<Order>, AppError> {
        let value = value.to_string();
        let orders: Vec<Order> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ORDERS)
            .filter(move |q| q.field(field).eq(value.clone()))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(orders.into_iter().next())
    }

    async fn orders_for_event(&self, event_id: &str) -> Result<Vec<Order>, AppError> {
        let event_id = event_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ORDERS)
            .filter(move |q| q.field("event_id").eq(event_id.clone()))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn count_scan_logs(
        &self,
        event_id: &str,
        outcome: ScanOutcome,
    ) -> Result<u64, AppError> {
        let event_id = event_id.to_string();
        let rows: Vec<StatsAggregate> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SCAN_LOGS)
            .filter(move |q| {
                q.for_all([
                    q.field("event_id").eq(event_id.clone()),
                    q.field("outcome").eq(outcome.as_str()),
                ])
            })
            .aggregate(|a| a.fields([a.field("count").count()]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(rows.first().and_then(|r| r.count).unwrap_or(0))
    }

    /// Sum of `quantity` over paid orders for an event, optionally only
    /// those already checked in.
    async fn sum_paid_tickets(
        &self,
        event_id: &str,
        checked_in_only: bool,
    ) -> Result<u64, AppError> {
        let event_id = event_id.to_string();
        let rows: Vec<StatsAggregate> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ORDERS)
            .filter(move |q| {
                q.for_all([
                    q.field("event_id").eq(event_id.clone()),
                    q.field("payment_status").eq(PaymentStatus::Paid.as_str()),
                    if checked_in_only {
                        q.field("checked_in").eq(true)
                    } else {
                        None
                    },
                ])
            })
            .aggregate(|a| a.fields([a.field("tickets").sum("quantity")]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(rows.first().and_then(|r| r.tickets).unwrap_or(0))
    }

    // ─── Rate Window Operations ──────────────────────────────────────

    /// Current count in a gate's rate window (0 if the window has no document).
    pub async fn get_rate_window_count(
        &self,
        gate_id: &str,
        window_start: i64,
    ) -> Result<u32, AppError> {
        let window: Option<RateWindow> = self
            .get_by_id(
                collections::RATE_WINDOWS,
                &rate_window_doc_id(gate_id, window_start),
            )
            .await?;
        Ok(window.map(|w| w.count).unwrap_or(0))
    }

    /// Atomically increment a gate's rate window.
    ///
    /// With `limit`, the increment only happens while `count < limit`;
    /// returns whether the attempt was counted.
    pub async fn increment_rate_window(
        &self,
        gate_id: &str,
        window_start: i64,
        limit: Option<u32>,
    ) -> Result<bool, AppError> {
        let doc_id = rate_window_doc_id(gate_id, window_start);
        let gate_id = gate_id.to_string();

        self.get_client()?
            .run_transaction(|db, transaction| {
                let doc_id = doc_id.clone();
                let gate_id = gate_id.clone();
                Box::pin(async move {
                    let current: Option<RateWindow> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::RATE_WINDOWS)
                        .obj()
                        .one(&doc_id)
                        .await?;

                    let mut window = current.unwrap_or_else(|| RateWindow {
                        gate_id,
                        window_start,
                        count: 0,
                        expire_at: DateTime::from_timestamp(
                            window_start + RATE_WINDOW_RETENTION_SECS,
                            0,
                        )
                        .unwrap_or_else(Utc::now),
                    });

                    if limit.is_some_and(|max| window.count >= max) {
                        return Ok(false);
                    }

                    window.count += 1;
                    db.fluent()
                        .update()
                        .in_col(collections::RATE_WINDOWS)
                        .document_id(&doc_id)
                        .object(&window)
                        .add_to_transaction(transaction)?;

                    Ok::<bool, BackoffError<FirestoreError>>(true)
                })
            })
            .await
            .map_err(db_err("Rate window transaction failed"))
    }
}

#[async_trait]
impl CatalogStore for FirestoreDb {
    // ─── Lookups ─────────────────────────────────────────────────────

    async fn find_order_by_token(&self, token: &str) -> Result<Option<Order>, AppError> {
        self.find_order_by_field("credential_token", token).await
    }

    async fn find_order_by_code(&self, order_code: &str) -> Result<Option<Order>, AppError> {
        self.find_order_by_field("order_code", order_code).await
    }

    async fn find_event(&self, event_id: &str) -> Result<Option<Event>, AppError> {
        self.get_by_id(collections::EVENTS, event_id).await
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.get_by_id(collections::USERS, user_id).await
    }

    async fn find_gate(&self, gate_id: &str) -> Result<Option<Gate>, AppError> {
        self.get_by_id(collections::GATES, gate_id).await
    }

    // ─── Atomic Check-in ─────────────────────────────────────────────

    async fn transition_check_in(
        &self,
        order_id: &str,
        gate_id: &str,
        operator_id: &str,
    ) -> Result<CheckInTransition, AppError> {
        let order_id = order_id.to_string();
        let gate_id = gate_id.to_string();
        let operator_id = operator_id.to_string();

        let transition = self
            .get_client()?
            .run_transaction(|db, transaction| {
                let order_id = order_id.clone();
                let gate_id = gate_id.clone();
                let operator_id = operator_id.clone();
                Box::pin(async move {
                    // Read inside the transaction: registers the order for
                    // conflict detection, so a concurrent committer forces a retry
                    // that then observes `checked_in == true`.
                    let current: Option<Order> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::ORDERS)
                        .obj()
                        .one(&order_id)
                        .await?;

                    let Some(mut order) = current else {
                        return Ok(CheckInTransition::NotFound);
                    };

                    let outcome = order.try_check_in(&gate_id, &operator_id, &now_rfc3339());
                    let transition = match outcome {
                        TransitionOutcome::Committed => {
                            db.fluent()
                                .update()
                                .in_col(collections::ORDERS)
                                .document_id(&order_id)
                                .object(&order)
                                .add_to_transaction(transaction)?;
                            CheckInTransition::Committed(order)
                        }
                        TransitionOutcome::AlreadyUsed => CheckInTransition::AlreadyUsed(order),
                        TransitionOutcome::NotPaid => CheckInTransition::NotPaid(order),
                    };

                    Ok::<CheckInTransition, BackoffError<FirestoreError>>(transition)
                })
            })
            .await
            .map_err(db_err("Check-in transaction failed"))?;

        tracing::debug!(
            order_id = %order_id,
            gate_id = %gate_id,
            committed = matches!(transition, CheckInTransition::Committed(_)),
            "Check-in transition finished"
        );

        Ok(transition)
    }

    // ─── Scan Log ────────────────────────────────────────────────────

    async fn append_scan_log(&self, entry: &ScanLogEntry) -> Result<(), AppError> {
        let doc_id = ids::scan_log_id(&entry.timestamp)?;
        self.put(collections::SCAN_LOGS, &doc_id, entry).await
    }

    async fn recent_scan_logs(
        &self,
        event_id: &str,
        limit: u32,
    ) -> Result<Vec<ScanLogEntry>, AppError> {
        let event_id = event_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::SCAN_LOGS)
            .filter(move |q| q.field("event_id").eq(event_id.clone()))
            .order_by([("timestamp", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Aggregated on the server: one count query per audited outcome and
    /// one sum query per ticket total, so cost does not grow with the
    /// number of scan log or order documents.
    async fn scan_stats(&self, event_id: &str) -> Result<ScanStats, AppError> {
        let mut stats = ScanStats::new(event_id);

        for outcome in ScanOutcome::ALL.into_iter().filter(|o| o.is_audited()) {
            let count = self.count_scan_logs(event_id, outcome).await?;
            stats.record_many(outcome, count);
        }

        stats.tickets_sold = self.sum_paid_tickets(event_id, false).await?;
        stats.tickets_checked_in = self.sum_paid_tickets(event_id, true).await?;

        Ok(stats)
    }

    // ─── Issuance & Payment ──────────────────────────────────────────

    async fn insert_order(&self, order: &Order) -> Result<(), AppError> {
        let order = order.clone();

        let outcome = self
            .get_client()?
            .run_transaction(|db, transaction| {
                let order = order.clone();
                Box::pin(async move {
                    let token_taken: Option<OrderIndex> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::CREDENTIAL_TOKENS)
                        .obj()
                        .one(&order.credential_token)
                        .await?;
                    if token_taken.is_some() {
                        return Ok(InsertOutcome::TokenTaken);
                    }

                    let code_taken: Option<OrderIndex> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::ORDER_CODES)
                        .obj()
                        .one(&order.order_code)
                        .await?;
                    if code_taken.is_some() {
                        return Ok(InsertOutcome::CodeTaken);
                    }

                    let index = OrderIndex {
                        order_id: order.id.clone(),
                    };
                    db.fluent()
                        .update()
                        .in_col(collections::CREDENTIAL_TOKENS)
                        .document_id(&order.credential_token)
                        .object(&index)
                        .add_to_transaction(transaction)?;
                    db.fluent()
                        .update()
                        .in_col(collections::ORDER_CODES)
                        .document_id(&order.order_code)
                        .object(&index)
                        .add_to_transaction(transaction)?;
                    db.fluent()
                        .update()
                        .in_col(collections::ORDERS)
                        .document_id(&order.id)
                        .object(&order)
                        .add_to_transaction(transaction)?;

                    Ok::<InsertOutcome, BackoffError<FirestoreError>>(InsertOutcome::Inserted)
                })
            })
            .await
            .map_err(db_err("Order insert transaction failed"))?;

        match outcome {
            InsertOutcome::Inserted => Ok(()),
            InsertOutcome::TokenTaken => Err(AppError::Conflict(format!(
                "Credential token already issued for order code {}",
                order.order_code
            ))),
            InsertOutcome::CodeTaken => Err(AppError::Conflict(format!(
                "Order code {} already exists",
                order.order_code
            ))),
        }
    }

    async fn set_payment_status(
        &self,
        order_code: &str,
        status: PaymentStatus,
    ) -> Result<Order, AppError> {
        let index: OrderIndex = self
            .get_by_id(collections::ORDER_CODES, order_code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_code)))?;
        let order_id = index.order_id;

        let update = self
            .get_client()?
            .run_transaction(|db, transaction| {
                let order_id = order_id.clone();
                Box::pin(async move {
                    let current: Option<Order> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::ORDERS)
                        .obj()
                        .one(&order_id)
                        .await?;

                    let Some(mut order) = current else {
                        return Ok(PaymentUpdate::Missing);
                    };
                    if order.checked_in {
                        return Ok(PaymentUpdate::CheckedIn);
                    }

                    order.payment_status = status;
                    order.updated_at = now_rfc3339();
                    db.fluent()
                        .update()
                        .in_col(collections::ORDERS)
                        .document_id(&order_id)
                        .object(&order)
                        .add_to_transaction(transaction)?;

                    Ok::<PaymentUpdate, BackoffError<FirestoreError>>(PaymentUpdate::Updated(
                        Box::new(order),
                    ))
                })
            })
            .await
            .map_err(db_err("Payment status transaction failed"))?;

        match update {
            PaymentUpdate::Updated(order) => {
                tracing::info!(
                    order_code,
                    status = status.as_str(),
                    "Payment status updated"
                );
                Ok(*order)
            }
            PaymentUpdate::CheckedIn => Err(AppError::Conflict(format!(
                "Order {} is already checked in",
                order_code
            ))),
            PaymentUpdate::Missing => {
                Err(AppError::NotFound(format!("Order {} not found", order_code)))
            }
        }
    }

    async fn reserved_quantity(&self, event_id: &str) -> Result<u64, AppError> {
        Ok(self
            .orders_for_event(event_id)
            .await?
            .iter()
            .filter(|o| {
                matches!(
                    o.payment_status,
                    PaymentStatus::Pending | PaymentStatus::Paid
                )
            })
            .map(|o| u64::from(o.quantity))
            .sum())
    }

    // ─── Catalog Maintenance ─────────────────────────────────────────

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.put(collections::USERS, &user.id, user).await
    }

    async fn upsert_event(&self, event: &Event) -> Result<(), AppError> {
        self.put(collections::EVENTS, &event.id, event).await
    }

    async fn upsert_gate(&self, gate: &Gate) -> Result<(), AppError> {
        self.put(collections::GATES, &gate.gate_id, gate).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_window_doc_id_escapes_gate() {
        assert_eq!(rate_window_doc_id("M-01", 1_772_096_400), "M-01_1772096400");
        assert_eq!(rate_window_doc_id("gate/1", 60), "gate%2F1_60");
    }

    #[tokio::test]
    async fn test_offline_client_reports_database_error() {
        let db = FirestoreDb::new_mock();
        let err = db.find_order_by_token("0123456789ABCDEF").await.unwrap_err();
        assert!(err.is_unavailable());

        let err = db
            .transition_check_in("order-1", "M-01", "op")
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_offline_client_rejects_document_writes() {
        let db = FirestoreDb::new_mock();
        let user = User {
            id: "user-1".to_string(),
            email: "holder@example.com".to_string(),
            name: "Holder".to_string(),
            phone: None,
            college: None,
            created_at: now_rfc3339(),
        };
        let err = db.upsert_user(&user).await.unwrap_err();
        assert!(err.is_unavailable());

        let entry = ScanLogEntry {
            scanned: "0123456789ABCDEF".to_string(),
            order_code: None,
            event_id: Some("event-day1".to_string()),
            outcome: ScanOutcome::NotFound,
            gate_id: "M-01".to_string(),
            operator_id: "op".to_string(),
            ip_address: None,
            user_agent: None,
            timestamp: now_rfc3339(),
        };
        let err = db.append_scan_log(&entry).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
