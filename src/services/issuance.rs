// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ticket issuance: creates pending orders with fresh credentials.

use crate::db::CatalogStore;
use crate::error::AppError;
use crate::ids;
use crate::models::{Order, PaymentStatus};
use crate::services::codec::CredentialCodec;
use crate::time_utils::format_utc_rfc3339;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Attempts at generating an unused order code / token pair.
const MAX_ISSUE_ATTEMPTS: usize = 5;

/// Issue request for one order.
#[derive(Debug, Clone)]
pub struct IssueOrder {
    pub user_id: String,
    pub event_id: String,
    pub quantity: u32,
    /// Scopes to grant; empty means "the event's own scope"
    pub scopes: Vec<String>,
}

#[derive(Clone)]
pub struct IssuanceService {
    store: Arc<dyn CatalogStore>,
    codec: CredentialCodec,
}

impl IssuanceService {
    pub fn new(store: Arc<dyn CatalogStore>, codec: CredentialCodec) -> Self {
        Self { store, codec }
    }

    /// Create a pending order.
    ///
    /// The store enforces token and code uniqueness; on a collision a new
    /// order code is drawn and insertion retried.
    pub async fn issue(&self, request: &IssueOrder) -> Result<Order, AppError> {
        if request.quantity == 0 {
            return Err(AppError::BadRequest("Quantity must be at least 1".to_string()));
        }

        let event = self
            .store
            .find_event(&request.event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", request.event_id)))?;
        if !event.is_active {
            return Err(AppError::BadRequest(format!(
                "Event {} is not active",
                event.id
            )));
        }

        if self.store.find_user(&request.user_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "User {} not found",
                request.user_id
            )));
        }

        // Capacity is advisory here: concurrent issuers may overshoot by one
        // batch. Admission is still exactly-once per order.
        let reserved = self.store.reserved_quantity(&event.id).await?;
        if reserved + u64::from(request.quantity) > u64::from(event.capacity) {
            return Err(AppError::Conflict("Not enough tickets available".to_string()));
        }

        let granted_scopes: BTreeSet<String> = if request.scopes.is_empty() {
            event.scope_token.iter().cloned().collect()
        } else {
            request
                .scopes
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        let now = chrono::Utc::now();
        let timestamp = format_utc_rfc3339(now);

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let order_code = ids::new_order_code(now)?;
            let order = Order {
                id: ids::new_id()?,
                credential_token: self.codec.encode(&order_code),
                order_code,
                user_id: request.user_id.clone(),
                event_id: event.id.clone(),
                payment_status: PaymentStatus::Pending,
                quantity: request.quantity,
                granted_scopes: granted_scopes.clone(),
                checked_in: false,
                checked_in_at: None,
                checked_in_by: None,
                checked_in_gate: None,
                created_at: timestamp.clone(),
                updated_at: timestamp.clone(),
            };

            match self.store.insert_order(&order).await {
                Ok(()) => {
                    tracing::info!(
                        order_code = %order.order_code,
                        event_id = %order.event_id,
                        quantity = order.quantity,
                        "Order issued"
                    );
                    return Ok(order);
                }
                Err(AppError::Conflict(reason)) => {
                    tracing::warn!(
                        attempt,
                        reason = %reason,
                        "Credential collision, regenerating order code"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(AppError::Internal(anyhow::anyhow!(
            "Could not allocate a unique credential after {} attempts",
            MAX_ISSUE_ATTEMPTS
        )))
    }

    /// Record the upstream payment result for an order.
    pub async fn set_payment_status(
        &self,
        order_code: &str,
        status: PaymentStatus,
    ) -> Result<Order, AppError> {
        self.store.set_payment_status(order_code, status).await
    }
}
