// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Check-in engine: decides admit/deny for one scan and consumes the
//! credential exactly once.
//!
//! A scan moves through decode → order lookup → payment check →
//! authorization → (verify only) atomic transition → audit write.
//! Business denials are [`ScanOutcome`] values. Store failures become
//! `internal_error` and are never retried here: a retried transition could
//! double-count a check-in whose first attempt committed before the
//! connection dropped. Gate devices re-scan with `validate` instead.
//!
//! The engine holds no per-scan state; all exclusion lives in the store.
//! Audit rows are written in the background after the decision is
//! returned; [`CheckinEngine::flush_audit`] waits for pending writes.

use crate::db::{CatalogStore, CheckInTransition};
use crate::error::AppError;
use crate::models::{CheckInDetails, ClientInfo, Event, Order, ScanLogEntry, ScanOutcome, User};
use crate::services::access::{authorize, authorize_any};
use crate::services::codec::{parse_credential, Credential, CredentialCodec};
use crate::time_utils::now_rfc3339;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// One scan submitted by a gate device.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Credential text exactly as scanned
    pub token: String,
    pub gate_id: String,
    pub operator_id: String,
    /// Event the gate is admitting to; `None` for open verification
    pub target_event_id: Option<String>,
    pub client: ClientInfo,
}

/// Result of a scan, with whatever context was resolved along the way.
#[derive(Debug, Clone)]
pub struct ScanDecision {
    pub outcome: ScanOutcome,
    pub order: Option<Order>,
    pub user: Option<User>,
    pub event: Option<Event>,
}

impl ScanDecision {
    fn bare(outcome: ScanOutcome) -> Self {
        Self {
            outcome,
            order: None,
            user: None,
            event: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ScanOutcome::Success
    }

    /// Original check-in record, reported only for `already_used`.
    pub fn already_used_details(&self) -> Option<CheckInDetails> {
        match self.outcome {
            ScanOutcome::AlreadyUsed => self.order.as_ref()?.check_in_details(),
            _ => None,
        }
    }
}

/// Where the read-only part of the pipeline ended.
enum Resolution {
    /// Paid and authorized for the event; ready to commit
    Authorized { order: Order, event: Option<Event> },
    Rejected {
        outcome: ScanOutcome,
        order: Option<Order>,
        event: Option<Event>,
    },
}

/// Audit writes still running in the background.
#[derive(Default)]
struct AuditTracker {
    in_flight: AtomicUsize,
    idle: Notify,
}

impl AuditTracker {
    fn finish(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Orchestrates codec, store, and access policy for scan requests.
#[derive(Clone)]
pub struct CheckinEngine {
    store: Arc<dyn CatalogStore>,
    codec: CredentialCodec,
    /// Upper bound on a single audit write
    scan_log_timeout: Duration,
    audit: Arc<AuditTracker>,
}

impl CheckinEngine {
    pub fn new(store: Arc<dyn CatalogStore>, codec: CredentialCodec) -> Self {
        Self {
            store,
            codec,
            scan_log_timeout: Duration::from_secs(2),
            audit: Arc::new(AuditTracker::default()),
        }
    }

    pub fn with_scan_log_timeout(mut self, timeout: Duration) -> Self {
        self.scan_log_timeout = timeout;
        self
    }

    pub fn codec(&self) -> &CredentialCodec {
        &self.codec
    }

    /// Wait until every audit write started so far has finished or timed out.
    pub async fn flush_audit(&self) {
        loop {
            let idle = self.audit.idle.notified();
            if self.audit.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Preview a scan without consuming the credential or writing the log.
    pub async fn validate(&self, token: &str, target_event_id: Option<&str>) -> ScanDecision {
        match self.resolve(token, target_event_id).await {
            Ok(Resolution::Authorized { order, event }) => {
                let outcome = if order.checked_in {
                    ScanOutcome::AlreadyUsed
                } else {
                    ScanOutcome::Success
                };
                let user = self.load_user(&order).await;
                ScanDecision {
                    outcome,
                    order: Some(order),
                    user,
                    event,
                }
            }
            Ok(Resolution::Rejected {
                outcome,
                order,
                event,
            }) => ScanDecision {
                outcome,
                order,
                user: None,
                event,
            },
            Err(err) => {
                tracing::error!(error = %err, "Scan validation failed: store unavailable");
                ScanDecision::bare(ScanOutcome::InternalError)
            }
        }
    }

    /// Run the full pipeline, consuming the credential on success.
    ///
    /// Every business outcome is appended to the scan log.
    pub async fn verify(&self, request: &ScanRequest) -> ScanDecision {
        let decision = match self.verify_inner(request).await {
            Ok(decision) => decision,
            Err(err) => {
                // Mutation state unknown: report, do not log, do not retry.
                tracing::error!(
                    error = %err,
                    gate_id = %request.gate_id,
                    "Scan verification failed: store unavailable"
                );
                return ScanDecision::bare(ScanOutcome::InternalError);
            }
        };

        tracing::info!(
            outcome = %decision.outcome,
            gate_id = %request.gate_id,
            operator_id = %request.operator_id,
            order_code = decision.order.as_ref().map(|o| o.order_code.as_str()),
            "Scan processed"
        );

        if decision.outcome.is_audited() {
            self.audit(request, &decision);
        }

        decision
    }

    async fn verify_inner(&self, request: &ScanRequest) -> Result<ScanDecision, AppError> {
        let (order, event) = match self
            .resolve(&request.token, request.target_event_id.as_deref())
            .await?
        {
            Resolution::Authorized { order, event } => (order, event),
            Resolution::Rejected {
                outcome,
                order,
                event,
            } => {
                return Ok(ScanDecision {
                    outcome,
                    order,
                    user: None,
                    event,
                });
            }
        };

        let transition = self
            .store
            .transition_check_in(&order.id, &request.gate_id, &request.operator_id)
            .await?;

        // Past this point the transition may have committed: later lookup
        // failures must not turn the result into `internal_error`.
        let decision = match transition {
            CheckInTransition::Committed(order) => {
                let user = self.load_user(&order).await;
                ScanDecision {
                    outcome: ScanOutcome::Success,
                    order: Some(order),
                    user,
                    event,
                }
            }
            CheckInTransition::AlreadyUsed(order) => ScanDecision {
                outcome: ScanOutcome::AlreadyUsed,
                order: Some(order),
                user: None,
                event,
            },
            CheckInTransition::NotPaid(order) => ScanDecision {
                outcome: ScanOutcome::NotPaid,
                order: Some(order),
                user: None,
                event,
            },
            CheckInTransition::NotFound => ScanDecision {
                outcome: ScanOutcome::NotFound,
                order: None,
                user: None,
                event,
            },
        };

        Ok(decision)
    }

    /// Decode, look up, and authorize without mutating anything.
    async fn resolve(
        &self,
        raw: &str,
        target_event_id: Option<&str>,
    ) -> Result<Resolution, AppError> {
        let Some(credential) = parse_credential(raw) else {
            tracing::debug!(len = raw.len(), "Rejected malformed credential");
            return Ok(Resolution::Rejected {
                outcome: ScanOutcome::Invalid,
                order: None,
                event: None,
            });
        };

        let order = match &credential {
            Credential::Token(token) => self.store.find_order_by_token(token).await?,
            Credential::OrderCode(code) => self.store.find_order_by_code(code).await?,
        };

        let Some(order) = order else {
            let event = match target_event_id {
                Some(id) => self.store.find_event(id).await?,
                None => None,
            };
            return Ok(Resolution::Rejected {
                outcome: ScanOutcome::NotFound,
                order: None,
                event,
            });
        };

        if let Credential::Token(token) = &credential {
            if !self.codec.matches(&order.order_code, token) {
                // Still admissible: the stored row is authoritative.
                tracing::warn!(
                    order_code = %order.order_code,
                    "Stored credential token does not match the configured QR secret"
                );
            }
        }

        let event_id = target_event_id.unwrap_or(&order.event_id);
        let event = self.store.find_event(event_id).await?;

        if !order.is_paid() {
            return Ok(Resolution::Rejected {
                outcome: ScanOutcome::NotPaid,
                order: Some(order),
                event,
            });
        }

        let allowed = match (target_event_id, &event) {
            (Some(_), Some(target)) => target.is_active && authorize(&order, target),
            // Targeted scan for an event that does not exist
            (Some(_), None) => false,
            (None, primary) => {
                primary.as_ref().map_or(true, |e| e.is_active)
                    && authorize_any(&order, primary.as_ref())
            }
        };

        if !allowed {
            return Ok(Resolution::Rejected {
                outcome: ScanOutcome::WrongEvent,
                order: Some(order),
                event,
            });
        }

        Ok(Resolution::Authorized { order, event })
    }

    async fn load_user(&self, order: &Order) -> Option<User> {
        match self.store.find_user(&order.user_id).await {
            Ok(user) => user,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    order_code = %order.order_code,
                    "Could not load ticket holder for scan response"
                );
                None
            }
        }
    }

    /// Start a best-effort audit write, bounded by `scan_log_timeout`.
    /// The caller does not wait for it.
    fn audit(&self, request: &ScanRequest, decision: &ScanDecision) {
        let event_id = request.target_event_id.clone().or_else(|| {
            decision
                .event
                .as_ref()
                .map(|e| e.id.clone())
                .or_else(|| decision.order.as_ref().map(|o| o.event_id.clone()))
        });

        let entry = ScanLogEntry {
            scanned: request.token.clone(),
            order_code: decision.order.as_ref().map(|o| o.order_code.clone()),
            event_id,
            outcome: decision.outcome,
            gate_id: request.gate_id.clone(),
            operator_id: request.operator_id.clone(),
            ip_address: request.client.ip_address.clone(),
            user_agent: request.client.user_agent.clone(),
            timestamp: now_rfc3339(),
        };

        let store = self.store.clone();
        let tracker = self.audit.clone();
        let timeout = self.scan_log_timeout;
        tracker.in_flight.fetch_add(1, Ordering::AcqRel);

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, store.append_scan_log(&entry)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(
                        error = %err,
                        outcome = %entry.outcome,
                        gate_id = %entry.gate_id,
                        "Failed to append scan log"
                    );
                }
                Err(_) => {
                    tracing::error!(
                        timeout_ms = timeout.as_millis() as u64,
                        outcome = %entry.outcome,
                        gate_id = %entry.gate_id,
                        "Timed out appending scan log"
                    );
                }
            }
            tracker.finish();
        });
    }
}
