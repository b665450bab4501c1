// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Order model: the redeemable credential record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Payment state of an order. Set upstream by the payment step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

/// Stored order record in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Durable order ID (also used as document ID)
    pub id: String,
    /// Human-facing order code ("ORD-LX2K9A1B-7QZP3M")
    pub order_code: String,
    /// Codec output printed on the QR code (16 uppercase characters)
    pub credential_token: String,
    pub user_id: String,
    /// Event the order was purchased for
    pub event_id: String,
    pub payment_status: PaymentStatus,
    pub quantity: u32,
    /// Scope tokens this order admits to
    #[serde(default)]
    pub granted_scopes: BTreeSet<String>,
    pub checked_in: bool,
    /// When the order was checked in (RFC3339)
    #[serde(default)]
    pub checked_in_at: Option<String>,
    /// Operator who scanned the order
    #[serde(default)]
    pub checked_in_by: Option<String>,
    /// Gate the order was scanned at
    #[serde(default)]
    pub checked_in_gate: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Result of applying a check-in to an order in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The order flipped to checked in
    Committed,
    AlreadyUsed,
    NotPaid,
}

/// Where and when an order was checked in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct CheckInDetails {
    pub checked_in_at: String,
    pub checked_in_by: String,
    pub checked_in_gate: String,
}

impl Order {
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// Check-in record, present once the order has been consumed.
    pub fn check_in_details(&self) -> Option<CheckInDetails> {
        if !self.checked_in {
            return None;
        }
        Some(CheckInDetails {
            checked_in_at: self.checked_in_at.clone()?,
            checked_in_by: self.checked_in_by.clone()?,
            checked_in_gate: self.checked_in_gate.clone()?,
        })
    }

    /// Apply the one-way `checked_in` transition.
    ///
    /// Must be called on a copy read under the store's per-order exclusion;
    /// leaves the order untouched unless it returns `Committed`.
    pub fn try_check_in(&mut self, gate_id: &str, operator_id: &str, at: &str) -> TransitionOutcome {
        match self.payment_status {
            PaymentStatus::Paid => {}
            PaymentStatus::Pending | PaymentStatus::Failed | PaymentStatus::Refunded => {
                return TransitionOutcome::NotPaid;
            }
        }
        if self.checked_in {
            return TransitionOutcome::AlreadyUsed;
        }

        self.checked_in = true;
        self.checked_in_at = Some(at.to_string());
        self.checked_in_by = Some(operator_id.to_string());
        self.checked_in_gate = Some(gate_id.to_string());
        self.updated_at = at.to_string();
        TransitionOutcome::Committed
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn paid_order(code: &str, scopes: &[&str]) -> Order {
        Order {
            id: format!("id-{}", code),
            order_code: code.to_string(),
            credential_token: "0123456789ABCDEF".to_string(),
            user_id: "user-1".to_string(),
            event_id: "event-1".to_string(),
            payment_status: PaymentStatus::Paid,
            quantity: 1,
            granted_scopes: scopes.iter().map(|s| s.to_string()).collect(),
            checked_in: false,
            checked_in_at: None,
            checked_in_by: None,
            checked_in_gate: None,
            created_at: "2026-02-26T09:00:00Z".to_string(),
            updated_at: "2026-02-26T09:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_check_in_sets_all_fields() {
        let mut order = paid_order("ORD-AAA111", &["DAY_1"]);
        let outcome = order.try_check_in("M-01", "volunteer-7", "2026-02-26T10:00:00Z");

        assert_eq!(outcome, TransitionOutcome::Committed);
        let details = order.check_in_details().unwrap();
        assert_eq!(details.checked_in_gate, "M-01");
        assert_eq!(details.checked_in_by, "volunteer-7");
        assert_eq!(details.checked_in_at, "2026-02-26T10:00:00Z");
    }

    #[test]
    fn test_second_check_in_preserves_original_fields() {
        let mut order = paid_order("ORD-AAA111", &["DAY_1"]);
        order.try_check_in("M-01", "volunteer-7", "2026-02-26T10:00:00Z");
        let outcome = order.try_check_in("M-02", "volunteer-9", "2026-02-26T11:00:00Z");

        assert_eq!(outcome, TransitionOutcome::AlreadyUsed);
        assert_eq!(order.checked_in_gate.as_deref(), Some("M-01"));
        assert_eq!(order.checked_in_at.as_deref(), Some("2026-02-26T10:00:00Z"));
    }

    #[test]
    fn test_unpaid_order_is_not_mutated() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
        ] {
            let mut order = paid_order("ORD-BBB222", &[]);
            order.payment_status = status;
            let outcome = order.try_check_in("M-01", "op", "2026-02-26T10:00:00Z");
            assert_eq!(outcome, TransitionOutcome::NotPaid);
            assert!(!order.checked_in);
            assert!(order.check_in_details().is_none());
        }
    }

    #[test]
    fn test_payment_status_serializes_lowercase() {
        let json = serde_json::to_string(&PaymentStatus::Refunded).unwrap();
        assert_eq!(json, "\"refunded\"");
        let parsed: PaymentStatus = serde_json::from_str("\"paid\"").unwrap();
        assert_eq!(parsed, PaymentStatus::Paid);
    }
}
