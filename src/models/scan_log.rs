// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scan outcomes and the append-only scan audit log.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Result of a single scan attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Success,
    AlreadyUsed,
    Invalid,
    NotFound,
    WrongEvent,
    NotPaid,
    /// The store could not be reached; the mutation state is unknown.
    InternalError,
}

impl ScanOutcome {
    pub const ALL: [ScanOutcome; 7] = [
        ScanOutcome::Success,
        ScanOutcome::AlreadyUsed,
        ScanOutcome::Invalid,
        ScanOutcome::NotFound,
        ScanOutcome::WrongEvent,
        ScanOutcome::NotPaid,
        ScanOutcome::InternalError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanOutcome::Success => "success",
            ScanOutcome::AlreadyUsed => "already_used",
            ScanOutcome::Invalid => "invalid",
            ScanOutcome::NotFound => "not_found",
            ScanOutcome::WrongEvent => "wrong_event",
            ScanOutcome::NotPaid => "not_paid",
            ScanOutcome::InternalError => "internal_error",
        }
    }

    /// Whether a `verify` with this outcome leaves a row in the scan log.
    ///
    /// `invalid` never reaches the store and `internal_error` has an
    /// unknown mutation state, so neither is recorded.
    pub fn is_audited(&self) -> bool {
        match self {
            ScanOutcome::Success
            | ScanOutcome::AlreadyUsed
            | ScanOutcome::NotFound
            | ScanOutcome::WrongEvent
            | ScanOutcome::NotPaid => true,
            ScanOutcome::Invalid | ScanOutcome::InternalError => false,
        }
    }
}

impl std::fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client metadata captured from the scanning device's request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// One row of the scan audit trail. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ScanLogEntry {
    /// Credential text exactly as scanned
    pub scanned: String,
    /// Order code the credential resolved to, if any
    #[serde(default)]
    pub order_code: Option<String>,
    /// Event the scan targeted (or the order's own event)
    #[serde(default)]
    pub event_id: Option<String>,
    pub outcome: ScanOutcome,
    pub gate_id: String,
    pub operator_id: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// When the scan was processed (RFC3339, millisecond precision)
    pub timestamp: String,
}

/// Aggregated scan counts for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub event_id: String,
    pub total_scans: u64,
    /// Scan count per outcome
    pub by_outcome: BTreeMap<ScanOutcome, u64>,
    /// Tickets (sum of quantities) on paid orders for the event
    pub tickets_sold: u64,
    /// Tickets on paid orders that have been checked in
    pub tickets_checked_in: u64,
}

impl ScanStats {
    pub fn new(event_id: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: ScanOutcome) {
        self.record_many(outcome, 1);
    }

    /// Add `count` scans with one outcome. Zero counts leave no entry.
    pub fn record_many(&mut self, outcome: ScanOutcome, count: u64) {
        if count == 0 {
            return;
        }
        self.total_scans += count;
        *self.by_outcome.entry(outcome).or_insert(0) += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_wire_names() {
        for outcome in [
            ScanOutcome::Success,
            ScanOutcome::AlreadyUsed,
            ScanOutcome::Invalid,
            ScanOutcome::NotFound,
            ScanOutcome::WrongEvent,
            ScanOutcome::NotPaid,
            ScanOutcome::InternalError,
        ] {
            let json = serde_json::to_string(&outcome).unwrap();
            assert_eq!(json, format!("\"{}\"", outcome.as_str()));
        }
    }

    #[test]
    fn test_only_business_outcomes_are_audited() {
        assert!(ScanOutcome::Success.is_audited());
        assert!(ScanOutcome::AlreadyUsed.is_audited());
        assert!(ScanOutcome::NotPaid.is_audited());
        assert!(!ScanOutcome::Invalid.is_audited());
        assert!(!ScanOutcome::InternalError.is_audited());
    }

    #[test]
    fn test_stats_record() {
        let mut stats = ScanStats::new("day-1");
        stats.record(ScanOutcome::Success);
        stats.record(ScanOutcome::AlreadyUsed);
        stats.record(ScanOutcome::AlreadyUsed);

        assert_eq!(stats.total_scans, 3);
        assert_eq!(stats.by_outcome[&ScanOutcome::AlreadyUsed], 2);
        assert_eq!(stats.by_outcome.get(&ScanOutcome::NotFound), None);
    }

    #[test]
    fn test_stats_record_many_skips_zero() {
        let mut stats = ScanStats::new("day-1");
        stats.record_many(ScanOutcome::Success, 4);
        stats.record_many(ScanOutcome::NotPaid, 0);
        stats.record(ScanOutcome::Success);

        assert_eq!(stats.total_scans, 5);
        assert_eq!(stats.by_outcome[&ScanOutcome::Success], 5);
        assert!(!stats.by_outcome.contains_key(&ScanOutcome::NotPaid));
    }
}
