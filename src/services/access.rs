// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access policy: which orders may enter which events.
//!
//! Scope matching is set membership, since one order can bundle several
//! day passes or session add-ons.

use crate::models::{Event, Order};

/// Whether `order` may be admitted to `event`.
///
/// Unrestricted events (no scope token) admit any order.
pub fn authorize(order: &Order, event: &Event) -> bool {
    match &event.scope_token {
        None => true,
        Some(scope) => order.granted_scopes.contains(scope),
    }
}

/// Open verification, used when the scanner did not pick a target event.
///
/// Any granted scope is sufficient. An order with no scopes falls back to
/// its own event's policy.
pub fn authorize_any(order: &Order, primary_event: Option<&Event>) -> bool {
    if !order.granted_scopes.is_empty() {
        return true;
    }
    primary_event.is_some_and(|event| authorize(order, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::tests::paid_order;

    fn event(scope: Option<&str>) -> Event {
        Event {
            id: "event-1".to_string(),
            name: "Day 1".to_string(),
            venue: "Main Ground".to_string(),
            capacity: 1000,
            is_active: true,
            scope_token: scope.map(str::to_string),
            scan_order: 0,
            created_at: "2026-02-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_unrestricted_event_admits_everyone() {
        let order = paid_order("ORD-AAA111", &[]);
        assert!(authorize(&order, &event(None)));
    }

    #[test]
    fn test_scope_membership() {
        let order = paid_order("ORD-AAA111", &["DAY_1", "TALK_KEYNOTE"]);
        assert!(authorize(&order, &event(Some("DAY_1"))));
        assert!(authorize(&order, &event(Some("TALK_KEYNOTE"))));
        assert!(!authorize(&order, &event(Some("DAY_2"))));
    }

    #[test]
    fn test_scope_match_is_exact() {
        let order = paid_order("ORD-AAA111", &["DAY_1"]);
        assert!(!authorize(&order, &event(Some("day_1"))));
        assert!(!authorize(&order, &event(Some("DAY_10"))));
    }

    #[test]
    fn test_open_verification() {
        let scoped = paid_order("ORD-AAA111", &["DAY_2"]);
        assert!(authorize_any(&scoped, None));

        let unscoped = paid_order("ORD-BBB222", &[]);
        assert!(authorize_any(&unscoped, Some(&event(None))));
        assert!(!authorize_any(&unscoped, Some(&event(Some("DAY_1")))));
        assert!(!authorize_any(&unscoped, None));
    }
}
