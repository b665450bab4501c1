// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{Request, Response};
use gate_checkin::config::Config;
use gate_checkin::db::{CatalogStore, FirestoreDb, MemoryStore};
use gate_checkin::models::{Event, Gate, Order, PaymentStatus, User};
use gate_checkin::routes::create_router;
use gate_checkin::services::{CheckinEngine, CredentialCodec, InMemoryRateLimiter};
use gate_checkin::AppState;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const DAY_1: &str = "event-day1";
pub const DAY_2: &str = "event-day2";
/// Event with no scope token
pub const OPEN_EVENT: &str = "event-open";
pub const CLOSED_EVENT: &str = "event-closed";

pub const HOLDER: &str = "user-1";
pub const SECRET_GATE: &str = "G-SECRET";
pub const GATE_SECRET: &str = "gate-secret-value";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

#[allow(dead_code)]
pub fn test_codec() -> CredentialCodec {
    CredentialCodec::new(&Config::test_default().qr_secret).unwrap()
}

/// Everything a router test needs to poke at.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub codec: CredentialCodec,
}

/// Create a seeded test app on the in-memory store.
#[allow(dead_code)]
pub async fn create_test_app() -> TestApp {
    create_test_app_with(Config::test_default()).await
}

#[allow(dead_code)]
pub async fn create_test_app_with(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    seed_catalog(&*store).await;

    let codec = CredentialCodec::new(&config.qr_secret).unwrap();
    let engine = CheckinEngine::new(store.clone(), codec.clone());

    let state = Arc::new(AppState {
        config,
        store: store.clone(),
        rate_limiter: Arc::new(InMemoryRateLimiter::new()),
        engine,
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        codec,
    }
}

fn event(id: &str, name: &str, scope: Option<&str>, active: bool, scan_order: i32) -> Event {
    Event {
        id: id.to_string(),
        name: name.to_string(),
        venue: "Main Arena".to_string(),
        capacity: 500,
        is_active: active,
        scope_token: scope.map(str::to_string),
        scan_order,
        created_at: "2026-01-10T08:00:00.000Z".to_string(),
    }
}

fn gate(id: &str, secret: Option<&str>, active: bool, event_id: Option<&str>) -> Gate {
    Gate {
        gate_id: id.to_string(),
        name: format!("Gate {}", id),
        secret: secret.map(str::to_string),
        is_active: active,
        event_id: event_id.map(str::to_string),
    }
}

/// Seed events, one ticket holder, and gates.
///
/// Gates: `M-01`, `G1`, `G2` (open), `G-SECRET` (needs a secret),
/// `G-OFF` (inactive), `G-DAY2` (bound to day 2).
#[allow(dead_code)]
pub async fn seed_catalog(store: &dyn CatalogStore) {
    for e in [
        event(DAY_1, "Day 1", Some("DAY_1"), true, 1),
        event(DAY_2, "Day 2", Some("DAY_2"), true, 2),
        event(OPEN_EVENT, "Workshop", None, true, 3),
        event(CLOSED_EVENT, "Closed Night", Some("NIGHT"), false, 4),
    ] {
        store.upsert_event(&e).await.unwrap();
    }

    store
        .upsert_user(&User {
            id: HOLDER.to_string(),
            email: "asha@example.com".to_string(),
            name: "Asha Rao".to_string(),
            phone: None,
            college: Some("Engineering".to_string()),
            created_at: "2026-01-11T10:00:00.000Z".to_string(),
        })
        .await
        .unwrap();

    for g in [
        gate("M-01", None, true, None),
        gate("G1", None, true, None),
        gate("G2", None, true, None),
        gate(SECRET_GATE, Some(GATE_SECRET), true, None),
        gate("G-OFF", None, false, None),
        gate("G-DAY2", None, true, Some(DAY_2)),
    ] {
        store.upsert_gate(&g).await.unwrap();
    }
}

/// Insert an order for [`HOLDER`] and return it. The token is derived with `codec`.
#[allow(dead_code)]
pub async fn seed_order(
    store: &dyn CatalogStore,
    codec: &CredentialCodec,
    order_code: &str,
    event_id: &str,
    scopes: &[&str],
    status: PaymentStatus,
) -> Order {
    let order = Order {
        id: format!("id-{}", order_code),
        order_code: order_code.to_string(),
        credential_token: codec.encode(order_code),
        user_id: HOLDER.to_string(),
        event_id: event_id.to_string(),
        payment_status: status,
        quantity: 1,
        granted_scopes: scopes.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        checked_in: false,
        checked_in_at: None,
        checked_in_by: None,
        checked_in_gate: None,
        created_at: "2026-02-01T12:00:00.000Z".to_string(),
        updated_at: "2026-02-01T12:00:00.000Z".to_string(),
    };
    store.insert_order(&order).await.unwrap();
    order
}

/// POST a JSON body, optionally as a gate.
#[allow(dead_code)]
pub fn post_json(uri: &str, gate: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(gate) = gate {
        builder = builder.header("x-gate-id", gate);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
