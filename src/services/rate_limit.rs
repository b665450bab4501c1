// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-gate scan rate limiting.
//!
//! Counters are keyed by gate ID, so one overloaded gate cannot starve the
//! others, and two devices misconfigured with the same ID share one budget.
//! Rejections happen before the catalog store is touched and are not scan
//! outcomes.

use crate::db::FirestoreDb;
use crate::error::AppError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Length of a rate-limit window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Per-gate scan counter.
///
/// `try_acquire` is the request-path operation: it checks and records as one
/// atomic step so concurrent requests for the same gate cannot both slip
/// under the limit.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one scan attempt for `gate_id`.
    async fn record(&self, gate_id: &str) -> Result<(), AppError>;

    /// Whether `gate_id` has used up its budget for the current window.
    async fn is_limited(&self, gate_id: &str, max_per_minute: u32) -> Result<bool, AppError>;

    /// Record an attempt if the gate is under budget.
    ///
    /// Returns `false` (and records nothing) when the gate is limited.
    async fn try_acquire(&self, gate_id: &str, max_per_minute: u32) -> Result<bool, AppError>;
}

// ─── In-memory sliding window ─────────────────────────────────────────────

/// Sliding-window limiter held in process memory.
///
/// Correct for a single replica only; use [`FirestoreRateLimiter`] when
/// several instances serve the same gates.
pub struct InMemoryRateLimiter {
    window: Duration,
    /// Attempt timestamps per gate, oldest first
    hits: DashMap<String, VecDeque<Instant>>,
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::with_window(WINDOW)
    }
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            hits: DashMap::new(),
        }
    }

    fn evict_expired(&self, hits: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = hits.front() {
            if now.duration_since(*oldest) >= self.window {
                hits.pop_front();
            } else {
                break;
            }
        }
    }

    /// Drop gates with no attempts inside the window.
    pub fn prune(&self) {
        let now = Instant::now();
        self.hits.retain(|_, hits| {
            self.evict_expired(hits, now);
            !hits.is_empty()
        });
    }

    /// Number of tracked gates.
    pub fn tracked_gates(&self) -> usize {
        self.hits.len()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn record(&self, gate_id: &str) -> Result<(), AppError> {
        let now = Instant::now();
        let mut hits = self.hits.entry(gate_id.to_string()).or_default();
        self.evict_expired(&mut hits, now);
        hits.push_back(now);
        Ok(())
    }

    async fn is_limited(&self, gate_id: &str, max_per_minute: u32) -> Result<bool, AppError> {
        let now = Instant::now();
        match self.hits.get_mut(gate_id) {
            Some(mut hits) => {
                self.evict_expired(&mut hits, now);
                Ok(hits.len() >= max_per_minute as usize)
            }
            None => Ok(max_per_minute == 0),
        }
    }

    async fn try_acquire(&self, gate_id: &str, max_per_minute: u32) -> Result<bool, AppError> {
        let now = Instant::now();
        // The entry guard holds the shard lock, making check-and-record atomic.
        let mut hits = self.hits.entry(gate_id.to_string()).or_default();
        self.evict_expired(&mut hits, now);
        if hits.len() >= max_per_minute as usize {
            return Ok(false);
        }
        hits.push_back(now);
        Ok(true)
    }
}

// ─── Firestore fixed window ───────────────────────────────────────────────

/// Fixed-minute-window limiter shared by all replicas through Firestore.
///
/// Window documents carry an `expire_at` field; configure a Firestore TTL
/// policy on it to have old windows removed.
#[derive(Clone)]
pub struct FirestoreRateLimiter {
    db: FirestoreDb,
}

impl FirestoreRateLimiter {
    pub fn new(db: FirestoreDb) -> Self {
        Self { db }
    }
}

/// Start (unix seconds) of the fixed window containing `now`.
pub fn window_start(now: chrono::DateTime<chrono::Utc>) -> i64 {
    let secs = WINDOW.as_secs() as i64;
    now.timestamp().div_euclid(secs) * secs
}

#[async_trait]
impl RateLimiter for FirestoreRateLimiter {
    async fn record(&self, gate_id: &str) -> Result<(), AppError> {
        let window = window_start(chrono::Utc::now());
        self.db.increment_rate_window(gate_id, window, None).await?;
        Ok(())
    }

    async fn is_limited(&self, gate_id: &str, max_per_minute: u32) -> Result<bool, AppError> {
        let window = window_start(chrono::Utc::now());
        let count = self.db.get_rate_window_count(gate_id, window).await?;
        Ok(count >= max_per_minute)
    }

    async fn try_acquire(&self, gate_id: &str, max_per_minute: u32) -> Result<bool, AppError> {
        let window = window_start(chrono::Utc::now());
        self.db
            .increment_rate_window(gate_id, window, Some(max_per_minute))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_sixth_scan_is_limited() {
        let limiter = InMemoryRateLimiter::new();

        for _ in 0..5 {
            assert!(limiter.try_acquire("G1", 5).await.unwrap());
        }
        assert!(!limiter.try_acquire("G1", 5).await.unwrap());
        assert!(limiter.is_limited("G1", 5).await.unwrap());

        // Independent budget per gate
        assert!(limiter.try_acquire("G2", 5).await.unwrap());
        assert!(!limiter.is_limited("G2", 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_attempts_are_not_recorded() {
        let limiter = InMemoryRateLimiter::new();
        for _ in 0..3 {
            limiter.try_acquire("G1", 2).await.unwrap();
        }
        // Raising the limit exposes the real count: only two were recorded.
        assert!(limiter.try_acquire("G1", 3).await.unwrap());
        assert!(!limiter.try_acquire("G1", 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_and_is_limited() {
        let limiter = InMemoryRateLimiter::new();
        assert!(!limiter.is_limited("G1", 2).await.unwrap());
        limiter.record("G1").await.unwrap();
        assert!(!limiter.is_limited("G1", 2).await.unwrap());
        limiter.record("G1").await.unwrap();
        assert!(limiter.is_limited("G1", 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = InMemoryRateLimiter::with_window(Duration::from_millis(50));
        assert!(limiter.try_acquire("G1", 1).await.unwrap());
        assert!(!limiter.try_acquire("G1", 1).await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.try_acquire("G1", 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_drops_idle_gates() {
        let limiter = InMemoryRateLimiter::with_window(Duration::from_millis(20));
        limiter.record("G1").await.unwrap();
        limiter.record("G2").await.unwrap();
        assert_eq!(limiter.tracked_gates(), 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        limiter.prune();
        assert_eq!(limiter.tracked_gates(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_acquire_never_exceeds_limit() {
        let limiter = std::sync::Arc::new(InMemoryRateLimiter::new());
        let mut handles = vec![];
        for _ in 0..50 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.try_acquire("shared", 10).await.unwrap()
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 10);
    }

    #[test]
    fn test_window_start_alignment() {
        let t = chrono::Utc.with_ymd_and_hms(2026, 2, 26, 9, 5, 42).unwrap();
        let start = window_start(t);
        assert_eq!(start % 60, 0);
        assert_eq!(t.timestamp() - start, 42);
    }
}
