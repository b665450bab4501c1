// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Cloud Run injects secrets as environment variables via secret bindings,
//! so there is no separate Secret Manager path.

use std::env;
use std::str::FromStr;

/// Default scans per minute a single gate may submit.
pub const DEFAULT_SCAN_RATE_LIMIT_PER_MINUTE: u32 = 100;

/// Which catalog store backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local store; single instance only
    Memory,
}

/// Where per-gate rate-limit counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    /// Process-local counters; correct only for a single replica
    Memory,
    /// Shared counters in Firestore, for multiple replicas
    Firestore,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StoreBackend::Firestore),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND", s.to_string())),
        }
    }
}

impl FromStr for RateLimitBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(RateLimitBackend::Memory),
            "firestore" => Ok(RateLimitBackend::Firestore),
            _ => Err(ConfigError::Invalid("RATE_LIMIT_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL allowed by CORS (scanner web app)
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    pub store_backend: StoreBackend,
    pub rate_limit_backend: RateLimitBackend,
    /// Maximum scans per gate per 60-second window
    pub scan_rate_limit_per_minute: u32,
    /// Upper bound on a single background audit write
    pub scan_log_timeout_ms: u64,
    /// JSON catalog seed applied at startup, if set
    pub catalog_seed_path: Option<String>,

    // --- Secrets ---
    /// HMAC key for credential tokens (raw bytes)
    pub qr_secret: Vec<u8>,
}

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            rate_limit_backend: RateLimitBackend::Memory,
            scan_rate_limit_per_minute: DEFAULT_SCAN_RATE_LIMIT_PER_MINUTE,
            scan_log_timeout_ms: 2000,
            catalog_seed_path: None,
            qr_secret: b"test_qr_secret".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let qr_secret = env::var("QR_SECRET")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("QR_SECRET"))?;
        if qr_secret.is_empty() {
            return Err(ConfigError::Missing("QR_SECRET"));
        }

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_var("PORT", 8080)?,
            store_backend: env::var("STORE_BACKEND")
                .map(|v| v.parse())
                .unwrap_or(Ok(StoreBackend::Firestore))?,
            rate_limit_backend: env::var("RATE_LIMIT_BACKEND")
                .map(|v| v.parse())
                .unwrap_or(Ok(RateLimitBackend::Memory))?,
            scan_rate_limit_per_minute: parse_var(
                "SCAN_RATE_LIMIT_PER_MINUTE",
                DEFAULT_SCAN_RATE_LIMIT_PER_MINUTE,
            )?,
            scan_log_timeout_ms: parse_var("SCAN_LOG_TIMEOUT_MS", 2000)?,
            catalog_seed_path: env::var("CATALOG_SEED_PATH")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            qr_secret: qr_secret.into_bytes(),
        })
    }
}

/// Read a numeric variable, falling back to `default` when unset.
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
