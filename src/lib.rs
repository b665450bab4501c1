// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gate check-in: ticket verification and admission for multi-day events
//!
//! This crate provides the backend that gate devices call to verify
//! scanned ticket credentials and consume them exactly once.

pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::CatalogStore;
use services::{CheckinEngine, RateLimiter};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn CatalogStore>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub engine: CheckinEngine,
}
