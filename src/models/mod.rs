// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod event;
pub mod gate;
pub mod order;
pub mod scan_log;
pub mod user;

pub use event::Event;
pub use gate::Gate;
pub use order::{CheckInDetails, Order, PaymentStatus, TransitionOutcome};
pub use scan_log::{ClientInfo, ScanLogEntry, ScanOutcome, ScanStats};
pub use user::User;
