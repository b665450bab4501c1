// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod access;
pub mod checkin;
pub mod codec;
pub mod issuance;
pub mod rate_limit;

pub use checkin::{CheckinEngine, ScanDecision, ScanRequest};
pub use codec::{Credential, CredentialCodec};
pub use issuance::{IssuanceService, IssueOrder};
pub use rate_limit::{FirestoreRateLimiter, InMemoryRateLimiter, RateLimiter};
