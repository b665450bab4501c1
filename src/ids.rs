// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identifier generation for orders and audit rows.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of the random suffix on order codes.
const ORDER_CODE_RANDOM_LEN: usize = 6;

fn random_bytes<const N: usize>() -> Result<[u8; N], AppError> {
    let mut buf = [0u8; N];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG failure")))?;
    Ok(buf)
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Random 128-bit identifier as lowercase hex.
pub fn new_id() -> Result<String, AppError> {
    Ok(hex::encode(random_bytes::<16>()?))
}

/// Human-facing order code: `ORD-<base36 millis>-<6 random base36>`.
pub fn new_order_code(now: DateTime<Utc>) -> Result<String, AppError> {
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
    let random = random_bytes::<ORDER_CODE_RANDOM_LEN>()?;
    let suffix: String = random
        .iter()
        .map(|b| BASE36[(*b as usize) % BASE36.len()] as char)
        .collect();
    Ok(format!("ORD-{}-{}", to_base36(millis), suffix))
}

/// Document ID for a scan log row: sortable timestamp plus random suffix.
pub fn scan_log_id(timestamp: &str) -> Result<String, AppError> {
    Ok(format!(
        "{}_{}",
        timestamp,
        hex::encode(random_bytes::<6>()?)
    ))
}
