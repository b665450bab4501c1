// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.
//!
//! All stored timestamps use fixed millisecond precision with a `Z` suffix so
//! that lexicographic order matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 (milliseconds, `Z` suffix).
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time, formatted for storage.
pub fn now_rfc3339() -> String {
    format_utc_rfc3339(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_has_fixed_width() {
        let a = Utc.with_ymd_and_hms(2026, 2, 26, 9, 5, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(1500);

        assert_eq!(format_utc_rfc3339(a), "2026-02-26T09:05:00.000Z");
        assert_eq!(format_utc_rfc3339(b), "2026-02-26T09:05:01.500Z");
        assert!(format_utc_rfc3339(a) < format_utc_rfc3339(b));
    }
}
