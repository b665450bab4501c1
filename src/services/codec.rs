// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential codec: order code to QR token, and scanned-input parsing.
//!
//! The token is a one-way tag (truncated HMAC-SHA256), not an encoding of
//! order data. Resolving a token back to an order is a store lookup.

use hmac::{Hmac, Mac};
use sha2::Sha256;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// Length of a credential token in characters (64 bits of hex).
pub const TOKEN_LEN: usize = 16;

/// Longest scanned payload we bother looking at.
const MAX_CREDENTIAL_LEN: usize = 128;

const ORDER_CODE_PREFIX: &str = "ORD-";

/// A scanned credential that passed shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// 16-character token, uppercased
    Token(String),
    /// Order code printed on legacy tickets, uppercased
    OrderCode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("QR secret must not be empty")]
    EmptySecret,

    #[error("Invalid HMAC key: {0}")]
    InvalidKey(String),
}

/// Keyed, deterministic order-code-to-token transform.
#[derive(Clone)]
pub struct CredentialCodec {
    /// Keyed MAC state, cloned per encode
    mac: HmacSha256,
}

impl std::fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCodec").finish_non_exhaustive()
    }
}

impl CredentialCodec {
    pub fn new(secret: &[u8]) -> Result<Self, CodecError> {
        if secret.is_empty() {
            return Err(CodecError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| CodecError::InvalidKey(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Derive the credential token for an order code.
    pub fn encode(&self, order_code: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(order_code.as_bytes());
        let digest = mac.finalize().into_bytes();

        // 8 bytes -> 16 hex characters
        hex::encode_upper(&digest[..TOKEN_LEN / 2])
    }

    /// Whether `token` is the credential issued for `order_code`.
    pub fn matches(&self, order_code: &str, token: &str) -> bool {
        use subtle::ConstantTimeEq;
        let expected = self.encode(order_code);
        expected
            .as_bytes()
            .ct_eq(token.trim().to_ascii_uppercase().as_bytes())
            .into()
    }
}

/// Validate the shape of scanned text without touching the store.
///
/// Returns `None` for input that can never resolve to an order.
pub fn parse_credential(raw: &str) -> Option<Credential> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_CREDENTIAL_LEN {
        return None;
    }

    if trimmed.len() == TOKEN_LEN && trimmed.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Some(Credential::Token(trimmed.to_ascii_uppercase()));
    }

    // Legacy printed tickets carry "ORD-...." or "ORD-....<.signature>".
    let upper = trimmed.to_ascii_uppercase();
    if upper.starts_with(ORDER_CODE_PREFIX) {
        let code = upper.split('.').next().unwrap_or_default();
        let body = &code[ORDER_CODE_PREFIX.len()..];
        let well_formed = !body.is_empty()
            && body.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
        if well_formed {
            return Some(Credential::OrderCode(code.to_string()));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn codec() -> CredentialCodec {
        CredentialCodec::new(b"Salt123").unwrap()
    }

    #[test]
    fn test_encode_is_deterministic() {
        let codec = codec();
        assert_eq!(codec.encode("ORD-AAA111"), codec.encode("ORD-AAA111"));
    }

    #[test]
    fn test_encode_shape() {
        let token = codec().encode("ORD-AAA111");
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b)));
    }

    #[test]
    fn test_encode_matches_truncated_hmac() {
        let mut mac = HmacSha256::new_from_slice(b"Salt123").unwrap();
        mac.update(b"ORD-AAA111");
        let full = hex::encode(mac.finalize().into_bytes()).to_uppercase();

        assert_eq!(codec().encode("ORD-AAA111"), full[..16]);
    }

    #[test]
    fn test_secret_changes_token() {
        let other = CredentialCodec::new(b"another-secret").unwrap();
        assert_ne!(codec().encode("ORD-AAA111"), other.encode("ORD-AAA111"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            CredentialCodec::new(b""),
            Err(CodecError::EmptySecret)
        ));
    }

    #[test]
    fn test_no_collisions_in_sample() {
        let codec = codec();
        let mut seen = HashSet::new();
        for i in 0..100_000u32 {
            let token = codec.encode(&format!("ORD-{:08X}", i));
            assert!(seen.insert(token), "collision at order {}", i);
        }
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let codec = codec();
        let token = codec.encode("ORD-AAA111");
        assert!(codec.matches("ORD-AAA111", &token.to_lowercase()));
        assert!(!codec.matches("ORD-AAA112", &token));
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(
            parse_credential("  a1b2c3d4e5f60708 "),
            Some(Credential::Token("A1B2C3D4E5F60708".to_string()))
        );
    }

    #[test]
    fn test_parse_order_code() {
        assert_eq!(
            parse_credential("ord-lx2k9a1b-7qzp3m"),
            Some(Credential::OrderCode("ORD-LX2K9A1B-7QZP3M".to_string()))
        );
        assert_eq!(
            parse_credential("ORD-AAA111.deadbeef"),
            Some(Credential::OrderCode("ORD-AAA111".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_credential(""), None);
        assert_eq!(parse_credential("   "), None);
        assert_eq!(parse_credential("ORD-"), None);
        assert_eq!(parse_credential("ORD-ABC 123"), None);
        assert_eq!(parse_credential("short"), None);
        assert_eq!(parse_credential("A1B2C3D4E5F6070!"), None);
        assert_eq!(parse_credential(&"A".repeat(200)), None);
    }
}
