//! Webhook signature verification
//!
//! The processor signs each delivery with a `Stripe-Signature` header of the
//! form `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]`. Each `v1` value
//! is an HMAC-SHA256 of `"<t>.<raw body>"` under the endpoint secret. A
//! delivery is authentic if any `v1` matches and `t` is within tolerance.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Name of the header carrying the signature
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Why a delivery failed verification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing Stripe-Signature header")]
    MissingHeader,

    #[error("malformed signature header: {0}")]
    Malformed(String),

    #[error("signature timestamp is {age_secs}s from now, tolerance is {tolerance_secs}s")]
    OutsideTolerance { age_secs: i64, tolerance_secs: u64 },

    #[error("no signature matches the payload")]
    Mismatch,

    #[error("invalid signing secret: {0}")]
    InvalidSecret(String),
}

/// Parsed `Stripe-Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl SignatureHeader {
    /// Parses the header, ignoring schemes other than `v1`
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part.trim().split_once('=').ok_or_else(|| {
                SignatureError::Malformed(format!("expected key=value, got '{part}'"))
            })?;
            match key {
                "t" => {
                    let parsed = value.parse::<i64>().map_err(|_| {
                        SignatureError::Malformed(format!("invalid timestamp '{value}'"))
                    })?;
                    timestamp = Some(parsed);
                }
                "v1" => signatures.push(value.to_string()),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| SignatureError::Malformed("missing timestamp".to_string()))?;
        if signatures.is_empty() {
            return Err(SignatureError::Malformed("missing v1 signature".to_string()));
        }
        Ok(Self { timestamp, signatures })
    }
}

fn signed_digest(secret: &[u8], timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|err| SignatureError::InvalidSecret(err.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Computes the hex `v1` signature for a payload signed at `timestamp`
pub fn compute_signature(
    secret: &[u8],
    timestamp: i64,
    payload: &[u8],
) -> Result<String, SignatureError> {
    signed_digest(secret, timestamp, payload).map(hex::encode)
}

/// Builds a complete header value, as the processor would send it
pub fn sign_payload(
    secret: &[u8],
    timestamp: i64,
    payload: &[u8],
) -> Result<String, SignatureError> {
    Ok(format!("t={},v1={}", timestamp, compute_signature(secret, timestamp, payload)?))
}

fn signatures_match(expected: &[u8], candidate: &str) -> bool {
    match hex::decode(candidate) {
        Ok(actual) if actual.len() == expected.len() => expected.ct_eq(actual.as_slice()).into(),
        _ => false,
    }
}

/// Verifies deliveries against the endpoint secret
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance: Duration,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<Vec<u8>>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    /// Verifies `payload` against the header value at time `now` (unix seconds)
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] describing the first check that failed.
    pub fn verify(
        &self,
        header: Option<&str>,
        payload: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        let header = SignatureHeader::parse(header.ok_or(SignatureError::MissingHeader)?)?;

        let age_secs = now.saturating_sub(header.timestamp);
        let tolerance_secs = self.tolerance.as_secs();
        if age_secs.unsigned_abs() > tolerance_secs {
            return Err(SignatureError::OutsideTolerance { age_secs, tolerance_secs });
        }

        let expected = signed_digest(&self.secret, header.timestamp, payload)?;
        if header.signatures.iter().any(|candidate| signatures_match(&expected, candidate)) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECRET: &[u8] = b"whsec_test_secret";
    const NOW: i64 = 1_704_067_200;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(SECRET, Duration::from_secs(300))
    }

    #[test]
    fn test_valid_signature_verifies() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = sign_payload(SECRET, NOW, payload).unwrap();

        assert_eq!(verifier().verify(Some(&header), payload, NOW + 10), Ok(()));
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let payload = b"{}";
        let good = compute_signature(SECRET, NOW, payload).unwrap();
        let header = format!("t={NOW},v1={},v0=legacy,v1={good}", "ab".repeat(32));

        assert_eq!(verifier().verify(Some(&header), payload, NOW), Ok(()));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let header = sign_payload(SECRET, NOW, br#"{"amount":100}"#).unwrap();

        let result = verifier().verify(Some(&header), br#"{"amount":900}"#, NOW);

        assert_eq!(result, Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let header = sign_payload(b"another_secret", NOW, b"{}").unwrap();

        assert_eq!(verifier().verify(Some(&header), b"{}", NOW), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let header = sign_payload(SECRET, NOW, b"{}").unwrap();

        let result = verifier().verify(Some(&header), b"{}", NOW + 301);

        assert!(matches!(result, Err(SignatureError::OutsideTolerance { age_secs: 301, .. })));
    }

    #[test]
    fn test_missing_and_malformed_headers() {
        assert_eq!(verifier().verify(None, b"{}", NOW), Err(SignatureError::MissingHeader));
        assert!(matches!(
            verifier().verify(Some("v1=abcd"), b"{}", NOW),
            Err(SignatureError::Malformed(_))
        ));
        assert!(matches!(
            verifier().verify(Some("t=abc,v1=abcd"), b"{}", NOW),
            Err(SignatureError::Malformed(_))
        ));
        assert!(matches!(
            verifier().verify(Some(&format!("t={NOW}")), b"{}", NOW),
            Err(SignatureError::Malformed(_))
        ));
    }

    #[test]
    fn test_non_hex_signature_does_not_match() {
        let header = format!("t={NOW},v1=not-hex");

        assert_eq!(verifier().verify(Some(&header), b"{}", NOW), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_debug_hides_secret() {
        let rendered = format!("{:?}", verifier());
        assert!(!rendered.contains("whsec"));
    }

    proptest! {
        #[test]
        fn signed_payloads_verify_and_altered_ones_do_not(
            payload in prop::collection::vec(any::<u8>(), 1..256),
            index in any::<usize>(),
        ) {
            let header = sign_payload(SECRET, NOW, &payload).unwrap();
            prop_assert_eq!(verifier().verify(Some(&header), &payload, NOW), Ok(()));

            let mut altered = payload.clone();
            let i = index % altered.len();
            altered[i] ^= 0x01;
            prop_assert_eq!(
                verifier().verify(Some(&header), &altered, NOW),
                Err(SignatureError::Mismatch)
            );
        }
    }
}
