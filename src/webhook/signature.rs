//! Webhook signature verification
//!
//! The payment collaborator signs each delivery with a header of the form
//! `t=<unix seconds>,v1=<hex hmac>[,v1=...]`. The MAC is HMAC-SHA256 keyed with
//! the endpoint secret over `"<t>.<raw payload>"`. A delivery is accepted when
//! any `v1` entry matches and the timestamp is within the tolerance window.

use crate::types::SettlementError;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default accepted clock skew between signing and verification
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verifies and produces webhook signature headers
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: u64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: tolerance_secs.unsigned_abs(),
        }
    }

    /// Verify a delivery against the current clock
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), SettlementError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verify a delivery against an explicit clock reading
    ///
    /// # Errors
    ///
    /// `SIGNATURE_INVALID` when the header is malformed, the timestamp is
    /// outside the tolerance window, or no signature matches.
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), SettlementError> {
        let parsed = parse_header(header)?;

        // The timestamp is not yet authenticated and may be any i64
        let skew = now.checked_sub(parsed.timestamp).map(i64::unsigned_abs);
        if !matches!(skew, Some(skew) if skew <= self.tolerance_secs) {
            return Err(SettlementError::signature_invalid(
                "timestamp outside the tolerance window",
            ));
        }

        let mac = self.mac(parsed.timestamp, payload)?;
        let matched = parsed
            .signatures
            .iter()
            .any(|signature| mac.clone().verify_slice(signature).is_ok());

        if matched {
            Ok(())
        } else {
            Err(SettlementError::signature_invalid(
                "no signature matches the payload",
            ))
        }
    }

    /// Produce a signature header for `payload` at `timestamp`
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, SettlementError> {
        let digest = self.mac(timestamp, payload)?.finalize().into_bytes();
        Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SettlementError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SettlementError::signature_invalid("webhook secret is not a valid key"))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

fn parse_header(header: &str) -> Result<SignatureHeader, SettlementError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                let parsed = value
                    .parse::<i64>()
                    .map_err(|_| SettlementError::signature_invalid("timestamp is not a number"))?;
                timestamp = Some(parsed);
            }
            // Unparseable entries cannot match; other schemes are ignored
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| SettlementError::signature_invalid("missing timestamp"))?;
    if signatures.is_empty() {
        return Err(SettlementError::signature_invalid("missing v1 signature"));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}
