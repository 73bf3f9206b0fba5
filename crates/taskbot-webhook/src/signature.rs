//! Webhook signature handling
//!
//! Signatures are sent in a single header of the form
//! `t=<unix seconds>,sha256=<hex>`, where the digest is HMAC-SHA256 over
//! `"<t>.<raw body>"`.

use crate::{Result, WebhookError};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "sha256";

/// Webhook signature configuration
#[derive(Debug, Clone)]
pub struct SignatureConfig {
    /// Signature header name
    pub header_name: String,
    /// Tolerance for timestamp validation (in seconds)
    pub timestamp_tolerance_seconds: i64,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            header_name: "X-Taskbot-Signature".to_string(),
            timestamp_tolerance_seconds: 300, // 5 minutes
        }
    }
}

impl From<&taskbot_core::WebhookConfig> for SignatureConfig {
    fn from(config: &taskbot_core::WebhookConfig) -> Self {
        Self {
            header_name: config.signature_header.clone(),
            timestamp_tolerance_seconds: config.timestamp_tolerance_seconds,
        }
    }
}

/// Produces signatures the way the upstream service does.
pub struct WebhookSigner {
    secret: Vec<u8>,
    config: SignatureConfig,
}

impl WebhookSigner {
    /// Create a new signer with a secret
    pub fn new(secret: &str) -> Self {
        Self::with_config(secret, SignatureConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(secret: &str, config: SignatureConfig) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            config,
        }
    }

    /// Generate a signature header value for a payload
    pub fn sign(&self, payload: &[u8], timestamp: DateTime<Utc>) -> String {
        let timestamp = timestamp.timestamp();
        let signature = compute_signature(&self.secret, timestamp, payload);
        format!("t={timestamp},{ALGORITHM}={signature}")
    }

    /// Generate signature with current timestamp
    pub fn sign_now(&self, payload: &[u8]) -> String {
        self.sign(payload, Utc::now())
    }

    /// Header name/value pair for a signed request
    pub fn header(&self, payload: &[u8]) -> (String, String) {
        (self.config.header_name.clone(), self.sign_now(payload))
    }
}

/// Webhook verifier for validating signatures
pub struct WebhookVerifier {
    secret: Vec<u8>,
    config: SignatureConfig,
}

impl WebhookVerifier {
    /// Create a new verifier with a secret
    pub fn new(secret: &str) -> Self {
        Self::with_config(secret, SignatureConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(secret: &str, config: SignatureConfig) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            config,
        }
    }

    /// Header the signature is read from
    pub fn header_name(&self) -> &str {
        &self.config.header_name
    }

    /// Verify a webhook signature
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<()> {
        let (timestamp, signatures) = parse_signature_header(signature_header)?;

        self.verify_timestamp(timestamp)?;

        let expected = compute_signature(&self.secret, timestamp, payload);
        let matched = signatures
            .iter()
            .any(|(alg, sig)| alg == ALGORITHM && constant_time_compare(sig, &expected));

        if matched {
            Ok(())
        } else {
            Err(WebhookError::SignatureVerificationFailed(
                "No matching signature found".to_string(),
            ))
        }
    }

    /// Verify timestamp is within tolerance
    fn verify_timestamp(&self, timestamp: i64) -> Result<()> {
        // The timestamp comes from the request; extreme values must not overflow.
        let diff = Utc::now()
            .timestamp()
            .checked_sub(timestamp)
            .and_then(i64::checked_abs);

        match diff {
            Some(diff) if diff <= self.config.timestamp_tolerance_seconds => Ok(()),
            Some(diff) => Err(WebhookError::SignatureVerificationFailed(format!(
                "Timestamp outside tolerance: {diff} seconds difference"
            ))),
            None => Err(WebhookError::SignatureVerificationFailed(
                "Timestamp outside tolerance".to_string(),
            )),
        }
    }
}

/// Parse `t=...,alg=sig,...` into the timestamp and signature pairs
fn parse_signature_header(header: &str) -> Result<(i64, Vec<(String, String)>)> {
    let invalid = || WebhookError::SignatureVerificationFailed("Invalid signature format".to_string());

    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part.trim().split_once('=').ok_or_else(invalid)?;

        if key == "t" {
            timestamp = Some(value.parse().map_err(|_| {
                WebhookError::SignatureVerificationFailed("Invalid timestamp".to_string())
            })?);
        } else {
            signatures.push((key.to_string(), value.to_string()));
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        WebhookError::SignatureVerificationFailed("Missing timestamp".to_string())
    })?;

    Ok((timestamp, signatures))
}

fn compute_signature(secret: &[u8], timestamp: i64, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can accept any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}
