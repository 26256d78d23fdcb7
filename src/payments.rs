//! Payment provider callbacks.
//!
//! The provider signs the raw request body with a keyed BLAKE3 MAC and sends
//! the lowercase hex digest in `x-payment-signature`.

use std::fmt;

pub const SIGNATURE_HEADER: &str = "x-payment-signature";

const KEY_CONTEXT: &str = "property-portal 2024 payment webhook signature";

/// PaymentStatus
///
/// The statuses a provider callback may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn parse(raw: &str) -> Option<PaymentStatus> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "succeeded" => Some(PaymentStatus::Succeeded),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn mac_key(secret: &str) -> [u8; 32] {
    blake3::derive_key(KEY_CONTEXT, secret.as_bytes())
}

/// Hex signature for `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    blake3::keyed_hash(&mac_key(secret), body).to_hex().to_string()
}

/// verify_signature
///
/// Constant-time comparison of the presented signature against the expected
/// MAC. Malformed hex or a wrong length is simply a mismatch.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(presented) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(presented) = <[u8; 32]>::try_from(presented) else {
        return false;
    };
    blake3::keyed_hash(&mac_key(secret), body) == blake3::Hash::from(presented)
}
