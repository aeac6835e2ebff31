//! Optional request signing.
//!
//! A signer sees the project id, the API key and the final payload and
//! produces a timestamp and a signature. Both travel as request headers
//! (`timestamp`, `signature`), never inside the body.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::Record;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub timestamp: String,
    pub signature: String,
}

/// Computes request signatures. Must be synchronous and deterministic for a
/// given payload and timestamp.
pub trait Signer: Send + Sync {
    fn sign(&self, project_id: &str, api_key: &str, payload: &Record) -> Signature;
}

impl<F> Signer for F
where
    F: Fn(&str, &str, &Record) -> Signature + Send + Sync,
{
    fn sign(&self, project_id: &str, api_key: &str, payload: &Record) -> Signature {
        self(project_id, api_key, payload)
    }
}

/// HMAC-SHA256 signer keyed with the API key.
///
/// The signed message is `"{project_id}.{timestamp}.{payload json}"` and the
/// signature is its lowercase hex digest. The timestamp is Unix milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSigner;

impl HmacSigner {
    /// Signature for an explicit timestamp; [`Signer::sign`] uses the clock.
    #[must_use]
    pub fn sign_at(project_id: &str, api_key: &str, payload: &Record, timestamp: &str) -> String {
        // Any key length is accepted by HMAC, so this cannot fail.
        let mut mac = match HmacSha256::new_from_slice(api_key.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(project_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(serde_json::Value::Object(payload.clone()).to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl Signer for HmacSigner {
    fn sign(&self, project_id: &str, api_key: &str, payload: &Record) -> Signature {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
            .to_string();
        let signature = Self::sign_at(project_id, api_key, payload, &timestamp);
        Signature {
            timestamp,
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Record {
        json!({"level": "INFO", "data": {"message": "hi"}})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_sign_at_is_deterministic() {
        let a = HmacSigner::sign_at("proj", "key", &payload(), "1700000000000");
        let b = HmacSigner::sign_at("proj", "key", &payload(), "1700000000000");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sign_at_depends_on_every_input() {
        let base = HmacSigner::sign_at("proj", "key", &payload(), "1");
        assert_ne!(base, HmacSigner::sign_at("other", "key", &payload(), "1"));
        assert_ne!(base, HmacSigner::sign_at("proj", "other", &payload(), "1"));
        assert_ne!(base, HmacSigner::sign_at("proj", "key", &Record::new(), "1"));
        assert_ne!(base, HmacSigner::sign_at("proj", "key", &payload(), "2"));
    }

    #[test]
    fn test_sign_uses_clock_timestamp() {
        let sig = HmacSigner.sign("proj", "key", &payload());
        let millis: u128 = sig.timestamp.parse().unwrap();
        assert!(millis > 1_600_000_000_000);
        assert_eq!(
            sig.signature,
            HmacSigner::sign_at("proj", "key", &payload(), &sig.timestamp)
        );
    }

    #[test]
    fn test_closure_signer() {
        let signer = |project_id: &str, _api_key: &str, _payload: &Record| Signature {
            timestamp: "42".to_string(),
            signature: format!("sig-{project_id}"),
        };
        let sig = signer.sign("p1", "k", &payload());
        assert_eq!(sig.signature, "sig-p1");
        assert_eq!(sig.timestamp, "42");
    }
}
