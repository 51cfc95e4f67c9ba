//! Outbound webhook delivery.
//!
//! Events are pushed onto the `webhook` queue by the orchestrator and the
//! monitor evaluator; a scheduler loop drains that queue and delivers each
//! event with an HMAC-SHA256 signature the receiver can use to authenticate
//! the payload, mirroring the teacher's use of `hmac`/`sha2` for password
//! hashing but applied here to request signing instead.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretBox};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("invalid signing key")]
    InvalidKey,
    #[error("http delivery failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Compute the hex-encoded HMAC-SHA256 signature of `body` under
/// `signing_key`, carried in the `X-Ledger-Signature` header.
pub fn sign(signing_key: &SecretBox<String>, body: &[u8]) -> Result<String, NotifierError> {
    let mut mac = HmacSha256::new_from_slice(signing_key.expose_secret().as_bytes())
        .map_err(|_| NotifierError::InvalidKey)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Deliver a single webhook event to `url`. Callers are responsible for
/// retry/backoff via the `webhook` queue; this function makes one attempt.
#[tracing::instrument(skip(signing_key, body))]
pub async fn deliver(
    client: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
    signing_key: &SecretBox<String>,
) -> Result<(), NotifierError> {
    let encoded = serde_json::to_vec(body).expect("webhook payload is always valid json");
    let signature = sign(signing_key, &encoded)?;

    let response = client
        .post(url)
        .header("X-Ledger-Signature", signature)
        .header("Content-Type", "application/json")
        .body(encoded)
        .send()
        .await?;

    if let Err(e) = response.error_for_status_ref() {
        tracing::warn!(url, error = %e, "webhook delivery received an error response");
        return Err(NotifierError::Http(e));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_is_deterministic() {
        let key = SecretBox::new(Box::new("shh".to_string()));
        let a = sign(&key, b"payload").unwrap();
        let b = sign(&key, b"payload").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sign_differs_by_body() {
        let key = SecretBox::new(Box::new("shh".to_string()));
        let a = sign(&key, b"payload-a").unwrap();
        let b = sign(&key, b"payload-b").unwrap();
        assert_ne!(a, b);
    }
}
