//! Short-lived signed download references.
//!
//! Token layout: `base64url(email|product_id|expires_unix) "." hex(hmac_sha256)`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadTokenError {
    #[error("download token is malformed")]
    Malformed,
    #[error("download token signature does not match")]
    BadSignature,
    #[error("download token expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("signing key rejected: {0}")]
    Key(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadClaims {
    pub email: String,
    pub product_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DownloadTokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl DownloadTokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    fn mac(&self) -> Result<HmacSha256, DownloadTokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| DownloadTokenError::Key(e.to_string()))
    }

    pub fn sign(
        &self,
        email: &str,
        product_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String, DownloadTokenError> {
        let expires = (now + self.ttl).timestamp();
        let payload = format!("{}|{}|{}", email, product_id, expires);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(payload), signature))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<DownloadClaims, DownloadTokenError> {
        let (encoded, signature) = token.split_once('.').ok_or(DownloadTokenError::Malformed)?;
        let payload = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| DownloadTokenError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| DownloadTokenError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| DownloadTokenError::BadSignature)?;

        let payload = String::from_utf8(payload).map_err(|_| DownloadTokenError::Malformed)?;
        // The email is the only part that could itself contain '|', so split
        // from the right.
        let mut parts = payload.rsplitn(3, '|');
        let expires = parts.next().ok_or(DownloadTokenError::Malformed)?;
        let product_id = parts.next().ok_or(DownloadTokenError::Malformed)?;
        let email = parts.next().ok_or(DownloadTokenError::Malformed)?;

        let expires: i64 = expires.parse().map_err(|_| DownloadTokenError::Malformed)?;
        let expires_at = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or(DownloadTokenError::Malformed)?;

        if now >= expires_at {
            return Err(DownloadTokenError::Expired(expires_at));
        }

        Ok(DownloadClaims {
            email: email.to_string(),
            product_id: product_id.to_string(),
            expires_at,
        })
    }
}
