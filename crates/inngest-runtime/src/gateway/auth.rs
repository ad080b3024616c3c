//! Request signature verification: `X-Inngest-Signature` is
//! `t=<unix-seconds>&s=<hex hmac-sha256 of body+timestamp>`, checked against
//! the configured signing key and, on mismatch, the fallback key (for
//! rotation). See spec §4.5/§6.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use inngest_core::{InngestError, Result};

type HmacSha256 = Hmac<Sha256>;

/// How stale a signature's timestamp may be before it's rejected as a
/// replay.
pub const MAX_SIGNATURE_AGE_SECS: i64 = 60 * 5;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub signing_key: Option<String>,
    pub signing_key_fallback: Option<String>,
    /// Dev mode skips signature verification entirely.
    pub is_dev: bool,
}

impl AuthConfig {
    pub fn new(signing_key: Option<String>, signing_key_fallback: Option<String>, is_dev: bool) -> Self {
        Self {
            signing_key,
            signing_key_fallback,
            is_dev,
        }
    }
}

/// Parse `t=<ts>&s=<sig>` into its parts.
fn parse_signature_header(header: &str) -> Result<(i64, String)> {
    let mut ts = None;
    let mut sig = None;
    for part in header.split('&') {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| InngestError::SignatureMismatch("malformed signature header".into()))?;
        match key {
            "t" => ts = value.parse::<i64>().ok(),
            "s" => sig = Some(value.to_string()),
            _ => {}
        }
    }
    let ts = ts.ok_or_else(|| InngestError::SignatureMismatch("missing timestamp".into()))?;
    let sig = sig.ok_or_else(|| InngestError::SignatureMismatch("missing signature".into()))?;
    Ok((ts, sig))
}

fn hmac_hex(key: &str, body: &[u8], ts: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| InngestError::SignatureMismatch(e.to_string()))?;
    mac.update(body);
    mac.update(ts.to_string().as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify `header` against `body`, trying the primary key then the
/// fallback. Returns `Ok(())` on a match, or a [`InngestError::SignatureMismatch`]
/// otherwise. A no-op (always `Ok`) in dev mode or when no signing key is
/// configured.
pub fn verify_signature(config: &AuthConfig, header: Option<&str>, body: &[u8], now_unix: i64) -> Result<()> {
    if config.is_dev {
        return Ok(());
    }
    let Some(signing_key) = config.signing_key.as_deref() else {
        return Ok(());
    };
    let header = header.ok_or_else(|| InngestError::SignatureMismatch("missing X-Inngest-Signature header".into()))?;
    let (ts, sig) = parse_signature_header(header)?;

    if (now_unix - ts).abs() > MAX_SIGNATURE_AGE_SECS {
        return Err(InngestError::SignatureMismatch("signature timestamp outside allowed window".into()));
    }

    let expected = hmac_hex(signing_key, body, ts)?;
    if constant_time_eq(&expected, &sig) {
        return Ok(());
    }

    if let Some(fallback) = config.signing_key_fallback.as_deref() {
        let expected_fallback = hmac_hex(fallback, body, ts)?;
        if constant_time_eq(&expected_fallback, &sig) {
            return Ok(());
        }
    }

    Err(InngestError::SignatureMismatch("signature does not match body".into()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Sign a body the way the SDK would when calling out to the Executor
/// (e.g. the `invoke` step). Exposed for symmetry with `verify_signature`
/// and for tests.
pub fn sign(signing_key: &str, body: &[u8], now_unix: i64) -> Result<String> {
    let sig = hmac_hex(signing_key, body, now_unix)?;
    Ok(format!("t={now_unix}&s={sig}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_sign_and_verify() {
        let config = AuthConfig::new(Some("secret".into()), None, false);
        let body = br#"{"hello":"world"}"#;
        let header = sign("secret", body, 1_000).unwrap();
        assert!(verify_signature(&config, Some(&header), body, 1_000).is_ok());
    }

    #[test]
    fn fallback_key_accepted_on_primary_mismatch() {
        let config = AuthConfig::new(Some("new-secret".into()), Some("old-secret".into()), false);
        let body = b"payload";
        let header = sign("old-secret", body, 1_000).unwrap();
        assert!(verify_signature(&config, Some(&header), body, 1_000).is_ok());
    }

    #[test]
    fn rejects_tampered_body() {
        let config = AuthConfig::new(Some("secret".into()), None, false);
        let header = sign("secret", b"original", 1_000).unwrap();
        assert!(verify_signature(&config, Some(&header), b"tampered", 1_000).is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let config = AuthConfig::new(Some("secret".into()), None, false);
        let body = b"payload";
        let header = sign("secret", body, 1_000).unwrap();
        assert!(verify_signature(&config, Some(&header), body, 1_000 + MAX_SIGNATURE_AGE_SECS + 10).is_err());
    }

    #[test]
    fn dev_mode_skips_verification() {
        let config = AuthConfig::new(Some("secret".into()), None, true);
        assert!(verify_signature(&config, None, b"anything", 0).is_ok());
    }

    #[test]
    fn no_signing_key_configured_is_a_noop() {
        let config = AuthConfig::new(None, None, false);
        assert!(verify_signature(&config, None, b"anything", 0).is_ok());
    }
}
