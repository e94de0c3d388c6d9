//! Per-provider signature validation, fail-closed on an empty configured
//! secret.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const GITHUB_HEADER: &str = "x-hub-signature-256";
const SENTRY_HEADER: &str = "sentry-hook-signature";
const GENERIC_HEADER: &str = "x-webhook-secret";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn hmac_hex(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Which provider's signature scheme authenticated a request — determines
/// the normalization extractor applied to the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    GitHub,
    Sentry,
    Generic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::GitHub => "github",
            Provider::Sentry => "sentry",
            Provider::Generic => "generic",
        }
    }
}

/// Validate an inbound request's signature against the endpoint's configured
/// secret. An empty `secret` always rejects, regardless of headers present —
/// this is the spec's deliberate fail-closed policy for misconfigured
/// endpoints. Returns the provider whose scheme matched, so the caller can
/// select the right body extractor.
pub fn authenticate(secret: &str, headers: &HeaderMap, body: &[u8]) -> Option<Provider> {
    if secret.is_empty() {
        return None;
    }

    if let Some(sig) = header_str(headers, GITHUB_HEADER) {
        let hex_part = sig.strip_prefix("sha256=")?;
        return constant_time_eq(hex_part, &hmac_hex(secret, body)).then_some(Provider::GitHub);
    }

    if let Some(sig) = header_str(headers, SENTRY_HEADER) {
        return constant_time_eq(sig, &hmac_hex(secret, body)).then_some(Provider::Sentry);
    }

    if let Some(provided) = header_str(headers, GENERIC_HEADER) {
        return constant_time_eq(provided, secret).then_some(Provider::Generic);
    }

    None
}

#[cfg(test)]
fn validate(secret: &str, headers: &HeaderMap, body: &[u8]) -> bool {
    authenticate(secret, headers, body).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: &str, value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(
            axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
        h
    }

    #[test]
    fn empty_secret_rejects_even_with_valid_signature() {
        let body = b"payload";
        let sig = format!("sha256={}", hmac_hex("whatever", body));
        let headers = headers_with(GITHUB_HEADER, &sig);
        assert!(!validate("", &headers, body));
    }

    #[test]
    fn github_signature_accepts_matching_hmac() {
        let secret = "shhh";
        let body = b"payload";
        let sig = format!("sha256={}", hmac_hex(secret, body));
        let headers = headers_with(GITHUB_HEADER, &sig);
        assert!(validate(secret, &headers, body));
    }

    #[test]
    fn github_signature_rejects_missing_prefix() {
        let secret = "shhh";
        let body = b"payload";
        let sig = hmac_hex(secret, body);
        let headers = headers_with(GITHUB_HEADER, &sig);
        assert!(!validate(secret, &headers, body));
    }

    #[test]
    fn sentry_signature_is_bare_hmac() {
        let secret = "shhh";
        let body = b"payload";
        let sig = hmac_hex(secret, body);
        let headers = headers_with(SENTRY_HEADER, &sig);
        assert!(validate(secret, &headers, body));
    }

    #[test]
    fn generic_secret_is_direct_equality() {
        let headers = headers_with(GENERIC_HEADER, "matches");
        assert!(validate("matches", &headers, b"anything"));
        assert!(!validate("matches", &headers_with(GENERIC_HEADER, "nope"), b"anything"));
    }

    #[test]
    fn no_recognized_header_rejects() {
        let headers = HeaderMap::new();
        assert!(!validate("shhh", &headers, b"body"));
    }
}
