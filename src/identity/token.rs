//! Bearer token payload handling.
//!
//! Tokens are JWTs issued by the identity provider. The payload is always
//! readable without the signing key; HS256 verification is only possible when
//! the deployment shares the provider's secret.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is not a three-part JWT")]
    Malformed,
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("token signature does not verify")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    sub: Option<serde_json::Value>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl TokenClaims {
    /// Caller id: `id` claim, falling back to `sub`. Numeric ids are stringified.
    pub fn subject(&self) -> Option<String> {
        let v = self.id.as_ref().or(self.sub.as_ref())?;
        match v {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JwtHeader {
    #[serde(default)]
    alg: String,
}

fn split(token: &str) -> Result<(&str, &str, &str), TokenError> {
    let mut parts = token.split('.');
    let (Some(h), Some(p), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
        return Err(TokenError::Malformed);
    };
    Ok((h, p, s))
}

fn decode_segment<T: for<'de> Deserialize<'de>>(seg: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(seg.trim_end_matches('='))
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

/// Read the payload without checking the signature.
pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenError> {
    let (_, payload, _) = split(token)?;
    decode_segment(payload)
}

/// Verify an HS256 signature and expiry (`now` in unix seconds), then return the claims.
pub fn verify_hs256(token: &str, secret: &str, now: i64) -> Result<TokenClaims, TokenError> {
    let (header, payload, signature) = split(token)?;
    let hdr: JwtHeader = decode_segment(header)?;
    if !hdr.alg.eq_ignore_ascii_case("HS256") {
        return Err(TokenError::UnsupportedAlg(hdr.alg));
    }
    let sig = URL_SAFE_NO_PAD
        .decode(signature.trim_end_matches('='))
        .map_err(|_| TokenError::Malformed)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::BadSignature)?;
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    mac.verify_slice(&sig).map_err(|_| TokenError::BadSignature)?;

    let claims: TokenClaims = decode_segment(payload)?;
    if let Some(exp) = claims.exp {
        if exp <= now { return Err(TokenError::Expired); }
    }
    Ok(claims)
}

/// Mint an HS256 token over `claims`. Used by tooling and tests that stand in
/// for the identity provider.
pub fn sign_hs256(claims: &serde_json::Value, secret: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    let signing_input = format!("{header}.{payload}");
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return format!("{signing_input}."),
    };
    mac.update(signing_input.as_bytes());
    let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    format!("{signing_input}.{sig}")
}
