use tracing::debug;

use super::principal::{Identity, Role};
use super::token::{decode_claims, verify_hs256};

/// Extract the token from an `Authorization: Bearer <token>` header value.
/// The scheme is matched case-insensitively; an empty token counts as absent.
pub fn extract_bearer(raw: Option<&str>) -> Option<&str> {
    let header = raw?.trim();
    let (scheme, rest) = header.split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") { return None; }
    let token = rest.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Turns the inbound credential header into an [`Identity`]. Never fails:
/// anything unusable resolves to the anonymous identity.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    secret: Option<String>,
}

impl IdentityResolver {
    /// `secret` enables HS256 verification; without it claims are trusted on presence.
    pub fn new(secret: Option<String>) -> Self {
        Self { secret: secret.filter(|s| !s.is_empty()) }
    }

    pub fn verifies_signatures(&self) -> bool { self.secret.is_some() }

    pub fn resolve(&self, raw_authorization: Option<&str>) -> Identity {
        self.resolve_at(raw_authorization, chrono::Utc::now().timestamp())
    }

    pub fn resolve_at(&self, raw_authorization: Option<&str>, now: i64) -> Identity {
        let Some(token) = extract_bearer(raw_authorization) else { return Identity::anonymous(); };

        let claims = match &self.secret {
            Some(secret) => match verify_hs256(token, secret, now) {
                Ok(c) => Some(c),
                Err(e) => {
                    debug!(error = %e, "bearer token rejected; treating caller as anonymous");
                    return Identity::anonymous();
                }
            },
            None => decode_claims(token).ok(),
        };

        let (id, role) = match claims {
            Some(c) => (c.subject(), c.role.as_deref().and_then(Role::parse)),
            None => (None, None),
        };
        Identity { id, role, token: Some(token.to_string()) }
    }
}
