use serde::Serialize;

use super::Identity;
use crate::error::AppError;

/// Permission an operation demands of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequiredCheck {
    /// No identity needed (queries, login, register).
    Public,
    /// Any caller presenting a token.
    Authenticated,
    /// Only the resource owner.
    OwnerOnly,
    /// The resource owner or an admin.
    OwnerOrAdmin,
    /// Admins only, ownership irrelevant.
    AdminOnly,
}

impl RequiredCheck {
    pub fn needs_owner(self) -> bool {
        matches!(self, RequiredCheck::OwnerOnly | RequiredCheck::OwnerOrAdmin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    None,
    NotAuthenticated,
    NotOwner,
    NotAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub reason: DenyReason,
}

impl AuthorizationDecision {
    pub const ALLOW: AuthorizationDecision = AuthorizationDecision { allowed: true, reason: DenyReason::None };

    fn deny(reason: DenyReason) -> Self { Self { allowed: false, reason } }

    pub fn into_result(self) -> Result<(), AppError> {
        match self.reason {
            _ if self.allowed => Ok(()),
            DenyReason::NotAuthenticated => Err(AppError::not_authenticated("not_authenticated", "Not authenticated")),
            DenyReason::NotOwner => Err(AppError::not_authorized("not_owner", "Not authorized: caller does not own this resource")),
            DenyReason::NotAdmin => Err(AppError::not_authorized("not_admin", "Not authorized: admin role required")),
            DenyReason::None => Err(AppError::not_authorized("not_authorized", "Not authorized")),
        }
    }
}

/// Evaluate the decision table for one operation; first matching rule wins.
///
/// `resource_owner_id` must be the owner as read at authorization time.
pub fn authorize(identity: &Identity, required: RequiredCheck, resource_owner_id: Option<&str>) -> AuthorizationDecision {
    if required == RequiredCheck::Public {
        return AuthorizationDecision::ALLOW;
    }
    if !identity.is_authenticated() {
        return AuthorizationDecision::deny(DenyReason::NotAuthenticated);
    }
    match required {
        RequiredCheck::AdminOnly if !identity.is_admin() => AuthorizationDecision::deny(DenyReason::NotAdmin),
        RequiredCheck::OwnerOrAdmin if !identity.owns(resource_owner_id) && !identity.is_admin() => {
            AuthorizationDecision::deny(DenyReason::NotOwner)
        }
        RequiredCheck::OwnerOnly if !identity.owns(resource_owner_id) => AuthorizationDecision::deny(DenyReason::NotOwner),
        _ => AuthorizationDecision::ALLOW,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;

    fn user(id: &str) -> Identity { Identity::new(id, Role::User, "t") }
    fn admin(id: &str) -> Identity { Identity::new(id, Role::Admin, "t") }

    const CHECKS: [RequiredCheck; 4] = [
        RequiredCheck::Authenticated,
        RequiredCheck::OwnerOnly,
        RequiredCheck::OwnerOrAdmin,
        RequiredCheck::AdminOnly,
    ];

    #[test]
    fn public_allows_anyone() {
        assert!(authorize(&Identity::anonymous(), RequiredCheck::Public, None).allowed);
    }

    #[test]
    fn missing_token_denies_before_role_or_ownership() {
        // Claims without a token still count as anonymous.
        let tokenless_admin = Identity { id: Some("u1".into()), role: Some(Role::Admin), token: None };
        for check in CHECKS {
            for who in [Identity::anonymous(), tokenless_admin.clone()] {
                let d = authorize(&who, check, Some("u1"));
                assert_eq!(d.reason, DenyReason::NotAuthenticated, "{check:?}");
                assert!(!d.allowed);
            }
        }
    }

    #[test]
    fn authenticated_only_needs_a_token() {
        let opaque = Identity { id: None, role: None, token: Some("t".into()) };
        assert_eq!(authorize(&opaque, RequiredCheck::Authenticated, None), AuthorizationDecision::ALLOW);
    }

    #[test]
    fn admin_only_ignores_ownership() {
        assert_eq!(authorize(&user("u1"), RequiredCheck::AdminOnly, Some("u1")).reason, DenyReason::NotAdmin);
        assert!(authorize(&admin("a1"), RequiredCheck::AdminOnly, Some("u1")).allowed);
    }

    #[test]
    fn owner_or_admin() {
        assert!(authorize(&user("u1"), RequiredCheck::OwnerOrAdmin, Some("u1")).allowed);
        assert_eq!(authorize(&user("u2"), RequiredCheck::OwnerOrAdmin, Some("u1")).reason, DenyReason::NotOwner);
        assert!(authorize(&admin("a1"), RequiredCheck::OwnerOrAdmin, Some("u1")).allowed);
    }

    #[test]
    fn owner_only_does_not_honour_admin() {
        assert!(authorize(&user("u1"), RequiredCheck::OwnerOnly, Some("u1")).allowed);
        assert_eq!(authorize(&admin("a1"), RequiredCheck::OwnerOnly, Some("u1")).reason, DenyReason::NotOwner);
    }

    #[test]
    fn non_owner_non_admin_is_never_allowed_owner_scoped_ops() {
        let ids = ["u1", "u2", "u3"];
        for me in ids {
            for owner in ids.iter().filter(|o| **o != me) {
                for check in [RequiredCheck::OwnerOnly, RequiredCheck::OwnerOrAdmin] {
                    let err = authorize(&user(me), check, Some(owner)).into_result().unwrap_err();
                    assert_eq!(err.graphql_code(), "NOT_AUTHORIZED");
                }
            }
        }
    }

    #[test]
    fn decisions_map_to_error_classes() {
        let e = authorize(&Identity::anonymous(), RequiredCheck::Authenticated, None).into_result().unwrap_err();
        assert_eq!(e.graphql_code(), "NOT_AUTHENTICATED");
        let e = authorize(&user("u1"), RequiredCheck::AdminOnly, None).into_result().unwrap_err();
        assert_eq!(e.code_str(), "not_admin");
        assert!(AuthorizationDecision::ALLOW.into_result().is_ok());
    }
}
