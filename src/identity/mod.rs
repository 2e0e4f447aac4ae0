//! Caller identity: credential resolution, the remote identity provider and
//! the per-operation authorization guard.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod token;
mod resolver;
mod provider;
mod request_context;
mod authorizer;

pub use principal::{Identity, Role};
pub use token::{TokenClaims, TokenError, decode_claims, verify_hs256, sign_hs256};
pub use resolver::{IdentityResolver, extract_bearer};
pub use provider::{
    Credentials, HttpIdentityProvider, IdentityProvider, IdentityProviderError, LoginMessageResponse,
    ProviderResult, User, UserInput,
};
pub use request_context::RequestContext;
pub use authorizer::{AuthorizationDecision, DenyReason, RequiredCheck, authorize};
