//! Operation dispatch: decoded operation + caller context in, typed result or
//! classified error out.
//!
//! Order for every call: rate-limit gate (login only), authentication,
//! fresh owner lookup for owner-scoped mutations (not-found short-circuits
//! here), guard, then the store or identity provider call.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{AppError, AppResult};
use crate::identity::{
    authorize, Credentials, Identity, IdentityProvider, LoginMessageResponse, RequestContext, RequiredCheck, User,
    UserInput,
};
use crate::rate_limit::{RateLimiter, WindowSpec};
use crate::storage::{BoundingBox, Cat, CatFilter, CatInput, CatPatch, CatStore, Coordinates, OwnerRef};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "operation", content = "arguments", rename_all = "camelCase")]
pub enum Operation {
    // cat queries
    Cats,
    CatById { id: String },
    CatsByArea {
        #[serde(rename = "topRight")]
        top_right: Coordinates,
        #[serde(rename = "bottomLeft")]
        bottom_left: Coordinates,
    },
    CatsByOwner {
        #[serde(rename = "ownerId", alias = "id")]
        owner_id: String,
    },
    // cat mutations
    CreateCat(CatInput),
    UpdateCat {
        id: String,
        #[serde(flatten)]
        patch: CatPatch,
    },
    DeleteCat { id: String },
    UpdateCatAsAdmin {
        id: String,
        #[serde(flatten)]
        patch: CatPatch,
    },
    DeleteCatAsAdmin { id: String },
    // user queries
    Users,
    UserById { id: String },
    CheckToken,
    // user mutations
    Login { credentials: Credentials },
    Register { user: UserInput },
    UpdateUser { user: UserInput },
    DeleteUser,
    DeleteUserAsAdmin { id: String },
}

impl Operation {
    /// Decode `arguments` for the operation called `name`. Null or `{}`
    /// arguments are accepted for operations that take none.
    pub fn parse(name: &str, arguments: Value) -> AppResult<Operation> {
        let mut envelope = serde_json::Map::new();
        envelope.insert("operation".into(), Value::String(name.to_string()));
        let empty = arguments.is_null() || arguments.as_object().is_some_and(|m| m.is_empty());
        if !empty {
            envelope.insert("arguments".into(), arguments);
        }
        serde_json::from_value(Value::Object(envelope))
            .map_err(|e| AppError::user("bad_request".to_string(), format!("{name}: {e}")))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Cats => "cats",
            Operation::CatById { .. } => "catById",
            Operation::CatsByArea { .. } => "catsByArea",
            Operation::CatsByOwner { .. } => "catsByOwner",
            Operation::CreateCat(_) => "createCat",
            Operation::UpdateCat { .. } => "updateCat",
            Operation::DeleteCat { .. } => "deleteCat",
            Operation::UpdateCatAsAdmin { .. } => "updateCatAsAdmin",
            Operation::DeleteCatAsAdmin { .. } => "deleteCatAsAdmin",
            Operation::Users => "users",
            Operation::UserById { .. } => "userById",
            Operation::CheckToken => "checkToken",
            Operation::Login { .. } => "login",
            Operation::Register { .. } => "register",
            Operation::UpdateUser { .. } => "updateUser",
            Operation::DeleteUser => "deleteUser",
            Operation::DeleteUserAsAdmin { .. } => "deleteUserAsAdmin",
        }
    }

    pub fn required_check(&self) -> RequiredCheck {
        match self {
            Operation::Cats
            | Operation::CatById { .. }
            | Operation::CatsByArea { .. }
            | Operation::CatsByOwner { .. }
            | Operation::Users
            | Operation::UserById { .. }
            | Operation::Login { .. }
            | Operation::Register { .. } => RequiredCheck::Public,
            Operation::CreateCat(_) | Operation::CheckToken | Operation::UpdateUser { .. } | Operation::DeleteUser => {
                RequiredCheck::Authenticated
            }
            Operation::UpdateCat { .. } | Operation::DeleteCat { .. } => RequiredCheck::OwnerOrAdmin,
            Operation::UpdateCatAsAdmin { .. } | Operation::DeleteCatAsAdmin { .. } | Operation::DeleteUserAsAdmin { .. } => {
                RequiredCheck::AdminOnly
            }
        }
    }

    /// Credential exchange is the only gated operation.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Operation::Login { .. })
    }

    /// Cat whose owner must be read before authorizing.
    fn owned_target(&self) -> Option<&str> {
        match self {
            Operation::UpdateCat { id, .. } | Operation::DeleteCat { id } => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum OperationOutput {
    Cat(Cat),
    Cats(Vec<Cat>),
    User(User),
    Users(Vec<User>),
    Message(LoginMessageResponse),
}

fn cat_not_found(id: &str) -> AppError {
    AppError::not_found("cat_not_found".to_string(), format!("Cat not found: {id}"))
}

fn bearer(identity: &Identity) -> AppResult<&str> {
    identity.token.as_deref().ok_or_else(|| AppError::not_authenticated("not_authenticated", "Not authenticated"))
}

fn caller_id(identity: &Identity) -> AppResult<&str> {
    identity.id.as_deref().ok_or_else(|| AppError::not_authenticated("no_subject", "Token carries no user id"))
}

pub struct Dispatcher {
    cats: Arc<dyn CatStore>,
    users: Arc<dyn IdentityProvider>,
    gate: Arc<RateLimiter>,
    login_window: WindowSpec,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(cats: Arc<dyn CatStore>, users: Arc<dyn IdentityProvider>, gate: Arc<RateLimiter>) -> Self {
        Self { cats, users, gate, login_window: WindowSpec::LOGIN, timeout: None }
    }

    pub fn with_login_window(mut self, spec: WindowSpec) -> Self {
        self.login_window = spec;
        self
    }

    /// Bound the whole operation; on expiry downstream futures are dropped and
    /// their results never applied.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn gate(&self) -> &Arc<RateLimiter> { &self.gate }

    pub async fn dispatch(&self, ctx: &RequestContext, op: Operation) -> AppResult<OperationOutput> {
        let name = op.name();
        let fut = AssertUnwindSafe(self.run(ctx, op)).catch_unwind();
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(r) => r,
                Err(_) => {
                    error!(op = name, request_id = %ctx.request_id, "operation timed out");
                    return Err(AppError::internal("timeout".to_string(), format!("{name} timed out")));
                }
            },
            None => fut.await,
        };
        match outcome {
            Ok(Ok(out)) => {
                debug!(op = name, request_id = %ctx.request_id, "operation ok");
                Ok(out)
            }
            Ok(Err(e)) => {
                match &e {
                    AppError::Internal { .. } => error!(op = name, request_id = %ctx.request_id, error = %e, "operation failed"),
                    AppError::NotAuthenticated { .. } | AppError::NotAuthorized { .. } => {
                        debug!(op = name, request_id = %ctx.request_id, reason = e.code_str(), "operation denied")
                    }
                    _ => debug!(op = name, request_id = %ctx.request_id, error = %e, "operation rejected"),
                }
                Err(e)
            }
            Err(panic_payload) => {
                let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() { *s }
                          else if let Some(s) = panic_payload.downcast_ref::<String>() { s.as_str() }
                          else { "panic" };
                error!(target: "panic", op = name, request_id = %ctx.request_id, "operation panic: {}", msg);
                Err(AppError::internal("internal_panic", "internal server error"))
            }
        }
    }

    async fn run(&self, ctx: &RequestContext, op: Operation) -> AppResult<OperationOutput> {
        let identity = &ctx.identity;
        if op.is_rate_limited() {
            self.gate.check(&ctx.rate_limit_key(), self.login_window)?;
        }
        let check = op.required_check();
        if check != RequiredCheck::Public && !identity.is_authenticated() {
            // Anonymous callers are turned away before any existence lookup.
            authorize(identity, check, None).into_result()?;
        }
        let owner = match op.owned_target() {
            Some(id) if check.needs_owner() => {
                let cat = self.cats.find_by_id(id).await?.ok_or_else(|| cat_not_found(id))?;
                Some(cat.owner.id)
            }
            _ => None,
        };
        authorize(identity, check, owner.as_deref()).into_result()?;
        self.execute(identity, op).await
    }

    async fn execute(&self, identity: &Identity, op: Operation) -> AppResult<OperationOutput> {
        let out = match op {
            Operation::Cats => OperationOutput::Cats(self.cats.find_all().await?),
            Operation::CatById { id } => {
                OperationOutput::Cat(self.cats.find_by_id(&id).await?.ok_or_else(|| cat_not_found(&id))?)
            }
            Operation::CatsByArea { top_right, bottom_left } => {
                let bbox = BoundingBox::new(top_right, bottom_left)?;
                OperationOutput::Cats(self.cats.find(&CatFilter::Within(bbox)).await?)
            }
            Operation::CatsByOwner { owner_id } => OperationOutput::Cats(self.cats.find(&CatFilter::Owner(owner_id)).await?),
            Operation::CreateCat(input) => {
                let owner = OwnerRef::new(caller_id(identity)?);
                if input.owner.as_deref().is_some_and(|o| o != owner.id) {
                    warn!(caller = %owner.id, "createCat owner argument ignored");
                }
                OperationOutput::Cat(self.cats.insert(input.into_cat(owner)).await?)
            }
            Operation::UpdateCat { id, patch } => {
                let updated = self.cats.update_by_id(&id, &patch.without_owner()).await?;
                OperationOutput::Cat(updated.ok_or_else(|| cat_not_found(&id))?)
            }
            Operation::UpdateCatAsAdmin { id, patch } => {
                let updated = self.cats.update_by_id(&id, &patch).await?;
                OperationOutput::Cat(updated.ok_or_else(|| cat_not_found(&id))?)
            }
            Operation::DeleteCat { id } | Operation::DeleteCatAsAdmin { id } => {
                OperationOutput::Cat(self.cats.delete_by_id(&id).await?.ok_or_else(|| cat_not_found(&id))?)
            }
            Operation::Users => OperationOutput::Users(self.users.list_users().await?),
            Operation::UserById { id } => OperationOutput::User(self.users.user_by_id(&id).await?),
            Operation::CheckToken => {
                let resp = self.users.check_token(caller_id(identity)?, bearer(identity)?).await?;
                OperationOutput::Message(resp)
            }
            Operation::Login { credentials } => OperationOutput::Message(self.users.login(&credentials).await?),
            Operation::Register { user } => OperationOutput::Message(self.users.register(&user).await?),
            Operation::UpdateUser { user } => OperationOutput::Message(self.users.update_user(bearer(identity)?, &user).await?),
            Operation::DeleteUser => OperationOutput::Message(self.users.delete_user(bearer(identity)?).await?),
            Operation::DeleteUserAsAdmin { id } => {
                OperationOutput::Message(self.users.delete_user_as_admin(bearer(identity)?, &id).await?)
            }
        };
        Ok(out)
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
