//! Remote identity provider: the service of record for user accounts and
//! credential checks. The dispatcher only sees the [`IdentityProvider`] trait;
//! [`HttpIdentityProvider`] is the REST adapter used in deployments.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Registration / profile update payload forwarded as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginMessageResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub user: User,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityProviderError {
    /// Upstream answered with a non-success status; `message` is its status text.
    #[error("identity provider returned {code}: {message}")]
    Status { code: u16, message: String },
    /// The request never produced a usable answer (connect, timeout, body).
    #[error("identity provider unreachable: {0}")]
    Transport(String),
}

impl From<IdentityProviderError> for AppError {
    fn from(e: IdentityProviderError) -> Self {
        match e {
            IdentityProviderError::Status { code, message } => {
                AppError::not_found(format!("upstream_{code}"), message)
            }
            IdentityProviderError::Transport(msg) => AppError::internal("upstream_unavailable".to_string(), msg),
        }
    }
}

pub type ProviderResult<T> = Result<T, IdentityProviderError>;

/// Capabilities the core needs from the identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn list_users(&self) -> ProviderResult<Vec<User>>;
    async fn user_by_id(&self, id: &str) -> ProviderResult<User>;
    /// Confirm that `token` is a live credential for user `id`.
    async fn check_token(&self, id: &str, token: &str) -> ProviderResult<LoginMessageResponse>;
    async fn login(&self, credentials: &Credentials) -> ProviderResult<LoginMessageResponse>;
    async fn register(&self, user: &UserInput) -> ProviderResult<LoginMessageResponse>;
    /// Update the account the token belongs to.
    async fn update_user(&self, token: &str, user: &UserInput) -> ProviderResult<LoginMessageResponse>;
    /// Delete the account the token belongs to.
    async fn delete_user(&self, token: &str) -> ProviderResult<LoginMessageResponse>;
    async fn delete_user_as_admin(&self, token: &str, id: &str) -> ProviderResult<LoginMessageResponse>;
}

pub struct HttpIdentityProvider {
    /// Base URL without trailing slash.
    base_url: String,
    client: Client,
}

impl HttpIdentityProvider {
    pub fn new(base_url: &str, connect_timeout: Duration, request_timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| IdentityProviderError::Transport(e.to_string()))?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client })
    }

    pub fn base_url(&self) -> &str { &self.base_url }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut rb = self.client.request(method, url);
        if let Some(t) = token { rb = rb.bearer_auth(t); }
        rb
    }

    async fn send<T: DeserializeOwned>(&self, op: &'static str, rb: RequestBuilder) -> ProviderResult<T> {
        let resp = rb.send().await.map_err(|e| {
            warn!(op, error = %e, "identity provider request failed");
            IdentityProviderError::Transport(e.to_string())
        })?;
        let resp = check_status(op, resp)?;
        resp.json::<T>().await.map_err(|e| IdentityProviderError::Transport(format!("invalid response body: {e}")))
    }
}

fn check_status(op: &'static str, resp: Response) -> ProviderResult<Response> {
    let status = resp.status();
    if status.is_success() {
        debug!(op, status = status.as_u16(), "identity provider ok");
        return Ok(resp);
    }
    let message = status.canonical_reason().unwrap_or("Unknown Status").to_string();
    warn!(op, status = status.as_u16(), %message, "identity provider rejected request");
    Err(IdentityProviderError::Status { code: status.as_u16(), message })
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn list_users(&self) -> ProviderResult<Vec<User>> {
        self.send("users", self.request(Method::GET, "/users", None)).await
    }

    async fn user_by_id(&self, id: &str) -> ProviderResult<User> {
        let path = format!("/users/{}", urlencoding::encode(id));
        self.send("user_by_id", self.request(Method::GET, &path, None)).await
    }

    async fn check_token(&self, id: &str, token: &str) -> ProviderResult<LoginMessageResponse> {
        let path = format!("/users/{}/check", urlencoding::encode(id));
        self.send("check_token", self.request(Method::GET, &path, Some(token))).await
    }

    async fn login(&self, credentials: &Credentials) -> ProviderResult<LoginMessageResponse> {
        self.send("login", self.request(Method::POST, "/auth/login", None).json(credentials)).await
    }

    async fn register(&self, user: &UserInput) -> ProviderResult<LoginMessageResponse> {
        self.send("register", self.request(Method::POST, "/users", None).json(user)).await
    }

    async fn update_user(&self, token: &str, user: &UserInput) -> ProviderResult<LoginMessageResponse> {
        self.send("update_user", self.request(Method::PUT, "/users", Some(token)).json(user)).await
    }

    async fn delete_user(&self, token: &str) -> ProviderResult<LoginMessageResponse> {
        self.send("delete_user", self.request(Method::DELETE, "/users", Some(token))).await
    }

    async fn delete_user_as_admin(&self, token: &str, id: &str) -> ProviderResult<LoginMessageResponse> {
        let path = format!("/users/{}", urlencoding::encode(id));
        self.send("delete_user_as_admin", self.request(Method::DELETE, &path, Some(token))).await
    }
}
