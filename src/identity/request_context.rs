use super::Identity;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub identity: Identity,
    /// Network identity of the caller (client address).
    pub origin: Option<String>,
    pub request_id: String,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self { identity: Identity::anonymous(), origin: None, request_id: uuid::Uuid::new_v4().to_string() }
    }
}

impl RequestContext {
    pub fn new(identity: Identity, origin: Option<String>) -> Self {
        Self { identity, origin, ..Default::default() }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Key used by the rate-limit gate. Callers with no known origin share one bucket.
    pub fn rate_limit_key(&self) -> String {
        match self.origin.as_deref() {
            Some(addr) if !addr.is_empty() => format!("origin:{addr}"),
            _ => "origin:unknown".to_string(),
        }
    }
}
