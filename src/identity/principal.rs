use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Caller identity resolved from the request credential.
///
/// Built once per inbound request and dropped with it. The anonymous identity
/// has every field unset; any identity carrying a token counts as
/// authenticated by presence.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

impl Identity {
    pub fn anonymous() -> Self { Self::default() }

    pub fn new<S: Into<String>>(id: S, role: Role, token: S) -> Self {
        Self { id: Some(id.into()), role: Some(role), token: Some(token.into()) }
    }

    pub fn is_authenticated(&self) -> bool { self.token.is_some() }

    pub fn is_admin(&self) -> bool { self.role == Some(Role::Admin) }

    /// True when this identity's id equals `owner_id`. An identity without
    /// an id never owns anything.
    pub fn owns(&self, owner_id: Option<&str>) -> bool {
        match (self.id.as_deref(), owner_id) {
            (Some(me), Some(owner)) => me == owner,
            _ => false,
        }
    }
}
