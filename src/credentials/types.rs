//! Credential types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Profile of the user a credential was issued to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// Server-side user identifier
    #[serde(default, alias = "_id")]
    pub id: String,
    /// Display or login name
    #[serde(default, alias = "name")]
    pub username: String,
    /// Email address, if the server returned one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Bearer credential together with the user it was issued to
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Opaque bearer token
    pub token: String,
    /// User the token belongs to
    pub issued_user: UserRef,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("issued_user", &self.issued_user)
            .finish()
    }
}
