use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Maximum length of a session identifier
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Identifier of a logical agent session.
///
/// The id may end up on a shell command line or in a terminal label, so it is
/// restricted to `[a-zA-Z0-9_-]` and 1-128 characters. The only way to obtain
/// a `SessionId` is through [`SessionId::parse`], which means every API that
/// takes one can rely on it being safe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Validate and wrap a raw identifier
    pub fn parse(raw: impl Into<String>) -> Result<Self, SessionError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(SessionError::Validation {
                id: raw,
                reason: "must not be empty".to_string(),
            });
        }
        if raw.len() > MAX_SESSION_ID_LEN {
            return Err(SessionError::Validation {
                reason: format!("longer than {} characters", MAX_SESSION_ID_LEN),
                id: raw,
            });
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(SessionError::Validation {
                reason: format!("contains disallowed character {:?}", bad),
                id: raw,
            });
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl std::str::FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}
