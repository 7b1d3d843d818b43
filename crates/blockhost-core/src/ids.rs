//! Server identity.
//!
//! A server is identified by its name alone. The name doubles as the directory
//! name under each base directory and as the suffix of the console session, so
//! it is validated once at the boundary and carried as a [`ServerName`] from
//! then on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix of every console session and engine environment marker.
pub const SESSION_PREFIX: &str = "mc-";

/// A validated server name.
///
/// Names match `[A-Za-z0-9_.]+` and must not start with `.`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerName(String);

impl ServerName {
    /// Parse and validate a server name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, starts with `.`, or contains a
    /// character outside `[A-Za-z0-9_.]`.
    pub fn parse(s: &str) -> Result<Self, NameError> {
        if s.is_empty() {
            return Err(NameError::Empty);
        }
        if s.starts_with('.') {
            return Err(NameError::LeadingDot);
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '.'))
        {
            return Err(NameError::InvalidChar(c));
        }
        Ok(Self(s.to_string()))
    }

    /// Check whether a string is a valid server name without allocating.
    #[must_use]
    pub fn is_valid(s: &str) -> bool {
        !s.is_empty()
            && !s.starts_with('.')
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    }

    /// Return the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the console session the engine runs in (`mc-<name>`).
    #[must_use]
    pub fn session_name(&self) -> String {
        format!("{SESSION_PREFIX}{}", self.0)
    }
}

impl fmt::Debug for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerName({})", self.0)
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ServerName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ServerName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ServerName> for String {
    fn from(name: ServerName) -> Self {
        name.0
    }
}

impl AsRef<str> for ServerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when parsing a server name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// The name was empty.
    #[error("name is empty")]
    Empty,

    /// The name started with a dot.
    #[error("name must not start with '.'")]
    LeadingDot,

    /// The name contained a character outside `[A-Za-z0-9_.]`.
    #[error("invalid character {0:?}")]
    InvalidChar(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_names() {
        for name in ["alpha", "Alpha_2", "pack.1.12", "a", "_x", "9lives"] {
            assert!(ServerName::parse(name).is_ok(), "{name} should be valid");
            assert!(ServerName::is_valid(name));
        }
    }

    #[test]
    fn rejects_invalid_names() {
        assert_eq!(ServerName::parse(""), Err(NameError::Empty));
        assert_eq!(ServerName::parse(".hidden"), Err(NameError::LeadingDot));
        assert_eq!(ServerName::parse("a b"), Err(NameError::InvalidChar(' ')));
        assert_eq!(ServerName::parse("a/b"), Err(NameError::InvalidChar('/')));
        assert_eq!(ServerName::parse("mc-x"), Err(NameError::InvalidChar('-')));
        assert!(!ServerName::is_valid("../etc"));
    }

    #[test]
    fn session_name_has_prefix() {
        let name = ServerName::parse("alpha").unwrap();
        assert_eq!(name.session_name(), "mc-alpha");
    }

    #[test]
    fn display_and_debug() {
        let name = ServerName::parse("alpha").unwrap();
        assert_eq!(name.to_string(), "alpha");
        assert_eq!(format!("{name:?}"), "ServerName(alpha)");
    }

    #[test]
    fn serde_roundtrip_validates() {
        let name = ServerName::parse("alpha").unwrap();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"alpha\"");

        let parsed: ServerName = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, name);

        let bad: Result<ServerName, _> = serde_json::from_str("\".bad\"");
        assert!(bad.is_err());
    }
}
