//! Common type definitions shared across crates.

use std::fmt;

/// Identifier of an application registered in the credential registry.
///
/// Never empty and never padded with whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId(String);

impl AppId {
    /// Create a new application id.
    ///
    /// # Errors
    /// Returns an error if the id is empty, has surrounding whitespace, or
    /// contains control characters.
    pub fn new(id: impl Into<String>) -> crate::SignGateResult<Self> {
        let id = id.into();
        if id.is_empty() || id.trim() != id || id.chars().any(char::is_control) {
            return Err(crate::SignGateError::InvalidAppId(id));
        }
        Ok(Self(id))
    }

    /// Get the application id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AppId {
    type Error = crate::SignGateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AppId> for String {
    fn from(value: AppId) -> Self {
        value.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
