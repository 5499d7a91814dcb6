use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialFormatError;

/// Application identifier used when the caller does not provide one.
pub const DEFAULT_APPLICATION_ID: &str = "b0f1b774-a586-4f72-9edd-27ead8aa7a8d";

// Three dot-separated alphanumeric segments, the shape of a signed token.
static TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z0-9]+\.){2}([a-zA-Z0-9]+)$").unwrap());

static APPLICATION_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9-]+$").unwrap());

/// Bearer credential issued by the Glowmarkt API.
///
/// A `Token` can only be built from a string with the shape of a signed token, so holding one
/// means the value is well-formed. Whether the service still accepts it is a different matter,
/// see [crate::authenticator::Authenticator::authorise].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Token {
    type Error = CredentialFormatError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if !TOKEN_REGEX.is_match(value) {
            return Err(CredentialFormatError::InvalidToken);
        }
        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for Token {
    type Error = CredentialFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token: redacted")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies the calling application to the Glowmarkt API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self(DEFAULT_APPLICATION_ID.to_string())
    }
}

impl TryFrom<&str> for ApplicationId {
    type Error = CredentialFormatError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if !APPLICATION_ID_REGEX.is_match(value) {
            return Err(CredentialFormatError::InvalidApplicationId(
                value.to_string(),
            ));
        }
        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for ApplicationId {
    type Error = CredentialFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<ApplicationId> for String {
    fn from(id: ApplicationId) -> Self {
        id.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
