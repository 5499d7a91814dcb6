use std::fmt;

use thiserror::Error;

/// A credential that does not have the shape the Glowmarkt API expects.
///
/// These are detected before any request is sent. Messages never include secret values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CredentialFormatError {
    #[error("token must be a valid JSON Web Token (JWT)")]
    InvalidToken,
    #[error("application id `{0}` must be a hexadecimal string")]
    InvalidApplicationId(String),
    #[error("username must be a non-empty string")]
    EmptyUsername,
    #[error("password must be a non-empty string")]
    EmptyPassword,
    #[error("no credentials provided and no stored token to reauthorise")]
    MissingCredentials,
}

#[derive(Clone, PartialEq)]
pub struct Password(String);

impl Password {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: AsRef<str>> From<S> for Password {
    fn from(password: S) -> Self {
        Password(password.as_ref().to_string())
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password: redacted")
    }
}

/// Username and password of a Glowmarkt account, both guaranteed non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    username: String,
    password: Password,
}

impl Credentials {
    pub fn new(username: String, password: Password) -> Result<Self, CredentialFormatError> {
        if username.is_empty() {
            return Err(CredentialFormatError::EmptyUsername);
        }
        if password.0.is_empty() {
            return Err(CredentialFormatError::EmptyPassword);
        }
        Ok(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &Password {
        &self.password
    }
}
