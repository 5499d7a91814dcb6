use std::io;

use thiserror::Error;

use crate::credentials::Password;

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("reading password: `{0}`")]
    Io(#[from] io::Error),
}

/// Source of the password used to log in as `username`.
pub trait PasswordPrompt {
    fn prompt_password(&self, username: &str) -> Result<Password, PromptError>;
}

impl<F> PasswordPrompt for F
where
    F: Fn(&str) -> Result<Password, PromptError>,
{
    fn prompt_password(&self, username: &str) -> Result<Password, PromptError> {
        self(username)
    }
}

/// Reads the password from the terminal without echoing it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn prompt_password(&self, username: &str) -> Result<Password, PromptError> {
        let password = rpassword::prompt_password(format!("Password for {username}: "))?;
        Ok(Password::from(password))
    }
}
