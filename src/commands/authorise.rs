use http::Uri;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::authenticator::{AuthoriseError, AuthoriseParams, Authenticator};
use crate::commands::prompt::{PasswordPrompt, PromptError};
use crate::http_client::HttpClient;
use crate::session::Session;
use crate::session::store::SessionStore;
use crate::token::ApplicationId;

/// Passwords asked for before giving up on a username.
pub const MAX_PASSWORD_ATTEMPTS: u8 = 3;

#[derive(Error, Debug)]
pub enum AuthoriseCommandError {
    #[error("authorising: `{0}`")]
    Authorise(#[from] AuthoriseError),
    #[error("{0}")]
    Prompt(#[from] PromptError),
    #[error("password not accepted after `{0}` attempts")]
    AttemptsExhausted(u8),
}

/// What the user asked to authorise with.
#[derive(Debug, Default, Clone)]
pub struct AuthoriseInput {
    pub username: Option<String>,
    pub token: Option<String>,
    pub application_id: Option<String>,
}

/// Restores the stored session, authorises with the user input and stores the result.
pub struct AuthoriseCommand<C, P>
where
    C: HttpClient,
    P: PasswordPrompt,
{
    http_client: C,
    auth_endpoint: Uri,
    store: Option<SessionStore>,
    prompt: P,
    max_attempts: u8,
}

impl<C, P> AuthoriseCommand<C, P>
where
    C: HttpClient,
    P: PasswordPrompt,
{
    pub fn new(http_client: C, auth_endpoint: Uri, prompt: P) -> Self {
        Self {
            http_client,
            auth_endpoint,
            store: None,
            prompt,
            max_attempts: MAX_PASSWORD_ATTEMPTS,
        }
    }

    pub fn with_session_store(self, store: SessionStore) -> Self {
        Self {
            store: Some(store),
            ..self
        }
    }

    pub fn with_max_attempts(self, max_attempts: u8) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }

    pub fn run(self, input: AuthoriseInput) -> Result<Session, AuthoriseCommandError> {
        let Self {
            http_client,
            auth_endpoint,
            store,
            prompt,
            max_attempts,
        } = self;

        if let Some(application_id) = input.application_id.as_deref() {
            ApplicationId::try_from(application_id).map_err(AuthoriseError::from)?;
        }

        let mut authenticator = Authenticator::new(http_client, auth_endpoint);

        if let Some(store) = &store {
            authenticator = restore_session(authenticator, store, &input.application_id)?;
        }

        if let Some(token) = &input.token {
            info!("token provided: checking validity");
            authenticator.authorise(
                AuthoriseParams::new()
                    .with_token(token)
                    .with_optional_application_id(input.application_id.clone()),
            )?;
            info!("token validated");
        }

        if let Some(username) = &input.username {
            if authenticator.is_authenticated() {
                info!("reauthorising with username and password instead of the current token");
            }
            login_with_prompt(
                &mut authenticator,
                &prompt,
                username,
                &input.application_id,
                max_attempts,
            )?;
        }

        if let Some(store) = &store {
            persist_session(&authenticator, store);
        }

        Ok(authenticator.into_session())
    }
}

/// Loads the stored session and checks it is still accepted. A session that cannot be loaded or
/// is rejected by the service is dropped, any other failure aborts.
fn restore_session<C: HttpClient>(
    authenticator: Authenticator<C>,
    store: &SessionStore,
    application_id: &Option<String>,
) -> Result<Authenticator<C>, AuthoriseError> {
    let session = match store.load() {
        Ok(Some(record)) => Session::from(record),
        Ok(None) => return Ok(authenticator),
        Err(e) => {
            warn!("session file ({}) error: {e}", store.path().display());
            return Ok(authenticator);
        }
    };

    if session.token().is_none() {
        return Ok(authenticator.with_session(session));
    }
    if session.is_expired() {
        info!("stored token expired, the service will likely reject it");
    }

    let restored_application_id = session.application_id().clone();
    let mut authenticator = authenticator.with_session(session);

    match authenticator
        .authorise(AuthoriseParams::new().with_optional_application_id(application_id.clone()))
    {
        Ok(()) => {
            info!("session restored from {}", store.path().display());
            Ok(authenticator)
        }
        Err(e @ AuthoriseError::AuthenticationRejected(..)) => {
            warn!("stored session not accepted: {e}");
            if let Err(e) = store.clear() {
                warn!("{e}");
            }
            Ok(authenticator.with_session(Session::new(None, restored_application_id, None)))
        }
        Err(e) => Err(e),
    }
}

fn login_with_prompt<C: HttpClient, P: PasswordPrompt>(
    authenticator: &mut Authenticator<C>,
    prompt: &P,
    username: &str,
    application_id: &Option<String>,
    max_attempts: u8,
) -> Result<(), AuthoriseCommandError> {
    info!("username {username} provided: getting password");

    for attempt in 1..=max_attempts {
        let password = prompt.prompt_password(username)?;
        let params = AuthoriseParams::new()
            .with_username(username)
            .with_password(password)
            .with_optional_application_id(application_id.clone());

        match authenticator.authorise(params) {
            Ok(()) => {
                info!("user {username} authorised");
                return Ok(());
            }
            Err(AuthoriseError::AuthenticationRejected(..)) => {
                error!("password not accepted ({attempt}/{max_attempts})");
            }
            Err(e @ AuthoriseError::InvalidCredentialFormat(_)) => {
                error!("{e} ({attempt}/{max_attempts})");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AuthoriseCommandError::AttemptsExhausted(max_attempts))
}

fn persist_session<C>(authenticator: &Authenticator<C>, store: &SessionStore) {
    if authenticator.is_authenticated() {
        if let Err(e) = store.save(&authenticator.session().to_record()) {
            warn!("couldn't save session: {e}");
        }
        return;
    }

    if let Err(e) = store.remove_if_empty() {
        warn!("error deleting empty session file: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::fs;

    use assert_matches::assert_matches;
    use http::{Method, Request, Response};
    use mockall::Sequence;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::authenticator::tests::{TOKEN, test_endpoint};
    use crate::commands::prompt::tests::MockPasswordPrompt;
    use crate::credentials::{CredentialFormatError, Password};
    use crate::http_client::HttpClientError;
    use crate::http_client::tests::{MockHttpClient, response};
    use crate::session::SessionRecord;
    use crate::token::Token;

    const NEW_TOKEN: &str = "ddd.eee.fff";

    fn login_succeeds()
    -> impl Fn(Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError> + Send + 'static
    {
        |req: Request<Vec<u8>>| {
            assert_eq!(req.method(), Method::POST);
            Ok(response(200, &json!({"token": NEW_TOKEN}).to_string()))
        }
    }

    fn stored_session(dir: &TempDir) -> SessionStore {
        let store = SessionStore::new(dir.path().join("glowmarkt.conf"));
        let session = Session::new(
            Some(Token::try_from(TOKEN).unwrap()),
            ApplicationId::default(),
            None,
        );
        store.save(&session.to_record()).unwrap();
        store
    }

    fn stored_token(store: &SessionStore) -> Option<String> {
        store
            .load()
            .unwrap()
            .and_then(|record: SessionRecord| record.token)
            .map(|token| token.to_string())
    }

    fn prompt_returning(passwords: &'static [&'static str]) -> MockPasswordPrompt {
        let calls = Cell::new(0);
        let mut prompt = MockPasswordPrompt::new();
        prompt
            .expect_prompt_password()
            .times(passwords.len())
            .returning(move |_| {
                let password = passwords[calls.get()];
                calls.set(calls.get() + 1);
                Ok(Password::from(password))
            });
        prompt
    }

    fn user_input() -> AuthoriseInput {
        AuthoriseInput {
            username: Some("alice".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn login_retries_after_rejection_and_saves_session() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("glowmarkt.conf"));

        let mut sequence = Sequence::new();
        let mut client = MockHttpClient::new();
        client
            .expect_send()
            .once()
            .in_sequence(&mut sequence)
            .returning(|_| Ok(response(401, "bad password")));
        client
            .expect_send()
            .once()
            .in_sequence(&mut sequence)
            .withf(|req| {
                let body: serde_json::Value = serde_json::from_slice(req.body()).unwrap();
                body == json!({"username": "alice", "password": "right"})
            })
            .returning(|_| Ok(response(200, &json!({"token": NEW_TOKEN}).to_string())));

        let prompt = prompt_returning(&["wrong", "right"]);
        let session = AuthoriseCommand::new(client, test_endpoint(), prompt)
            .with_session_store(store.clone())
            .run(user_input())
            .unwrap();

        assert_eq!(session.token().unwrap().as_str(), NEW_TOKEN);
        assert_eq!(stored_token(&store).as_deref(), Some(NEW_TOKEN));
    }

    #[test]
    fn empty_password_counts_as_an_attempt() {
        let prompt = prompt_returning(&["", "right"]);
        let session = AuthoriseCommand::new(login_succeeds(), test_endpoint(), prompt)
            .run(user_input())
            .unwrap();

        assert_eq!(session.token().unwrap().as_str(), NEW_TOKEN);
    }

    #[test]
    fn login_gives_up_after_max_attempts() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("glowmarkt.conf"));

        let mut client = MockHttpClient::new();
        client
            .expect_send()
            .times(MAX_PASSWORD_ATTEMPTS as usize)
            .returning(|_| Ok(response(401, "bad password")));

        let prompt = prompt_returning(&["a", "b", "c"]);
        let err = AuthoriseCommand::new(client, test_endpoint(), prompt)
            .with_session_store(store.clone())
            .run(user_input())
            .unwrap_err();

        assert_matches!(
            err,
            AuthoriseCommandError::AttemptsExhausted(MAX_PASSWORD_ATTEMPTS)
        );
        assert!(!store.path().exists());
    }

    #[test]
    fn max_attempts_can_be_lowered() {
        let mut client = MockHttpClient::new();
        client
            .expect_send()
            .once()
            .returning(|_| Ok(response(401, "bad password")));

        let err = AuthoriseCommand::new(client, test_endpoint(), prompt_returning(&["a"]))
            .with_max_attempts(1)
            .run(user_input())
            .unwrap_err();

        assert_matches!(err, AuthoriseCommandError::AttemptsExhausted(1));
    }

    #[test]
    fn service_failure_aborts_login() {
        let mut client = MockHttpClient::new();
        client
            .expect_send()
            .once()
            .returning(|_| Ok(response(503, "down")));

        let err = AuthoriseCommand::new(client, test_endpoint(), prompt_returning(&["secret"]))
            .run(user_input())
            .unwrap_err();

        assert_matches!(
            err,
            AuthoriseCommandError::Authorise(AuthoriseError::ServiceUnavailable {
                status: Some(503),
                ..
            })
        );
    }

    #[test]
    fn prompt_failure_aborts_login() {
        let mut prompt = MockPasswordPrompt::new();
        prompt
            .expect_prompt_password()
            .once()
            .returning(|_| Err(PromptError::Io(std::io::Error::other("no tty"))));

        let mut client = MockHttpClient::new();
        client.expect_send().never();

        let err = AuthoriseCommand::new(client, test_endpoint(), prompt)
            .run(user_input())
            .unwrap_err();

        assert_matches!(err, AuthoriseCommandError::Prompt(_));
    }

    #[test]
    fn stored_session_is_reauthorised_silently() {
        let dir = TempDir::new().unwrap();
        let store = stored_session(&dir);

        let mut client = MockHttpClient::new();
        client
            .expect_send()
            .once()
            .withf(|req| {
                req.method() == Method::GET && req.headers().get("token").unwrap() == TOKEN
            })
            .returning(|_| Ok(response(200, "")));
        let mut prompt = MockPasswordPrompt::new();
        prompt.expect_prompt_password().never();

        let session = AuthoriseCommand::new(client, test_endpoint(), prompt)
            .with_session_store(store.clone())
            .run(AuthoriseInput::default())
            .unwrap();

        assert_eq!(session.token().unwrap().as_str(), TOKEN);
        assert_eq!(stored_token(&store).as_deref(), Some(TOKEN));
    }

    #[test]
    fn rejected_stored_session_is_dropped() {
        let dir = TempDir::new().unwrap();
        let store = stored_session(&dir);

        let mut client = MockHttpClient::new();
        client
            .expect_send()
            .once()
            .returning(|_| Ok(response(401, "expired")));

        let session = AuthoriseCommand::new(client, test_endpoint(), MockPasswordPrompt::new())
            .with_session_store(store.clone())
            .run(AuthoriseInput::default())
            .unwrap();

        assert!(session.token().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn rejected_stored_session_falls_back_to_login() {
        let dir = TempDir::new().unwrap();
        let store = stored_session(&dir);

        let mut sequence = Sequence::new();
        let mut client = MockHttpClient::new();
        client
            .expect_send()
            .once()
            .in_sequence(&mut sequence)
            .returning(|_| Ok(response(401, "expired")));
        client
            .expect_send()
            .once()
            .in_sequence(&mut sequence)
            .returning(login_succeeds());

        let prompt = prompt_returning(&["secret"]);
        let session = AuthoriseCommand::new(client, test_endpoint(), prompt)
            .with_session_store(store.clone())
            .run(user_input())
            .unwrap();

        assert_eq!(session.token().unwrap().as_str(), NEW_TOKEN);
        assert_eq!(stored_token(&store).as_deref(), Some(NEW_TOKEN));
    }

    #[test]
    fn service_failure_on_restore_aborts() {
        let dir = TempDir::new().unwrap();
        let store = stored_session(&dir);

        let mut client = MockHttpClient::new();
        client
            .expect_send()
            .once()
            .returning(|_| Ok(response(500, "boom")));

        let err = AuthoriseCommand::new(client, test_endpoint(), MockPasswordPrompt::new())
            .with_session_store(store.clone())
            .run(AuthoriseInput::default())
            .unwrap_err();

        assert_matches!(
            err,
            AuthoriseCommandError::Authorise(AuthoriseError::ServiceUnavailable { .. })
        );
        assert_eq!(stored_token(&store).as_deref(), Some(TOKEN));
    }

    #[test]
    fn token_input_is_checked() {
        let mut client = MockHttpClient::new();
        client
            .expect_send()
            .once()
            .withf(|req| {
                req.method() == Method::GET
                    && req.headers().get("token").unwrap() == NEW_TOKEN
                    && req.headers().get("applicationid").unwrap() == "abc-123"
            })
            .returning(|_| Ok(response(200, "")));

        let input = AuthoriseInput {
            token: Some(NEW_TOKEN.to_string()),
            application_id: Some("abc-123".to_string()),
            ..Default::default()
        };
        let session = AuthoriseCommand::new(client, test_endpoint(), MockPasswordPrompt::new())
            .run(input)
            .unwrap();

        assert_eq!(session.token().unwrap().as_str(), NEW_TOKEN);
        assert_eq!(session.application_id().as_str(), "abc-123");
    }

    #[test]
    fn malformed_token_input_fails() {
        let mut client = MockHttpClient::new();
        client.expect_send().never();

        let input = AuthoriseInput {
            token: Some("not-a-token".to_string()),
            ..Default::default()
        };
        let err = AuthoriseCommand::new(client, test_endpoint(), MockPasswordPrompt::new())
            .run(input)
            .unwrap_err();

        assert_matches!(
            err,
            AuthoriseCommandError::Authorise(AuthoriseError::InvalidCredentialFormat(
                CredentialFormatError::InvalidToken
            ))
        );
    }

    #[test]
    fn corrupt_session_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("glowmarkt.conf"));
        fs::write(store.path(), "garbage").unwrap();

        let input = AuthoriseInput {
            token: Some(NEW_TOKEN.to_string()),
            ..Default::default()
        };
        let client = |_req: Request<Vec<u8>>| -> Result<Response<Vec<u8>>, HttpClientError> {
            Ok(response(200, ""))
        };
        AuthoriseCommand::new(client, test_endpoint(), MockPasswordPrompt::new())
            .with_session_store(store.clone())
            .run(input)
            .unwrap();

        assert_eq!(stored_token(&store).as_deref(), Some(NEW_TOKEN));
    }

    #[test]
    fn empty_session_file_is_removed() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("glowmarkt.conf"));
        fs::write(store.path(), "").unwrap();

        let mut client = MockHttpClient::new();
        client.expect_send().never();

        let session = AuthoriseCommand::new(client, test_endpoint(), MockPasswordPrompt::new())
            .with_session_store(store.clone())
            .run(AuthoriseInput::default())
            .unwrap();

        assert!(session.token().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn malformed_application_id_keeps_stored_session() {
        let dir = TempDir::new().unwrap();
        let store = stored_session(&dir);

        let mut client = MockHttpClient::new();
        client.expect_send().never();

        let input = AuthoriseInput {
            application_id: Some("zz-not-hex".to_string()),
            ..Default::default()
        };
        let err = AuthoriseCommand::new(client, test_endpoint(), MockPasswordPrompt::new())
            .with_session_store(store.clone())
            .run(input)
            .unwrap_err();

        assert_matches!(
            err,
            AuthoriseCommandError::Authorise(AuthoriseError::InvalidCredentialFormat(
                CredentialFormatError::InvalidApplicationId(_)
            ))
        );
        assert_eq!(stored_token(&store).as_deref(), Some(TOKEN));
    }
}
