use chrono::{DateTime, Utc};
use http::uri::InvalidUri;
use http::{HeaderValue, Method, Request, Response, Uri, header::CONTENT_TYPE};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::credentials::{CredentialFormatError, Credentials, Password};
use crate::http_client::HttpClient;
use crate::session::Session;
use crate::token::{ApplicationId, Token};

const AUTH_PATH: &str = "auth";
const TOKEN_HEADER: &str = "token";
const APPLICATION_ID_HEADER: &str = "applicationId";

#[derive(Error, Debug)]
pub enum AuthoriseError {
    #[error("invalid credential format: `{0}`")]
    InvalidCredentialFormat(#[from] CredentialFormatError),
    #[error("authentication rejected: Status code: `{0}`, Reason: `{1}`")]
    AuthenticationRejected(u16, String),
    #[error("service unavailable: `{reason}`")]
    ServiceUnavailable { status: Option<u16>, reason: String },
    #[error("unable to build request: `{0}`")]
    InvalidRequest(String),
    #[error("unable to deserialize login response: `{0}`")]
    InvalidResponse(String),
}

impl AuthoriseError {
    /// Whether trying again with different credentials may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthoriseError::InvalidCredentialFormat(_) | AuthoriseError::AuthenticationRejected(..)
        )
    }
}

/// Builds the URI of the authentication endpoint from the API base url.
pub fn auth_endpoint(api_url: &str) -> Result<Uri, InvalidUri> {
    format!("{}/{AUTH_PATH}", api_url.trim_end_matches('/')).parse()
}

/// Arguments of [Authenticator::authorise]. Any combination may be set, the one used is decided
/// when authorising.
#[derive(Debug, Default, Clone)]
pub struct AuthoriseParams {
    username: Option<String>,
    password: Option<Password>,
    token: Option<String>,
    application_id: Option<String>,
}

impl AuthoriseParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_username(self, username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..self
        }
    }

    pub fn with_password(self, password: Password) -> Self {
        Self {
            password: Some(password),
            ..self
        }
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..self
        }
    }

    pub fn with_application_id(self, application_id: impl Into<String>) -> Self {
        Self {
            application_id: Some(application_id.into()),
            ..self
        }
    }

    pub fn with_optional_application_id(self, application_id: Option<String>) -> Self {
        Self {
            application_id,
            ..self
        }
    }
}

enum AuthMode {
    StoredToken(Token),
    ProvidedToken(Token),
    Login(Credentials),
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    /// Token expiration, in seconds since the epoch.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub exp: Option<i64>,
}

/// Reads a timestamp given either as a number or as a numeric string. Any other value is read as
/// no expiration.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let timestamp = match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    if timestamp.is_none() {
        debug!("login response carries no usable expiration");
    }
    Ok(timestamp)
}

/// Authenticates against the Glowmarkt API and owns the resulting [Session].
pub struct Authenticator<C> {
    /// HTTP client
    http_client: C,
    /// `{api_url}/auth`
    auth_endpoint: Uri,
    session: Session,
}

impl<C> Authenticator<C> {
    pub fn new(http_client: C, auth_endpoint: Uri) -> Self {
        Self {
            http_client,
            auth_endpoint,
            session: Session::default(),
        }
    }

    /// Restores a previously saved session. It should be checked with [Authenticator::authorise]
    /// before it is trusted.
    pub fn with_session(self, session: Session) -> Self {
        Self { session, ..self }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.token().is_some()
    }
}

impl<C> Authenticator<C>
where
    C: HttpClient,
{
    /// Authenticates with whatever `params` carries, in this order of preference:
    ///
    /// 1. Nothing but maybe an application id, and a token already in the session: the stored
    ///    token is checked against the service.
    /// 2. A token: it is checked against the service.
    /// 3. Otherwise a username and password are required to log in.
    ///
    /// Exactly one request is sent, and only once every input is well-formed. The session is
    /// replaced as a whole when the service accepts the request and left untouched otherwise.
    pub fn authorise(&mut self, params: AuthoriseParams) -> Result<(), AuthoriseError> {
        let AuthoriseParams {
            username,
            password,
            token,
            application_id,
        } = params;

        let mode = self.select_mode(username, password, token)?;

        let application_id = match application_id {
            Some(id) => ApplicationId::try_from(id)?,
            None => self.session.application_id().clone(),
        };

        let session = match mode {
            AuthMode::StoredToken(token) => {
                info!("reauthorising existing token");
                self.check_token(&token, &application_id)?;
                Session::new(Some(token), application_id, self.session.expires_at())
            }
            AuthMode::ProvidedToken(token) => {
                info!("reauthorising provided token");
                self.check_token(&token, &application_id)?;
                let expires_at = self
                    .session
                    .token()
                    .filter(|stored| **stored == token)
                    .and(self.session.expires_at());
                Session::new(Some(token), application_id, expires_at)
            }
            AuthMode::Login(credentials) => {
                info!("authorising user {}", credentials.username());
                let (token, expires_at) = self.login(&credentials, &application_id)?;
                Session::new(Some(token), application_id, expires_at)
            }
        };

        debug!(
            "session updated, application id: {}, expires at: {:?}",
            session.application_id(),
            session.expires_at()
        );
        self.session = session;
        Ok(())
    }

    fn select_mode(
        &self,
        username: Option<String>,
        password: Option<Password>,
        token: Option<String>,
    ) -> Result<AuthMode, CredentialFormatError> {
        match (username, password, token) {
            (None, None, None) => self
                .session
                .token()
                .map(|stored| AuthMode::StoredToken(stored.clone()))
                .ok_or(CredentialFormatError::MissingCredentials),
            (_, _, Some(token)) => Token::try_from(token).map(AuthMode::ProvidedToken),
            (username, password, None) => Credentials::new(
                username.unwrap_or_default(),
                password.unwrap_or_else(|| Password::from("")),
            )
            .map(AuthMode::Login),
        }
    }

    /// Executes a GET request with the token and application id headers. The service only
    /// answers successfully if it still accepts the token.
    fn check_token(
        &self,
        token: &Token,
        application_id: &ApplicationId,
    ) -> Result<(), AuthoriseError> {
        let mut token_header = HeaderValue::from_str(token.as_str())
            .map_err(|_| CredentialFormatError::InvalidToken)?;
        token_header.set_sensitive(true);

        let request = Request::builder()
            .uri(&self.auth_endpoint)
            .method(Method::GET)
            .header(TOKEN_HEADER, token_header)
            .header(APPLICATION_ID_HEADER, application_id.as_str())
            .body(Vec::new())
            .map_err(|e| AuthoriseError::InvalidRequest(e.to_string()))?;

        self.send(request)?;
        Ok(())
    }

    /// Executes a POST request with the credentials as a JSON body and returns the issued token.
    fn login(
        &self,
        credentials: &Credentials,
        application_id: &ApplicationId,
    ) -> Result<(Token, Option<DateTime<Utc>>), AuthoriseError> {
        let body = serde_json::to_vec(&LoginRequest {
            username: credentials.username(),
            password: credentials.password().as_str(),
        })
        .map_err(|e| AuthoriseError::InvalidRequest(e.to_string()))?;

        let request = Request::builder()
            .uri(&self.auth_endpoint)
            .method(Method::POST)
            .header(CONTENT_TYPE, "application/json")
            .header(APPLICATION_ID_HEADER, application_id.as_str())
            .body(body)
            .map_err(|e| AuthoriseError::InvalidRequest(e.to_string()))?;

        let response = self.send(request)?;

        let login_response: LoginResponse = serde_json::from_slice(response.body())
            .map_err(|e| AuthoriseError::InvalidResponse(e.to_string()))?;

        let token = Token::try_from(login_response.token).map_err(|e| {
            AuthoriseError::InvalidResponse(format!("issued token is not valid: {e}"))
        })?;
        let expires_at = login_response
            .exp
            .and_then(|exp| DateTime::from_timestamp(exp, 0));

        Ok((token, expires_at))
    }

    fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, AuthoriseError> {
        let response = self.http_client.send(request).map_err(|e| {
            error!("transport error reaching the Glowmarkt API - aborting: {e}");
            AuthoriseError::ServiceUnavailable {
                status: None,
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        debug!("response from server: {status}");
        if status.is_success() {
            return Ok(response);
        }

        let body = String::from_utf8_lossy(response.body()).to_string();
        if status.as_u16() < 500 {
            warn!("error {status} - {body}");
            Err(AuthoriseError::AuthenticationRejected(status.as_u16(), body))
        } else {
            error!("server error {status} - aborting: {body}");
            Err(AuthoriseError::ServiceUnavailable {
                status: Some(status.as_u16()),
                reason: body,
            })
        }
    }
}
