use std::time::Duration;

use http::Uri;
use thiserror::Error;

use crate::parameters::DEFAULT_AUTHENTICATOR_TIMEOUT;

/// Schemes reqwest can tunnel the API requests through.
const PROXY_SCHEMES: [&str; 4] = ["http", "https", "socks5", "socks5h"];

#[derive(Error, Debug, PartialEq)]
pub enum ProxyError {
    #[error("invalid proxy url `{0}`: `{1}`")]
    InvalidUrl(String, String),
    #[error("proxy url `{0}` needs a scheme, one of {schemes:?}", schemes = PROXY_SCHEMES)]
    UnsupportedScheme(String),
    #[error("proxy url `{0}` has no host")]
    MissingHost(String),
}

/// Settings used to build the reqwest-backed [super::client::HttpClient].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub(crate) timeout: Duration,
    pub(crate) conn_timeout: Duration,
    /// Explicit proxy. Without one the client honours `HTTPS_PROXY`, `HTTP_PROXY` and `NO_PROXY`.
    pub(crate) proxy: Option<Uri>,
}

impl HttpConfig {
    pub fn new(timeout: Duration, conn_timeout: Duration) -> Self {
        Self {
            timeout,
            conn_timeout,
            proxy: None,
        }
    }

    pub fn with_proxy(self, proxy: Option<Uri>) -> Self {
        Self { proxy, ..self }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::new(DEFAULT_AUTHENTICATOR_TIMEOUT, DEFAULT_AUTHENTICATOR_TIMEOUT)
    }
}

/// Parses the `--proxy` value: `<scheme>://[<user>:<password>@]<host>[:<port>]`.
pub fn parse_proxy_url(value: &str) -> Result<Uri, ProxyError> {
    let uri = value
        .parse::<Uri>()
        .map_err(|err| ProxyError::InvalidUrl(value.to_string(), err.to_string()))?;

    match uri.scheme_str() {
        Some(scheme) if PROXY_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) => {}
        _ => return Err(ProxyError::UnsupportedScheme(value.to_string())),
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(ProxyError::MissingHost(value.to_string()));
    }

    Ok(uri)
}
