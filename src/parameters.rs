use std::path::PathBuf;
use std::time::Duration;

use clap::error::{Error as ClapError, ErrorKind};
use clap::{ArgGroup, Parser, ValueEnum};
use http::Uri;

use crate::authenticator::auth_endpoint;
use crate::commands::authorise::AuthoriseInput;
use crate::http::config::{HttpConfig, parse_proxy_url};

pub const DEFAULT_AUTHENTICATOR_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_API_URL: &str = "https://api.glowmarkt.com/api/v0-1";
/// Name of the session file inside the user configuration directory.
pub const SESSION_FILE_NAME: &str = "glowmarkt.conf";

#[derive(Parser)]
#[command(
    name = "glowmarkt-auth-cli",
    about = "Authorise against the Glowmarkt API and keep the session for later runs"
)]
#[command(group(
    ArgGroup::new("auth-source")
        .required(true)
        .multiple(true)
        .args(["config", "user", "token"])
))]
pub struct Cli {
    /// Increase output verbosity
    #[arg(short, long)]
    pub verbose: bool,

    /// Load and save the session from file CONFIG (defaults to <user config dir>/glowmarkt.conf)
    #[arg(short, long, value_name = "CONFIG")]
    pub config: Option<Option<PathBuf>>,

    /// Account username, the password is asked for interactively
    #[arg(short, long)]
    pub user: Option<String>,

    /// Token value from a previous authorisation
    #[arg(short, long)]
    pub token: Option<String>,

    /// Application identifier sent to the API
    #[arg(short, long)]
    pub application_id: Option<String>,

    /// Base url of the Glowmarkt API
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Proxy url. HTTPS_PROXY and HTTP_PROXY are used when it is not set
    #[arg(long, value_name = "URL", value_parser = parse_proxy_url)]
    pub proxy: Option<Uri>,

    /// Print the token once authorised
    #[arg(long)]
    pub output_token_format: Option<OutputTokenFormat>,
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputTokenFormat {
    /// Returns only the token
    #[value(name = "Plain")]
    Plain,
    /// Returns the whole session record in json format
    #[value(name = "Json")]
    Json,
}

impl Cli {
    /// Path of the session file, if the session should be kept across runs.
    pub fn session_path(&self) -> Result<Option<PathBuf>, ClapError> {
        match &self.config {
            None => Ok(None),
            Some(Some(path)) => Ok(Some(path.to_owned())),
            Some(None) => default_session_path().map(Some).ok_or_else(|| {
                ClapError::raw(
                    ErrorKind::InvalidValue,
                    "could not find the user configuration directory, provide a CONFIG path",
                )
            }),
        }
    }

    pub fn auth_endpoint(&self) -> Result<Uri, ClapError> {
        auth_endpoint(&self.api_url).map_err(|err| {
            ClapError::raw(
                ErrorKind::InvalidValue,
                format!("invalid api url `{}`: {err}", self.api_url),
            )
        })
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig::new(DEFAULT_AUTHENTICATOR_TIMEOUT, DEFAULT_AUTHENTICATOR_TIMEOUT)
            .with_proxy(self.proxy.clone())
    }

    pub fn authorise_input(&self) -> AuthoriseInput {
        AuthoriseInput {
            username: self.user.clone(),
            token: self.token.clone(),
            application_id: self.application_id.clone(),
        }
    }
}

pub fn default_session_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(SESSION_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn at_least_one_source_is_required() {
        let err = Cli::try_parse_from(["glowmarkt-auth-cli", "-v"]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[rstest]
    #[case(&["-u", "alice"])]
    #[case(&["-t", "aaa.bbb.ccc"])]
    #[case(&["-c"])]
    #[case(&["-c", "/tmp/glowmarkt.conf", "-u", "alice", "-t", "aaa.bbb.ccc"])]
    fn accepted_sources(#[case] args: &[&str]) {
        let args = std::iter::once("glowmarkt-auth-cli").chain(args.iter().copied());
        assert!(Cli::try_parse_from(args).is_ok());
    }

    #[test]
    fn config_without_value_uses_default_path() {
        let cli = Cli::try_parse_from(["glowmarkt-auth-cli", "-c", "-u", "alice"]).unwrap();

        assert_eq!(cli.config, Some(None));
        assert_eq!(cli.user.as_deref(), Some("alice"));
        assert_eq!(cli.session_path().unwrap(), default_session_path());
    }

    #[test]
    fn config_with_value() {
        let cli = Cli::try_parse_from(["glowmarkt-auth-cli", "--config", "/tmp/session.json"])
            .unwrap();

        assert_eq!(
            cli.session_path().unwrap(),
            Some(PathBuf::from("/tmp/session.json"))
        );
    }

    #[test]
    fn no_config_means_no_session_file() {
        let cli = Cli::try_parse_from(["glowmarkt-auth-cli", "-u", "alice"]).unwrap();

        assert_eq!(cli.session_path().unwrap(), None);
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["glowmarkt-auth-cli", "-t", "aaa.bbb.ccc"]).unwrap();

        assert!(!cli.verbose);
        assert_eq!(
            cli.auth_endpoint().unwrap(),
            "https://api.glowmarkt.com/api/v0-1/auth"
        );
        assert_eq!(cli.output_token_format, None);
        assert_eq!(cli.http_config().proxy, None);

        let input = cli.authorise_input();
        assert_eq!(input.token.as_deref(), Some("aaa.bbb.ccc"));
        assert_eq!(input.username, None);
        assert_eq!(input.application_id, None);
    }

    #[test]
    fn invalid_api_url() {
        let cli = Cli::try_parse_from([
            "glowmarkt-auth-cli",
            "-t",
            "aaa.bbb.ccc",
            "--api-url",
            "not a url",
        ])
        .unwrap();

        assert_eq!(
            cli.auth_endpoint().unwrap_err().kind(),
            ErrorKind::InvalidValue
        );
    }

    #[test]
    fn output_format() {
        let cli = Cli::try_parse_from([
            "glowmarkt-auth-cli",
            "-t",
            "aaa.bbb.ccc",
            "--output-token-format",
            "Json",
        ])
        .unwrap();

        assert_eq!(cli.output_token_format, Some(OutputTokenFormat::Json));
    }

    #[test]
    fn proxy_flag() {
        let cli = Cli::try_parse_from([
            "glowmarkt-auth-cli",
            "-t",
            "aaa.bbb.ccc",
            "--proxy",
            "socks5://localhost:1080",
        ])
        .unwrap();

        assert_eq!(cli.http_config().proxy.unwrap(), "socks5://localhost:1080");
    }

    #[rstest]
    #[case("")]
    #[case("localhost:1080")]
    fn invalid_proxy_flag(#[case] proxy: &str) {
        let err = Cli::try_parse_from([
            "glowmarkt-auth-cli",
            "-t",
            "aaa.bbb.ccc",
            "--proxy",
            proxy,
        ])
        .err()
        .unwrap();

        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }
}
