use std::error::Error;
use std::io;

use clap::Parser;
use glowmarkt_auth::commands::authorise::AuthoriseCommand;
use glowmarkt_auth::commands::prompt::TerminalPrompt;
use glowmarkt_auth::http::client::HttpClient;
use glowmarkt_auth::parameters::{Cli, OutputTokenFormat};
use glowmarkt_auth::session::store::SessionStore;
use tracing::{Level, info};

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    info!("verbose output");
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let http_client = HttpClient::new(cli.http_config())
        .map_err(|e| format!("error creating http client: {e}"))?;

    let command = AuthoriseCommand::new(http_client, cli.auth_endpoint()?, TerminalPrompt);
    let command = match cli.session_path()? {
        Some(path) => command.with_session_store(SessionStore::new(path)),
        None => command,
    };

    let session = command.run(cli.authorise_input())?;

    match cli.output_token_format {
        Some(OutputTokenFormat::Plain) => {
            if let Some(token) = session.token() {
                println!("{token}");
            }
        }
        Some(OutputTokenFormat::Json) => {
            let output = serde_json::to_string_pretty(&session.to_record())?;
            println!("{output}");
        }
        None => {}
    }

    Ok(())
}
