//! b2-account-info -- inspect or reset the cached account info store.

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use b2_account_info::account_info::{Allowed, Realm};
use b2_account_info::config::{Config, LoggingConfig};
use b2_account_info::{open_account_info, AccountInfo};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "b2-account-info",
    version,
    about = "Inspect or reset cached B2 account info"
)]
struct Cli {
    /// Path to the YAML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the cached session with secrets redacted.
    Show,
    /// Remove all cached account info.
    Clear,
    /// Print the cached id for a bucket name.
    Bucket {
        /// Bucket name to look up.
        name: String,
    },
}

/// Session summary printed by `show`. Secrets are never included.
#[derive(Serialize)]
struct SessionSummary {
    account_id: String,
    realm: Realm,
    api_url: String,
    download_url: String,
    minimum_part_size: u64,
    auth_token: &'static str,
    application_key: &'static str,
    allowed: Option<Allowed>,
    allowed_bucket_name: Option<String>,
}

const REDACTED: &str = "<redacted>";

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => b2_account_info::config::load_config(path)?,
        None => Config::default(),
    };
    init_logging(&config.logging);

    b2_account_info::metrics::describe_metrics();
    let store = open_account_info(&config.account_info)?;

    println!("{}", run(cli.command, store.as_ref())?);
    Ok(())
}

/// Execute `command` against `store` and return the text to print.
fn run(command: Commands, store: &dyn AccountInfo) -> anyhow::Result<String> {
    match command {
        Commands::Show => Ok(serde_json::to_string_pretty(&session_summary(store)?)?),
        Commands::Clear => {
            store.clear()?;
            info!("Cleared cached account info");
            Ok("Account info cleared".to_string())
        }
        Commands::Bucket { name } => Ok(match store.get_bucket_id_or_none_from_bucket_name(&name)? {
            Some(id) => id,
            None => format!("Bucket {name} is not in the cache"),
        }),
    }
}

fn session_summary(store: &dyn AccountInfo) -> anyhow::Result<SessionSummary> {
    let session = match store.get_session() {
        Ok(session) => session,
        Err(e) if e.is_missing_account_data() => {
            anyhow::bail!("No account is authorized; nothing is cached")
        }
        Err(e) => return Err(e.into()),
    };
    let summary = SessionSummary {
        account_id: session.account_id,
        realm: session.realm,
        api_url: session.api_url,
        download_url: session.download_url,
        minimum_part_size: session.minimum_part_size,
        auth_token: REDACTED,
        application_key: REDACTED,
        allowed: store.get_allowed()?,
        allowed_bucket_name: store.get_bucket_name_from_allowed_or_none()?,
    };
    Ok(summary)
}

/// Install the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
