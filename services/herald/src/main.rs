//! Herald CLI
//!
//! Command-line interface for the notification dispatch service.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use herald::event::{Failure, Service, ServiceEvent};
use herald::{load_config, Config, HeraldBuilder};
use tracing::Level;

#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "Notification dispatch service for service monitoring alerts")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dispatch JSON service events read line by line from stdin (default)
    Run,
    /// Print the registered notifiers as JSON
    List,
    /// Send a test notification through one notifier
    Test {
        /// Notifier method, e.g. pushover
        method: String,
    },
    /// Print the remote extension catalog as JSON
    Catalog,
    /// Dispatch a single event
    Dispatch {
        /// Service name
        #[arg(long)]
        service: String,

        /// Service URL
        #[arg(long, default_value = "")]
        domain: String,

        /// Failure description; dispatches a failure event when given
        #[arg(long)]
        issue: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, log_level={:?}, command={:?}",
        args.config,
        args.log_level,
        args.command
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    config.resolve_secrets()?;

    tracing::debug!(
        "Notifier settings: {}, extensions directory: {:?}",
        config.notifiers.len(),
        config.extensions.directory
    );

    let herald = HeraldBuilder::new(config).build().await?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            tracing::info!("Starting herald service");
            herald.start().await?;
        }
        Command::List => {
            let listing: Vec<_> = herald
                .registry()
                .all()
                .iter()
                .map(|config| config.redacted())
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Command::Test { method } => {
            let response = herald.registry().test(&method).await?;
            println!("{}", response);
        }
        Command::Catalog => {
            let catalog = herald.catalog().fetch_catalog().await?;
            println!("{}", serde_json::to_string_pretty(&catalog)?);
        }
        Command::Dispatch {
            service,
            domain,
            issue,
        } => {
            let service = Service {
                id: 0,
                name: service,
                domain,
                port: None,
                latency_ms: None,
                online: issue.is_none(),
            };
            let event = match issue {
                Some(issue) => ServiceEvent::failure(service, Failure::new(issue)),
                None => ServiceEvent::success(service),
            };
            let outcomes = herald.dispatch(&event).await;
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
        }
    }

    Ok(())
}
