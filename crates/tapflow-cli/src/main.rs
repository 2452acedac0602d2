use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tapflow_cli::commands::{events, export, metrics, status, sync, tap};
use tapflow_cli::{Cli, Commands, Config};
use tapflow_core::event::{Origin, RawTap};
use tapflow_core::types::{SessionId, TokenId};
use tapflow_store::{EventStore, IngestionService, MetricsReader};

/// Load config and open the event store, ensuring the parent directory
/// exists.
fn open_store(config_path: Option<&Path>) -> Result<(Arc<EventStore>, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let store = EventStore::open(&config.database_path, config.windows())
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    Ok((Arc::new(store), config))
}

fn session_id(config: &Config, session: Option<&str>) -> Result<SessionId> {
    let raw = session.unwrap_or(&config.session_id);
    SessionId::new(raw).with_context(|| format!("invalid session id {raw:?}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let mut stdout = std::io::stdout();

    match &cli.command {
        Some(Commands::Tap {
            token,
            uid,
            stage,
            session,
            at,
            mobile,
        }) => {
            let (store, config) = open_store(cli.config.as_deref())?;
            let origin = if *mobile {
                Origin::Mobile(config.device_id.clone())
            } else {
                Origin::Station(config.device_id.clone())
            };
            let raw = RawTap {
                token_id: token.clone(),
                uid: uid.clone(),
                stage: stage.clone(),
                session_id: session.clone().unwrap_or_else(|| config.session_id.clone()),
                origin,
                observed_at: at.unwrap_or_else(Utc::now),
            };
            let service = IngestionService::new(store, config.policy()?);
            tap::run(&mut stdout, &service, &raw)?;
        }
        Some(Commands::Sync { file }) => {
            let (store, config) = open_store(cli.config.as_deref())?;
            let service = IngestionService::new(store, config.policy()?);
            sync::run(&mut stdout, &service, file.as_deref())?;
        }
        Some(Commands::Metrics { session, json }) => {
            let (store, config) = open_store(cli.config.as_deref())?;
            let session = session_id(&config, session.as_deref())?;
            let reader =
                MetricsReader::new(Arc::clone(&store), config.vocabulary()?, config.metrics_config());
            metrics::run(&mut stdout, &store, &reader, &session, *json)?;
        }
        Some(Commands::Status {
            token,
            session,
            json,
        }) => {
            let (store, config) = open_store(cli.config.as_deref())?;
            let session = session_id(&config, session.as_deref())?;
            let token = TokenId::new(token).context("invalid token id")?;
            let reader = MetricsReader::new(store, config.vocabulary()?, config.metrics_config());
            status::run(&mut stdout, &reader, &session, &token, *json)?;
        }
        Some(Commands::Events { session, limit }) => {
            let (store, config) = open_store(cli.config.as_deref())?;
            let session = session_id(&config, session.as_deref())?;
            events::run(&mut stdout, &store, &session, *limit)?;
        }
        Some(Commands::Export { session }) => {
            let (store, config) = open_store(cli.config.as_deref())?;
            let session = session_id(&config, session.as_deref())?;
            export::run(&mut stdout, &store, &session)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
