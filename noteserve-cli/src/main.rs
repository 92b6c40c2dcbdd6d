use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use noteserve_core::config::Config;
use noteserve_core::core_store::{migrations, NoteSqlStore, UserId};
use noteserve_core::core_sync::{SyncProtocolHandler, SystemClock};
use noteserve_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use noteserve_core::metrics::init_metrics;
use noteserve_core::server::types::SyncStateResponse;
use noteserve_core::server::{AppState, NoteServer, StaticTokenAuthenticator};
use noteserve_core::shutdown::{install_signal_handlers, ShutdownCoordinator};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "noteserve")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML); NOTESERVE_* variables override it
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long, global = true)]
    json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Bearer token for a user, as USER_ID=TOKEN (repeatable)
        #[arg(long = "token", value_parser = parse_token)]
        tokens: Vec<(UserId, String)>,
    },
    /// Create or upgrade the database schema
    Migrate,
    /// Create a user with an empty change feed
    CreateUser,
    /// Print the sync state of a user
    SyncState {
        #[arg(long)]
        user: i64,
    },
    /// Write the effective configuration to a file
    WriteConfig { path: PathBuf },
}

fn parse_token(raw: &str) -> Result<(UserId, String), String> {
    let (user, token) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected USER_ID=TOKEN, got '{}'", raw))?;
    let user: i64 = user
        .trim()
        .parse()
        .map_err(|_| format!("invalid user id '{}'", user))?;
    if token.is_empty() {
        return Err("token must not be empty".to_string());
    }
    Ok((UserId(user), token.to_string()))
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let path = shellexpand::tilde(path).into_owned();
            Config::from_file(&path).with_context(|| format!("Failed to load config from {}", path))?
        }
        None => Config::default(),
    };
    config.apply_env()?;

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    config.validate()?;
    Ok(config)
}

fn init_logging_from(config: &Config) -> Result<()> {
    let log_config = LogConfig::try_from(&config.logging).unwrap_or_else(|e| {
        eprintln!("{}, using 'info'", e);
        LogConfig::new(LogLevel::Info).json_format(config.logging.json_format)
    });
    init_logging_with_config(log_config)?;
    Ok(())
}

async fn serve(config: Config, bind: Option<SocketAddr>, tokens: Vec<(UserId, String)>) -> Result<()> {
    let mut server_config = config.server.clone();
    if let Some(bind) = bind {
        server_config.bind_address = bind;
    }

    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(config.metrics.bind_address)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Prometheus metrics on {}", config.metrics.bind_address);
    }
    init_metrics();

    let store = NoteSqlStore::open(&config.store)?;

    let mut auth = StaticTokenAuthenticator::new();
    for (user_id, token) in tokens {
        store
            .get_user(user_id)
            .with_context(|| format!("Token configured for unknown user {}", user_id))?;
        auth.insert(token, user_id);
    }
    if auth.is_empty() {
        warn!("No tokens configured; every request will be rejected");
    }

    let state = AppState::new(store, &config.sync, Arc::new(auth), Arc::new(SystemClock))?;

    let shutdown = Arc::new(ShutdownCoordinator::new(server_config.shutdown_timeout));
    install_signal_handlers(shutdown.clone());

    NoteServer::new(state, server_config, shutdown).run().await
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging_from(&config)?;

    info!("noteserve {} started", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Serve { bind, tokens } => serve(config, bind, tokens).await?,
        Command::Migrate => {
            let store = NoteSqlStore::open(&config.store)?;
            let version = store.read(|conn| migrations::get_current_version(conn))?;
            println!("Schema of {} is at version {}", config.store.db_path.display(), version);
        }
        Command::CreateUser => {
            let store = NoteSqlStore::open(&config.store)?;
            let user = store.create_user()?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Command::SyncState { user } => {
            let store = NoteSqlStore::open(&config.store)?;
            let handler =
                SyncProtocolHandler::new(store, config.sync.full_sync_before, Arc::new(SystemClock));
            let state = handler.get_sync_state(UserId(user)).await?;
            println!("{}", serde_json::to_string_pretty(&SyncStateResponse::from(state))?);
        }
        Command::WriteConfig { path } => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            config.save_to_file(&path)?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token() {
        assert_eq!(parse_token("3=abc").unwrap(), (UserId(3), "abc".to_string()));
        assert!(parse_token("abc").is_err());
        assert!(parse_token("x=abc").is_err());
        assert!(parse_token("3=").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "noteserve",
            "serve",
            "--token",
            "1=alpha",
            "--token",
            "2=beta",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.log_level.as_deref(), Some("debug"));
        match args.command {
            Command::Serve { tokens, bind } => {
                assert_eq!(tokens.len(), 2);
                assert!(bind.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_log_level_override() {
        let args = Args::try_parse_from(["noteserve", "--log-level", "warn", "migrate"]).unwrap();
        let config = load_config(&args).unwrap();
        assert_eq!(config.logging.level, "warn");
    }
}
