//! `uboard` command-line entry point.
//!
//! # Responsibility
//! - Load configuration from the environment and apply flag overrides.
//! - Start the HTTP server or run one-off maintenance commands.

use clap::{Args, Parser, Subcommand};
use log::error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use uboard_core::db::migrations::{current_version, latest_version};
use uboard_core::{
    init_logging, open_db, AuthContext, AuthService, LogMailer, SqliteTokenRepository,
    SqliteUserRepository, SystemClock,
};
use uboard_server::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "uboard", author, version, about = "University bulletin board backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve(ServeArgs),
    /// Create or upgrade the database schema and exit.
    Migrate(DbArgs),
    /// Delete expired confirmation/reset tokens and sessions once.
    Purge(DbArgs),
    /// Print the crate version.
    Version,
}

#[derive(Args, Debug)]
struct DbArgs {
    /// SQLite database file; overrides UBOARD_DB_PATH.
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    db: DbArgs,
    /// Listen address; overrides UBOARD_BIND.
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// Base URL used in email links; overrides UBOARD_PUBLIC_URL.
    #[arg(long)]
    public_url: Option<String>,
    /// trace|debug|info|warn|error; overrides UBOARD_LOG_LEVEL.
    #[arg(long)]
    log_level: Option<String>,
    /// Absolute directory for rotated log files; overrides UBOARD_LOG_DIR.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("uboard: {err}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command {
        Command::Version => {
            println!("uboard {}", uboard_core::core_version());
            return ExitCode::SUCCESS;
        }
        Command::Serve(args) => {
            apply_serve_overrides(&mut config, args);
            match start_logging(&config) {
                Ok(()) => uboard_server::serve(config)
                    .await
                    .map_err(|err| err.to_string()),
                Err(err) => Err(err),
            }
        }
        Command::Migrate(args) => {
            apply_db_override(&mut config, args);
            start_logging(&config).and_then(|()| migrate(&config))
        }
        Command::Purge(args) => {
            apply_db_override(&mut config, args);
            start_logging(&config).and_then(|()| purge(&config))
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_exit module=cli status=error error={message}");
            eprintln!("uboard: {message}");
            ExitCode::FAILURE
        }
    }
}

fn apply_db_override(config: &mut ServerConfig, args: DbArgs) {
    if let Some(db) = args.db {
        config.db_path = db;
    }
}

fn apply_serve_overrides(config: &mut ServerConfig, args: ServeArgs) {
    apply_db_override(config, args.db);
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(url) = args.public_url {
        config.policy.public_url = url.trim_end_matches('/').to_string();
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if args.log_dir.is_some() {
        config.log_dir = args.log_dir;
    }
}

fn start_logging(config: &ServerConfig) -> Result<(), String> {
    init_logging(&config.log_level, config.log_dir.as_deref())
}

fn migrate(config: &ServerConfig) -> Result<(), String> {
    let conn = open_db(&config.db_path).map_err(|err| err.to_string())?;
    let version = current_version(&conn).map_err(|err| err.to_string())?;
    println!(
        "schema version {version} (latest {}) at {}",
        latest_version(),
        config.db_path.display()
    );
    Ok(())
}

fn purge(config: &ServerConfig) -> Result<(), String> {
    let conn = open_db(&config.db_path).map_err(|err| err.to_string())?;
    let ctx = AuthContext {
        clock: Arc::new(SystemClock),
        mailer: Arc::new(LogMailer),
        policy: Arc::new(config.policy.clone()),
    };
    let service = AuthService::new(
        SqliteUserRepository::new(&conn),
        SqliteTokenRepository::new(&conn),
        ctx,
    );
    let stats = service.purge_expired().map_err(|err| err.to_string())?;
    println!(
        "removed {} expired tokens and {} expired sessions",
        stats.tokens, stats.sessions
    );
    Ok(())
}
