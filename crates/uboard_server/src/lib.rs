//! HTTP API for UBoard.
//!
//! # Responsibility
//! - Expose core use-cases as JSON endpoints over axum.
//! - Own process-level wiring: database, mailer, clock and background purge.
//!
//! # Invariants
//! - Handlers never hold the database lock across an await point.
//! - Shutdown waits for in-flight requests to finish.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use config::{ConfigError, ServerConfig};
pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;

use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use uboard_core::{open_db, AuthContext, DbError, LogMailer, SystemClock};

const PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opens the database, binds the listener and serves until a shutdown signal.
pub async fn serve(config: ServerConfig) -> Result<(), ServerError> {
    let conn = open_db(&config.db_path)?;
    let ctx = AuthContext {
        clock: Arc::new(SystemClock),
        mailer: Arc::new(LogMailer),
        policy: Arc::new(config.policy.clone()),
    };
    let state = AppState::new(conn, ctx);
    let app = build_router(state.clone(), &config.cors_origins);

    let purge = tokio::spawn(purge_loop(state));

    let listener = TcpListener::bind(config.bind).await?;
    info!(
        "event=server_start module=server status=ok bind={} db_path={}",
        config.bind,
        config.db_path.display()
    );

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    purge.abort();
    result?;

    info!("event=server_stop module=server status=ok");
    Ok(())
}

/// Removes expired tokens and sessions on a fixed interval.
async fn purge_loop(state: AppState) {
    let mut interval = tokio::time::interval(PURGE_INTERVAL);
    loop {
        interval.tick().await;
        let outcome = state
            .run(|conn, ctx| Ok(state::auth_service(conn, ctx).purge_expired()?))
            .await;
        if let Err(err) = outcome {
            warn!("event=purge_expired module=server status=error error={err}");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = ctrl_c().await {
            error!("event=shutdown_signal module=server status=error signal=ctrl_c error={err}");
            std::future::pending::<()>().await;
        }
        info!("event=shutdown_signal module=server status=ok signal=ctrl_c");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("event=shutdown_signal module=server status=ok signal=terminate");
            }
            Err(err) => {
                error!(
                    "event=shutdown_signal module=server status=error signal=terminate error={err}"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
