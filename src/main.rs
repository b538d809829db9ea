mod config;
mod frame;
mod params;
mod queue;
mod request;
mod routes;
mod services;
mod socket;
mod state;
mod toolkit;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ConfigError};
use crate::request::Context;
use crate::services::accounts::{AccountDirectory, JsonAccountFile, NoAccounts};
use crate::services::dispatch::spawn_service;
use crate::services::identity::IdentityStore;
use crate::services::inactivity::InactivityTimer;
use crate::services::indicator::{CommandNotifier, Indicator, LogNotifier, Notifier};
use crate::socket::SocketError;
use crate::toolkit::zenity::ZenityToolkit;

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("server failed: {0}")]
    Serve(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config::log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "authui: fatal");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = Config::from_env()?;

    let indicator = config.indicator_enabled.then(|| {
        let notifier: Arc<dyn Notifier> = if config.notify_command.is_empty() {
            Arc::new(LogNotifier)
        } else {
            Arc::new(CommandNotifier::new(config.notify_command.clone()))
        };
        Indicator::new(notifier)
    });
    let accounts: Arc<dyn AccountDirectory> = match &config.accounts_file {
        Some(path) => Arc::new(JsonAccountFile::new(path.clone())),
        None => Arc::new(NoAccounts),
    };

    let context = Context {
        toolkit: Arc::new(ZenityToolkit::new(config.dialog_command.clone())),
        indicator: indicator.clone(),
        accounts,
        identities: IdentityStore::new(config.cache_dir.clone()),
        helper: config.helper.clone(),
    };
    let (service, _actor) = spawn_service(context, config.browser_mode);

    let listener = socket::bind(&config.socket_path).await?;
    tracing::info!(
        socket = %config.socket_path.display(),
        browser_mode = ?config.browser_mode,
        idle_timeout_secs = config.idle_timeout.map(|d| d.as_secs()),
        "authui listening"
    );

    let shutdown = shutdown_signal(
        config.idle_timeout,
        service.idle_signal(),
        indicator.as_ref().map(Indicator::idle_signal),
    );
    let app = routes::app(state::AppState::new(service, indicator));

    // Upgraded websocket connections never drain, so shutdown drops the
    // server instead of waiting for it.
    let result = tokio::select! {
        result = axum::serve(listener, app).into_future() => result,
        () = shutdown => Ok(()),
    };

    socket::remove(&config.socket_path);
    result.map_err(StartupError::Serve)
}

/// Resolve on Ctrl-C/SIGTERM, or once every component has been idle for
/// `idle_timeout`.
async fn shutdown_signal(
    idle_timeout: Option<Duration>,
    service_idle: watch::Receiver<bool>,
    indicator_idle: Option<watch::Receiver<bool>>,
) {
    let idle = async {
        let Some(interval) = idle_timeout else {
            return std::future::pending().await;
        };
        let mut timer = InactivityTimer::new(interval).watch(service_idle);
        if let Some(signal) = indicator_idle {
            timer = timer.watch(signal);
        }
        timer.wait().await;
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "authui: SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = idle => tracing::info!("authui: idle, shutting down"),
        _ = tokio::signal::ctrl_c() => tracing::info!("authui: interrupted, shutting down"),
        () = terminate => tracing::info!("authui: terminated, shutting down"),
    }
}
