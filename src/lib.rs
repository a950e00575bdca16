pub mod api;
pub mod config;
pub mod core_state;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod tasks;

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::core_state::EngineState;

/// Process role, from the first CLI argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// HTTP API plus, on the Redis backend, local consumers.
    Serve,
    /// Redis consumers only.
    Worker,
}

impl Mode {
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Option<Self> {
        match args.into_iter().nth(1).as_deref() {
            None | Some("serve") => Some(Mode::Serve),
            Some("worker") => Some(Mode::Worker),
            _ => None,
        }
    }
}

pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let Some(mode) = Mode::from_args(std::env::args()) else {
        eprintln!("usage: {} [serve|worker]", config::APP_NAME);
        return ExitCode::from(2);
    };

    tracing::info!(?mode, "docflow starting v{}", config::APP_VERSION);

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let engine = match EngineState::initialize(config).await {
            Ok(engine) => engine,
            Err(e) => {
                tracing::error!(error = %e, "Engine initialization failed");
                return ExitCode::FAILURE;
            }
        };
        let code = match mode {
            Mode::Serve => serve(Arc::clone(&engine)).await,
            Mode::Worker => work(Arc::clone(&engine)).await,
        };
        engine.shutdown().await;
        code
    })
}

async fn serve(engine: Arc<EngineState>) -> ExitCode {
    engine.start_sweeper();
    engine.start_consumers();

    let bind = engine.config().bind_address.clone();
    let mut server = match api::start_api_server(Arc::clone(&engine), &bind).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, bind = %bind, "Failed to bind API server");
            return ExitCode::FAILURE;
        }
    };

    wait_for_signal().await;
    server.shutdown();
    server.wait().await;
    ExitCode::SUCCESS
}

async fn work(engine: Arc<EngineState>) -> ExitCode {
    if !engine.start_consumers() {
        tracing::error!("Worker mode needs a reachable Redis backend (DOCFLOW_REDIS_URL)");
        return ExitCode::FAILURE;
    }
    engine.start_sweeper();
    wait_for_signal().await;
    ExitCode::SUCCESS
}

async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
