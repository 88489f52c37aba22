//! Entry point for the account server.
use account_backend::{
    auth::session_store::spawn_cleanup_task,
    config::{Settings, StorageBackend, DEFAULT_CONFIG_FILE},
    epoch::ProcessEpoch,
    logging, router, AppState,
};
use anyhow::Context;
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::net::TcpListener;

/// How often expired sessions and stale login failures are swept
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Parser)]
#[command(name = "account-server", version, about = "Login, signup and logout over server-side sessions")]
struct Args {
    /// Configuration file
    #[arg(long, env = "ACCOUNT_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Env file loaded before configuration; a missing file is ignored
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Override `server.host`
    #[arg(long)]
    host: Option<String>,

    /// Override `server.port`
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Err(e) = dotenv::from_path(&args.env_file) {
        if !e.not_found() {
            return Err(anyhow::Error::new(e).context(format!("failed to read {}", args.env_file.display())));
        }
    }

    let mut settings = Settings::load_from(&args.config)?;
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    logging::init(&settings)?;

    // Sessions stamped with any other value are logged out on their next request
    let epoch = ProcessEpoch::now();
    let addr = settings.bind_addr()?;

    tracing::info!(
        %epoch,
        backend = ?settings.storage.backend,
        debug = settings.debug,
        "starting account server"
    );

    match settings.storage.backend {
        StorageBackend::File => {
            let state = AppState::with_file_storage(settings, epoch)?;
            serve(state, addr).await
        },
        StorageBackend::Memory => serve(AppState::with_memory_storage(settings, epoch), addr).await,
    }
}

async fn serve<S>(state: AppState<S>, addr: SocketAddr) -> anyhow::Result<()>
where
    S: account_backend::storage::UserStore + Clone + 'static,
{
    let sweeper = spawn_cleanup_task(state.sessions.clone(), SESSION_SWEEP_INTERVAL);
    let limiter = state.login_limiter.clone();
    let limiter_sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            limiter.cleanup();
        }
    });
    let app = router::create_router(Arc::new(state));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    limiter_sweeper.abort();
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
