//! membersync service entry point.

use std::future::Future;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use membersync::config::AppConfig;
use membersync::logging::init_logging;
use membersync::{build_scheduler, router, AppState};

fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config.rust_log);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.sync.worker_threads)
        .thread_name("membersync-worker")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to build runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(serve(config));
}

async fn serve(config: AppConfig) {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        groups = ?config.target_groups,
        interval_secs = config.sync.interval.as_secs(),
        worker_threads = config.sync.worker_threads,
        "Starting membersync"
    );

    let bind_addr = config.bind_addr();
    let scheduler = match build_scheduler(config) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("Startup failed: {e}");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let periodic = tokio::spawn(
        std::sync::Arc::clone(&scheduler).run_periodic(wait_for_shutdown(shutdown_rx)),
    );

    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {bind_addr}: {e}");
            std::process::exit(1);
        }
    };
    info!("Listening on {bind_addr}");

    let app = router(AppState::new(scheduler));
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
    {
        error!("Server error: {e}");
        std::process::exit(1);
    }

    if let Err(e) = periodic.await {
        error!("Periodic sync task failed: {e}");
    }
    info!("Server shutdown complete");
}

/// Resolves once the shutdown flag is set or its sender is gone.
fn wait_for_shutdown(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> {
    async move {
        loop {
            let stop = *rx.borrow_and_update();
            if stop || rx.changed().await.is_err() {
                return;
            }
        }
    }
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }

    // Stops the periodic trigger; an in-flight cycle is abandoned.
    let _ = shutdown_tx.send(true);
}
