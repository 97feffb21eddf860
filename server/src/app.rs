//! Process wiring: hub task, HTTP server, graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use postpulse_core::{HubError, PostSource};
use postpulse_sse::{EventHub, WindowedCollector};

use crate::config::AppConfig;
use crate::http::{self, AppState};

/// Why the serve loop stopped.
enum Exit {
    Signal,
    Feed(Result<Result<(), HubError>, tokio::task::JoinError>),
    Server(Result<std::io::Result<()>, tokio::task::JoinError>),
}

/// Run until SIGINT/SIGTERM or until the hub gives up on the upstream.
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let hub = Arc::new(EventHub::new(config.sse.clone()).context("can't create SSE client")?);
    let source: Arc<dyn PostSource> = Arc::new(WindowedCollector::new(Arc::clone(&hub)));
    let state = AppState::new(Arc::clone(&hub), source, &config.router.analysis_handler_config);

    let addr = config.router.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("can't bind {addr}"))?;
    info!(%addr, upstream = %hub.url(), "REST API listening");

    let mut feed: JoinHandle<Result<(), HubError>> = tokio::spawn({
        let hub = Arc::clone(&hub);
        async move { hub.listen().await }
    });

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = axum::serve(listener, http::router(state)).with_graceful_shutdown(async move {
        let _ = stop_rx.changed().await;
    });
    let mut server: JoinHandle<std::io::Result<()>> = tokio::spawn(async move { server.await });

    let exit = tokio::select! {
        _ = shutdown_signal() => Exit::Signal,
        res = &mut feed => Exit::Feed(res),
        res = &mut server => Exit::Server(res),
    };

    let mut failure = None;
    match &exit {
        Exit::Signal => info!("shutdown requested"),
        Exit::Feed(Ok(Ok(()))) => warn!("SSE client stopped"),
        Exit::Feed(Ok(Err(e))) if e.is_terminal() => {
            error!(error = %e, "SSE client gave up on the upstream, shutting down");
            failure = Some(anyhow!("event hub failed: {e}"));
        }
        Exit::Feed(Ok(Err(e))) => {
            error!(error = %e, "SSE client error, shutting down");
            failure = Some(anyhow!("event hub stopped unexpectedly: {e}"));
        }
        Exit::Feed(Err(e)) => failure = Some(anyhow!("event hub task failed: {e}")),
        Exit::Server(Ok(Ok(()))) => warn!("HTTP server stopped"),
        Exit::Server(Ok(Err(e))) => failure = Some(anyhow!("HTTP server failed: {e}")),
        Exit::Server(Err(e)) => failure = Some(anyhow!("HTTP server task failed: {e}")),
    }

    // Drain in-flight requests first; their windows still need the hub.
    let _ = stop_tx.send(true);
    if !matches!(exit, Exit::Server(_)) {
        let grace = Duration::from_secs(config.router.shutdown_timeout);
        if tokio::time::timeout(grace, &mut server).await.is_err() {
            warn!(timeout_secs = grace.as_secs(), "shutdown timeout elapsed, aborting in-flight requests");
            server.abort();
        }
    }

    hub.close();
    if !matches!(exit, Exit::Feed(_)) {
        if let Err(e) = feed.await {
            warn!(error = %e, "event hub task ended abnormally");
        }
    }

    info!("shutdown complete");
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "can't listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "can't listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
