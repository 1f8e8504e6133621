use std::error::Error;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use accounts::{app, config, initialize_state, rpc, telemetry};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;

const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Read configuration file.
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.yaml".into());
    let config = config::Configuration::default().path(path).read()?;

    telemetry::setup_tracing(!config.is_local());
    if config.is_loaded() {
        tracing::info!(path = %config.file().display(), "configuration loaded");
    } else {
        tracing::warn!(path = %config.file().display(), "configuration file not found, using defaults");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = match telemetry::setup_metrics_recorder(shutdown_rx.clone()) {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(%err, "prometheus recorder not installed, /metrics disabled");
            None
        },
    };

    let state = match initialize_state(Arc::clone(&config), metrics).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(%err, database = %config.database, "cannot initialize application state");
            return Err(err);
        },
    };

    let mut poller = config
        .poller
        .run
        .then(|| state.health.spawn_poller(config.poller.interval, shutdown_rx.clone()));

    let http_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.http_port));
    let grpc_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.grpc_port));
    let listener = TcpListener::bind(http_addr).await?;

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut http_shutdown = shutdown_rx.clone();
    let http = axum::serve(listener, app(state.clone())).with_graceful_shutdown(async move {
        let _ = http_shutdown.wait_for(|stop| *stop).await;
        tracing::info!("http server stopping");
    });

    let mut grpc_shutdown = shutdown_rx.clone();
    let grpc = tonic::transport::Server::builder()
        .add_service(rpc::server(&state))
        .serve_with_shutdown(grpc_addr, async move {
            let _ = grpc_shutdown.wait_for(|stop| *stop).await;
            tracing::info!("grpc server stopping");
        });

    tracing::info!(
        %http_addr,
        %grpc_addr,
        database = %config.database,
        version = %config.version,
        "server started"
    );

    tokio::try_join!(
        async { http.await },
        async { grpc.await.map_err(std::io::Error::other) },
    )?;

    if let Some(poller) = poller.as_mut() {
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut *poller).await.is_err() {
            tracing::warn!("health poller did not stop in time");
            poller.abort();
        }
    }

    tracing::info!("server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(%err, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(err) => {
                tracing::error!(%err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
