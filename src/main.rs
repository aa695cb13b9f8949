use courier_server::api::MgmtState;
use courier_server::config::Config;
use courier_server::{AppBuilder, telemetry};
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    courier_server::setup_panic_hook();

    let boot_span = tracing::info_span!("boot_server");
    let (api_listener, mgmt_listener, app_router, mgmt_app, shutdown_tx, shutdown_rx) = async {
        // Phase 1: resources
        let store = courier_server::init_store(&config.database).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        courier_server::spawn_signal_handler(shutdown_tx.clone());

        // Phase 2: wiring
        let services = AppBuilder::new(config.clone()).with_store(store).build()?;

        // Phase 3: listeners and routers
        let app_router = courier_server::api::app_router(&services);
        let mgmt_app = courier_server::api::mgmt_router(MgmtState { health_service: services.health_service });

        let api_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        let mgmt_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.mgmt_port).parse()?;

        tracing::info!(address = %api_addr, "listening");
        tracing::info!(address = %mgmt_addr, "management server listening");

        let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
        let mgmt_listener = tokio::net::TcpListener::bind(mgmt_addr).await?;

        Ok::<
            (
                tokio::net::TcpListener,
                tokio::net::TcpListener,
                axum::Router,
                axum::Router,
                watch::Sender<bool>,
                watch::Receiver<bool>,
            ),
            anyhow::Error,
        >((api_listener, mgmt_listener, app_router, mgmt_app, shutdown_tx, shutdown_rx))
    }
    .instrument(boot_span)
    .await?;

    // Phase 4: serve
    let mut api_rx = shutdown_rx.clone();
    let api_server = axum::serve(api_listener, app_router).with_graceful_shutdown(async move {
        let _ = api_rx.wait_for(|&s| s).await;
    });

    let mut mgmt_rx = shutdown_rx.clone();
    let mgmt_server = axum::serve(mgmt_listener, mgmt_app).with_graceful_shutdown(async move {
        let _ = mgmt_rx.wait_for(|&s| s).await;
    });

    let drain_timeout = std::time::Duration::from_secs(config.server.shutdown_timeout_secs);
    let mut drain_rx = shutdown_rx;
    tokio::select! {
        result = async { tokio::try_join!(api_server, mgmt_server) } => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Server error");
            }
        }
        () = async {
            let _ = drain_rx.wait_for(|&s| s).await;
            tokio::time::sleep(drain_timeout).await;
        } => {
            tracing::warn!("Timeout waiting for in-flight requests to finish");
        }
    }

    // Phase 5: shutdown
    let _ = shutdown_tx.send(true);
    tracing::info!("Shutdown complete");
    telemetry_guard.shutdown();
    Ok(())
}
