use anyhow::Context;
use kiosk_edge::{BackgroundTasks, Config, Services, build_app, init_logger_with_file};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

/// Time each background loop gets to stop
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
/// Time in-flight print jobs get to finish
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let mock = std::env::args().any(|arg| arg == "--mock");

    let config = Config::from_env().context("invalid configuration")?;
    let _log_guard = init_logger_with_file(
        Some(&config.log_level),
        config.log_json,
        config.log_dir.as_deref(),
    );

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        device = %config.device_name,
        policy = ?config.restart_policy,
        "kiosk edge starting"
    );

    let services = Services::initialize(&config, mock)
        .await
        .context("failed to initialize services")?;

    let mut tasks = BackgroundTasks::new();
    services.start_background_tasks(&mut tasks);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "peripheral API listening");

    axum::serve(listener, build_app(&services.state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        })
        .await
        .context("HTTP server failed")?;

    // Detached jobs keep running after the server stops
    for printer in services.state.printers() {
        if tokio::time::timeout(DRAIN_TIMEOUT, printer.idle()).await.is_err() {
            tracing::warn!(printer = printer.name(), "print job still running at shutdown");
        }
    }
    // Names each loop that died while the server was up
    let lost = tasks.check_health();
    if lost > 0 {
        tracing::warn!(lost, "background loops exited before shutdown");
    }
    tasks.shutdown(SHUTDOWN_GRACE).await;

    tracing::info!("kiosk edge stopped");
    Ok(())
}
