use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use hallmon_server::collector::{run_collector, run_watchdog};
use hallmon_server::{
    Config, DeviceConfig, DeviceReceiver, MockDeviceReceiver, ServerState, WebSocketDeviceReceiver,
    dashboard,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "hallmon-server")]
#[command(about = "Hall sensor telemetry server and live dashboard")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "hallmon-server.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "tracing=info,hallmon_server=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    info!(
        dashboard_addr = %config.dashboard.addr,
        site_dir = ?config.dashboard.site_dir,
        "Starting hallmon-server"
    );

    let state = ServerState::new(config.sensor, config.rpm);

    match &config.device {
        DeviceConfig::Websocket { addr, path } => {
            let receiver = WebSocketDeviceReceiver::new(*addr, path.clone());
            run_server(receiver, config, state).await?;
        }
        DeviceConfig::Mock { interval_ms, rpm } => {
            info!(interval_ms, rpm, "Using mock device receiver");
            let receiver = MockDeviceReceiver::new(*interval_ms, *rpm);
            run_server(receiver, config, state).await?;
        }
    }

    Ok(())
}

async fn run_server<D: DeviceReceiver>(
    receiver: D,
    config: Config,
    state: ServerState,
) -> color_eyre::Result<()> {
    let cancel = CancellationToken::new();

    let device_rx = receiver.start(cancel.clone()).await?;

    let collector_handle = tokio::spawn(run_collector(device_rx, state.clone(), cancel.clone()));

    let watchdog_interval = Duration::from_millis(config.watchdog.interval_ms.max(1));
    let watchdog_handle = tokio::spawn(run_watchdog(
        state.clone(),
        watchdog_interval,
        cancel.clone(),
    ));

    let dashboard_addr = config.dashboard.addr;
    let app = dashboard::router(state, &config.dashboard.site_dir);
    let listener = TcpListener::bind(dashboard_addr).await?;
    info!(%dashboard_addr, "Dashboard listening");

    let cancel_for_http = cancel.clone();

    tokio::select! {
        result = axum::serve(listener, app).with_graceful_shutdown(async move {
            cancel_for_http.cancelled().await;
        }) => {
            if let Err(e) = result {
                error!(error = ?e, "Dashboard server error");
            }
            info!("Dashboard server shut down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    cancel.cancel();

    let _ = collector_handle.await;
    let _ = watchdog_handle.await;

    info!("hallmon-server shut down complete");
    Ok(())
}
