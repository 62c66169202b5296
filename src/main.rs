use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use ecostep_telemetry::freshness::SystemClock;
use ecostep_telemetry::metrics::METRICS;
use ecostep_telemetry::{Config, Dashboard, TelemetryClient, TimePeriod};

#[derive(Parser, Debug)]
#[command(name = "ecostep_telemetry")]
#[command(about = "Polls EcoStep energy-harvesting telemetry and serves derived dashboard state", long_about = None)]
struct Args {
    /// ThingSpeak channel to read from
    #[arg(long, env = "ECOSTEP_CHANNEL_ID", default_value = "2995641")]
    channel_id: String,

    /// Read API key for the channel
    #[arg(long, env = "ECOSTEP_READ_API_KEY", default_value = "JAEGUGJX3K7ICOHQ")]
    read_api_key: String,

    /// Base URL of the telemetry API
    #[arg(long, env = "ECOSTEP_API_BASE", default_value = "https://api.thingspeak.com")]
    base_url: String,

    /// Data poll interval in seconds
    #[arg(long, env = "ECOSTEP_POLL_INTERVAL_SECS", default_value = "30")]
    poll_interval_secs: u64,

    /// Staleness check interval in seconds
    #[arg(long, default_value = "10")]
    freshness_interval_secs: u64,

    /// Grid animation tick in milliseconds
    #[arg(long, default_value = "800")]
    grid_tick_ms: u64,

    /// HTTP request timeout in seconds
    #[arg(long, default_value = "10")]
    request_timeout_secs: u64,

    /// Initial chart window (hour, day or week)
    #[arg(long, default_value = "day")]
    period: TimePeriod,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ecostep_telemetry=info".parse()?),
        )
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let args = Args::parse();

    let config = Config {
        channel_id: args.channel_id,
        read_api_key: args.read_api_key,
        base_url: args.base_url,
        poll_interval: Duration::from_secs(args.poll_interval_secs),
        freshness_interval: Duration::from_secs(args.freshness_interval_secs),
        grid_tick_interval: Duration::from_millis(args.grid_tick_ms),
        request_timeout: Duration::from_secs(args.request_timeout_secs),
    };

    let client = Arc::new(TelemetryClient::new(&config)?);
    let mut dashboard = Dashboard::new(client, Arc::new(SystemClock), config.clone(), args.period);
    dashboard.start();
    info!(channel = %config.channel_id, period = args.period.label(), "dashboard core running");

    let mut status_ticker = tokio::time::interval(config.poll_interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = status_ticker.tick() => log_snapshot(&dashboard),
        }
    }

    info!("shutting down");
    dashboard.stop();
    METRICS.lock().print_summary();

    Ok(())
}

fn log_snapshot(dashboard: &Dashboard) {
    let snapshot = dashboard.snapshot();
    match &snapshot.latest {
        Some(reading) => info!(
            voltage = reading.voltage,
            events = reading.events,
            temperature = reading.temperature,
            humidity = reading.humidity,
            light = reading.light,
            connected = snapshot.connection.is_connected,
            active_cells = snapshot.feedback.active_cells,
            battery_pct = snapshot.feedback.battery_level,
            "telemetry snapshot"
        ),
        None => match &snapshot.advisory {
            Some(advisory) => info!(%advisory, "no data yet"),
            None => info!("waiting for first reading"),
        },
    }
}
