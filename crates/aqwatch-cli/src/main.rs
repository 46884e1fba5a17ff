use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use aqwatch_core::render::local_time_label;
use aqwatch_core::{
    spawn_subscription, Actuator, Commander, DashboardConfig, DeviceMirror, DeviceStore,
    DisplayMode, DisplayModel, FirebaseStore, SensorSnapshot, StoreEvent,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod viewer;

#[derive(Debug, Parser)]
#[command(name = "aqwatchd")]
#[command(about = "Air quality device dashboard backed by a Firebase Realtime Database")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, env = "AQWATCH_DATABASE_URL", default_value = "https://localhost.firebaseio.com")]
    database_url: String,

    #[arg(long, default_value = aqwatch_core::config::DEFAULT_DEVICE_ID)]
    device_id: String,

    #[arg(long, env = "AQWATCH_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    #[arg(long, default_value_t = 3_000)]
    reconnect_delay_ms: u64,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the record once and print it.
    Once {
        #[arg(long, value_enum, default_value = "human")]
        format: OnceFormat,
    },
    /// Follow the record and print every change.
    Watch {
        #[arg(long, value_enum, default_value = "human")]
        format: StreamFormat,
    },
    /// Interactive terminal dashboard.
    View,
    /// Toggle the sprinkler.
    Sprinkler,
    /// Toggle the buzzer.
    Buzzer,
    /// Clear the fire and smoke alarms.
    Ack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnceFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StreamFormat {
    Human,
    Ndjson,
}

#[derive(Debug, Clone, Copy)]
enum OutputFormat {
    Human,
    Json,
    Ndjson,
}

impl From<OnceFormat> for OutputFormat {
    fn from(format: OnceFormat) -> Self {
        match format {
            OnceFormat::Human => OutputFormat::Human,
            OnceFormat::Json => OutputFormat::Json,
        }
    }
}

impl From<StreamFormat> for OutputFormat {
    fn from(format: StreamFormat) -> Self {
        match format {
            StreamFormat::Human => OutputFormat::Human,
            StreamFormat::Ndjson => OutputFormat::Ndjson,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let config = DashboardConfig {
        database_url: cli.database_url,
        device_id: cli.device_id,
        auth_token: cli.auth_token,
        request_timeout: Duration::from_millis(cli.timeout_ms),
        reconnect_delay: Duration::from_millis(cli.reconnect_delay_ms),
        ..DashboardConfig::default()
    };

    let store = Arc::new(FirebaseStore::new(&config)?);

    match cli.command {
        Command::Once { format } => {
            let raw = store.fetch().await?;
            print_snapshot(SensorSnapshot::from_value(&raw).as_ref(), format.into())?;
        }
        Command::Watch { format } => {
            watch_loop(store, &config, format.into()).await?;
        }
        Command::View => {
            viewer::run_viewer(store, &config).await?;
        }
        Command::Sprinkler => {
            let commander = primed_commander(store).await?;
            commander.toggle(Actuator::Sprinkler).await?;
        }
        Command::Buzzer => {
            let commander = primed_commander(store).await?;
            commander.toggle(Actuator::Buzzer).await?;
        }
        Command::Ack => {
            let commander = primed_commander(store).await?;
            commander.acknowledge_fire().await?;
        }
    }

    Ok(())
}

/// One-shot commands have no running subscription, so the mirror is filled
/// from a single fetch first.
async fn primed_commander<S>(store: Arc<S>) -> Result<Commander<S>>
where
    S: DeviceStore + 'static,
{
    let raw = store.fetch().await?;
    let mirror = DeviceMirror::new();
    mirror.replace(SensorSnapshot::from_value(&raw));
    Ok(Commander::new(store, mirror.reader()))
}

async fn watch_loop<S>(store: Arc<S>, config: &DashboardConfig, format: OutputFormat) -> Result<()>
where
    S: DeviceStore + 'static,
{
    let (mut inbox, subscription) = spawn_subscription(store, config.inbox_capacity);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("received ctrl-c, stopping");
                break;
            }
            event = inbox.recv() => {
                match event {
                    Some(StoreEvent::Snapshot(raw)) => {
                        let snapshot = raw.as_ref().and_then(SensorSnapshot::from_value);
                        if snapshot.is_some() {
                            print_snapshot(snapshot.as_ref(), format)?;
                        }
                        info!(present = %snapshot.is_some(), "snapshot");
                    }
                    Some(StoreEvent::Error(reason)) => {
                        warn!(%reason, "error reading device record");
                    }
                    None => break,
                }
            }
        }
    }

    subscription.abort();
    Ok(())
}

fn print_snapshot(snapshot: Option<&SensorSnapshot>, format: OutputFormat) -> Result<()> {
    let Some(snapshot) = snapshot else {
        match format {
            OutputFormat::Human => println!("No device record."),
            OutputFormat::Json | OutputFormat::Ndjson => println!("null"),
        }
        return Ok(());
    };

    let display = DisplayModel::from_snapshot(snapshot);
    let out = serde_json::json!({
        "time": local_time_label(),
        "snapshot": snapshot,
        "display": display,
    });

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Ndjson => {
            println!("{}", serde_json::to_string(&out)?);
        }
        OutputFormat::Human => {
            let c = &display.classification;
            println!("=== Device Snapshot ({}) ===", local_time_label());
            println!("Status:      {}", display.status_label);
            println!("{:<12} {} -> {} [{}]", "Air:", display.aqi_label, c.category_label, c.category_class.as_str());
            println!("Air Score:   {:>3}% {}", c.score, score_bar(c.score));
            println!("Temperature: {} °C", display.temperature);
            println!("Humidity:    {} %", display.humidity);
            println!("Noise:       {} dB", display.noise);
            println!("PM2.5:       {} µg/m³", display.pm25);
            println!("Sprinkler:   {}", display.sprinkler);
            println!("Buzzer:      {}", display.buzzer);
            if display.fire_alert == DisplayMode::Block {
                println!("!!! FIRE / SMOKE DETECTED (fire={} smoke={}) !!!", snapshot.fire, snapshot.smoke);
            }
        }
    }

    Ok(())
}

fn score_bar(score: u8) -> String {
    let filled = usize::from(score.min(100)) / 5;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(20 - filled))
}
