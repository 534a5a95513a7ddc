use std::{
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::{Context, Result};
use bridge_core::{
    config::{load_settings_from, settings_path},
    local_host::DEFAULT_DENIAL_MESSAGE,
    unwrap_envelope, AckMode, HostLayout, HostRejection, LocalHost, NotificationBridge,
    StatusReporter,
};
use clap::{Parser, ValueEnum};
use serde_json::Value;
use shared::protocol::{ConnectionArgs, ConnectionSettings, NotificationWindowArgs};
use tokio::{
    fs::File,
    io::{self, AsyncBufRead, AsyncBufReadExt, BufReader},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Feeds newline-delimited JSON frames through the notification bridge of an
/// in-process host and prints every notification window it asks for.
#[derive(Parser, Debug)]
struct Args {
    /// Settings file; defaults to ./bridge.toml, then the user config dir.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Read frames from this file instead of stdin.
    #[arg(long)]
    file: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Shape::Modern)]
    shape: Shape,
    /// Acknowledge listens after this many milliseconds instead of at once.
    #[arg(long)]
    deferred_ack_ms: Option<u64>,
    /// Refuse listen calls the way a host without event permission does.
    #[arg(long)]
    deny_listen: bool,
    /// Number of probes that see no host object.
    #[arg(long, default_value_t = 0)]
    inject_after: u32,
    #[arg(long, requires = "token")]
    server_url: Option<String>,
    #[arg(long, requires = "server_url")]
    token: Option<String>,
    #[arg(long)]
    test_notification: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Shape {
    Modern,
    ModernFlat,
    Legacy,
    Both,
}

impl Shape {
    fn layout(self) -> HostLayout {
        match self {
            Shape::Modern => HostLayout::modern(),
            Shape::ModernFlat => HostLayout::modern_flat(),
            Shape::Legacy => HostLayout::legacy(),
            Shape::Both => HostLayout::both(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let settings = load_settings_from(&settings_path(args.config.clone()), |key| {
        std::env::var(key).ok()
    });
    info!(?settings, "settings loaded");

    let host = build_host(&args);
    let status = StatusReporter::new(settings.status_display());
    print_status_changes(&status);

    let bridge = match NotificationBridge::start(Arc::new(host.clone()), &settings, status).await {
        Ok(bridge) => bridge,
        Err(error) if error.kind().is_terminal_for_setup() => {
            error!(%error, kind = ?error.kind(), "notifications disabled for this session");
            return Ok(());
        }
        Err(error) => return Err(error).context("notification bridge failed to start"),
    };

    if let (Some(server_url), Some(token)) = (args.server_url.clone(), args.token.clone()) {
        let connection =
            ConnectionSettings::new(server_url, token, settings.notification_timeout_seconds);
        bridge.commands().save_config(&connection).await?;
        bridge.commands().start_connection(&connection).await?;
    }
    if args.test_notification {
        bridge.commands().send_test_notification().await?;
    }

    let emitted = match &args.file {
        Some(path) => {
            let file = File::open(path)
                .await
                .with_context(|| format!("failed to open frame file '{}'", path.display()))?;
            pump_frames(BufReader::new(file), &host, &settings.channel).await?
        }
        None => pump_frames(BufReader::new(io::stdin()), &host, &settings.channel).await?,
    };
    info!(emitted, "input exhausted");

    if bridge.commands().is_connected() {
        bridge.commands().stop_connection().await?;
    }
    bridge.shutdown().await;
    Ok(())
}

fn build_host(args: &Args) -> LocalHost {
    let mut builder = LocalHost::builder(args.shape.layout()).inject_after_probes(args.inject_after);
    if let Some(ms) = args.deferred_ack_ms {
        builder = builder.ack(AckMode::Deferred(Duration::from_millis(ms)));
    }
    if args.deny_listen {
        builder = builder.deny_listen(DEFAULT_DENIAL_MESSAGE);
    }
    let host = builder.build();
    register_commands(&host);
    host
}

fn register_commands(host: &LocalHost) {
    let saved: Arc<Mutex<Option<ConnectionSettings>>> = Arc::default();

    let store = Arc::clone(&saved);
    host.register_command("load_config", move |_| {
        let current = store.lock().unwrap_or_else(PoisonError::into_inner).clone();
        match current {
            Some(settings) => serde_json::to_value(settings).map_err(rejection),
            None => Ok(Value::Null),
        }
    });

    let store = Arc::clone(&saved);
    host.register_command("save_config", move |args| {
        let args: ConnectionArgs = serde_json::from_value(args).map_err(rejection)?;
        *store.lock().unwrap_or_else(PoisonError::into_inner) = Some(ConnectionSettings::new(
            args.server_url,
            args.token,
            args.timeout_seconds,
        ));
        Ok(Value::Null)
    });

    host.register_command("start_gotify_connection", |args| {
        let args: ConnectionArgs = serde_json::from_value(args).map_err(rejection)?;
        info!(server_url = %args.server_url, "upstream connection requested");
        Ok(Value::Null)
    });

    host.register_command("stop_gotify_connection", |_| {
        info!("upstream connection closed");
        Ok(Value::Null)
    });

    host.register_command("create_notification_window", |args| {
        let window: NotificationWindowArgs = serde_json::from_value(args).map_err(rejection)?;
        println!(
            "[p{}] {}: {} ({}s)",
            window.priority, window.title, window.message, window.timeout_seconds
        );
        Ok(Value::Null)
    });
}

fn rejection(error: serde_json::Error) -> HostRejection {
    HostRejection::new(error.to_string())
}

fn print_status_changes(status: &StatusReporter) {
    let mut updates = status.subscribe();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            if let Some(line) = updates.borrow_and_update().clone() {
                eprintln!("status [{:?}] {}", line.kind, line.message);
            }
        }
    });
}

async fn pump_frames<R>(reader: R, host: &LocalHost, channel: &str) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut emitted = 0;
    while let Some(line) = lines.next_line().await.context("failed to read frame")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let frame: Value = match serde_json::from_str(line) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "skipping frame that is not JSON");
                continue;
            }
        };
        if host.emit(channel, unwrap_envelope(frame)) == 0 {
            warn!(%channel, "no listener on channel; frame dropped");
        }
        emitted += 1;
    }
    Ok(emitted)
}
