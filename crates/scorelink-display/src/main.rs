//! ScoreLink display client — entry point.
//!
//! Wires together the availability monitor, server discovery, media sync,
//! score channel, and the optional timer peripheral link, then runs the
//! session loop on the Tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ PeripheralLink::start()     -- serial probe + frame pump (own thread)
//!  └─ session loop
//!       ├─ poll network_available()        every 3 s until true
//!       ├─ ServerDiscoverer::discover()    on a timer until a reply arrives
//!       ├─ UpdateMediaUseCase::run_all()   one sync session per category
//!       └─ score event loop                payloads -> ScoreChannel -> sink
//!            └─ on disconnect: back to the availability poll
//! ```
//!
//! Failure behavior is textual: every recoverable problem becomes a status
//! line on the display sink ("waiting for network", "media logos sync
//! failed: ..."), and the session loop starts over.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use scorelink_display::application::{
    MediaTarget, ScoreChannel, TextDisplaySink, UpdateMediaUseCase,
};
use scorelink_display::infrastructure::network::score::{
    self, ScoreConnectionConfig, ScoreEvent,
};
use scorelink_display::infrastructure::network::{
    interfaces::network_available, DiscoveryConfig, ServerDiscoverer,
};
use scorelink_display::infrastructure::storage::config::{
    config_file_path, load_config, AppConfig,
};
use scorelink_display::infrastructure::timer_link::{
    serial::SerialScanner, LinkConfig, LinkEvent, PeripheralLink,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// ScoreLink scoreboard display client.
///
/// Discovers the scoreboard server on the local network, mirrors its media
/// files, and shows live scores and the peripheral game clock.
#[derive(Debug, Parser)]
#[command(
    name = "scorelink-display",
    about = "Networked scoreboard display client",
    version
)]
struct Cli {
    /// Path to the TOML config file; the platform default location is used
    /// when omitted.
    #[arg(long, env = "SCORELINK_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory for synchronized media (overrides the config file).
    #[arg(long, env = "SCORELINK_MEDIA_ROOT")]
    media_root: Option<String>,

    /// Log level (overrides the config file): error, warn, info, debug, trace.
    #[arg(long, env = "SCORELINK_LOG")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the config file and applies the CLI overrides.
    fn resolve_config(&self) -> anyhow::Result<AppConfig> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => config_file_path().context("cannot resolve platform config directory")?,
        };
        let mut config = load_config(&path)
            .with_context(|| format!("cannot load config from {}", path.display()))?;
        if let Some(root) = &self.media_root {
            config.display.media_root = root.clone();
        }
        if let Some(level) = &self.log_level {
            config.display.log_level = level.clone();
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    // RUST_LOG wins over the configured level when set.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.display.log_level.clone())),
        )
        .init();

    info!("ScoreLink display starting");

    let group: Ipv4Addr = config
        .network
        .discovery_group
        .parse()
        .with_context(|| format!("invalid discovery group {:?}", config.network.discovery_group))?;
    let poll = Duration::from_millis(config.network.poll_interval_ms);

    // ── Shutdown / interruption flags ─────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    // The sync engines check this at every inbound frame.
    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let running = Arc::clone(&running);
        let interrupt = Arc::clone(&interrupt);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                running.store(false, Ordering::Relaxed);
                interrupt.store(true, Ordering::Relaxed);
            }
        });
    }

    let channel = Arc::new(ScoreChannel::new(TextDisplaySink));

    // ── Timer peripheral link ─────────────────────────────────────────────────
    // Independent of the server: probed once at startup, pumping clock text
    // until shutdown. When no device answers, the feature silently stays off.
    let _link = if config.timer.enabled {
        let (link_tx, mut link_rx) = mpsc::channel(64);
        let link_config = LinkConfig {
            baud: config.timer.baud,
            settle: Duration::from_millis(config.timer.settle_ms),
            response_timeout: Duration::from_millis(config.timer.response_timeout_ms),
        };
        let scanner = SerialScanner::new(config.timer.port_pattern.clone());
        let link = PeripheralLink::start(
            Box::new(scanner),
            link_config,
            link_tx,
            Arc::clone(&running),
        );

        let channel = Arc::clone(&channel);
        tokio::spawn(async move {
            while let Some(event) = link_rx.recv().await {
                match event {
                    LinkEvent::ClockText(text) => channel.handle_clock_text(&text),
                    LinkEvent::Connected { port } => {
                        channel.handle_status(&format!("timer connected on {port}"));
                    }
                    LinkEvent::Unavailable => debug!("timer peripheral unavailable"),
                    LinkEvent::Closed => break,
                }
            }
        });
        Some(link)
    } else {
        None
    };

    // ── Media / score session loop ────────────────────────────────────────────
    let media = UpdateMediaUseCase::new(
        MediaTarget::from_config(&config),
        config.network.scheme.clone(),
    );

    'session: while running.load(Ordering::Relaxed) {
        // Wait for a usable interface; polling stops once one exists and
        // resumes only when the server connection is lost.
        channel.handle_status("waiting for network");
        while !network_available() {
            if !running.load(Ordering::Relaxed) {
                break 'session;
            }
            tokio::time::sleep(poll).await;
        }

        // One-shot discovery, retried on the poll timer until a reply lands.
        channel.handle_status("searching for server");
        let (discovery_tx, mut discovery_rx) = mpsc::channel(32);
        let mut discoverer = ServerDiscoverer::new(
            DiscoveryConfig {
                group,
                port: config.network.discovery_port,
                service_port: config.network.score_port,
                scheme: config.network.scheme.clone(),
                dedupe_endpoints: config.network.dedupe_endpoints,
            },
            discovery_tx,
        );
        if let Some(name) = &config.display.client_name {
            discoverer = discoverer.with_host_name(name.clone());
        }

        let endpoint = loop {
            if !running.load(Ordering::Relaxed) {
                discoverer.stop();
                break 'session;
            }
            if !discoverer.discover() {
                // Interfaces vanished between checks; back to availability
                // polling.
                warn!("server discovery not started: no qualifying interfaces");
                discoverer.stop();
                continue 'session;
            }
            tokio::select! {
                event = discovery_rx.recv() => match event {
                    Some(event) => break event.endpoint,
                    None => {
                        discoverer.stop();
                        continue 'session;
                    }
                },
                _ = tokio::time::sleep(poll) => continue,
            }
        };
        // Connection is about to be established; release every discovery
        // socket.
        discoverer.stop();
        info!("using server {endpoint}");

        // Mirror both media categories before showing scores.
        media
            .run_all(&endpoint.host, Arc::clone(&interrupt), &*channel)
            .await;

        // Score session: runs until the server goes away.
        let mut score_rx = score::start(
            ScoreConnectionConfig {
                endpoint: endpoint.clone(),
            },
            Arc::clone(&running),
        );
        loop {
            tokio::select! {
                event = score_rx.recv() => match event {
                    Some(ScoreEvent::Connected) => channel.handle_status("connected"),
                    Some(ScoreEvent::PayloadReceived(payload)) => channel.handle_payload(&payload),
                    Some(ScoreEvent::Disconnected) | None => {
                        channel.handle_status("server connection lost");
                        break;
                    }
                },
                _ = tokio::time::sleep(poll) => {
                    if !running.load(Ordering::Relaxed) {
                        break;
                    }
                }
            }
        }
        // Errored closure of the score session: recheck the network and
        // rediscover.
    }

    info!("ScoreLink display stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
