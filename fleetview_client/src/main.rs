//! FleetView demo client
//!
//! Runs a whole fleet in one process: N simulated drivers publishing
//! random-walk positions, an in-process relay standing in for the
//! server, and one viewer session rendering the fleet to the console.

use anyhow::Result;
use clap::Parser;
use fleetview_core::{
    IdentityPolicy, PositionPublisher, ReconcilerConfig, SessionConfig, TrackingSession,
    WatchOptions, WireMode,
};
use fleetview_env::{loopback_pair, ChannelConfig, EventChannel, TokioContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod location;
mod relay;
mod widget;

use location::SimulatedLocationSource;
use relay::RelayHub;
use widget::ConsoleMapWidget;

/// FleetView live-tracking demo
#[derive(Parser, Debug)]
#[command(name = "fleetview-client")]
#[command(about = "Simulated drivers publishing live positions to a viewer", long_about = None)]
struct Args {
    /// Channel endpoint URL
    #[arg(long, env = "FLEETVIEW_ENDPOINT", default_value = "loopback://demo")]
    endpoint: String,

    /// Send credentials/cookies with the channel handshake
    #[arg(long)]
    with_credentials: bool,

    /// Wire shape for driver:update messages (snapshot, delta)
    #[arg(short, long, default_value = "snapshot")]
    mode: WireMode,

    /// Number of simulated drivers
    #[arg(short, long, default_value = "3")]
    drivers: usize,

    /// Demo duration in seconds
    #[arg(long, default_value = "10")]
    duration: u64,

    /// Evict drivers silent for this many seconds (delta mode)
    #[arg(long)]
    stale_after: Option<u64>,

    /// Transient sensor-error injection rate (0.0 - 1.0)
    #[arg(long, default_value = "0.1")]
    error_rate: f64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("FleetView demo client v0.1.0");
    info!(
        endpoint = %args.endpoint,
        drivers = args.drivers,
        mode = ?args.mode,
        "Starting fleet"
    );

    let mut channel_config = ChannelConfig::new(args.endpoint.clone());
    if args.with_credentials {
        channel_config = channel_config.with_credentials();
    }

    let mut hub = RelayHub::new(args.mode);
    let ctx = TokioContext::shared();

    // Background drivers: standalone publishers on their own channels
    let mut driver_channels = Vec::with_capacity(args.drivers);
    for i in 0..args.drivers {
        let (end, peer) = loopback_pair(channel_config.clone());
        hub.attach(peer);

        let end = Arc::new(end);
        driver_channels.push(end.clone());

        // Spread starting points around central Budapest
        let start = (47.4979 + i as f64 * 0.002, 19.0402 - i as f64 * 0.002);
        let source = SimulatedLocationSource::new(start).with_error_rate(args.error_rate);
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let mut publisher = PositionPublisher::new(
                IdentityPolicy::PerSession.provision(),
                end,
                WatchOptions::default(),
            );
            publisher.run(&source, ctx.as_ref()).await;
        });
    }

    // The viewer: a full session that publishes its own position too
    let (end, peer) = loopback_pair(channel_config.clone());
    hub.attach(peer);

    let session_config = SessionConfig {
        reconciler: ReconcilerConfig {
            mode: args.mode,
            stale_after: args.stale_after.map(Duration::from_secs),
        },
        ..Default::default()
    };

    let map = ConsoleMapWidget::new();
    let mut session = TrackingSession::new(ctx.clone(), end, session_config, map.clone());
    let viewer_channel = session.channel();

    let viewer = tokio::spawn(async move {
        let source = SimulatedLocationSource::new((47.4979, 19.0402));
        session.run(&source).await;
        session
    });

    let hub_task = tokio::spawn(hub.run());

    tokio::time::sleep(Duration::from_secs(args.duration)).await;

    // Teardown: close every session-side end; forwarders and the hub
    // drain and stop once the senders are gone
    for channel in &driver_channels {
        channel.close();
    }
    drop(driver_channels);
    viewer_channel.close();

    let session = viewer.await?;
    hub_task.await?;

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        driver = %session.driver_id(),
        markers_placed = map.placed(),
        markers_removed = map.removed(),
        "Demo finished"
    );
    if let Some(sample) = session.last_sample() {
        if let Some((lat, lng)) = sample.coords() {
            info!("Own last position: ({lat:.5}, {lng:.5})");
        }
    }

    Ok(())
}
