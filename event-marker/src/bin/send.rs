//! Stream event codes to a USB Event Marker.
//!
//! Finds and configures the device, then sends the configured codes until
//! they run out or the process receives SIGINT or SIGTERM. The device may be
//! unplugged and replugged while this runs; events sent while it is away are
//! lost.

use std::process::ExitCode;

use anyhow::Context;
use tokio::signal::unix::{self, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use event_marker::config::Config;
use event_marker::error::Error;
use event_marker::locator::PortLocator;
use event_marker::streamer::{EventStreamer, SerialConnector};
use event_marker::tracing::{self, prelude::*};

#[tokio::main]
async fn main() -> ExitCode {
    tracing::init_journald_or_stderr();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            let code = e.downcast_ref::<Error>().map_or(1, Error::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    let codes = config.codes.codes()?;
    let path = PortLocator::from_config(&config)?.find().await?;

    let running = CancellationToken::new();
    let mut streamer = EventStreamer::new(SerialConnector, path, config.streamer())
        .with_cancellation(running.clone());

    info!(
        codes = ?config.codes,
        delay = ?config.event_delay,
        "Sending event codes. Press ctrl-c to quit."
    );

    let tracker = TaskTracker::new();
    let stream = tracker.spawn(async move { streamer.run(codes).await });
    tracker.close();
    info!("Started.");

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = tracker.wait() => {},
    }

    trace!("Shutting down.");
    running.cancel();

    tracker.wait().await;
    let summary = stream.await.context("event stream task failed")??;
    if summary.lost > 0 {
        warn!(lost = summary.lost, "Some event codes were lost while the device was away.");
    }
    info!("Exiting.");
    Ok(())
}
