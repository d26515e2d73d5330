//! Event code streaming with reconnect.
//!
//! [`EventStreamer`] owns the channel to one device and writes one byte per
//! event, flushing each before the next. Write failures drop the channel and
//! send the streamer back to connecting; the event being written is lost and
//! never resent. Opening is retried at a fixed interval without limit, since
//! the device may take human-scale time to be replugged.
//!
//! ```text
//!  Disconnected ──open──▶ Connecting ──ok──▶ Connected ──send──▶ Connected
//!                           ▲    │ err, wait                │
//!                           └────┘                          │ write error
//!                           ▲                               │
//!                           └───────────────────────────────┘
//!  any state ──close/cancel──▶ Closed
//! ```
//!
//! Cancellation is observed while waiting to retry and between sends. A send
//! that has started always runs to completion or failure.

mod connector;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::tracing::prelude::*;
use crate::types::EventCode;

pub use connector::{Connector, SerialConnector};

/// Timing and line settings for a streamer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamerConfig {
    /// Must match the firmware's `Serial.begin()` rate.
    pub baud_rate: u32,
    /// Pause between failed connection attempts.
    pub retry_interval: Duration,
    /// Pause after each event.
    pub event_delay: Duration,
}

/// Where the streamer is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Disconnected => "disconnected",
            StreamState::Connecting => "connecting",
            StreamState::Connected => "connected",
            StreamState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Outcome of [`EventStreamer::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Codes written and flushed.
    pub sent: u64,
    /// Codes whose write failed; not resent.
    pub lost: u64,
    /// Connections opened after the first one.
    pub reconnects: u64,
    /// The run stopped because of cancellation rather than running out of
    /// codes.
    pub cancelled: bool,
}

/// Streams event codes to one device.
pub struct EventStreamer<C: Connector> {
    connector: C,
    device_path: PathBuf,
    config: StreamerConfig,
    cancel: CancellationToken,
    state: StreamState,
    channel: Option<C::Channel>,
}

impl<C: Connector> EventStreamer<C> {
    pub fn new(connector: C, device_path: impl Into<PathBuf>, config: StreamerConfig) -> Self {
        Self {
            connector,
            device_path: device_path.into(),
            config,
            cancel: CancellationToken::new(),
            state: StreamState::Disconnected,
            channel: None,
        }
    }

    /// Stop when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn device_path(&self) -> &Path {
        &self.device_path
    }

    /// A handle that shuts the streamer down when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Make one attempt to open the channel.
    ///
    /// On failure the streamer stays in `Connecting`.
    pub async fn open(&mut self) -> Result<()> {
        if self.state == StreamState::Closed {
            return Err(Error::Closed);
        }

        self.channel = None;
        self.state = StreamState::Connecting;

        match self
            .connector
            .open(&self.device_path, self.config.baud_rate)
            .await
        {
            Ok(channel) => {
                self.channel = Some(channel);
                self.state = StreamState::Connected;
                info!(
                    path = %self.device_path.display(),
                    baud_rate = self.config.baud_rate,
                    "Connected to event marker."
                );
                Ok(())
            }
            Err(source) => Err(Error::Connect {
                path: self.device_path.clone(),
                source,
            }),
        }
    }

    /// Open the channel, retrying until it succeeds or the streamer is
    /// cancelled.
    ///
    /// Returns `Error::Closed` on cancellation; no further opens are tried.
    pub async fn connect(&mut self) -> Result<()> {
        let mut failures = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                self.close().await;
                return Err(Error::Closed);
            }

            match self.state {
                StreamState::Connected => return Ok(()),
                StreamState::Closed => return Err(Error::Closed),
                _ => {}
            }

            if let Err(e) = self.open().await {
                failures += 1;
                if failures == 1 {
                    warn!(
                        error = %e,
                        "Cannot open event marker, retrying every {:?}.",
                        self.config.retry_interval
                    );
                } else {
                    debug!(error = %e, attempt = failures + 1, "Still cannot open event marker.");
                }

                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = time::sleep(self.config.retry_interval) => {}
                }
            }
        }
    }

    /// Write one event code and wait for it to be flushed.
    ///
    /// The value is checked before anything touches the channel. A write
    /// failure drops the channel and leaves the streamer connecting; the
    /// code is not retried.
    pub async fn send(&mut self, code: impl Into<i64>) -> Result<()> {
        let code = EventCode::new(code.into())?;

        if self.state == StreamState::Closed {
            return Err(Error::Closed);
        }

        let Some(channel) = self.channel.as_mut() else {
            return Err(Error::Send {
                code: code.as_byte(),
                source: io::Error::new(io::ErrorKind::NotConnected, "event marker not connected"),
            });
        };

        let byte = [code.as_byte()];
        let written = async {
            channel.write_all(&byte).await?;
            channel.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                trace!(code = code.as_byte(), "Sent event code.");
                Ok(())
            }
            Err(source) => {
                self.channel = None;
                self.state = StreamState::Connecting;
                Err(Error::Send {
                    code: code.as_byte(),
                    source,
                })
            }
        }
    }

    /// Send every code in order, pausing `event_delay` after each.
    ///
    /// Reconnects as needed; codes lost to write failures are counted, not
    /// reported. The channel is released before returning, whatever the
    /// reason for stopping.
    pub async fn run<I>(&mut self, codes: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = EventCode>,
    {
        if self.state == StreamState::Closed {
            return Err(Error::Closed);
        }

        let mut summary = RunSummary::default();
        let result = self.drive(codes, &mut summary).await;

        if summary.cancelled {
            self.close().await;
        } else {
            self.disconnect().await;
        }

        info!(
            sent = summary.sent,
            lost = summary.lost,
            reconnects = summary.reconnects,
            cancelled = summary.cancelled,
            "Event stream finished."
        );

        result.map(|()| summary)
    }

    async fn drive<I>(&mut self, codes: I, summary: &mut RunSummary) -> Result<()>
    where
        I: IntoIterator<Item = EventCode>,
    {
        let mut connected_once = false;

        for code in codes {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                return Ok(());
            }

            if self.state != StreamState::Connected {
                match self.connect().await {
                    Ok(()) => {
                        if connected_once {
                            summary.reconnects += 1;
                        }
                        connected_once = true;
                    }
                    Err(Error::Closed) => {
                        summary.cancelled = true;
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                }
            }

            match self.send(code).await {
                Ok(()) => {
                    summary.sent += 1;
                    debug!(code = code.as_byte(), "Sent event code.");
                }
                Err(e) if e.is_transient() => {
                    summary.lost += 1;
                    warn!(error = %e, "Event code lost, reconnecting.");
                }
                Err(e) => return Err(e),
            }

            if !self.config.event_delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        summary.cancelled = true;
                        return Ok(());
                    }
                    _ = time::sleep(self.config.event_delay) => {}
                }
            }
        }

        Ok(())
    }

    /// Release the channel, leaving the streamer able to connect again.
    pub async fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.shutdown().await {
                debug!(error = %e, "Error shutting down event marker channel.");
            }
            debug!(path = %self.device_path.display(), "Closed event marker channel.");
        }
        if self.state != StreamState::Closed {
            self.state = StreamState::Disconnected;
        }
    }

    /// Release the channel and refuse further use.
    pub async fn close(&mut self) {
        self.disconnect().await;
        self.state = StreamState::Closed;
    }
}
