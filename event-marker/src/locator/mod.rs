//! Serial device discovery and line configuration.
//!
//! The locator enumerates attached serial devices, picks the one whose USB
//! product string matches exactly, applies raw mode and the firmware's baud
//! rate, and hands back the device path. It never writes to stdout; status
//! goes through tracing so that callers can capture the path alone.
//!
//! Enumeration and line configuration are injected through
//! [`DeviceRegistry`] and [`LineConfigurator`], so discovery runs against a
//! canned device list in tests.

mod line;
mod registry;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{Config, LineTool, Target};
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

#[cfg(unix)]
pub use line::Termios;
pub use line::{LineConfiguration, LineConfigurator, LineMode, RecordingConfigurator, Stty};
pub use registry::{DeviceRegistry, HostRegistry, StaticRegistry};

/// One serial device as reported by enumeration.
///
/// The path was valid when enumerated; the device may be unplugged since.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceDescriptor {
    pub device_path: PathBuf,
    pub product_identifier: String,
}

impl DeviceDescriptor {
    pub fn new(device_path: impl Into<PathBuf>, product_identifier: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
            product_identifier: product_identifier.into(),
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.device_path.display(), self.product_identifier)
    }
}

/// Pick the device reporting `product`.
///
/// Matching is exact string equality. Candidates are ordered by path, so when
/// several devices match the same one is chosen every time; that case is
/// logged as a warning but still succeeds.
pub fn locate(descriptors: Vec<DeviceDescriptor>, product: &str) -> Result<DeviceDescriptor> {
    let mut matches: Vec<DeviceDescriptor> = descriptors
        .into_iter()
        .filter(|d| d.product_identifier == product)
        .collect();
    matches.sort();

    if matches.len() > 1 {
        let candidates: Vec<String> = matches
            .iter()
            .map(|d| d.device_path.display().to_string())
            .collect();
        warn!(
            product,
            candidates = ?candidates,
            "Multiple matching devices found, using {}.",
            candidates[0]
        );
    }

    matches
        .into_iter()
        .next()
        .ok_or_else(|| Error::DeviceNotFound {
            product: product.to_string(),
        })
}

/// Finds and configures the event marker's serial port.
pub struct PortLocator {
    registry: Box<dyn DeviceRegistry>,
    configurator: Box<dyn LineConfigurator>,
    target: Target,
    baud_rate: u32,
}

impl PortLocator {
    pub fn new(
        registry: Box<dyn DeviceRegistry>,
        configurator: Box<dyn LineConfigurator>,
        target: Target,
        baud_rate: u32,
    ) -> Self {
        Self {
            registry,
            configurator,
            target,
            baud_rate,
        }
    }

    /// Create a locator backed by the host's serial ports.
    pub fn from_config(config: &Config) -> Result<Self> {
        let configurator: Box<dyn LineConfigurator> = match config.line_tool {
            LineTool::Stty => Box::new(Stty::new(&config.stty_path)),
            #[cfg(unix)]
            LineTool::Termios => Box::new(Termios),
            #[cfg(not(unix))]
            LineTool::Termios => {
                return Err(Error::Config(
                    "termios line configuration needs a unix host".into(),
                ))
            }
        };
        Ok(Self::new(
            Box::new(HostRegistry),
            configurator,
            config.target.clone(),
            config.baud_rate,
        ))
    }

    /// List every serial device currently attached.
    pub fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        let descriptors = self.registry.enumerate()?;
        debug!(count = descriptors.len(), "Enumerated serial devices.");
        for d in &descriptors {
            trace!(device = %d, "Serial device.");
        }
        Ok(descriptors)
    }

    /// Pick the target device out of `descriptors`.
    ///
    /// A fixed-path target matches on path rather than product.
    pub fn locate(&self, descriptors: Vec<DeviceDescriptor>) -> Result<DeviceDescriptor> {
        match &self.target {
            Target::Product(product) => locate(descriptors, product),
            Target::Path(path) => descriptors
                .into_iter()
                .find(|d| &d.device_path == path)
                .ok_or_else(|| Error::PathNotFound { path: path.clone() }),
        }
    }

    /// Put `device_path` in raw mode at `baud_rate`.
    ///
    /// Not retried: a failure here is usually a permissions or driver
    /// problem.
    pub async fn configure(&self, device_path: &Path, baud_rate: u32) -> Result<()> {
        let line = LineConfiguration::raw(baud_rate);
        self.configurator.configure(device_path, &line).await
    }

    /// Enumerate, locate, and configure; return the ready device path.
    pub async fn find(&self) -> Result<PathBuf> {
        let path = match &self.target {
            Target::Product(product) => {
                info!(product = %product, "Searching for event marker...");
                let found = locate(self.enumerate()?, product)?;
                info!(path = %found.device_path.display(), "Found event marker.");
                found.device_path
            }
            Target::Path(path) => {
                info!(path = %path.display(), "Using fixed event marker path.");
                path.clone()
            }
        };

        info!(
            path = %path.display(),
            baud_rate = self.baud_rate,
            "Configuring serial port for event marker."
        );
        self.configure(&path, self.baud_rate).await?;
        Ok(path)
    }
}
