//! Line discipline setup for the event marker's serial port.
//!
//! Raw mode matters here: without it the tty layer would translate or
//! swallow event codes that happen to be newline, carriage return, or other
//! control characters.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// Line discipline applied to the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMode {
    /// No special handling of control characters; every byte passes through.
    Raw,
}

/// Settings applied once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineConfiguration {
    pub baud_rate: u32,
    pub mode: LineMode,
}

impl LineConfiguration {
    pub fn raw(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            mode: LineMode::Raw,
        }
    }
}

/// Applies a [`LineConfiguration`] to a device.
#[async_trait]
pub trait LineConfigurator: Send + Sync {
    async fn configure(&self, device_path: &Path, line: &LineConfiguration) -> Result<()>;
}

/// Configure the line by running the `stty` utility.
#[derive(Debug, Clone)]
pub struct Stty {
    program: PathBuf,
}

impl Stty {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn failure(&self, status: Option<std::process::ExitStatus>, diagnostic: String) -> Error {
        Error::Configuration {
            tool: self.program.display().to_string(),
            status,
            diagnostic,
        }
    }
}

#[async_trait]
impl LineConfigurator for Stty {
    async fn configure(&self, device_path: &Path, line: &LineConfiguration) -> Result<()> {
        let mode = match line.mode {
            LineMode::Raw => "raw",
        };

        debug!(
            program = %self.program.display(),
            path = %device_path.display(),
            mode,
            baud_rate = line.baud_rate,
            "Running stty."
        );

        let output = Command::new(&self.program)
            .arg("-F")
            .arg(device_path)
            .arg(mode)
            .arg(line.baud_rate.to_string())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.failure(None, e.to_string()))?;

        if output.status.success() {
            return Ok(());
        }

        let diagnostic = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(self.failure(Some(output.status), diagnostic))
    }
}

/// Configure the line in-process through termios.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Termios;

#[cfg(unix)]
impl Termios {
    fn apply(device_path: &Path, line: LineConfiguration) -> std::io::Result<()> {
        use rustix::fs::{self, Mode, OFlags};
        use rustix::termios::{self, OptionalActions};

        let fd = fs::open(
            device_path,
            OFlags::RDWR | OFlags::NOCTTY | OFlags::NONBLOCK | OFlags::CLOEXEC,
            Mode::empty(),
        )?;
        let mut attrs = termios::tcgetattr(&fd)?;
        match line.mode {
            LineMode::Raw => attrs.make_raw(),
        }
        attrs.set_speed(line.baud_rate)?;
        termios::tcsetattr(&fd, OptionalActions::Now, &attrs)?;
        Ok(())
    }
}

#[cfg(unix)]
#[async_trait]
impl LineConfigurator for Termios {
    async fn configure(&self, device_path: &Path, line: &LineConfiguration) -> Result<()> {
        let path = device_path.to_path_buf();
        let line = *line;
        let failure = |diagnostic: String| Error::Configuration {
            tool: "termios".to_string(),
            status: None,
            diagnostic,
        };

        tokio::task::spawn_blocking(move || Self::apply(&path, line))
            .await
            .map_err(|e| failure(e.to_string()))?
            .map_err(|e| failure(e.to_string()))
    }
}

/// Records requested configurations instead of touching any device.
///
/// Clones share the same record, so a test can keep one handle and give the
/// other to a locator.
#[derive(Debug, Clone, Default)]
pub struct RecordingConfigurator {
    calls: Arc<Mutex<Vec<(PathBuf, LineConfiguration)>>>,
    failure: Option<String>,
}

impl RecordingConfigurator {
    /// A configurator whose every call fails with `diagnostic`.
    pub fn failing(diagnostic: impl Into<String>) -> Self {
        Self {
            calls: Arc::default(),
            failure: Some(diagnostic.into()),
        }
    }

    /// Every configuration requested so far, in order.
    pub fn calls(&self) -> Vec<(PathBuf, LineConfiguration)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl LineConfigurator for RecordingConfigurator {
    async fn configure(&self, device_path: &Path, line: &LineConfiguration) -> Result<()> {
        self.calls.lock().push((device_path.to_path_buf(), *line));
        match &self.failure {
            Some(diagnostic) => Err(Error::Configuration {
                tool: "recording".to_string(),
                status: None,
                diagnostic: diagnostic.clone(),
            }),
            None => Ok(()),
        }
    }
}
