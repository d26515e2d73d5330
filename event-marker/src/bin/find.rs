//! Find and configure the USB Event Marker's serial port.
//!
//! Prints the device path on stdout and nothing else, so that other programs
//! can run this and capture the path. Status and errors go to stderr. Exits
//! non-zero when the device is missing or its line cannot be configured.

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;

use event_marker::config::Config;
use event_marker::error::Error;
use event_marker::locator::PortLocator;
use event_marker::tracing::{self, prelude::*};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing::init_journald_or_stderr();

    match find().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            exit_code(&e)
        }
    }
}

async fn find() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    let locator = PortLocator::from_config(&config)?;
    let path = locator.find().await?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", path.display()).context("failed to write device path")?;
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    let code = err.downcast_ref::<Error>().map_or(1, Error::exit_code);
    ExitCode::from(code)
}
