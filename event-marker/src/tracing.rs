//! Provide tracing, tailored to this program.
//!
//! At startup, the program should call one of the init_* functions to install
//! a tracing subscriber (i.e., something that emits events to a log).
//!
//! The rest of the program can include `use tracing::prelude::*` for
//! convenient access to the `trace!()`, `debug!()`, `info!()`, `warn!()`, and
//! `error!()` macros.
//!
//! Log output never goes to stdout. Callers capture the device path from
//! stdout, so every status and diagnostic line is written to stderr (or the
//! journal).

use std::env;
use std::io;
use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Initialize logging.
///
/// If running under systemd, use journald; otherwise fall back to stderr.
pub fn init_journald_or_stderr() {
    if env::var("JOURNAL_STREAM").is_ok() {
        if let Ok(layer) = tracing_journald::layer() {
            tracing_subscriber::registry().with(layer).init();
        } else {
            use_stderr();
            error!("Failed to initialize journald logging, using stderr.");
        }
    } else {
        use_stderr();
    }
}

// Log to stderr, filtering according to environment variable RUST_LOG,
// overriding the default level (ERROR) to INFO.
fn use_stderr() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_timer(LocalTimer),
        )
        .init();
}

// Timestamps in local time to the nearest second. The default timer was in
// UTC and formatted timestamps as a long, ugly string.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or(OffsetDateTime::now_utc());
        let formatted = now
            .format(time::macros::format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| std::fmt::Error)?;
        write!(w, "{}", formatted)
    }
}
