//! # ralph-logging
//!
//! Logging for the ralph loop.
//!
//! ## Key Types
//!
//! - [`Logger`] - Tees loop events to the console and the run log
//! - [`LogEvent`] - Log event types
//! - [`LogFormat`] - Console formats (Pretty, JSON, Compact)
//! - [`Transcript`] - The box-drawn, append-only run log file
//! - [`EventLog`] - Timestamped event lines inside the run log
//!
//! Diagnostics that are not meant for the operator go through `tracing`,
//! initialised with [`init_tracing`].

mod events;
mod transcript;

pub use events::{LogEvent, LogFormat, Logger};
pub use transcript::{timestamp_millis, timestamp_seconds, EventLog, Transcript, SECTION_WIDTH};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing for the application
pub fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(false).with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty | LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .init();
        }
    }
}
