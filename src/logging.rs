//! Tracing setup and the operation/error sinks used by the engines.

use std::error::Error as StdError;
use std::path::Path;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize a tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level follows the verbosity
/// count given on the command line (0 = info, 1 = debug, 2+ = trace).
pub fn init(verbosity: u8) -> Result<(), Box<dyn StdError + Send + Sync>> {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .compact();

    let filter_layer =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Record a file operation (copy, snapshot, delete, restore...).
pub fn log_file_operation(op: &str, src: &Path, dst: &Path) {
    tracing::info!(
        target: "twinsync::ops",
        op,
        src = %src.display(),
        dst = %dst.display(),
        "{op}"
    );
}

/// Record an error, with its source chain when one is available.
pub fn log_error(message: &str, err: Option<&dyn StdError>) {
    match err {
        Some(err) => {
            let mut chain = err.to_string();
            let mut source = err.source();
            while let Some(cause) = source {
                chain.push_str(": ");
                chain.push_str(&cause.to_string());
                source = cause.source();
            }
            tracing::error!(target: "twinsync::errors", error = %chain, "{message}");
        }
        None => tracing::error!(target: "twinsync::errors", "{message}"),
    }
}
