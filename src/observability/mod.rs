//! Observability: logging setup and metric helpers.

mod logging;
mod metrics;

pub use logging::{LogFormat, LoggingConfig};
pub use metrics::{record_autosave, record_operation_metrics, record_translation, status_of};

use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Installs the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if logging was already initialized, the log file cannot
/// be opened, or another global subscriber is installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    if LOGGING_INIT.get().is_some() {
        return Err(Error::OperationFailed {
            operation: "logging_init".to_string(),
            cause: "logging already initialized".to_string(),
        });
    }

    let filter = config.env_filter();
    let (writer, ansi) = match &config.file {
        Some(path) => (BoxMakeWriter::new(Mutex::new(open_log_file(path)?)), false),
        None => (BoxMakeWriter::new(io::stderr), true),
    };
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);

    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(layer.json().with_current_span(true))
            .with(filter)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry().with(layer).with(filter).try_init(),
    };
    installed.map_err(|e| Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: e.to_string(),
    })?;

    LOGGING_INIT.set(()).map_err(|()| Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: "failed to mark logging initialized".to_string(),
    })
}

/// Opens the log file for appending, creating its directory first.
fn open_log_file(path: &Path) -> Result<File> {
    let failed = |e: io::Error| Error::OperationFailed {
        operation: "open_log_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(failed)?;
    }
    OpenOptions::new().create(true).append(true).open(path).map_err(failed)
}
