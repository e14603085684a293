//! chartlink-python: PyO3 evaluation runtime for the chartlink worker.

pub mod context;
pub mod convert;
pub mod entry;
pub mod pickle;
pub mod rcparams;
pub mod vectorops;

use pyo3::prelude::*;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Libraries scripts cannot run without. Checked before bootstrap so a
/// broken environment fails fast instead of mid-script.
pub const REQUIRED_LIBRARIES: &[&str] =
    &["matplotlib", "matplotlib.pyplot", "numpy", "scipy", "pandas"];

/// Initialize tracing with CHARTLINK_LOG and LOG_FORMAT support.
///
/// Diagnostics go to stderr; stdout stays clean for the controller's
/// console.
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("CHARTLINK_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!(
            "chartlink={level},chartlink_python={level},chartlink_worker={level}"
        ))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

/// Verify every required collaborator library imports. Returns the name of
/// the first one that does not.
pub fn preflight_imports() -> Result<(), String> {
    Python::attach(|py| {
        for name in REQUIRED_LIBRARIES.iter().copied() {
            if let Err(err) = py.import(name) {
                tracing::error!(library = name, error = %err, "Required library unavailable");
                return Err(name.to_string());
            }
        }
        Ok(())
    })
}
