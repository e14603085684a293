//! chartlink-worker: the process the controller spawns.
//!
//! Startup order matters: stdio first so every diagnostic reaches the
//! controller unbuffered, then the library preflight (exit 1 before any
//! bootstrap when the environment is broken), then the port exchange, then
//! serve until the controlling pipe closes or a script fails.

use std::sync::Arc;

use anyhow::Context as _;

use chartlink_core::{
    BootstrapConfig, Channel, ProviderRegistry, Session, SessionExit, lifecycle,
};
use chartlink_python::entry::ChartEntryPoint;

fn main() {
    lifecycle::set_unbuffered_stdio();
    chartlink_python::init_tracing();
    tracing::info!("chartlink-worker {}", env!("CARGO_PKG_VERSION"));

    if let Err(name) = chartlink_python::preflight_imports() {
        // The controller watches stdout for this exact shape.
        println!("can't import {name}");
        std::process::exit(1);
    }

    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = format!("{err:#}"), "Worker startup failed");
            1
        }
    };

    // Unconditional: no lingering interpreter or runtime thread may keep
    // the process alive past this point.
    std::process::exit(code);
}

fn run() -> anyhow::Result<i32> {
    let config = BootstrapConfig::from_args(std::env::args()).context("parse command line")?;

    let runtime = tokio::runtime::Runtime::new().context("create async runtime")?;
    runtime.block_on(async {
        let channel = Channel::bootstrap(&config)
            .await
            .context("channel bootstrap")?;

        let registry = Arc::new(ProviderRegistry::new());
        let entry = Arc::new(
            ChartEntryPoint::new(Arc::clone(&registry))
                .context("seed evaluation namespace")?,
        );

        let session = Session::new(channel, registry, entry);
        let exit: SessionExit = session.run(lifecycle::controller_eof()).await;
        Ok(exit.code())
    })
}
