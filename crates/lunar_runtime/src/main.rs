//! Lunar Runtime
//!
//! Minimal binary that boots a lua session and runs a script
//!
//! Usage: `lunar <script.lua> [config.json]`

mod host_api;

use anyhow::{Context, Result};
use lunar_bridge::{Session, SessionConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let script = args.next().context("usage: lunar <script.lua> [config.json]")?;
    let config = match args.next() {
        Some(path) => {
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config '{path}'"))?;
            SessionConfig::from_json(&source)?
        }
        None => SessionConfig::default(),
    };

    tracing::info!("Lunar v{}", lunar_bridge::VERSION);
    let session = Session::with_config(config)?;
    session.open_libraries()?;
    host_api::install(&session)?;

    let results = session
        .eval_file(&script)
        .with_context(|| format!("script '{script}' failed"))?;
    for value in &results {
        println!("{value}");
    }

    tracing::debug!(stats = ?session.stats(), "script finished");
    Ok(())
}
