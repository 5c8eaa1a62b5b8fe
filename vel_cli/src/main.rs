mod cli;
mod display;
mod error;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, RunCommand};
use log::debug;
use vel::config::Config;

const DEFAULT_LOGGING_LEVEL: &str = "warn";

#[tokio::main]
async fn main() -> Result<()> {
    // Set RUST_LOG to `DEFAULT_LOGGING_LEVEL` if not set
    let _ =
        std::env::var("RUST_LOG").map_err(|_| std::env::set_var("RUST_LOG", DEFAULT_LOGGING_LEVEL));
    pretty_env_logger::init_timed();
    let args = Cli::parse();
    debug!("args: {args:?}");
    let config = match &args.config {
        Some(path) => read_config_from_toml(path)?,
        None => read_default_config()?,
    };
    debug!("config: {config:?}");

    if let Some(command) = args.command {
        command.run(config).await?;
    }
    Ok(())
}

/// Reads `<config dir>/vel/config.toml`, e.g. `~/.config/vel/config.toml` on Linux, falling back
/// to the default configuration when there is no such file.
fn read_default_config() -> Result<Config> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(Config::default());
    };
    let file_path = config_dir.join("vel").join("config.toml");
    if !file_path.exists() {
        return Ok(Config::default());
    }
    read_config_from_toml(&file_path)
}

fn read_config_from_toml(file_path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(file_path)
        .with_context(|| format!("Error reading config file {}", file_path.display()))?;
    Ok(Config::from_toml(&contents)?)
}
