//! neji-stream - capture-side streaming daemon
//!
//! Streams meshes and camera frames to remote collectors:
//!
//! - **TCP (port 8989)**: compressed mesh records
//! - **TCP (port 8990)**: compressed, subsampled YUV frames
//!
//! Each payload is preceded by a big-endian u32 length.

use neji_stream::app::NejiApp;
use neji_stream::{Config, Result};
use std::env;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "/etc/neji.toml";

/// Parse config path from command line arguments.
///
/// Supports:
/// - `neji-stream <path>` (positional)
/// - `neji-stream --config <path>` (flag-based)
/// - `neji-stream -c <path>` (short flag)
///
/// Defaults to `/etc/neji.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for pair in args.windows(2).skip(1) {
        if pair[0] == "--config" || pair[0] == "-c" {
            return pair[1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    DEFAULT_CONFIG_PATH.to_string()
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = if Path::new(&config_path).exists() {
        Some(Config::load(&config_path)?)
    } else {
        None
    };
    let level = config
        .as_ref()
        .map_or("info", |c| c.logging.level.as_str())
        .to_string();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    log::info!("neji-stream v{} starting...", env!("CARGO_PKG_VERSION"));
    let config = match config {
        Some(config) => {
            log::info!("Using config: {}", config_path);
            config
        }
        None => {
            log::warn!("Config {} not found, using defaults", config_path);
            Config::default()
        }
    };

    let mut app = NejiApp::new(config)?;
    app.run()?;

    log::info!("neji-stream stopped");
    Ok(())
}
