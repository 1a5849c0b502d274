//! Configuration for the neji-stream daemon
//!
//! Loads configuration from a TOML file. Every tunable the pipelines use
//! (collector endpoints, queue sizes, worker counts, subsample factor,
//! compression) lives here and is validated before any thread starts.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub compression: CompressionConfig,
    pub supervisor: SupervisorConfig,
    pub mesh: StreamConfig,
    pub frame: FrameStreamConfig,
    pub capture: CaptureConfig,
    pub logging: LoggingConfig,
}

/// Socket settings shared by every collector connection
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Give up on the initial connect after this long
    pub connect_timeout_ms: u64,
    /// Upper bound on one blocking socket write before the cancel flag is rechecked
    pub write_timeout_ms: u64,
    /// Disable Nagle's algorithm
    pub nodelay: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            write_timeout_ms: 250,
            nodelay: true,
        }
    }
}

/// Container wrapped around the deflate stream of every payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionFormat {
    /// Gzip header + deflate + CRC32 trailer
    #[default]
    Gzip,
    /// Zlib header + deflate + Adler-32 trailer
    Zlib,
    /// Raw deflate stream
    Deflate,
}

/// Payload compression settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub format: CompressionFormat,
    /// 0 (store) to 9 (best)
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            format: CompressionFormat::Gzip,
            level: 6,
        }
    }
}

/// Worker supervision settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Respawn workers that died from a panic
    pub restart_workers: bool,
    /// How often the supervisor checks worker liveness
    pub poll_interval_ms: u64,
    /// Capacity of the health event channel (events beyond it are dropped)
    pub health_capacity: usize,
    /// How long a graceful shutdown may spend draining before it aborts
    pub drain_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart_workers: true,
            poll_interval_ms: 50,
            health_capacity: 64,
            drain_timeout_ms: 5000,
        }
    }
}

/// One pipeline instance: its collector endpoint, queues and worker pool
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    pub enabled: bool,
    /// Collector address as `host:port`
    ///
    /// Examples:
    /// - `192.168.86.42:8989` - collector on the LAN
    /// - `127.0.0.1:8989` - local collector
    pub address: String,
    /// Raw items buffered ahead of the workers
    pub ingest_capacity: usize,
    /// Encoded messages buffered ahead of the sender
    pub egress_capacity: usize,
    /// Parallel encode/compress workers
    pub workers: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "192.168.86.42:8989".to_string(),
            ingest_capacity: 100,
            egress_capacity: 100,
            workers: 4,
        }
    }
}

impl StreamConfig {
    fn validate(&self, name: &str) -> Result<()> {
        if self.ingest_capacity == 0 {
            return Err(Error::Config(format!("{name}.ingest_capacity must be >= 1")));
        }
        if self.egress_capacity == 0 {
            return Err(Error::Config(format!("{name}.egress_capacity must be >= 1")));
        }
        if self.workers == 0 {
            return Err(Error::Config(format!("{name}.workers must be >= 1")));
        }
        validate_address(name, &self.address)
    }
}

/// Video frame stream: a [`StreamConfig`] plus the subsample factor
///
/// Fields missing from a `[frame]` section fall back to the frame defaults,
/// not to the mesh-oriented [`StreamConfig::default`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(from = "FrameSection")]
pub struct FrameStreamConfig {
    #[serde(flatten)]
    pub stream: StreamConfig,
    /// Keep every k-th row and column (1 = full resolution)
    pub subsample: u32,
}

impl Default for FrameStreamConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig {
                enabled: true,
                address: "192.168.86.42:8990".to_string(),
                ingest_capacity: 1,
                egress_capacity: 1,
                workers: 10,
            },
            subsample: 3,
        }
    }
}

/// Raw `[frame]` table before defaults are applied
#[derive(Deserialize)]
struct FrameSection {
    enabled: Option<bool>,
    address: Option<String>,
    ingest_capacity: Option<usize>,
    egress_capacity: Option<usize>,
    workers: Option<usize>,
    subsample: Option<u32>,
}

impl From<FrameSection> for FrameStreamConfig {
    fn from(section: FrameSection) -> Self {
        let defaults = Self::default();
        Self {
            stream: StreamConfig {
                enabled: section.enabled.unwrap_or(defaults.stream.enabled),
                address: section.address.unwrap_or(defaults.stream.address),
                ingest_capacity: section
                    .ingest_capacity
                    .unwrap_or(defaults.stream.ingest_capacity),
                egress_capacity: section
                    .egress_capacity
                    .unwrap_or(defaults.stream.egress_capacity),
                workers: section.workers.unwrap_or(defaults.stream.workers),
            },
            subsample: section.subsample.unwrap_or(defaults.subsample),
        }
    }
}

/// Synthetic capture source driving the daemon
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Mesh add/update/remove events per second
    pub mesh_rate_hz: f64,
    /// Number of distinct mesh blocks cycled through
    pub mesh_count: usize,
    pub vertices_per_mesh: usize,
    /// Raw frames per second
    pub frame_rate_hz: f64,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Extra bytes at the end of every Y row (U/V rows get half)
    pub row_padding: u32,
    /// 0 = random each run
    pub seed: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mesh_rate_hz: 10.0,
            mesh_count: 16,
            vertices_per_mesh: 512,
            frame_rate_hz: 30.0,
            frame_width: 640,
            frame_height: 480,
            row_padding: 64,
            seed: 42,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    pub level: String,
    /// Seconds between statistics lines
    pub stats_interval_secs: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            stats_interval_secs: 10,
        }
    }
}

fn validate_address(name: &str, address: &str) -> Result<()> {
    let Some((host, port)) = address.rsplit_once(':') else {
        return Err(Error::Config(format!(
            "{name}.address '{address}' is not host:port"
        )));
    };
    if host.is_empty() {
        return Err(Error::Config(format!("{name}.address has an empty host")));
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(Error::Config(format!(
            "{name}.address '{address}' has an invalid port"
        ))),
        Ok(_) => Ok(()),
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use neji_stream::config::Config;
    ///
    /// let config = Config::load("neji.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject configurations the pipelines cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.compression.level > 9 {
            return Err(Error::Config(format!(
                "compression.level {} is outside 0..=9",
                self.compression.level
            )));
        }
        if self.supervisor.poll_interval_ms == 0 {
            return Err(Error::Config(
                "supervisor.poll_interval_ms must be >= 1".to_string(),
            ));
        }
        if self.supervisor.health_capacity == 0 {
            return Err(Error::Config(
                "supervisor.health_capacity must be >= 1".to_string(),
            ));
        }
        if self.network.write_timeout_ms == 0 {
            return Err(Error::Config(
                "network.write_timeout_ms must be >= 1".to_string(),
            ));
        }
        if self.mesh.enabled {
            self.mesh.validate("mesh")?;
        }
        if self.frame.stream.enabled {
            self.frame.stream.validate("frame")?;
            if self.frame.subsample == 0 {
                return Err(Error::Config("frame.subsample must be >= 1".to_string()));
            }
        }
        Ok(())
    }
}
