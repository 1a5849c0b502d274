//! Error types for neji-stream

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// neji-stream error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// TOML parse error
    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("Config serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Raw item could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// Mesh id no longer resolves to vertex data
    #[error("Mesh not available: {0}")]
    MeshUnavailable(String),

    /// Plane geometry inconsistent with its backing buffer
    #[error("Invalid frame layout: {0}")]
    FrameLayout(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Payload does not fit the 4-byte length prefix
    #[error("Payload too large for frame: {0} bytes")]
    PayloadTooLarge(usize),

    /// Incoming frame exceeds the reader's limit
    #[error("Message too large: {len} bytes (limit {limit})")]
    MessageTooLarge {
        /// Length announced by the prefix
        len: usize,
        /// Configured maximum
        limit: usize,
    },

    /// Initial connect failed
    #[error("Connect to {address} failed: {source}")]
    Connect {
        /// Remote address as configured
        address: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Operation abandoned because the pipeline is shutting down
    #[error("Cancelled")]
    Cancelled,

    /// Peer closed the connection
    #[error("Disconnected")]
    Disconnected,

    /// Thread could not be spawned
    #[error("Failed to spawn thread {0}")]
    ThreadSpawn(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
