//! Neji-Stream - telemetry streaming library
//!
//! Ships reconstructed surface meshes and camera frames from a capture device
//! to remote collectors over long-lived TCP connections.
//!
//! ## Architecture
//!
//! Each stream kind runs its own [`pipeline::Pipeline`]:
//!
//! - [`queue`]: bounded drop-oldest queues between stages
//! - [`codec`]: mesh and frame encoders plus payload compression
//! - [`pipeline`]: worker pool, supervisor and sender loop
//! - [`transport`]: length-prefixed TCP wire and a mock for tests
//! - [`collector`]: receiving side, reads and decodes a stream
//! - [`capture`]: synthetic mesh and frame source
//! - [`app`]: daemon orchestration

pub mod app;
pub mod capture;
pub mod codec;
pub mod collector;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{FramePipeline, HealthEvent, MeshPipeline, Pipeline, PipelineOptions};
pub use queue::BoundedQueue;
pub use types::{EncodedMessage, MeshEvent, MeshId, MeshSource, Plane, RawFrameItem, Vertex};
