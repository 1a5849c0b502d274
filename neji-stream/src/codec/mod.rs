//! Payload encoders and compression
//!
//! Each stream kind has its own [`Encoder`]. The two encodings share no state
//! and carry no type tag, so a collector must know which kind of stream it is
//! reading.

pub mod compress;
pub mod frame;
pub mod mesh;

pub use compress::Compressor;
pub use frame::{FrameEncoder, FrameRecord, decode_frame};
pub use mesh::{MeshEncoder, MeshRecord, decode_mesh, encode_mesh};

use crate::error::Result;

/// Pure transform from a raw capture item to an uncompressed payload.
///
/// Shared by every worker of a pool, so implementations must be callable
/// concurrently.
pub trait Encoder: Send + Sync + 'static {
    /// Raw item consumed from the ingest queue
    type Item: Send + 'static;

    /// Short stream name used in thread names and logs
    fn name(&self) -> &'static str;

    fn encode(&self, item: Self::Item) -> Result<Vec<u8>>;
}
