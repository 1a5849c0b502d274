//! Capture items crossing into the pipeline and the encoded messages leaving it.

use std::fmt;

/// Opaque identifier of a reconstructed mesh block
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeshId(String);

impl MeshId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MeshId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MeshId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Vertex position (x, y, z)
pub type Vertex = [f32; 3];

/// Inbound notification from the spatial mapper.
///
/// Added and updated meshes are resolved to vertices at encode time, so a
/// burst of updates for the same id costs one lookup per queued event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshEvent {
    Added(MeshId),
    Updated(MeshId),
    Removed(MeshId),
}

impl MeshEvent {
    pub fn id(&self) -> &MeshId {
        match self {
            MeshEvent::Added(id) | MeshEvent::Updated(id) | MeshEvent::Removed(id) => id,
        }
    }
}

/// Resolves mesh ids to their current vertex buffers.
///
/// Implemented by whatever owns the reconstructed geometry. Returning `None`
/// means the mesh is gone.
pub trait MeshSource: Send + Sync {
    fn vertices(&self, id: &MeshId) -> Option<Vec<Vertex>>;
}

/// One 8-bit sample plane of a YUV frame.
///
/// `data` is laid out row by row with `stride` bytes per row; only the first
/// `width` bytes of each row are image samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub data: Vec<u8>,
}

impl Plane {
    pub fn new(width: u32, height: u32, stride: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride,
            data,
        }
    }
}

/// Raw camera frame as delivered by the capture callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrameItem {
    pub y: Plane,
    pub u: Plane,
    pub v: Plane,
}

/// Compressed payload ready for the wire.
///
/// Immutable once built; ownership moves from the encoding worker through the
/// egress queue to the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMessage(Vec<u8>);

impl EncodedMessage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for EncodedMessage {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
