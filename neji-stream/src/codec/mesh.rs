//! Mesh block encoding
//!
//! ```text
//! ┌──────────────┬──────────────┬───────────────┬──────────────────────────┐
//! │ id length    │ id bytes     │ vertex count  │ vertices                 │
//! │ u32 LE       │ ASCII        │ u32 LE        │ count × (x,y,z) f32 LE   │
//! └──────────────┴──────────────┴───────────────┴──────────────────────────┘
//! ```
//!
//! A removed mesh is sent as a tombstone: the same record with zero vertices.

use super::Encoder;
use crate::error::{Error, Result};
use crate::types::{MeshEvent, MeshId, MeshSource, Vertex};
use std::sync::Arc;

const VERTEX_BYTES: usize = 3 * 4;

/// Decoded mesh record (collector side)
#[derive(Debug, Clone, PartialEq)]
pub struct MeshRecord {
    pub id: String,
    pub vertices: Vec<Vertex>,
}

impl MeshRecord {
    pub fn is_tombstone(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Serialize one mesh record
pub fn encode_mesh(id: &MeshId, vertices: &[Vertex]) -> Result<Vec<u8>> {
    let id_bytes = id.as_str().as_bytes();
    if id_bytes.is_empty() {
        return Err(Error::Encode("mesh id is empty".to_string()));
    }
    if !id.as_str().is_ascii() {
        return Err(Error::Encode(format!("mesh id '{id}' is not ASCII")));
    }
    let id_len = u32::try_from(id_bytes.len())
        .map_err(|_| Error::Encode(format!("mesh id is {} bytes", id_bytes.len())))?;
    let count = u32::try_from(vertices.len())
        .map_err(|_| Error::Encode(format!("mesh {id} has {} vertices", vertices.len())))?;

    let mut buffer = Vec::with_capacity(8 + id_bytes.len() + vertices.len() * VERTEX_BYTES);
    buffer.extend_from_slice(&id_len.to_le_bytes());
    buffer.extend_from_slice(id_bytes);
    buffer.extend_from_slice(&count.to_le_bytes());
    for vertex in vertices {
        for component in vertex {
            buffer.extend_from_slice(&component.to_le_bytes());
        }
    }
    Ok(buffer)
}

/// Parse a decompressed mesh record
pub fn decode_mesh(bytes: &[u8]) -> Result<MeshRecord> {
    let mut cursor = bytes;

    let id_len = take_u32_le(&mut cursor)? as usize;
    let id_bytes = take(&mut cursor, id_len)?;
    let id = std::str::from_utf8(id_bytes)
        .map_err(|e| Error::Encode(format!("mesh id is not text: {e}")))?
        .to_string();

    let count = take_u32_le(&mut cursor)? as usize;
    let body_len = count
        .checked_mul(VERTEX_BYTES)
        .ok_or_else(|| Error::Encode(format!("vertex count {count} overflows")))?;
    let body = take(&mut cursor, body_len)?;
    if !cursor.is_empty() {
        return Err(Error::Encode(format!(
            "{} trailing bytes after mesh {id}",
            cursor.len()
        )));
    }

    let vertices = body
        .chunks_exact(VERTEX_BYTES)
        .map(|v| {
            [
                f32::from_le_bytes([v[0], v[1], v[2], v[3]]),
                f32::from_le_bytes([v[4], v[5], v[6], v[7]]),
                f32::from_le_bytes([v[8], v[9], v[10], v[11]]),
            ]
        })
        .collect();

    Ok(MeshRecord { id, vertices })
}

fn take<'a>(cursor: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if cursor.len() < n {
        return Err(Error::Encode(format!(
            "mesh record truncated: need {n} bytes, have {}",
            cursor.len()
        )));
    }
    let (head, tail) = cursor.split_at(n);
    *cursor = tail;
    Ok(head)
}

fn take_u32_le(cursor: &mut &[u8]) -> Result<u32> {
    let bytes = take(cursor, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Encodes mesh events, dereferencing vertices through a [`MeshSource`]
#[derive(Clone)]
pub struct MeshEncoder {
    source: Arc<dyn MeshSource>,
}

impl MeshEncoder {
    pub fn new(source: Arc<dyn MeshSource>) -> Self {
        Self { source }
    }
}

impl Encoder for MeshEncoder {
    type Item = MeshEvent;

    fn name(&self) -> &'static str {
        "mesh"
    }

    fn encode(&self, item: MeshEvent) -> Result<Vec<u8>> {
        match item {
            MeshEvent::Added(id) | MeshEvent::Updated(id) => {
                let vertices = self
                    .source
                    .vertices(&id)
                    .ok_or_else(|| Error::MeshUnavailable(id.to_string()))?;
                encode_mesh(&id, &vertices)
            }
            MeshEvent::Removed(id) => encode_mesh(&id, &[]),
        }
    }
}
