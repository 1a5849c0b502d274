//! Receiving end of a stream: frame reader and payload decoders.
//!
//! A collector connection carries one stream kind, so the caller says up front
//! which decoder to apply.
//!
//! # Example
//!
//! ```ignore
//! use neji_stream::collector::{CollectorReader, StreamKind};
//! use neji_stream::codec::Compressor;
//! use std::net::TcpStream;
//!
//! let stream = TcpStream::connect("127.0.0.1:8989")?;
//! let mut reader = CollectorReader::new(stream, StreamKind::Mesh, Compressor::default());
//! while let Some(record) = reader.next_record()? {
//!     println!("{}", record);
//! }
//! ```

use crate::codec::{Compressor, FrameRecord, MeshRecord, decode_frame, decode_mesh};
use crate::error::Result;
use crate::transport::read_frame;
use std::fmt;
use std::io::Read;

/// Largest payload accepted from the wire
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Which encoding a connection carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StreamKind {
    Mesh,
    Frame,
}

/// One decoded payload
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Mesh(MeshRecord),
    Frame(FrameRecord),
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Mesh(mesh) if mesh.is_tombstone() => write!(f, "mesh {} removed", mesh.id),
            Record::Mesh(mesh) => write!(f, "mesh {} ({} vertices)", mesh.id, mesh.vertices.len()),
            Record::Frame(frame) => write!(
                f,
                "frame {}x{} ({} samples)",
                frame.width,
                frame.height,
                frame.samples.len()
            ),
        }
    }
}

/// Decompress and decode one payload
pub fn decode_payload(kind: StreamKind, compressor: &Compressor, payload: &[u8]) -> Result<Record> {
    let raw = compressor.decompress(payload)?;
    match kind {
        StreamKind::Mesh => decode_mesh(&raw).map(Record::Mesh),
        StreamKind::Frame => decode_frame(&raw).map(Record::Frame),
    }
}

/// Reads length-prefixed payloads from a byte stream and decodes them
pub struct CollectorReader<R: Read> {
    reader: R,
    kind: StreamKind,
    compressor: Compressor,
    buffer: Vec<u8>,
    max_frame_bytes: usize,
    frames: u64,
    bytes: u64,
}

impl<R: Read> CollectorReader<R> {
    pub fn new(reader: R, kind: StreamKind, compressor: Compressor) -> Self {
        Self {
            reader,
            kind,
            compressor,
            buffer: Vec::new(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            frames: 0,
            bytes: 0,
        }
    }

    pub fn with_max_frame_bytes(mut self, limit: usize) -> Self {
        self.max_frame_bytes = limit;
        self
    }

    /// Next raw (still compressed) payload, `None` at a clean end of stream
    pub fn next_payload(&mut self) -> Result<Option<&[u8]>> {
        if !read_frame(&mut self.reader, &mut self.buffer, self.max_frame_bytes)? {
            return Ok(None);
        }
        self.frames += 1;
        self.bytes += self.buffer.len() as u64;
        Ok(Some(&self.buffer))
    }

    /// Next decoded record, `None` at a clean end of stream
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let kind = self.kind;
        let compressor = self.compressor;
        match self.next_payload()? {
            Some(payload) => decode_payload(kind, &compressor, payload).map(Some),
            None => Ok(None),
        }
    }

    /// Payloads read so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Compressed payload bytes read so far (prefixes excluded)
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Encoder, FrameEncoder, encode_mesh};
    use crate::error::Error;
    use crate::transport::{MockTransport, Transport};
    use crate::types::{MeshId, Plane, RawFrameItem};
    use std::io::Cursor;

    #[test]
    fn test_reads_mesh_stream() {
        let compressor = Compressor::default();
        let mut transport = MockTransport::new();
        let mesh = encode_mesh(&MeshId::new("m1"), &[[1.0, 2.0, 3.0]]).unwrap();
        let tombstone = encode_mesh(&MeshId::new("m2"), &[]).unwrap();
        transport.send(&compressor.compress(&mesh).unwrap()).unwrap();
        transport.send(&compressor.compress(&tombstone).unwrap()).unwrap();

        let mut reader = CollectorReader::new(Cursor::new(transport.wire_bytes()), StreamKind::Mesh, compressor);
        let first = reader.next_record().unwrap().unwrap();
        let second = reader.next_record().unwrap().unwrap();
        assert!(reader.next_record().unwrap().is_none());

        assert_eq!(first.to_string(), "mesh m1 (1 vertices)");
        assert_eq!(second.to_string(), "mesh m2 removed");
        assert_eq!(reader.frames(), 2);
    }

    #[test]
    fn test_reads_frame_stream() {
        let compressor = Compressor::default();
        let plane = |w: u32, h: u32| Plane::new(w, h, w, vec![9; (w * h) as usize]);
        let item = RawFrameItem {
            y: plane(4, 4),
            u: plane(2, 2),
            v: plane(2, 2),
        };
        let raw = FrameEncoder::new(2).unwrap().encode(item).unwrap();

        let mut wire = Vec::new();
        crate::transport::write_frame(&mut wire, &compressor.compress(&raw).unwrap(), None).unwrap();

        let mut reader = CollectorReader::new(Cursor::new(wire), StreamKind::Frame, compressor);
        match reader.next_record().unwrap() {
            Some(Record::Frame(frame)) => {
                assert_eq!((frame.width, frame.height), (2, 2));
                assert_eq!(frame.samples.len(), 4 + 1 + 1);
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_wrong_kind_is_an_error() {
        let compressor = Compressor::default();
        // Big-endian 2x2 header, read as a little-endian id length
        let frame = [0, 0, 0, 2, 0, 0, 0, 2, 1, 2, 3, 4, 5, 6];
        let payload = compressor.compress(&frame).unwrap();
        let result = decode_payload(StreamKind::Mesh, &compressor, &payload);
        assert!(matches!(result, Err(Error::Encode(_))));
    }
}
