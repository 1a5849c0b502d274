//! Transport layer and wire framing
//!
//! # TCP Protocol
//!
//! Every message on a collector connection is length-prefixed:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)           │
//! │ Big-endian u32   │ compressed mesh/frame record │
//! └──────────────────┴──────────────────────────────┘
//! ```
//!
//! - **Length field**: network byte order, counts payload bytes only
//! - **Payload**: one compressed record; no type tag, one stream kind per
//!   connection
//! - **Ordering**: frames appear in the order the sender dequeued them

use crate::error::{Error, Result};
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod mock;
mod tcp;

pub use mock::MockTransport;
pub use tcp::TcpTransport;

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Outbound side of a collector connection.
///
/// Owned by exactly one sender thread for its whole lifetime.
pub trait Transport: Send {
    /// Write one length-prefixed frame, blocking until every byte is written
    fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Orderly shutdown of the connection; safe to call more than once
    fn close(&mut self) -> Result<()>;

    /// Human-readable peer description for logs
    fn peer(&self) -> String;

    /// Flag that makes a blocked [`send`](Self::send) give up once set.
    ///
    /// Called by the pipeline before the sender takes ownership.
    fn bind_cancel(&mut self, _cancel: Arc<AtomicBool>) {}
}

/// Encode the length prefix for a payload
pub fn length_prefix(payload: &[u8]) -> Result<[u8; LENGTH_PREFIX_BYTES]> {
    let len = u32::try_from(payload.len()).map_err(|_| Error::PayloadTooLarge(payload.len()))?;
    Ok(len.to_be_bytes())
}

/// Write `buf` completely, retrying partial writes.
///
/// Timeouts (`WouldBlock`/`TimedOut`) are retried until `cancel` is set, so a
/// socket with a write timeout gives the caller a bounded shutdown latency.
pub fn write_fully<W: Write + ?Sized>(
    writer: &mut W,
    mut buf: &[u8],
    cancel: Option<&AtomicBool>,
) -> Result<()> {
    while !buf.is_empty() {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return Err(Error::Cancelled);
        }
        match writer.write(buf) {
            Ok(0) => return Err(Error::Disconnected),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                log::trace!("Socket write timed out, retrying");
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(())
}

/// Write one frame (prefix then payload)
pub fn write_frame<W: Write + ?Sized>(
    writer: &mut W,
    payload: &[u8],
    cancel: Option<&AtomicBool>,
) -> Result<()> {
    let prefix = length_prefix(payload)?;
    write_fully(writer, &prefix, cancel)?;
    write_fully(writer, payload, cancel)
}

/// Read one frame into `buffer`.
///
/// Returns `Ok(false)` on a clean end of stream before a new frame starts.
/// Frames larger than `max_len` are rejected before allocating.
pub fn read_frame<R: Read + ?Sized>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
    max_len: usize,
) -> Result<bool> {
    let mut len_buf = [0u8; LENGTH_PREFIX_BYTES];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(Error::Disconnected),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::Io(e)),
        }
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_len {
        return Err(Error::MessageTooLarge {
            len,
            limit: max_len,
        });
    }

    // Reuse buffer - no allocation if capacity is sufficient
    buffer.clear();
    buffer.resize(len, 0);
    reader.read_exact(buffer).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => Error::Disconnected,
        _ => Error::Io(e),
    })?;
    Ok(true)
}
