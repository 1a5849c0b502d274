//! Mock transport for testing

use super::{Transport, write_frame};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// In-memory transport recording every frame it is asked to send.
///
/// Clones share state, so a test keeps one handle while the sender thread
/// owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    frames: Vec<Vec<u8>>,
    wire: Vec<u8>,
    fail_after: Option<usize>,
    send_delay: Option<Duration>,
    closed: bool,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send after the first `frames` ones fail with a broken pipe
    pub fn fail_after(&self, frames: usize) {
        self.inner.lock().fail_after = Some(frames);
    }

    /// Sleep this long inside every send to simulate a slow link
    pub fn set_send_delay(&self, delay: Duration) {
        self.inner.lock().send_delay = Some(delay);
    }

    /// Payloads sent so far, in order
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.inner.lock().frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// Exact bytes that would have gone over the socket
    pub fn wire_bytes(&self) -> Vec<u8> {
        self.inner.lock().wire.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl Transport for MockTransport {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        let delay = self.inner.lock().send_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Error::Disconnected);
        }
        if inner.fail_after.is_some_and(|limit| inner.frames.len() >= limit) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock link failure",
            )));
        }
        write_frame(&mut inner.wire, payload, None)?;
        inner.frames.push(payload.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.inner.lock().closed = true;
        Ok(())
    }

    fn peer(&self) -> String {
        "mock".to_string()
    }
}
