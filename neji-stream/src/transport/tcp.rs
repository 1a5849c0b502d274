//! TCP connection to the remote collector

use super::{Transport, write_frame};
use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

/// Single long-lived TCP connection: open once, write many, close once.
///
/// There is no reconnect; once a write fails the owner is expected to give up
/// on the stream.
pub struct TcpTransport {
    stream: Option<TcpStream>,
    peer: SocketAddr,
    cancel: Option<Arc<AtomicBool>>,
}

impl TcpTransport {
    /// Resolve `address` and connect to the first address that accepts.
    pub fn connect(address: &str, network: &NetworkConfig) -> Result<Self> {
        let connect_error = |source: std::io::Error| Error::Connect {
            address: address.to_string(),
            source,
        };

        let candidates: Vec<SocketAddr> = address
            .to_socket_addrs()
            .map_err(connect_error)?
            .collect();

        let timeout = Duration::from_millis(network.connect_timeout_ms.max(1));
        let mut last_error = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => return Self::from_stream(stream, network),
                Err(e) => {
                    log::debug!("Connect to {} failed: {}", candidate, e);
                    last_error = Some(e);
                }
            }
        }

        Err(connect_error(last_error.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "address resolved to nothing",
            )
        })))
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream, network: &NetworkConfig) -> Result<Self> {
        let peer = stream.peer_addr()?;
        if network.nodelay
            && let Err(e) = stream.set_nodelay(true)
        {
            log::warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }
        stream.set_write_timeout(Some(Duration::from_millis(network.write_timeout_ms.max(1))))?;

        log::info!("Connected to collector at {}", peer);
        Ok(Self {
            stream: Some(stream),
            peer,
            cancel: None,
        })
    }

    /// Abort in-progress writes once `cancel` is set.
    ///
    /// A pipeline binds its own flag on start; this is for standalone use.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.bind_cancel(cancel);
        self
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::Disconnected)?;
        write_frame(stream, payload, self.cancel.as_deref())?;
        log::trace!("Sent {} byte frame to {}", payload.len(), self.peer);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        log::info!("Closing collector connection {}", self.peer);
        match stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Peer already gone
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn peer(&self) -> String {
        self.peer.to_string()
    }

    fn bind_cancel(&mut self, cancel: Arc<AtomicBool>) {
        self.cancel = Some(cancel);
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::debug!("Error closing {}: {}", self.peer, e);
        }
    }
}
