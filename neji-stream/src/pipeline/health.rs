//! Degraded-state notifications for the pipeline owner

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Something went wrong inside a pipeline without stopping it outright
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// An item could not be encoded or compressed and was skipped
    EncodeFailed {
        stream: &'static str,
        worker: usize,
        error: String,
    },
    /// A worker thread panicked
    WorkerPanicked { stream: &'static str, worker: usize },
    /// The supervisor replaced a dead worker
    WorkerRestarted { stream: &'static str, worker: usize },
    /// The sender hit a transport error; nothing more goes out on this stream
    SenderStopped { stream: &'static str, error: String },
}

impl fmt::Display for HealthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthEvent::EncodeFailed {
                stream,
                worker,
                error,
            } => write!(f, "{stream}-worker-{worker}: encode failed: {error}"),
            HealthEvent::WorkerPanicked { stream, worker } => {
                write!(f, "{stream}-worker-{worker} panicked")
            }
            HealthEvent::WorkerRestarted { stream, worker } => {
                write!(f, "{stream}-worker-{worker} restarted")
            }
            HealthEvent::SenderStopped { stream, error } => {
                write!(f, "{stream}-sender stopped: {error}")
            }
        }
    }
}

/// Sending half of the health channel.
///
/// Never blocks: when the owner is not draining events, new ones are counted
/// and discarded.
pub struct HealthReporter {
    tx: Sender<HealthEvent>,
    overflow: AtomicU64,
}

impl HealthReporter {
    /// Create a reporter and the receiver the owner polls
    pub fn channel(capacity: usize) -> (Self, Receiver<HealthEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            Self {
                tx,
                overflow: AtomicU64::new(0),
            },
            rx,
        )
    }

    pub fn report(&self, event: HealthEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let n = self.overflow.fetch_add(1, Ordering::Relaxed) + 1;
                if n % 100 == 1 {
                    log::warn!("Health channel full, dropped {} events (latest: {})", n, event);
                }
            }
            // Owner went away; logs are all that is left
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Events discarded because the channel was full
    pub fn overflow(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_is_non_blocking_when_full() {
        let (reporter, rx) = HealthReporter::channel(2);
        for worker in 0..5 {
            reporter.report(HealthEvent::WorkerPanicked {
                stream: "mesh",
                worker,
            });
        }
        assert_eq!(reporter.overflow(), 3);

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![
                HealthEvent::WorkerPanicked {
                    stream: "mesh",
                    worker: 0
                },
                HealthEvent::WorkerPanicked {
                    stream: "mesh",
                    worker: 1
                },
            ]
        );
    }

    #[test]
    fn test_display() {
        let event = HealthEvent::SenderStopped {
            stream: "frame",
            error: "Disconnected".to_string(),
        };
        assert_eq!(event.to_string(), "frame-sender stopped: Disconnected");
    }
}
