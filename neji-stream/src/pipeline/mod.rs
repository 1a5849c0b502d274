//! Streaming pipeline: ingest queue, worker pool, egress queue, sender
//!
//! ```text
//! submit() ──► ingest ──► worker × N ──► egress ──► sender ──► Transport
//!              (drop-     encode +       (drop-
//!               oldest)   compress        oldest)
//! ```
//!
//! Producers never block: both queues discard their oldest entry when full.
//! With more than one worker, messages may leave in a different order than
//! their items were submitted.

mod health;
mod sender;
mod stats;
mod worker;

pub use health::{HealthEvent, HealthReporter};
pub use stats::{PipelineStats, StatsSnapshot};
pub use worker::WorkerPool;

use crate::codec::{Compressor, Encoder, FrameEncoder, MeshEncoder};
use crate::config::{Config, StreamConfig, SupervisorConfig};
use crate::error::{Error, Result};
use crate::queue::BoundedQueue;
use crate::transport::Transport;
use crate::types::EncodedMessage;
use crossbeam_channel::Receiver;
use sender::SenderContext;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use worker::WorkerContext;

pub type MeshPipeline = Pipeline<MeshEncoder>;
pub type FramePipeline = Pipeline<FrameEncoder>;

/// Sizing and behaviour of one pipeline
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub ingest_capacity: usize,
    pub egress_capacity: usize,
    pub workers: usize,
    pub compressor: Compressor,
    pub supervisor: SupervisorConfig,
}

impl PipelineOptions {
    /// Options for one stream section of the config file
    pub fn from_config(stream: &StreamConfig, config: &Config) -> Self {
        Self {
            ingest_capacity: stream.ingest_capacity,
            egress_capacity: stream.egress_capacity,
            workers: stream.workers,
            compressor: Compressor::from_config(&config.compression),
            supervisor: config.supervisor.clone(),
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        let config = Config::default();
        Self::from_config(&config.mesh, &config)
    }
}

/// One encode-and-ship pipeline.
///
/// Created idle by [`Pipeline::new`]; items submitted before
/// [`Pipeline::start`] are buffered (subject to overflow). Dropping a running
/// pipeline performs a graceful [`Pipeline::shutdown`].
pub struct Pipeline<E: Encoder> {
    stream: &'static str,
    encoder: Option<Arc<E>>,
    options: PipelineOptions,
    ingest: Arc<BoundedQueue<E::Item>>,
    egress: Arc<BoundedQueue<EncodedMessage>>,
    cancel: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    health: Arc<HealthReporter>,
    health_rx: Receiver<HealthEvent>,
    workers: Option<WorkerPool>,
    sender: Option<JoinHandle<()>>,
}

impl<E: Encoder> Pipeline<E> {
    /// Build the queues without starting any threads
    pub fn new(encoder: E, options: PipelineOptions) -> Result<Self> {
        if options.workers == 0 {
            return Err(Error::InvalidParameter(format!(
                "{} pipeline needs at least one worker",
                encoder.name()
            )));
        }
        let ingest = Arc::new(BoundedQueue::new(options.ingest_capacity)?);
        let egress = Arc::new(BoundedQueue::new(options.egress_capacity)?);
        let (health, health_rx) = HealthReporter::channel(options.supervisor.health_capacity);

        Ok(Self {
            stream: encoder.name(),
            encoder: Some(Arc::new(encoder)),
            options,
            ingest,
            egress,
            cancel: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(PipelineStats::default()),
            health: Arc::new(health),
            health_rx,
            workers: None,
            sender: None,
        })
    }

    /// Build and immediately start a pipeline
    pub fn launch<T: Transport + 'static>(
        encoder: E,
        transport: T,
        options: PipelineOptions,
    ) -> Result<Self> {
        let mut pipeline = Self::new(encoder, options)?;
        pipeline.start(transport)?;
        Ok(pipeline)
    }

    /// Spawn the worker pool and the sender.
    ///
    /// The sender owns `transport` from here on and closes it when it exits.
    /// The transport is bound to this pipeline's cancel flag, so
    /// [`Pipeline::abort`] also interrupts a write blocked on a stalled peer.
    pub fn start<T: Transport + 'static>(&mut self, mut transport: T) -> Result<()> {
        let Some(encoder) = self.encoder.take() else {
            return Err(Error::Other(format!(
                "{} pipeline already started",
                self.stream
            )));
        };

        transport.bind_cancel(Arc::clone(&self.cancel));
        let sender = sender::spawn_sender(
            SenderContext {
                stream: self.stream,
                egress: Arc::clone(&self.egress),
                cancel: Arc::clone(&self.cancel),
                stats: Arc::clone(&self.stats),
                health: Arc::clone(&self.health),
            },
            transport,
        )?;
        self.sender = Some(sender);

        let ctx = WorkerContext {
            stream: self.stream,
            encoder,
            compressor: self.options.compressor,
            ingest: Arc::clone(&self.ingest),
            egress: Arc::clone(&self.egress),
            cancel: Arc::clone(&self.cancel),
            stats: Arc::clone(&self.stats),
            health: Arc::clone(&self.health),
        };
        match WorkerPool::start(ctx, self.options.workers, &self.options.supervisor) {
            Ok(pool) => self.workers = Some(pool),
            Err(e) => {
                // Unwind the sender and any workers already running
                if let Err(abort_error) = self.abort() {
                    log::warn!("{} pipeline: {}", self.stream, abort_error);
                }
                return Err(e);
            }
        }

        log::info!(
            "{} pipeline started: {} workers, queues {}/{}, {:?}",
            self.stream,
            self.options.workers,
            self.options.ingest_capacity,
            self.options.egress_capacity,
            self.options.compressor.format()
        );
        Ok(())
    }

    /// Hand an item to the pipeline. Never blocks.
    ///
    /// When the ingest queue is full its oldest item is discarded; after
    /// shutdown the item is discarded.
    pub fn submit(&self, item: E::Item) {
        self.stats.record_submitted();
        self.ingest.enqueue(item);
    }

    /// Producer handle that can move to capture threads
    pub fn submitter(&self) -> Submitter<E::Item> {
        Submitter {
            ingest: Arc::clone(&self.ingest),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Flag set by [`Pipeline::abort`]; already bound to the transport
    /// passed to [`Pipeline::start`]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Degraded-state notifications; poll with `try_recv`/`try_iter`
    pub fn health(&self) -> &Receiver<HealthEvent> {
        &self.health_rx
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot::collect(
            &self.stats,
            self.ingest.dropped(),
            self.egress.dropped(),
            self.ingest.len(),
            self.egress.len(),
        )
    }

    pub fn name(&self) -> &'static str {
        self.stream
    }

    pub fn is_running(&self) -> bool {
        self.sender.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop accepting items, deliver everything buffered, close the
    /// transport and join all threads.
    ///
    /// Falls back to [`Pipeline::abort`] if draining takes longer than the
    /// configured drain timeout.
    pub fn shutdown(&mut self) -> Result<()> {
        let timeout = Duration::from_millis(self.options.supervisor.drain_timeout_ms);
        self.shutdown_within(timeout)
    }

    /// Graceful shutdown with an explicit drain deadline
    pub fn shutdown_within(&mut self, timeout: Duration) -> Result<()> {
        self.ingest.close();
        if self.workers.is_none() {
            // Never started: nothing will read egress
            self.egress.close();
        }

        let deadline = Instant::now() + timeout;
        while !self.threads_finished() {
            if Instant::now() >= deadline {
                log::warn!(
                    "{} pipeline did not drain within {:?}, aborting",
                    self.stream,
                    timeout
                );
                self.cancel_threads();
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        self.join_threads()
    }

    /// Stop immediately, discarding everything buffered
    pub fn abort(&mut self) -> Result<()> {
        self.cancel_threads();
        self.join_threads()
    }

    fn threads_finished(&self) -> bool {
        self.workers.as_ref().is_none_or(WorkerPool::is_finished)
            && self.sender.as_ref().is_none_or(JoinHandle::is_finished)
    }

    fn cancel_threads(&self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.ingest.close_and_clear();
        self.egress.close_and_clear();
    }

    fn join_threads(&mut self) -> Result<()> {
        let mut panicked = Vec::new();
        if let Some(mut workers) = self.workers.take()
            && workers.join().is_err()
        {
            panicked.push("supervisor");
        }
        if let Some(sender) = self.sender.take() {
            if sender.join().is_err() {
                panicked.push("sender");
            }
            log::info!("{} pipeline stopped: {}", self.stream, self.stats());
        }

        if panicked.is_empty() {
            Ok(())
        } else {
            Err(Error::Other(format!(
                "{} pipeline: {} thread panicked",
                self.stream,
                panicked.join(" and ")
            )))
        }
    }
}

/// Clonable producer side of a [`Pipeline`]
pub struct Submitter<T> {
    ingest: Arc<BoundedQueue<T>>,
    stats: Arc<PipelineStats>,
}

impl<T> Clone for Submitter<T> {
    fn clone(&self) -> Self {
        Self {
            ingest: Arc::clone(&self.ingest),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<T> Submitter<T> {
    /// Same contract as [`Pipeline::submit`]
    pub fn submit(&self, item: T) {
        self.stats.record_submitted();
        self.ingest.enqueue(item);
    }

    /// False once the pipeline stopped accepting items
    pub fn is_open(&self) -> bool {
        !self.ingest.is_closed()
    }
}

impl<E: Encoder> Drop for Pipeline<E> {
    fn drop(&mut self) {
        if (self.workers.is_some() || self.sender.is_some())
            && let Err(e) = self.shutdown()
        {
            log::error!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    /// Identity encoder over byte vectors
    struct Passthrough;

    impl Encoder for Passthrough {
        type Item = Vec<u8>;

        fn name(&self) -> &'static str {
            "passthrough"
        }

        fn encode(&self, item: Vec<u8>) -> Result<Vec<u8>> {
            Ok(item)
        }
    }

    fn options(ingest: usize, egress: usize, workers: usize) -> PipelineOptions {
        PipelineOptions {
            ingest_capacity: ingest,
            egress_capacity: egress,
            workers,
            compressor: Compressor::default(),
            supervisor: SupervisorConfig {
                poll_interval_ms: 5,
                ..SupervisorConfig::default()
            },
        }
    }

    fn payloads(transport: &MockTransport, compressor: &Compressor) -> Vec<Vec<u8>> {
        transport
            .frames()
            .iter()
            .map(|f| compressor.decompress(f).unwrap())
            .collect()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(Pipeline::new(Passthrough, options(0, 1, 1)).is_err());
        assert!(Pipeline::new(Passthrough, options(1, 0, 1)).is_err());
        assert!(Pipeline::new(Passthrough, options(1, 1, 0)).is_err());
    }

    #[test]
    fn test_overflow_before_start_keeps_newest() {
        let mut pipeline = Pipeline::new(Passthrough, options(2, 8, 1)).unwrap();
        pipeline.submit(b"A".to_vec());
        pipeline.submit(b"B".to_vec());
        pipeline.submit(b"C".to_vec());
        assert_eq!(pipeline.stats().ingest_dropped, 1);

        let transport = MockTransport::new();
        pipeline.start(transport.clone()).unwrap();
        pipeline.shutdown().unwrap();

        let compressor = Compressor::default();
        assert_eq!(
            payloads(&transport, &compressor),
            vec![b"B".to_vec(), b"C".to_vec()]
        );
        assert!(transport.is_closed());
    }

    #[test]
    fn test_submitter_feeds_pipeline() {
        let transport = MockTransport::new();
        let mut pipeline = Pipeline::launch(Passthrough, transport.clone(), options(8, 8, 1)).unwrap();
        let submitter = pipeline.submitter();
        let producer = thread::spawn(move || {
            for n in 0..3u8 {
                submitter.submit(vec![n]);
            }
            submitter
        });
        let submitter = producer.join().unwrap();
        pipeline.shutdown().unwrap();

        assert!(!submitter.is_open());
        assert_eq!(pipeline.stats().submitted, 3);
        assert_eq!(transport.frame_count(), 3);
    }

    #[test]
    fn test_start_twice_fails() {
        let mut pipeline = Pipeline::launch(Passthrough, MockTransport::new(), options(4, 4, 1)).unwrap();
        assert!(pipeline.start(MockTransport::new()).is_err());
        pipeline.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_without_start() {
        let mut pipeline = Pipeline::new(Passthrough, options(4, 4, 1)).unwrap();
        pipeline.submit(vec![1]);
        pipeline.shutdown().unwrap();
        // Discarded after shutdown
        pipeline.submit(vec![2]);
        assert_eq!(pipeline.stats().ingest_len, 1);
    }

    #[test]
    fn test_abort_discards_buffered_items() {
        let transport = MockTransport::new();
        transport.set_send_delay(Duration::from_millis(20));
        let mut pipeline = Pipeline::launch(Passthrough, transport.clone(), options(64, 64, 2)).unwrap();
        for n in 0..50u8 {
            pipeline.submit(vec![n]);
        }
        pipeline.abort().unwrap();

        assert!(transport.frame_count() < 50);
        assert!(transport.is_closed());
        assert!(!pipeline.is_running());
    }

    #[test]
    fn test_drain_timeout_falls_back_to_abort() {
        let transport = MockTransport::new();
        transport.set_send_delay(Duration::from_millis(50));
        let mut pipeline = Pipeline::launch(Passthrough, transport.clone(), options(64, 64, 1)).unwrap();
        for n in 0..40u8 {
            pipeline.submit(vec![n]);
        }

        let started = Instant::now();
        pipeline.shutdown_within(Duration::from_millis(100)).unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(transport.frame_count() < 40);
    }
}
