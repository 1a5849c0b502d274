//! Worker pool and its supervisor
//!
//! Each worker loops `ingest → encode → compress → egress`. The supervisor
//! owns the worker handles, replaces workers that panicked, and closes the
//! egress queue once every worker has exited so the sender knows no more
//! messages are coming.

use super::health::{HealthEvent, HealthReporter};
use super::stats::PipelineStats;
use crate::codec::{Compressor, Encoder};
use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::queue::BoundedQueue;
use crate::types::EncodedMessage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Everything a worker thread needs, shared across the pool
pub(crate) struct WorkerContext<E: Encoder> {
    pub stream: &'static str,
    pub encoder: Arc<E>,
    pub compressor: Compressor,
    pub ingest: Arc<BoundedQueue<E::Item>>,
    pub egress: Arc<BoundedQueue<EncodedMessage>>,
    pub cancel: Arc<AtomicBool>,
    pub stats: Arc<PipelineStats>,
    pub health: Arc<HealthReporter>,
}

// Manual impl: derive would demand `E: Clone`
impl<E: Encoder> Clone for WorkerContext<E> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream,
            encoder: Arc::clone(&self.encoder),
            compressor: self.compressor,
            ingest: Arc::clone(&self.ingest),
            egress: Arc::clone(&self.egress),
            cancel: Arc::clone(&self.cancel),
            stats: Arc::clone(&self.stats),
            health: Arc::clone(&self.health),
        }
    }
}

impl<E: Encoder> WorkerContext<E> {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn process(&self, item: E::Item) -> Result<EncodedMessage> {
        let raw = self.encoder.encode(item)?;
        let compressed = self.compressor.compress(&raw)?;
        log::trace!(
            "{} record {} -> {} bytes",
            self.encoder.name(),
            raw.len(),
            compressed.len()
        );
        Ok(EncodedMessage::new(compressed))
    }
}

fn run_worker<E: Encoder>(ctx: WorkerContext<E>, index: usize) {
    log::debug!("{}-worker-{} started", ctx.stream, index);

    // dequeue() returns None once ingest is closed and drained
    while let Some(item) = ctx.ingest.dequeue() {
        if ctx.cancelled() {
            break;
        }
        match ctx.process(item) {
            Ok(message) => {
                ctx.stats.record_encoded();
                ctx.egress.enqueue(message);
            }
            Err(e) => {
                log::warn!("{}-worker-{}: {}", ctx.stream, index, e);
                ctx.stats.record_encode_failure();
                ctx.health.report(HealthEvent::EncodeFailed {
                    stream: ctx.stream,
                    worker: index,
                    error: e.to_string(),
                });
            }
        }
    }

    log::debug!("{}-worker-{} exiting", ctx.stream, index);
}

fn spawn_worker<E: Encoder>(ctx: WorkerContext<E>, index: usize) -> Result<JoinHandle<()>> {
    let name = format!("{}-worker-{}", ctx.stream, index);
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || run_worker(ctx, index))
        .map_err(|e| Error::ThreadSpawn(format!("{name}: {e}")))
}

/// Fixed-size pool of encoder threads under one supervisor thread
pub struct WorkerPool {
    supervisor: Option<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` worker threads plus the supervisor.
    ///
    /// If a spawn fails midway the already running workers are left to the
    /// caller's shutdown: closing ingest stops them.
    pub(crate) fn start<E: Encoder>(
        ctx: WorkerContext<E>,
        workers: usize,
        supervisor: &SupervisorConfig,
    ) -> Result<Self> {
        if workers == 0 {
            return Err(Error::InvalidParameter(
                "worker pool needs at least one worker".to_string(),
            ));
        }

        let mut slots = Vec::with_capacity(workers);
        for index in 0..workers {
            slots.push(Some(spawn_worker(ctx.clone(), index)?));
        }

        let restart = supervisor.restart_workers;
        let poll = Duration::from_millis(supervisor.poll_interval_ms.max(1));
        let name = format!("{}-supervisor", ctx.stream);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || supervise(ctx, slots, restart, poll))
            .map_err(|e| Error::ThreadSpawn(format!("{name}: {e}")))?;

        Ok(Self {
            supervisor: Some(handle),
        })
    }

    /// True once every worker has exited and egress is closed
    pub fn is_finished(&self) -> bool {
        self.supervisor.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the supervisor (and therefore every worker) to exit
    pub fn join(&mut self) -> Result<()> {
        match self.supervisor.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Other("worker supervisor panicked".to_string())),
            None => Ok(()),
        }
    }
}

fn supervise<E: Encoder>(
    ctx: WorkerContext<E>,
    mut slots: Vec<Option<JoinHandle<()>>>,
    restart: bool,
    poll: Duration,
) {
    log::debug!("{}-supervisor started with {} workers", ctx.stream, slots.len());

    loop {
        // Sampled before reaping so a worker that exits because of shutdown is
        // never mistaken for one that needs replacing
        let stopping = ctx.ingest.is_closed() || ctx.cancelled();

        for (index, slot) in slots.iter_mut().enumerate() {
            let Some(handle) = slot.take_if(|h| h.is_finished()) else {
                continue;
            };
            if handle.join().is_ok() {
                continue;
            }

            log::error!("{}-worker-{} panicked", ctx.stream, index);
            ctx.health.report(HealthEvent::WorkerPanicked {
                stream: ctx.stream,
                worker: index,
            });

            if stopping || !restart {
                continue;
            }
            match spawn_worker(ctx.clone(), index) {
                Ok(handle) => {
                    *slot = Some(handle);
                    ctx.stats.record_restart();
                    log::info!("{}-worker-{} restarted", ctx.stream, index);
                    ctx.health.report(HealthEvent::WorkerRestarted {
                        stream: ctx.stream,
                        worker: index,
                    });
                }
                Err(e) => log::error!("Failed to restart {}-worker-{}: {}", ctx.stream, index, e),
            }
        }

        if stopping && slots.iter().all(Option::is_none) {
            break;
        }
        thread::sleep(poll);
    }

    ctx.egress.close();
    log::debug!("{}-supervisor exiting, egress closed", ctx.stream);
}
