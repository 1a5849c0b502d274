//! Sender loop: egress queue to transport

use super::health::{HealthEvent, HealthReporter};
use super::stats::PipelineStats;
use crate::error::{Error, Result};
use crate::queue::BoundedQueue;
use crate::transport::Transport;
use crate::types::EncodedMessage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

pub(crate) struct SenderContext {
    pub stream: &'static str,
    pub egress: Arc<BoundedQueue<EncodedMessage>>,
    pub cancel: Arc<AtomicBool>,
    pub stats: Arc<PipelineStats>,
    pub health: Arc<HealthReporter>,
}

pub(crate) fn spawn_sender<T: Transport + 'static>(
    ctx: SenderContext,
    transport: T,
) -> Result<JoinHandle<()>> {
    let name = format!("{}-sender", ctx.stream);
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || run_sender(ctx, transport))
        .map_err(|e| Error::ThreadSpawn(format!("{name}: {e}")))
}

fn run_sender<T: Transport>(ctx: SenderContext, mut transport: T) {
    log::debug!("{}-sender started, peer {}", ctx.stream, transport.peer());

    match send_all(&ctx, &mut transport) {
        Ok(()) => log::info!("{} stream drained", ctx.stream),
        Err(Error::Cancelled) => log::info!("{} stream aborted", ctx.stream),
        Err(e) => {
            // Egress keeps absorbing output by dropping its oldest entries
            log::error!("{} stream to {} failed: {}", ctx.stream, transport.peer(), e);
            ctx.health.report(HealthEvent::SenderStopped {
                stream: ctx.stream,
                error: e.to_string(),
            });
        }
    }

    if let Err(e) = transport.close() {
        log::warn!("{}-sender: close failed: {}", ctx.stream, e);
    }
    log::debug!("{}-sender exiting", ctx.stream);
}

/// Send until egress is closed and empty, the cancel flag is set, or the
/// transport fails
fn send_all<T: Transport>(ctx: &SenderContext, transport: &mut T) -> Result<()> {
    while let Some(message) = ctx.egress.dequeue() {
        if ctx.cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }
        transport.send(message.as_bytes())?;
        ctx.stats.record_sent(message.len());
    }
    if ctx.cancel.load(Ordering::Relaxed) {
        return Err(Error::Cancelled);
    }
    Ok(())
}
