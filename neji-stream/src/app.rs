//! Application orchestration for the neji-stream daemon
//!
//! Connects the enabled streams, drives the synthetic capture source into
//! them, reports health and statistics, and drains everything on shutdown.

use crate::capture::{FrameGenerator, MeshGenerator, SceneMeshes, spawn_periodic};
use crate::codec::{Encoder, FrameEncoder, MeshEncoder};
use crate::config::{Config, StreamConfig};
use crate::error::{Error, Result};
use crate::pipeline::{FramePipeline, MeshPipeline, Pipeline, PipelineOptions};
use crate::transport::TcpTransport;
use crate::types::MeshSource;
use log::{debug, error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Main application structure that owns both pipelines and the capture threads
pub struct NejiApp {
    config: Config,
    scene: Arc<SceneMeshes>,
    mesh: Option<MeshPipeline>,
    frame: Option<FramePipeline>,
    capture_running: Arc<AtomicBool>,
    capture_threads: Vec<JoinHandle<()>>,
    signals: Option<Handle>,
    shutdown: Arc<AtomicBool>,
}

impl NejiApp {
    /// Connect every enabled stream.
    ///
    /// A stream whose collector cannot be reached is logged and disabled;
    /// it is an error only if no stream is left.
    pub fn new(config: Config) -> Result<Self> {
        info!("Initializing neji-stream");
        config.validate()?;

        let scene = Arc::new(SceneMeshes::new());

        let mesh = if config.mesh.enabled {
            let source: Arc<dyn MeshSource> = scene.clone();
            open_stream(MeshEncoder::new(source), &config.mesh, &config)
        } else {
            info!("mesh stream disabled in config");
            None
        };

        let frame = if config.frame.stream.enabled {
            match FrameEncoder::new(config.frame.subsample) {
                Ok(encoder) => open_stream(encoder, &config.frame.stream, &config),
                Err(e) => {
                    error!("frame stream disabled: {}", e);
                    None
                }
            }
        } else {
            info!("frame stream disabled in config");
            None
        };

        if mesh.is_none() && frame.is_none() {
            return Err(Error::Config("no stream could be started".to_string()));
        }

        Ok(Self {
            config,
            scene,
            mesh,
            frame,
            capture_running: Arc::new(AtomicBool::new(true)),
            capture_threads: Vec::new(),
            signals: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that stops [`NejiApp::run`] when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Start capture and block until a shutdown signal arrives or every
    /// stream has stopped
    pub fn run(&mut self) -> Result<()> {
        self.setup_signal_handler()?;
        self.start_capture()?;

        info!("neji-stream running. Press Ctrl+C to stop.");

        let stats_interval = Duration::from_secs(self.config.logging.stats_interval_secs.max(1));
        let mut last_stats = Instant::now();

        while !self.shutdown.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(100));
            self.drain_health();

            if last_stats.elapsed() >= stats_interval {
                self.log_statistics();
                last_stats = Instant::now();
            }

            let mesh_alive = self.mesh.as_ref().is_some_and(Pipeline::is_running);
            let frame_alive = self.frame.as_ref().is_some_and(Pipeline::is_running);
            if !mesh_alive && !frame_alive {
                error!("All streams have stopped");
                break;
            }
        }

        info!("Shutting down...");
        self.stop();
        Ok(())
    }

    fn setup_signal_handler(&mut self) -> Result<()> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        self.signals = Some(signals.handle());
        let shutdown = Arc::clone(&self.shutdown);

        std::thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    info!("Received signal {}, initiating shutdown", sig);
                    shutdown.store(true, Ordering::Relaxed);
                }
            })
            .map_err(|e| Error::ThreadSpawn(format!("signal-handler: {e}")))?;
        Ok(())
    }

    fn start_capture(&mut self) -> Result<()> {
        let capture = self.config.capture.clone();

        if let Some(mesh) = &self.mesh {
            let submitter = mesh.submitter();
            let mut generator = MeshGenerator::new(Arc::clone(&self.scene), &capture);
            let handle = spawn_periodic(
                "mesh-capture",
                capture.mesh_rate_hz,
                Arc::clone(&self.capture_running),
                move || submitter.submit(generator.next_event()),
            )?;
            self.capture_threads.push(handle);
        }

        if let Some(frame) = &self.frame {
            let submitter = frame.submitter();
            let mut generator = FrameGenerator::new(&capture)?;
            let handle = spawn_periodic(
                "frame-capture",
                capture.frame_rate_hz,
                Arc::clone(&self.capture_running),
                move || submitter.submit(generator.next_frame()),
            )?;
            self.capture_threads.push(handle);
        }

        info!("Capture started ({} sources)", self.capture_threads.len());
        Ok(())
    }

    fn drain_health(&self) {
        if let Some(mesh) = &self.mesh {
            log_health(mesh);
        }
        if let Some(frame) = &self.frame {
            log_health(frame);
        }
    }

    fn log_statistics(&self) {
        if let Some(mesh) = &self.mesh {
            info!("mesh: {} (scene holds {} meshes)", mesh.stats(), self.scene.len());
        }
        if let Some(frame) = &self.frame {
            info!("frame: {}", frame.stats());
        }
    }

    /// Stop capture, then drain and close every stream. Idempotent.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.capture_running.store(false, Ordering::Relaxed);
        for handle in self.capture_threads.drain(..) {
            if handle.join().is_err() {
                error!("Capture thread panicked");
            }
        }

        if let Some(mut mesh) = self.mesh.take() {
            if let Err(e) = mesh.shutdown() {
                error!("{}", e);
            }
            log_health(&mesh);
        }
        if let Some(mut frame) = self.frame.take() {
            if let Err(e) = frame.shutdown() {
                error!("{}", e);
            }
            log_health(&frame);
        }

        if let Some(signals) = self.signals.take() {
            signals.close();
        }
        debug!("All streams stopped");
    }
}

impl Drop for NejiApp {
    fn drop(&mut self) {
        self.stop();
    }
}

fn log_health<E: Encoder>(pipeline: &Pipeline<E>) {
    for event in pipeline.health().try_iter() {
        warn!("{}", event);
    }
}

/// Build a pipeline and connect it to its collector; `None` disables the stream
fn open_stream<E: Encoder>(encoder: E, stream: &StreamConfig, config: &Config) -> Option<Pipeline<E>> {
    let name = encoder.name();
    let connect = || -> Result<Pipeline<E>> {
        let mut pipeline = Pipeline::new(encoder, PipelineOptions::from_config(stream, config))?;
        pipeline.start(TcpTransport::connect(&stream.address, &config.network)?)?;
        Ok(pipeline)
    };

    match connect() {
        Ok(pipeline) => {
            info!("{} stream -> {}", name, stream.address);
            Some(pipeline)
        }
        Err(e) => {
            error!("{} stream disabled: {}", name, e);
            None
        }
    }
}
