//! Synthetic capture source
//!
//! Stands in for a real spatial-mapping and camera stack: a scene of meshes
//! that appear, change and disappear, and a moving YUV 4:2:0 test pattern
//! with padded rows. Seeded for reproducible runs (seed 0 uses entropy).

use crate::config::CaptureConfig;
use crate::error::{Error, Result};
use crate::types::{MeshEvent, MeshId, MeshSource, Plane, RawFrameItem, Vertex};
use parking_lot::RwLock;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

fn seeded_rng(seed: u64) -> SmallRng {
    if seed == 0 {
        SmallRng::from_entropy()
    } else {
        SmallRng::seed_from_u64(seed)
    }
}

/// Live mesh store that encoders read vertices from
#[derive(Default)]
pub struct SceneMeshes {
    meshes: RwLock<HashMap<MeshId, Vec<Vertex>>>,
}

impl SceneMeshes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a mesh; returns true if it was not present before
    pub fn upsert(&self, id: MeshId, vertices: Vec<Vertex>) -> bool {
        self.meshes.write().insert(id, vertices).is_none()
    }

    /// Returns true if the mesh existed
    pub fn remove(&self, id: &MeshId) -> bool {
        self.meshes.write().remove(id).is_some()
    }

    pub fn contains(&self, id: &MeshId) -> bool {
        self.meshes.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.meshes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.read().is_empty()
    }
}

impl MeshSource for SceneMeshes {
    fn vertices(&self, id: &MeshId) -> Option<Vec<Vertex>> {
        self.meshes.read().get(id).cloned()
    }
}

/// Produces mesh add/update/remove events against a [`SceneMeshes`]
pub struct MeshGenerator {
    rng: SmallRng,
    scene: Arc<SceneMeshes>,
    mesh_count: usize,
    vertices_per_mesh: usize,
}

impl MeshGenerator {
    pub fn new(scene: Arc<SceneMeshes>, config: &CaptureConfig) -> Self {
        Self {
            rng: seeded_rng(config.seed),
            scene,
            mesh_count: config.mesh_count.max(1),
            vertices_per_mesh: config.vertices_per_mesh,
        }
    }

    /// Mutate the scene and describe what changed
    pub fn next_event(&mut self) -> MeshEvent {
        let id = MeshId::new(format!("mesh-{:04}", self.rng.gen_range(0..self.mesh_count)));

        if self.scene.contains(&id) && self.rng.gen_bool(0.1) {
            self.scene.remove(&id);
            return MeshEvent::Removed(id);
        }

        let vertices = self.surface_patch();
        if self.scene.upsert(id.clone(), vertices) {
            MeshEvent::Added(id)
        } else {
            MeshEvent::Updated(id)
        }
    }

    /// Noisy patch of floor-ish surface around a random centre
    fn surface_patch(&mut self) -> Vec<Vertex> {
        let cx = self.rng.gen_range(-5.0f32..5.0);
        let cz = self.rng.gen_range(-5.0f32..5.0);
        (0..self.vertices_per_mesh)
            .map(|_| {
                [
                    cx + self.rng.gen_range(-0.5f32..0.5),
                    self.rng.gen_range(-0.02f32..0.02),
                    cz + self.rng.gen_range(-0.5f32..0.5),
                ]
            })
            .collect()
    }
}

/// Produces padded YUV 4:2:0 frames of a scrolling gradient with sensor noise
pub struct FrameGenerator {
    rng: SmallRng,
    width: u32,
    height: u32,
    padding: u32,
    frame_index: u32,
}

impl FrameGenerator {
    pub fn new(config: &CaptureConfig) -> Result<Self> {
        if config.frame_width < 2 || config.frame_height < 2 {
            return Err(Error::InvalidParameter(format!(
                "capture frame {}x{} is too small for 4:2:0",
                config.frame_width, config.frame_height
            )));
        }
        Ok(Self {
            rng: seeded_rng(config.seed),
            width: config.frame_width,
            height: config.frame_height,
            padding: config.row_padding,
            frame_index: 0,
        })
    }

    pub fn next_frame(&mut self) -> RawFrameItem {
        let shift = self.frame_index;
        self.frame_index = self.frame_index.wrapping_add(1);

        let padding = self.padding;
        let y = self.plane(self.width, self.height, padding, |x, y| {
            x.wrapping_add(y).wrapping_add(shift) as u8
        });
        let (cw, ch) = (self.width / 2, self.height / 2);
        let u = self.plane(cw, ch, padding / 2, |x, _| (128 + (x % 32)) as u8);
        let v = self.plane(cw, ch, padding / 2, |_, y| (128 + (y % 32)) as u8);
        RawFrameItem { y, u, v }
    }

    fn plane(
        &mut self,
        width: u32,
        height: u32,
        padding: u32,
        pattern: impl Fn(u32, u32) -> u8,
    ) -> Plane {
        let stride = width + padding;
        let mut data = vec![0u8; (stride * height) as usize];
        for (row, line) in data.chunks_exact_mut(stride as usize).enumerate() {
            for (col, sample) in line[..width as usize].iter_mut().enumerate() {
                let noise: i8 = self.rng.gen_range(-3..=3);
                *sample = pattern(col as u32, row as u32).saturating_add_signed(noise);
            }
        }
        Plane::new(width, height, stride, data)
    }
}

/// Background thread calling `tick` at a fixed rate until `running` clears
pub fn spawn_periodic<F>(
    name: &str,
    rate_hz: f64,
    running: Arc<AtomicBool>,
    mut tick: F,
) -> Result<JoinHandle<()>>
where
    F: FnMut() + Send + 'static,
{
    if rate_hz.is_nan() || rate_hz <= 0.0 {
        return Err(Error::InvalidParameter(format!(
            "{name} rate must be positive, got {rate_hz}"
        )));
    }
    let interval = Duration::from_secs_f64(1.0 / rate_hz);
    let thread_name = name.to_string();

    thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            log::debug!("{} started at {:.1} Hz", thread_name, rate_hz);
            while running.load(Ordering::Relaxed) {
                let started = Instant::now();
                tick();
                let elapsed = started.elapsed();
                if elapsed < interval {
                    thread::sleep(interval - elapsed);
                }
            }
            log::debug!("{} exiting", thread_name);
        })
        .map_err(|e| Error::ThreadSpawn(format!("{name}: {e}")))
}
