//! # Render session
//!
//! The state machine that owns a [`Scene`], a [`Film`], and a pool of
//! worker threads, and drives them through
//! `Created -> Started -> (Paused <-> Started <-> InSceneEdit) -> Stopped`.
//! Workers are plain `std::thread` handles coordinated through
//! `parking_lot`-guarded shared state — one mutex per piece of shared data,
//! matching the tile repository and scene edit-state gate rather than a
//! single coarse lock over everything.

use crate::dlsc::DirectLightSamplingCache;
use crate::error::{RenderError, Result};
use crate::film::{pipeline::Pipeline, Film, OutputType};
use crate::integrator::{PathTracer, PathTracerParams, VarianceReductionCache};
use crate::persist::{atomic_write, FormatHeader, RESUME_MAGIC, RESUME_VERSION};
use crate::sampler::random::RandomSampler;
use crate::sampler::{SampleKind, Sampler};
use crate::scene::camera::Camera;
use crate::scene::Scene;
use crate::tile::TileRepository;
use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Started,
    Paused,
    InSceneEdit,
    Stopped,
}

#[derive(Debug, Clone, Default)]
pub struct HaltConditions {
    pub time: Option<Duration>,
    pub spp: Option<u64>,
    pub noise_threshold: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub samples: u64,
    pub elapsed: Duration,
    pub samples_per_sec: f64,
}

pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub thread_count: usize,
    pub path_tracer: PathTracerParams,
    pub halt: HaltConditions,
    pub outputs: Vec<OutputType>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            width: 512,
            height: 512,
            tile_size: crate::tile::DEFAULT_TILE_SIZE,
            thread_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            path_tracer: PathTracerParams::default(),
            halt: HaltConditions::default(),
            outputs: vec![OutputType::Rgb, OutputType::RgbImagepipeline],
        }
    }
}

/// Shared worker state. Each field is behind its own lock/atomic rather than
/// one struct-wide mutex, so a worker pulling a tile never blocks on another
/// worker merging its film.
struct Shared {
    scene: RwLock<Scene>,
    camera: RwLock<Camera>,
    film: Mutex<Film>,
    cache: RwLock<Option<DirectLightSamplingCache>>,
    tiles: TileRepository,
    running: AtomicBool,
    stop: AtomicBool,
    fatal: Mutex<Option<RenderError>>,
    samples_taken: AtomicU64,
    config: RenderConfig,
}

pub struct RenderSession {
    shared: Arc<Shared>,
    state: SessionState,
    workers: Vec<JoinHandle<()>>,
    stats: Stats,
    start_time: Option<Instant>,
    pipeline: Pipeline,
}

impl RenderSession {
    pub fn new(config: RenderConfig, scene: Scene, camera: Camera) -> Self {
        let tiles = TileRepository::new(config.width, config.height, config.tile_size, None);
        let outputs = config.outputs.clone();
        let (width, height) = (config.width, config.height);
        let shared = Shared {
            scene: RwLock::new(scene),
            camera: RwLock::new(camera),
            film: Mutex::new(Film::new(width, height, &outputs)),
            cache: RwLock::new(None),
            tiles,
            running: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            fatal: Mutex::new(None),
            samples_taken: AtomicU64::new(0),
            config,
        };
        RenderSession { shared: Arc::new(shared), state: SessionState::Created, workers: Vec::new(), stats: Stats::default(), start_time: None, pipeline: Pipeline::default_chain() }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Build every accelerator (scene BVH + light distribution) and spawn
    /// the worker pool.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Created && self.state != SessionState::Stopped {
            return Err(RenderError::Configuration("start() requires Created or Stopped state".into()));
        }
        self.shared.scene.write().rebuild();
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.stop.store(false, Ordering::SeqCst);
        self.start_time = Some(Instant::now());

        let thread_count = self.shared.config.thread_count.max(1);
        for worker_id in 0..thread_count {
            let shared = self.shared.clone();
            self.workers.push(std::thread::spawn(move || worker_loop(shared, worker_id as u32)));
        }
        self.state = SessionState::Started;
        Ok(())
    }

    /// Block worker tile pulls without tearing down accelerators.
    pub fn pause(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.state = SessionState::Paused;
    }

    pub fn resume(&mut self) {
        self.shared.running.store(true, Ordering::SeqCst);
        self.state = SessionState::Started;
    }

    /// Implicit pause plus scene mutation rights.
    pub fn begin_scene_edit(&mut self) {
        self.pause();
        self.shared.scene.write().begin_edit();
        self.state = SessionState::InSceneEdit;
    }

    /// Rebuild only the accelerators edits might have invalidated (the
    /// object BVH and light distribution; the DLSC is invalidated outright
    /// since it was built against the pre-edit visibility) and resume.
    pub fn end_scene_edit(&mut self) -> Result<()> {
        if self.state != SessionState::InSceneEdit {
            return Err(RenderError::Configuration("endSceneEdit() outside scene-edit state".into()));
        }
        self.shared.scene.write().rebuild();
        *self.shared.cache.write() = None;
        self.resume();
        Ok(())
    }

    /// Access the scene for mutation during [`SessionState::InSceneEdit`].
    pub fn edit_scene<F: FnOnce(&mut Scene)>(&self, f: F) -> Result<()> {
        if self.state != SessionState::InSceneEdit {
            return Err(RenderError::Configuration("scene mutation requires beginSceneEdit() first".into()));
        }
        f(&mut self.shared.scene.write());
        Ok(())
    }

    /// Install a freshly built direct-lighting sampling cache (built
    /// separately, since building needs pilot-pass candidates the session
    /// doesn't itself generate).
    pub fn set_cache(&self, cache: DirectLightSamplingCache) {
        *self.shared.cache.write() = Some(cache);
    }

    /// Join every worker and tear down the worker pool. The scene and film
    /// remain readable afterward.
    pub fn stop(&mut self) -> Result<()> {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst); // unpark any paused worker so it can observe `stop`
        for w in self.workers.drain(..) {
            w.join().map_err(|_| RenderError::Invariant("a render worker panicked".into()))?;
        }
        self.state = SessionState::Stopped;
        if let Some(err) = self.shared.fatal.lock().take() {
            return Err(err);
        }
        Ok(())
    }

    /// Refresh sample counts, elapsed time, and sample/sec, then apply any
    /// configured halt condition by stopping the session. Meant to be
    /// called periodically by the owner, never by a worker.
    pub fn update_stats(&mut self) -> Result<()> {
        let elapsed = self.start_time.map(|t| t.elapsed()).unwrap_or_default();
        let samples = self.shared.samples_taken.load(Ordering::Relaxed);
        self.stats = Stats { samples, elapsed, samples_per_sec: samples as f64 / elapsed.as_secs_f64().max(1e-6) };

        let halt = &self.shared.config.halt;
        let pixel_count = (self.shared.config.width * self.shared.config.height).max(1) as u64;
        let spp_done = samples / pixel_count;
        let time_exceeded = halt.time.is_some_and(|t| elapsed >= t);
        let spp_exceeded = halt.spp.is_some_and(|s| spp_done >= s);
        let noise_converged = halt.noise_threshold.is_some_and(|threshold| {
            // A per-pixel variance estimate needs at least two samples to
            // mean anything; below that every pixel reads as zero noise.
            if spp_done < 2 {
                return false;
            }
            let mut film = self.shared.film.lock();
            film.refresh_noise_channels(threshold);
            film.mean_relative_noise() < threshold
        });
        if (time_exceeded || spp_exceeded || noise_converged) && self.state != SessionState::Stopped {
            self.stop()?;
        }
        Ok(())
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn with_film<T>(&self, f: impl FnOnce(&Film) -> T) -> T {
        f(&self.shared.film.lock())
    }

    pub fn get_output(&self, channel: OutputType, run_pipeline: bool) -> Result<Vec<f32>> {
        self.shared.film.lock().get_output(channel, run_pipeline, &self.pipeline)
    }

    /// Serialize `{renderState, film}` to `path`. Scene/render-config are
    /// not re-serialized here — a resumed session is expected to rebuild
    /// the scene from its original description and reattach to this file
    /// only for progress (see the grounding ledger for why full scene
    /// persistence was scoped out).
    pub fn save_resume_file(&self, path: &Path) -> Result<()> {
        let mut out = Vec::new();
        FormatHeader { magic: RESUME_MAGIC, version: RESUME_VERSION }.write(&mut out)?;
        out.extend_from_slice(&self.shared.samples_taken.load(Ordering::Relaxed).to_le_bytes());

        let (pass, done) = self.shared.tiles.save_state();
        out.extend_from_slice(&pass.to_le_bytes());
        out.extend_from_slice(&(done.len() as u32).to_le_bytes());
        out.extend(done.iter().map(|&d| d as u8));

        let film = self.shared.film.lock();
        out.extend_from_slice(&film.width.to_le_bytes());
        out.extend_from_slice(&film.height.to_le_bytes());
        let channels: Vec<_> = film.channels().collect();
        out.extend_from_slice(&(channels.len() as u32).to_le_bytes());
        for (ty, buf) in channels {
            out.extend_from_slice(&(*ty as u32).to_le_bytes());
            out.push(buf.weighted as u8);
            out.extend_from_slice(&(buf.components as u32).to_le_bytes());
            write_f32_slice(&mut out, buf.raw_sum());
            write_f32_slice(&mut out, buf.raw_weight());
        }
        atomic_write(path, &out)
    }

    /// Restore `{renderState, film}` previously written by
    /// [`save_resume_file`]. Must be called before [`start`].
    pub fn load_resume_file(&mut self, path: &Path) -> Result<()> {
        if self.state != SessionState::Created {
            return Err(RenderError::Configuration("loadResumeFile() requires the Created state".into()));
        }
        let bytes = std::fs::read(path)?;
        let mut cursor = bytes.as_slice();
        FormatHeader::read(&mut cursor, RESUME_MAGIC, RESUME_VERSION)?;
        let samples = read_u64(&mut cursor)?;
        self.shared.samples_taken.store(samples, Ordering::SeqCst);

        let pass = read_u64(&mut cursor)?;
        let done_count = read_u32(&mut cursor)? as usize;
        let done: Vec<bool> = read_bytes(&mut cursor, done_count)?.iter().map(|&b| b != 0).collect();
        self.shared.tiles.restore_state(pass, &done);

        let width = read_u32(&mut cursor)?;
        let height = read_u32(&mut cursor)?;
        let channel_count = read_u32(&mut cursor)? as usize;
        let mut film = self.shared.film.lock();
        for _ in 0..channel_count {
            let ty_raw = read_u32(&mut cursor)?;
            let ty = output_type_from_u32(ty_raw)
                .ok_or_else(|| RenderError::Configuration(format!("resume file has unknown output type {ty_raw}")))?;
            let weighted = read_bytes(&mut cursor, 1)?[0] != 0;
            let components = read_u32(&mut cursor)? as usize;
            let sum = read_f32_slice(&mut cursor, (width as usize) * (height as usize) * components)?;
            let weight_len = if weighted { (width as usize) * (height as usize) } else { 0 };
            let weight = read_f32_slice(&mut cursor, weight_len)?;
            film.set_channel(ty, crate::film::ChannelBuffer::from_raw(width, height, components, weighted, sum, weight));
        }
        Ok(())
    }
}

fn write_f32_slice(out: &mut Vec<u8>, values: &[f32]) {
    out.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn read_u32(cursor: &mut &[u8]) -> Result<u32> {
    if cursor.len() < 4 {
        return Err(RenderError::Invariant("truncated resume file".into()));
    }
    let (head, rest) = cursor.split_at(4);
    *cursor = rest;
    Ok(u32::from_le_bytes(head.try_into().unwrap()))
}

fn read_u64(cursor: &mut &[u8]) -> Result<u64> {
    if cursor.len() < 8 {
        return Err(RenderError::Invariant("truncated resume file".into()));
    }
    let (head, rest) = cursor.split_at(8);
    *cursor = rest;
    Ok(u64::from_le_bytes(head.try_into().unwrap()))
}

fn read_bytes<'a>(cursor: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if cursor.len() < n {
        return Err(RenderError::Invariant("truncated resume file".into()));
    }
    let (head, rest) = cursor.split_at(n);
    *cursor = rest;
    Ok(head)
}

fn read_f32_slice(cursor: &mut &[u8], len: usize) -> Result<Vec<f32>> {
    let count = read_u32(cursor)? as usize;
    if count != len {
        return Err(RenderError::Invariant(format!("resume file channel length mismatch: expected {len}, found {count}")));
    }
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(f32::from_le_bytes(read_bytes(cursor, 4)?.try_into().unwrap()));
    }
    Ok(out)
}

fn output_type_from_u32(v: u32) -> Option<OutputType> {
    const ALL: &[OutputType] = &[
        OutputType::Rgb, OutputType::Rgba, OutputType::RgbImagepipeline, OutputType::RgbaImagepipeline, OutputType::Alpha,
        OutputType::Depth, OutputType::Position, OutputType::GeometryNormal, OutputType::ShadingNormal, OutputType::MaterialId,
        OutputType::DirectDiffuse, OutputType::DirectDiffuseReflect, OutputType::DirectDiffuseTransmit, OutputType::DirectGlossy,
        OutputType::DirectGlossyReflect, OutputType::DirectGlossyTransmit, OutputType::Emission, OutputType::IndirectDiffuse,
        OutputType::IndirectDiffuseReflect, OutputType::IndirectDiffuseTransmit, OutputType::IndirectGlossy,
        OutputType::IndirectGlossyReflect, OutputType::IndirectGlossyTransmit, OutputType::IndirectSpecular,
        OutputType::IndirectSpecularReflect, OutputType::IndirectSpecularTransmit, OutputType::MaterialIdMask,
        OutputType::DirectShadowMask, OutputType::IndirectShadowMask, OutputType::RadianceGroup, OutputType::Uv,
        OutputType::Raycount, OutputType::ByMaterialId, OutputType::Irradiance, OutputType::ObjectId, OutputType::ObjectIdMask,
        OutputType::ByObjectId, OutputType::Samplecount, OutputType::Convergence, OutputType::SerializedFilm,
        OutputType::MaterialIdColor, OutputType::Albedo, OutputType::AvgShadingNormal, OutputType::Noise,
        OutputType::UserImportance, OutputType::Caustic,
    ];
    ALL.iter().copied().find(|ty| *ty as u32 == v)
}

fn worker_loop(shared: Arc<Shared>, worker_id: u32) {
    let tracer = PathTracer::new(shared.config.path_tracer.clone());
    let mut sampler = RandomSampler::new(0x5EED_0000 ^ worker_id as u64);
    let mut rng = rand::rngs::StdRng::seed_from_u64(0xA11C_E000 ^ worker_id as u64);
    let mut local_film = Film::new(shared.config.width, shared.config.height, &shared.config.outputs);

    loop {
        if shared.stop.load(Ordering::Relaxed) {
            break;
        }
        if !shared.running.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(2));
            continue;
        }
        let Some((tile_index, coord, _pass)) = shared.tiles.pull() else { break };

        local_film.clear();
        let scene = shared.scene.read();
        let camera = shared.camera.read();
        let cache = shared.cache.read();
        let cache_ref: Option<&dyn VarianceReductionCache> = cache.as_ref().map(|c| c as &dyn VarianceReductionCache);

        let mut samples_this_tile = 0u64;
        for y in coord.y..coord.y + coord.height {
            for x in coord.x..coord.x + coord.width {
                sampler.start_pixel(x, y, 0);
                let jitter = sampler.get_2d(SampleKind::Camera);
                let ndc = Camera::pixel_to_ndc(x as f32 + jitter.0, y as f32 + jitter.1, shared.config.width, shared.config.height);
                let ray = camera.generate_ray(ndc);
                let radiance = tracer.trace(&scene, cache_ref, ray, &mut rng);
                local_film.splat_radiance(x, y, radiance, 1.0);
                samples_this_tile += 1;
            }
        }
        drop(scene);
        drop(camera);
        drop(cache);

        shared.film.lock().add_film(&local_film);
        shared.samples_taken.fetch_add(samples_this_tile, Ordering::Relaxed);
        shared.tiles.mark_done(tile_index, samples_this_tile);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Spectrum;
    use crate::math::{Transform, Vec3};
    use crate::mesh::{MeshRef, TriangleMesh};
    use crate::scene::light::LightSource;
    use crate::scene::material::Material;
    use crate::texture::Texture;

    fn tiny_scene_and_camera() -> (Scene, Camera) {
        let mut scene = Scene::new();
        let vertices = vec![Vec3::new(-10.0, 0.0, -10.0), Vec3::new(10.0, 0.0, -10.0), Vec3::new(0.0, 0.0, 10.0)];
        let mesh = TriangleMesh::build(vertices, vec![[0, 1, 2]], None, vec![], vec![], vec![], 0.0).unwrap();
        let mesh_id = scene.add_mesh("floor", mesh);
        let albedo = scene.textures.insert_named("albedo", Texture::Constant(Spectrum::new(0.6, 0.6, 0.6)));
        let mat = scene.add_material("matte", Material::Matte { albedo });
        let mesh_arc = scene.mesh(mesh_id).clone();
        scene.begin_edit();
        scene.add_object("floor_obj", MeshRef::Base(mesh_arc), mat, None).unwrap();
        scene.add_light(LightSource::Point { position: Vec3::new(0.0, 5.0, 0.0), intensity: Spectrum::new(40.0, 40.0, 40.0) });
        scene.rebuild();
        let camera = Camera::perspective(Transform::look_at(Vec3::new(0.0, 2.0, -5.0), Vec3::ZERO, Vec3::Y), std::f32::consts::FRAC_PI_3);
        (scene, camera)
    }

    #[test]
    fn session_renders_a_few_tiles_and_stops_on_spp_halt() {
        let (scene, camera) = tiny_scene_and_camera();
        let config = RenderConfig {
            width: 16,
            height: 16,
            tile_size: 8,
            thread_count: 2,
            halt: HaltConditions { spp: Some(1), ..Default::default() },
            ..Default::default()
        };
        let mut session = RenderSession::new(config, scene, camera);
        session.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        session.update_stats().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.stats().samples > 0);
    }

    #[test]
    fn session_stops_once_noise_falls_below_threshold() {
        let (scene, camera) = tiny_scene_and_camera();
        let config = RenderConfig {
            width: 16,
            height: 16,
            tile_size: 8,
            thread_count: 2,
            // A generously loose threshold: convergence is expected well
            // before any spp/time halt would fire, proving the knob is live.
            halt: HaltConditions { noise_threshold: Some(5.0), ..Default::default() },
            ..Default::default()
        };
        let mut session = RenderSession::new(config, scene, camera);
        session.start().unwrap();
        std::thread::sleep(Duration::from_millis(80));
        session.update_stats().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn noise_threshold_is_ignored_before_two_samples_per_pixel() {
        let (scene, camera) = tiny_scene_and_camera();
        let config = RenderConfig {
            width: 64,
            height: 64,
            tile_size: 8,
            thread_count: 1,
            halt: HaltConditions { noise_threshold: Some(5.0), ..Default::default() },
            ..Default::default()
        };
        let mut session = RenderSession::new(config, scene, camera);
        session.start().unwrap();
        // Too short for even one full pass over a 64x64 film with one worker.
        std::thread::sleep(Duration::from_millis(1));
        session.update_stats().unwrap();
        assert_ne!(session.state(), SessionState::Stopped, "a single sample per pixel must not look already converged");
        session.stop().unwrap();
    }

    #[test]
    fn pause_then_resume_does_not_lose_progress() {
        let (scene, camera) = tiny_scene_and_camera();
        let config = RenderConfig { width: 16, height: 16, tile_size: 8, thread_count: 1, ..Default::default() };
        let mut session = RenderSession::new(config, scene, camera);
        session.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        session.pause();
        assert_eq!(session.state(), SessionState::Paused);
        let samples_before = session.shared.samples_taken.load(Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(20));
        let samples_during_pause = session.shared.samples_taken.load(Ordering::Relaxed);
        assert_eq!(samples_before, samples_during_pause);
        session.resume();
        session.stop().unwrap();
    }

    #[test]
    fn resume_file_round_trips_sample_count_and_tile_state() {
        let (scene, camera) = tiny_scene_and_camera();
        let config = RenderConfig { width: 8, height: 8, tile_size: 8, thread_count: 1, halt: HaltConditions { spp: Some(1), ..Default::default() }, ..Default::default() };
        let mut session = RenderSession::new(config, scene, camera);
        session.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        session.update_stats().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.rsm");
        session.save_resume_file(&path).unwrap();

        let (scene2, camera2) = tiny_scene_and_camera();
        let config2 = RenderConfig { width: 8, height: 8, tile_size: 8, thread_count: 1, ..Default::default() };
        let mut resumed = RenderSession::new(config2, scene2, camera2);
        resumed.load_resume_file(&path).unwrap();
        assert_eq!(resumed.shared.samples_taken.load(Ordering::Relaxed), session.stats().samples);
    }
}
