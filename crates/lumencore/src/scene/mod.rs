//! # Scene
//!
//! Named dictionaries of meshes, materials, lights, and objects, owned by
//! one [`Scene`] rather than linked by raw pointers: every other entity
//! references a scene member by a stable arena index
//! ([`MeshId`]/[`MaterialId`]/[`LightId`]/[`ObjectId`]), the fix the design
//! notes call out for the original's cyclic scene/mesh/texture pointer web.
//! A name index on top of each arena mirrors the original's name-keyed
//! `Properties` lookup without needing string comparisons on the hot path.

pub mod bsdf;
pub mod camera;
pub mod light;
pub mod material;

use crate::bvh::{Bounded, IndexBvh};
use crate::distribution::Distribution1D;
use crate::error::{RenderError, Result};
use crate::image::MipImageMap;
use crate::math::{Bounds3, Ray, Vec2, Vec3};
use crate::mesh::{MeshHit, MeshRef, TriangleMesh};
use crate::texture::{HitPoint, TextureGraph};
use light::LightSource;
use material::{Emitter, Material};
use std::collections::HashMap;
use std::sync::Arc;

pub type MeshId = u32;
pub type MaterialId = u32;
pub type LightId = u32;
pub type ObjectId = u32;

/// A placed instance of a mesh in the scene, carrying the material and
/// optional emitter that apply to every triangle on it (per-triangle
/// material overrides are out of scope — see the grounding ledger).
pub struct SceneObject {
    pub name: String,
    pub mesh: MeshRef,
    pub material: MaterialId,
    pub emitter: Option<LightId>,
}

impl Bounded for SceneObject {
    fn bounds(&self) -> Bounds3 {
        self.mesh.bounds()
    }
}

/// Result of a world-space ray cast against the whole scene.
pub struct SceneHit {
    pub object: ObjectId,
    pub mesh_hit: MeshHit,
    pub p: Vec3,
    pub ns: Vec3,
    pub ng: Vec3,
}

/// Whether scene mutation is currently allowed. Mirrors the render
/// session's edit-mode gate: the BVH and light distribution are rebuilt
/// only when edits are committed, not on every individual mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditState {
    Closed,
    Editing,
}

/// `lightstrategy.type`: how [`Scene::rebuild`] weights the global light
/// distribution that `sample_light`/`light_pdf` fall back to when no
/// [`crate::dlsc::DirectLightSamplingCache`] is in play (`DLS_CACHE` picks
/// the cache at the integrator level instead of touching this field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightStrategy {
    Uniform,
    Power,
    LogPower,
}

fn light_weights(lights: &[LightSource], strategy: LightStrategy) -> Vec<f32> {
    match strategy {
        LightStrategy::Uniform => vec![1.0; lights.len()],
        LightStrategy::Power => lights.iter().map(|l| l.power().max(0.0)).collect(),
        LightStrategy::LogPower => lights.iter().map(|l| (1.0 + l.power().max(0.0)).ln()).collect(),
    }
}

pub struct Scene {
    meshes: Vec<Arc<TriangleMesh>>,
    mesh_names: HashMap<String, MeshId>,
    materials: Vec<Material>,
    material_names: HashMap<String, MaterialId>,
    lights: Vec<LightSource>,
    emitters: HashMap<LightId, Emitter>,
    objects: Vec<SceneObject>,
    object_names: HashMap<String, ObjectId>,
    pub textures: TextureGraph,
    pub image_maps: Vec<MipImageMap>,
    object_bvh: IndexBvh,
    light_distribution: Distribution1D,
    light_strategy: LightStrategy,
    edit_state: EditState,
}

impl Scene {
    pub fn new() -> Self {
        Scene {
            meshes: Vec::new(),
            mesh_names: HashMap::new(),
            materials: Vec::new(),
            material_names: HashMap::new(),
            lights: Vec::new(),
            emitters: HashMap::new(),
            objects: Vec::new(),
            object_names: HashMap::new(),
            textures: TextureGraph::new(),
            image_maps: Vec::new(),
            object_bvh: IndexBvh::empty(),
            light_distribution: Distribution1D::uniform(0),
            light_strategy: LightStrategy::LogPower,
            edit_state: EditState::Closed,
        }
    }

    /// Switch `lightstrategy.type`; takes effect on the next [`Scene::rebuild`].
    pub fn set_light_strategy(&mut self, strategy: LightStrategy) {
        self.light_strategy = strategy;
    }

    pub fn add_mesh(&mut self, name: impl Into<String>, mesh: TriangleMesh) -> MeshId {
        let id = self.meshes.len() as MeshId;
        self.meshes.push(Arc::new(mesh));
        self.mesh_names.insert(name.into(), id);
        id
    }

    pub fn mesh(&self, id: MeshId) -> &Arc<TriangleMesh> {
        &self.meshes[id as usize]
    }

    pub fn resolve_mesh(&self, name: &str) -> Option<MeshId> {
        self.mesh_names.get(name).copied()
    }

    pub fn add_material(&mut self, name: impl Into<String>, material: Material) -> MaterialId {
        let id = self.materials.len() as MaterialId;
        self.materials.push(material);
        self.material_names.insert(name.into(), id);
        id
    }

    pub fn material(&self, id: MaterialId) -> &Material {
        &self.materials[id as usize]
    }

    pub fn add_light(&mut self, light: LightSource) -> LightId {
        let id = self.lights.len() as LightId;
        self.lights.push(light);
        id
    }

    pub fn set_emitter(&mut self, light: LightId, emitter: Emitter) {
        self.emitters.insert(light, emitter);
    }

    pub fn lights(&self) -> &[LightSource] {
        &self.lights
    }

    pub fn light(&self, id: LightId) -> &LightSource {
        &self.lights[id as usize]
    }

    /// Picks a light from the distribution [`rebuild`] last built under the
    /// current [`LightStrategy`] (`LOG_POWER` by default).
    pub fn sample_light(&self, u: f32) -> Option<(LightId, f32)> {
        if self.lights.is_empty() {
            return None;
        }
        let (idx, pdf) = self.light_distribution.sample(u);
        Some((idx as LightId, pdf))
    }

    pub fn light_pdf(&self, id: LightId) -> f32 {
        if self.lights.is_empty() {
            0.0
        } else {
            self.light_distribution.pdf(id as usize)
        }
    }

    pub fn begin_edit(&mut self) {
        self.edit_state = EditState::Editing;
    }

    pub fn add_object(&mut self, name: impl Into<String>, mesh: MeshRef, material: MaterialId, emitter: Option<LightId>) -> Result<ObjectId> {
        if self.edit_state != EditState::Editing && !self.objects.is_empty() {
            return Err(RenderError::Configuration("scene must be in edit mode to add objects after the initial build".into()));
        }
        let id = self.objects.len() as ObjectId;
        let name = name.into();
        self.object_names.insert(name.clone(), id);
        self.objects.push(SceneObject { name, mesh, material, emitter });
        Ok(id)
    }

    pub fn object(&self, id: ObjectId) -> &SceneObject {
        &self.objects[id as usize]
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    /// Recompute the top-level object BVH and the light power distribution.
    /// Must be called once after the initial scene build and again after
    /// every `begin_edit`/mutate cycle before rendering resumes.
    pub fn rebuild(&mut self) {
        self.object_bvh = IndexBvh::build(&self.objects);
        self.light_distribution = Distribution1D::new(light_weights(&self.lights, self.light_strategy));
        self.edit_state = EditState::Closed;
        self.textures.validate_acyclic().expect("scene built with a cyclic texture graph");
    }

    pub fn bounds(&self) -> Bounds3 {
        self.objects.iter().fold(Bounds3::EMPTY, |b, o| {
            let ob = o.bounds();
            b.union(&ob)
        })
    }

    /// Cast a world-space ray against every object via the top-level BVH.
    pub fn intersect(&self, ray: &Ray) -> Option<SceneHit> {
        let hit = self.object_bvh.intersect(&self.objects, ray, |obj, r| obj.mesh.intersect(r).map(|(h, _, _)| h.t));
        let (obj_idx, t) = hit?;
        let obj = &self.objects[obj_idx as usize];
        let mut local_ray = *ray;
        local_ray.maxt = t + 1e-4;
        let (mesh_hit, ns, ng) = obj.mesh.intersect(&local_ray)?;
        let p = ray.at(mesh_hit.t);
        Some(SceneHit { object: obj_idx, mesh_hit, p, ns, ng })
    }

    pub fn occluded(&self, ray: &Ray) -> bool {
        self.object_bvh.intersect(&self.objects, ray, |obj, r| obj.mesh.intersect(r).map(|(h, _, _)| h.t)).is_some()
    }

    /// Build the [`HitPoint`] bundle a material's BSDF and emitter read at
    /// `hit`, resolving interpolated UV/color/alpha channels through the
    /// owning object's mesh.
    pub fn hit_point(&self, hit: &SceneHit, wo: Vec3) -> HitPoint {
        let obj = &self.objects[hit.object as usize];
        let mesh = obj.mesh.mesh();
        let mut uv = [Vec2::ZERO; 8];
        let mut color = [crate::color::Spectrum::WHITE; 8];
        let mut alpha = [1.0f32; 8];
        for i in 0..8 {
            uv[i] = mesh.interpolate_uv(i, &hit.mesh_hit);
            color[i] = mesh.interpolate_color(i, &hit.mesh_hit);
        }
        HitPoint {
            p: hit.p,
            n: hit.ng,
            ns: hit.ns,
            uv,
            color,
            alpha,
            dpdu: Vec3::X,
            dpdv: Vec3::Z,
            wo,
            object_id: hit.object,
            material_id: obj.material,
        }
    }

    pub fn emitted_radiance(&self, hit: &SceneHit, wo: Vec3) -> crate::color::Spectrum {
        let obj = &self.objects[hit.object as usize];
        let Some(light_id) = obj.emitter else { return crate::color::Spectrum::BLACK };
        let Some(emitter) = self.emitters.get(&light_id) else { return crate::color::Spectrum::BLACK };
        if hit.ng.dot(wo) <= 0.0 {
            return crate::color::Spectrum::BLACK;
        }
        let hp = self.hit_point(hit, wo);
        emitter.radiance(&self.textures, &hp, &self.image_maps)
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Spectrum;
    use crate::texture::Texture;

    fn unit_triangle_mesh() -> TriangleMesh {
        let vertices = vec![Vec3::new(-10.0, -10.0, 0.0), Vec3::new(10.0, -10.0, 0.0), Vec3::new(0.0, 10.0, 0.0)];
        TriangleMesh::build(vertices, vec![[0, 1, 2]], None, vec![], vec![], vec![], 0.0).unwrap()
    }

    #[test]
    fn scene_ray_cast_resolves_material_and_normal() {
        let mut scene = Scene::new();
        let mesh_id = scene.add_mesh("floor", unit_triangle_mesh());
        let albedo = scene.textures.insert_named("albedo", Texture::Constant(Spectrum::splat(0.5)));
        let mat = scene.add_material("matte", Material::Matte { albedo });
        let mesh_arc = scene.mesh(mesh_id).clone();
        scene.begin_edit();
        scene.add_object("floor_obj", MeshRef::Base(mesh_arc), mat, None).unwrap();
        scene.rebuild();

        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let hit = scene.intersect(&ray).expect("ray should hit the floor");
        assert_eq!(hit.object, 0);
        assert!(hit.ns.z < 0.0 || hit.ns.z > 0.0);
    }

    #[test]
    fn empty_scene_has_no_lights_to_sample() {
        let scene = Scene::new();
        assert!(scene.sample_light(0.5).is_none());
    }

    #[test]
    fn power_strategy_favors_the_brighter_of_two_lights() {
        let mut scene = Scene::new();
        scene.add_light(LightSource::Point { position: Vec3::new(0.0, 1.0, 0.0), intensity: Spectrum::splat(1.0) });
        scene.add_light(LightSource::Point { position: Vec3::new(0.0, 1.0, 0.0), intensity: Spectrum::splat(1000.0) });
        scene.set_light_strategy(LightStrategy::Power);
        scene.rebuild();
        let (picked, pdf) = scene.sample_light(0.999).unwrap();
        assert_eq!(picked, 1, "the 1000x brighter light should dominate the distribution");
        assert!(pdf > 0.9);
    }

    #[test]
    fn uniform_strategy_ignores_power() {
        let mut scene = Scene::new();
        scene.add_light(LightSource::Point { position: Vec3::new(0.0, 1.0, 0.0), intensity: Spectrum::splat(1.0) });
        scene.add_light(LightSource::Point { position: Vec3::new(0.0, 1.0, 0.0), intensity: Spectrum::splat(1000.0) });
        scene.set_light_strategy(LightStrategy::Uniform);
        scene.rebuild();
        assert!((scene.light_pdf(0) - 0.5).abs() < 1e-5);
        assert!((scene.light_pdf(1) - 0.5).abs() < 1e-5);
    }
}
