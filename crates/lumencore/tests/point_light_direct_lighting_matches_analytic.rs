//! A matte floor lit by a single point light directly overhead: at the
//! point straight below the light, normal incidence makes the direct
//! lighting term `albedo/pi * intensity/distance^2` exactly, with no other
//! light source or bounce in the scene to perturb it.

use lumencore::color::Spectrum;
use lumencore::integrator::{PathTracer, PathTracerParams};
use lumencore::math::{Ray, Vec3};
use lumencore::mesh::{MeshRef, TriangleMesh};
use lumencore::scene::light::LightSource;
use lumencore::scene::material::Material;
use lumencore::scene::Scene;
use lumencore::texture::Texture;
use rand::rngs::StdRng;
use rand::SeedableRng;

const ALBEDO: f32 = 0.8;
const INTENSITY: f32 = 50.0;
const LIGHT_HEIGHT: f32 = 4.0;

fn floor_lit_from_directly_above() -> Scene {
    let mut scene = Scene::new();
    let vertices = vec![
        Vec3::new(-5.0, 0.0, -5.0),
        Vec3::new(5.0, 0.0, -5.0),
        Vec3::new(5.0, 0.0, 5.0),
        Vec3::new(-5.0, 0.0, 5.0),
    ];
    let mesh = TriangleMesh::build(vertices, vec![[0, 1, 2], [0, 2, 3]], None, vec![], vec![], vec![], 0.0).unwrap();
    let mesh_id = scene.add_mesh("floor", mesh);
    let albedo = scene.textures.insert_named("albedo", Texture::Constant(Spectrum::splat(ALBEDO)));
    let mat = scene.add_material("matte", Material::Matte { albedo });
    let mesh_arc = scene.mesh(mesh_id).clone();
    scene.begin_edit();
    scene.add_object("floor_obj", MeshRef::Base(mesh_arc), mat, None).unwrap();
    scene.add_light(LightSource::Point { position: Vec3::new(0.0, LIGHT_HEIGHT, 0.0), intensity: Spectrum::splat(INTENSITY) });
    scene.rebuild();
    scene
}

#[test]
fn radiance_straight_down_matches_the_lambertian_point_light_formula() {
    let scene = floor_lit_from_directly_above();
    let tracer = PathTracer::new(PathTracerParams::default());
    let mut rng = StdRng::seed_from_u64(7);

    let ray = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::NEG_Y);
    let radiance = tracer.trace(&scene, None, ray, &mut rng);

    let expected = ALBEDO * std::f32::consts::FRAC_1_PI * INTENSITY / (LIGHT_HEIGHT * LIGHT_HEIGHT);
    assert!(
        (radiance.r - expected).abs() < 1e-3,
        "expected {expected}, got {radiance:?} (single delta light, no occluders: the NEE term should be exact)"
    );
    assert!((radiance.r - radiance.g).abs() < 1e-6);
    assert!((radiance.r - radiance.b).abs() < 1e-6);
}
