//! A single emissive triangle, orthographic camera, no light sources: rays
//! inside the triangle's projected area should see its emission exactly,
//! rays outside should see black.

use lumencore::color::Spectrum;
use lumencore::math::{Transform, Vec2, Vec3};
use lumencore::mesh::{MeshRef, TriangleMesh};
use lumencore::scene::camera::Camera;
use lumencore::scene::material::{Emitter, EmissionSpec, Material};
use lumencore::scene::Scene;
use lumencore::texture::Texture;

fn build_scene() -> Scene {
    let mut scene = Scene::new();
    let vertices = vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
    let mesh = TriangleMesh::build(vertices, vec![[0, 1, 2]], None, vec![], vec![], vec![], 0.0).unwrap();
    let mesh_id = scene.add_mesh("tri", mesh);
    let mat = scene.add_material("null", Material::Null);
    let emission_tex = scene.textures.insert_named("emission", Texture::Constant(Spectrum::WHITE));
    let mesh_arc = scene.mesh(mesh_id).clone();
    scene.begin_edit();
    let object = scene.add_object("tri_obj", MeshRef::Base(mesh_arc), mat, Some(0)).unwrap();
    scene.set_emitter(0, Emitter { spec: EmissionSpec { texture: emission_tex, gain: 1.0, power: 0.0, efficacy: 0.0 } });
    scene.rebuild();
    assert_eq!(object, 0);
    scene
}

fn camera_along_negative_z() -> Camera {
    let eye = Vec3::new(0.5, 0.5, 2.0);
    let target = Vec3::new(0.5, 0.5, 0.0);
    Camera::orthographic(Transform::look_at(eye, target, Vec3::Y), 2.0)
}

#[test]
fn inside_the_triangle_sees_full_emission() {
    let scene = build_scene();
    let camera = camera_along_negative_z();
    // u = 0.2, v = 0.2 -> u + v <= 1, inside the triangle.
    let ray = camera.generate_ray(Vec2::new(-0.3, -0.3));
    let hit = scene.intersect(&ray).expect("ray through the triangle's interior must hit it");
    let radiance = scene.emitted_radiance(&hit, -ray.direction);
    assert!((radiance.r - 1.0).abs() < 1e-5, "expected white emission, got {radiance:?}");
    assert!((radiance.g - 1.0).abs() < 1e-5);
    assert!((radiance.b - 1.0).abs() < 1e-5);
}

#[test]
fn outside_the_triangle_sees_nothing() {
    let scene = build_scene();
    let camera = camera_along_negative_z();
    // u = 0.9, v = 0.9 -> u + v > 1, outside the triangle's hypotenuse.
    let ray = camera.generate_ray(Vec2::new(0.4, 0.4));
    assert!(scene.intersect(&ray).is_none(), "ray outside the triangle must miss it entirely");
}
