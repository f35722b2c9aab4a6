//! A two-triangle wedge folded into a convex dihedral along the shared
//! v0-v1 edge: with no bevel radius the flat triangle's geometric normal is
//! the shading normal everywhere; with a bevel radius configured, a ray
//! that grazes close enough to the shared edge is rounded onto the bevel
//! capsule instead, returning a different (but still unit-length) normal.

use lumencore::math::{Ray, Vec3};
use lumencore::mesh::TriangleMesh;

fn wedge_vertices() -> Vec<Vec3> {
    vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.5), Vec3::new(0.0, 1.0, -0.5)]
}

fn triangle0_normal() -> Vec3 {
    let v = wedge_vertices();
    (v[1] - v[0]).cross(v[2] - v[0]).normalize_or_zero()
}

/// A ray aimed at a point on triangle 0 close to the shared v0-v1 edge
/// (barycentric weight 0.1 toward the far vertex), approaching along the
/// flat face's own normal so it would hit the flat triangle dead-on if the
/// edge weren't rounded.
fn ray_near_the_shared_edge() -> Ray {
    let v = wedge_vertices();
    let point = v[0] * 0.45 + v[1] * 0.45 + v[2] * 0.1;
    let n0 = triangle0_normal();
    Ray::new(point + n0 * 5.0, -n0)
}

#[test]
fn without_bevel_the_shading_normal_is_the_flat_face_normal() {
    let mesh = TriangleMesh::build(wedge_vertices(), vec![[0, 1, 2], [1, 0, 3]], None, vec![], vec![], vec![], 0.0).unwrap();
    let (_, n, ng) = mesh.intersect(&ray_near_the_shared_edge()).expect("ray must hit triangle 0");
    let n0 = triangle0_normal();
    assert!(n.dot(n0) > 1.0 - 1e-5, "expected the flat normal {n0:?}, got {n:?}");
    assert!(ng.dot(n0) > 1.0 - 1e-5);
}

#[test]
fn with_bevel_the_edge_rounds_onto_the_capsule() {
    let mesh = TriangleMesh::build(wedge_vertices(), vec![[0, 1, 2], [1, 0, 3]], None, vec![], vec![], vec![], 0.1).unwrap();
    let (_, n, ng) = mesh.intersect(&ray_near_the_shared_edge()).expect("ray must still hit the mesh");

    assert!((n.length() - 1.0).abs() < 1e-3, "rounded normal should be unit length, got {n:?}");

    let n0 = triangle0_normal();
    assert!(n.dot(n0) < 1.0 - 1e-4, "rounded normal should differ from the flat face it replaced");

    // The flat geometric normal reported alongside the rounded shading
    // normal still names triangle 0, the one the ray actually hit.
    assert!((ng.dot(n0) - 1.0).abs() < 1e-5);
}
