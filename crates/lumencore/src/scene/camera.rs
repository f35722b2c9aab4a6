//! The camera generates a primary ray per film-space sample. Two
//! projections, matching the `scene.camera.type` property: `perspective`
//! (the common case) and `orthographic` (used by the single-triangle test
//! scenario, where screen-space coverage must match analytically without a
//! lens).

use crate::math::{Ray, Transform, Vec2, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective { fov_y_radians: f32 },
    Orthographic { screen_height: f32 },
}

/// `camera_to_world` places the camera looking down `-Z` in its own space,
/// consistent with [`Transform::look_at`].
#[derive(Debug, Clone)]
pub struct Camera {
    pub camera_to_world: Transform,
    pub projection: Projection,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn perspective(camera_to_world: Transform, fov_y_radians: f32) -> Self {
        Camera { camera_to_world, projection: Projection::Perspective { fov_y_radians }, near: 1e-3, far: 1e6 }
    }

    pub fn orthographic(camera_to_world: Transform, screen_height: f32) -> Self {
        Camera { camera_to_world, projection: Projection::Orthographic { screen_height }, near: 1e-3, far: 1e6 }
    }

    /// Generate the primary ray for a normalized screen coordinate in
    /// `[-aspect, aspect] x [-1, 1]` (`ndc.y` increasing upward).
    pub fn generate_ray(&self, ndc: Vec2) -> Ray {
        let (origin, direction) = match self.projection {
            Projection::Perspective { fov_y_radians } => {
                let tan_half = (fov_y_radians * 0.5).tan();
                let dir_camera = Vec3::new(ndc.x * tan_half, ndc.y * tan_half, -1.0).normalize();
                (Vec3::ZERO, dir_camera)
            }
            Projection::Orthographic { screen_height } => {
                let half = screen_height * 0.5;
                (Vec3::new(ndc.x * half, ndc.y * half, 0.0), Vec3::NEG_Z)
            }
        };
        let world_origin = self.camera_to_world.transform_point(origin);
        let world_dir = self.camera_to_world.transform_vector(direction).normalize_or_zero();
        let mut ray = Ray::new(world_origin, world_dir);
        ray.mint = self.near;
        ray.maxt = self.far;
        ray
    }

    /// Map a pixel plus a jittered in-pixel offset to the normalized screen
    /// coordinate [`generate_ray`] expects.
    pub fn pixel_to_ndc(px: f32, py: f32, width: u32, height: u32) -> Vec2 {
        let aspect = width as f32 / height.max(1) as f32;
        let x = (px / width as f32 * 2.0 - 1.0) * aspect;
        let y = 1.0 - py / height as f32 * 2.0;
        Vec2::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orthographic_rays_stay_parallel() {
        let cam = Camera::orthographic(Transform::IDENTITY, 2.0);
        let a = cam.generate_ray(Vec2::new(-0.5, 0.0));
        let b = cam.generate_ray(Vec2::new(0.5, 0.0));
        assert_eq!(a.direction, b.direction);
        assert_ne!(a.origin, b.origin);
    }

    #[test]
    fn perspective_rays_diverge_from_the_eye() {
        let cam = Camera::perspective(Transform::IDENTITY, std::f32::consts::FRAC_PI_2);
        let center = cam.generate_ray(Vec2::ZERO);
        let corner = cam.generate_ray(Vec2::new(1.0, 1.0));
        assert_eq!(center.origin, Vec3::ZERO);
        assert_ne!(center.direction, corner.direction);
    }

    #[test]
    fn pixel_to_ndc_maps_image_center_to_origin() {
        let ndc = Camera::pixel_to_ndc(50.0, 50.0, 100, 100);
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
    }
}
