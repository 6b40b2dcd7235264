use glam::{Mat3, Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::math::{self, Viewport};

/// Camera used by the renderers for 2D and 3D projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub viewport: Viewport,
    pub position: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,
    pub fov: f32,
    pub ratio: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            position: Vec3::new(5.0, 5.0, 5.0),
            look_at: Vec3::ZERO,
            up: Vec3::Z,
            fov: 60.0,
            ratio: 0.0,
            znear: 1.0,
            zfar: 20.0,
        }
    }
}

impl Camera {
    pub fn new(viewport: Viewport) -> Self {
        let mut camera = Self {
            viewport,
            ..Self::default()
        };
        camera.calc_ratio();
        camera
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn calc_ratio(&mut self) {
        self.ratio = self.viewport.ratio();
    }

    pub fn projection(&self) -> Mat4 {
        math::perspective(self.fov, self.ratio, self.znear, self.zfar)
    }

    pub fn ortho(&self) -> Mat3 {
        math::ortho_2d(self.viewport)
    }

    pub fn ortho_3d(&self) -> Mat4 {
        math::ortho_3d(self.viewport, self.znear, self.zfar)
    }

    pub fn view(&self) -> Mat4 {
        math::look_at(self.position, self.look_at, self.up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_look_at_origin_with_z_up() {
        let camera = Camera::new(Viewport::new(0.0, 0.0, 600.0, 400.0));
        assert_eq!(camera.position, Vec3::splat(5.0));
        assert_eq!(camera.up, Vec3::Z);
        assert_eq!(camera.ratio, 1.5);
        let origin = camera.view().transform_point3(Vec3::ZERO);
        assert!((origin.length() - Vec3::splat(5.0).length()).abs() < 1e-4);
        assert!(origin.z < 0.0);
    }

    #[test]
    fn ratio_follows_viewport() {
        let mut camera = Camera::default();
        camera.set_viewport(Viewport::new(0.0, 0.0, 800.0, 200.0));
        camera.calc_ratio();
        assert_eq!(camera.ratio, 4.0);
    }
}
