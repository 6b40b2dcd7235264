use glam::{Mat3, Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Position component for 2D actors.
///
/// `rot` is in degrees and rotates around `rot_point`, which is relative
/// to `pos`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pos2D {
    pub pos: Vec2,
    pub size: Vec2,
    pub scale: Vec2,
    pub rot_point: Vec2,
    pub rot: f32,
    pub visible: bool,
}

impl Default for Pos2D {
    fn default() -> Self {
        Self {
            pos: Vec2::ZERO,
            size: Vec2::ONE,
            scale: Vec2::ONE,
            rot_point: Vec2::ZERO,
            rot: 0.0,
            visible: true,
        }
    }
}

impl Pos2D {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(size: Vec2) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Model matrix: translate, rotate around the rotation point, then scale.
    pub fn model(&self) -> Mat3 {
        Mat3::from_translation(self.pos + self.rot_point)
            * Mat3::from_angle(self.rot.to_radians())
            * Mat3::from_translation(-self.rot_point)
            * Mat3::from_scale(self.size * self.scale)
    }

    pub fn scaled_size(&self) -> Vec2 {
        self.size * self.scale
    }

    pub fn center(&self) -> Vec2 {
        self.pos + self.scaled_size() / 2.0
    }

    /// True if the point lies strictly inside the scaled rectangle.
    pub fn point_in_rect(&self, point: Vec2) -> bool {
        let max = self.pos + self.scaled_size();
        point.x > self.pos.x && point.x < max.x && point.y > self.pos.y && point.y < max.y
    }
}

/// Position component for 3D actors, rotations in degrees applied X, Y, Z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pos3D {
    pub pos: Vec3,
    pub size: Vec3,
    pub scale: Vec3,
    pub rot_point: Vec3,
    pub rot: Vec3,
    pub visible: bool,
}

impl Default for Pos3D {
    fn default() -> Self {
        Self {
            pos: Vec3::ZERO,
            size: Vec3::ONE,
            scale: Vec3::ONE,
            rot_point: Vec3::ZERO,
            rot: Vec3::ZERO,
            visible: true,
        }
    }
}

impl Pos3D {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(&self) -> Mat4 {
        let rotation = Mat4::from_rotation_z(self.rot.z.to_radians())
            * Mat4::from_rotation_y(self.rot.y.to_radians())
            * Mat4::from_rotation_x(self.rot.x.to_radians());
        Mat4::from_translation(self.pos + self.rot_point)
            * rotation
            * Mat4::from_translation(-self.rot_point)
            * Mat4::from_scale(self.size * self.scale)
    }

    pub fn center(&self) -> Vec3 {
        self.pos + self.size * self.scale / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_scales_then_translates() {
        let pos = Pos2D {
            pos: Vec2::new(10.0, 20.0),
            size: Vec2::new(4.0, 2.0),
            scale: Vec2::new(2.0, 1.0),
            ..Pos2D::default()
        };
        let corner = pos.model().transform_point2(Vec2::ONE);
        assert!((corner - Vec2::new(18.0, 22.0)).length() < 1e-5);
    }

    #[test]
    fn rotation_is_around_rot_point() {
        let pos = Pos2D {
            size: Vec2::splat(2.0),
            rot_point: Vec2::splat(1.0),
            rot: 180.0,
            ..Pos2D::default()
        };
        let origin = pos.model().transform_point2(Vec2::ZERO);
        assert!((origin - Vec2::splat(2.0)).length() < 1e-5);
    }

    #[test]
    fn center_and_point_in_rect_use_scaled_size() {
        let pos = Pos2D {
            pos: Vec2::new(0.0, 0.0),
            size: Vec2::new(10.0, 10.0),
            scale: Vec2::new(2.0, 2.0),
            ..Pos2D::default()
        };
        assert_eq!(pos.center(), Vec2::new(10.0, 10.0));
        assert!(pos.point_in_rect(Vec2::new(15.0, 15.0)));
        assert!(!pos.point_in_rect(Vec2::new(20.0, 5.0)));
        assert!(!pos.point_in_rect(Vec2::new(0.0, 5.0)));
    }

    #[test]
    fn pos3d_rotates_x_before_z() {
        let pos = Pos3D {
            rot: Vec3::new(90.0, 0.0, 90.0),
            ..Pos3D::default()
        };
        let moved = pos.model().transform_point3(Vec3::Y);
        // X turns +Y into +Z, Z leaves it there.
        assert!((moved - Vec3::Z).length() < 1e-5);
    }
}
