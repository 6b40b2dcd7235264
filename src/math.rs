//! Projection helpers and the viewport rectangle shared by cameras and culling.
//!
//! Vector and matrix arithmetic comes from `glam`; this module only adds the
//! engine specific builders on top of it.

use glam::{Mat3, Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Rectangle in window pixels, origin in the lower left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y
    }

    pub fn top(&self) -> f32 {
        self.y + self.height
    }

    /// Width to height ratio, zero for a viewport without height.
    pub fn ratio(&self) -> f32 {
        if self.height == 0.0 {
            0.0
        } else {
            self.width / self.height
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.width == 0.0 || self.height == 0.0
    }
}

/// 2D orthographic projection mapping the viewport onto clip space.
pub fn ortho_2d(viewport: Viewport) -> Mat3 {
    if viewport.is_degenerate() {
        return Mat3::IDENTITY;
    }
    let (l, r, b, t) = (
        viewport.left(),
        viewport.right(),
        viewport.bottom(),
        viewport.top(),
    );
    Mat3::from_cols_array(&[
        2.0 / (r - l),
        0.0,
        0.0,
        0.0,
        2.0 / (t - b),
        0.0,
        -(r + l) / (r - l),
        -(t + b) / (t - b),
        1.0,
    ])
}

/// 3D orthographic projection of the viewport with a 0..1 depth range.
pub fn ortho_3d(viewport: Viewport, znear: f32, zfar: f32) -> Mat4 {
    if viewport.is_degenerate() || znear == zfar {
        return Mat4::IDENTITY;
    }
    Mat4::orthographic_rh(
        viewport.left(),
        viewport.right(),
        viewport.bottom(),
        viewport.top(),
        znear,
        zfar,
    )
}

/// Right handed perspective projection, field of view in degrees.
pub fn perspective(fov_degrees: f32, ratio: f32, znear: f32, zfar: f32) -> Mat4 {
    if ratio <= 0.0 || znear <= 0.0 || zfar <= znear {
        return Mat4::IDENTITY;
    }
    Mat4::perspective_rh(fov_degrees.to_radians(), ratio, znear, zfar)
}

pub fn look_at(position: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    let dir = target - position;
    if dir.length_squared() <= f32::EPSILON || dir.cross(up).length_squared() <= f32::EPSILON {
        return Mat4::IDENTITY;
    }
    Mat4::look_at_rh(position, target, up)
}

pub fn translate_2d(offset: Vec2) -> Mat3 {
    Mat3::from_translation(offset)
}

pub fn rotate_2d(degrees: f32) -> Mat3 {
    Mat3::from_angle(degrees.to_radians())
}

pub fn scale_2d(scale: Vec2) -> Mat3 {
    Mat3::from_scale(scale)
}
