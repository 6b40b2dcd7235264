use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec2;
use image::RgbaImage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    pub fn next() -> Self {
        Self(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Sampling filter used when the texture is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureFilter {
    #[default]
    Linear,
    Nearest,
}

impl TextureFilter {
    pub fn to_wgpu(self) -> wgpu::FilterMode {
        match self {
            TextureFilter::Linear => wgpu::FilterMode::Linear,
            TextureFilter::Nearest => wgpu::FilterMode::Nearest,
        }
    }
}

/// CPU side texture.
///
/// Pixels wait here until the first draw uploads them. Unless `keep_data`
/// is set they are released afterwards.
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    width: u32,
    height: u32,
    filter: TextureFilter,
    keep_data: bool,
    pixels: Mutex<Option<RgbaImage>>,
}

impl Texture {
    pub fn from_rgba(image: RgbaImage, filter: TextureFilter, keep_data: bool) -> Self {
        Self {
            id: TextureId::next(),
            width: image.width(),
            height: image.height(),
            filter,
            keep_data,
            pixels: Mutex::new(Some(image)),
        }
    }

    /// Texture without pixel data, used for offscreen render targets.
    pub fn empty(width: u32, height: u32, filter: TextureFilter) -> Self {
        Self {
            id: TextureId::next(),
            width,
            height,
            filter,
            keep_data: false,
            pixels: Mutex::new(None),
        }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }

    pub fn filter(&self) -> TextureFilter {
        self.filter
    }

    pub fn keeps_data(&self) -> bool {
        self.keep_data
    }

    /// Hands out the pixels for uploading, cloning them when they must stay.
    pub fn take_upload_data(&self) -> Option<RgbaImage> {
        let mut pixels = self.pixels.lock();
        if self.keep_data {
            pixels.clone()
        } else {
            pixels.take()
        }
    }

    /// Runs `f` with the retained pixels. Only textures loaded with
    /// `keep_data` guarantee them.
    pub fn with_rgba<R>(&self, f: impl FnOnce(&RgbaImage) -> R) -> Option<R> {
        if !self.keep_data {
            return None;
        }
        self.pixels.lock().as_ref().map(f)
    }
}
