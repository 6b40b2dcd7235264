//! Texture mapped fonts and the text renderer.
//!
//! A font is a texture split into square tiles, one glyph per tile, plus a
//! JSON table naming the tile of every character:
//!
//! ```json
//! [{"char": "a", "x": 0, "y": 0, "offset": 0}]
//! ```
//!
//! `x` and `y` count tiles from the upper left corner. `offset` moves the
//! glyph up or down relative to the others and may be omitted.

use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::{Mat3, Vec2, Vec4};
use serde::Deserialize;

use crate::actor::{shared, Actor, ActorId, Shared};
use crate::camera::Camera;
use crate::pos::Pos2D;
use crate::render::{DrawCall, Frame, GpuBuffer, ShaderKind, Uniform2D};
use crate::resource::ResourceError;
use crate::system::System;
use crate::texture::Texture;

pub const TEXT_RENDERER_NAME: &str = "textRenderer";

/// Pixels kept around the opaque area of a cut glyph.
const CUT_PADDING: i64 = 2;

/// Where a glyph lives on the font texture and how large it is drawn,
/// in units of one tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub min: Vec2,
    pub max: Vec2,
    pub size: Vec2,
    pub offset: f32,
}

#[derive(Debug, Deserialize)]
struct GlyphEntry {
    char: String,
    x: f32,
    y: f32,
    #[serde(default)]
    offset: f32,
}

pub struct Font {
    texture: Arc<Texture>,
    tile_size: f32,
    pub char_padding: Vec2,
    pub space: f32,
    pub tab: f32,
    pub line: f32,
    glyphs: HashMap<char, Glyph>,
}

impl Font {
    /// Font without glyphs. `tile_size` is the edge length of one tile in
    /// pixels.
    pub fn new(texture: Arc<Texture>, tile_size: f32) -> Self {
        Self {
            texture,
            tile_size,
            char_padding: Vec2::new(0.05, 0.05),
            space: 0.3,
            tab: 1.2,
            line: 1.0,
            glyphs: HashMap::new(),
        }
    }

    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn glyph(&self, ch: char) -> Option<&Glyph> {
        self.glyphs.get(&ch)
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Reads a glyph table from disk. See [`Font::load_json_str`].
    pub fn load_json(&mut self, path: impl AsRef<Path>, cut: bool) -> Result<usize> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read font file {}", path.display()))?;
        self.load_json_str(&json, cut)
            .with_context(|| format!("failed to load font file {}", path.display()))
    }

    /// Adds the glyphs of a JSON table and returns how many were added.
    ///
    /// Entries whose `char` is not exactly one character are ignored. With
    /// `cut` every glyph shrinks to the opaque pixels of its tile, which
    /// requires the texture to keep its pixel data.
    pub fn load_json_str(&mut self, json: &str, cut: bool) -> Result<usize> {
        let entries: Vec<GlyphEntry> =
            serde_json::from_str(json).context("invalid font glyph table")?;
        let mut added = 0;
        for entry in entries {
            let mut chars = entry.char.chars();
            let (Some(ch), None) = (chars.next(), chars.next()) else {
                continue;
            };
            let x = tile_index(ch, "x", entry.x)?;
            let y = tile_index(ch, "y", entry.y)?;
            self.add_glyph(ch, x, y, entry.offset, cut)?;
            added += 1;
        }
        Ok(added)
    }

    /// Maps `ch` to the tile at column `x`, row `y`. The tile has to lie
    /// completely inside the texture.
    pub fn add_glyph(&mut self, ch: char, x: u32, y: u32, offset: f32, cut: bool) -> Result<()> {
        self.check_tile(ch, x, y)?;
        let mut glyph = if cut {
            self.cut_glyph(ch, x, y)?
        } else {
            self.tile_glyph(x, y)
        };
        glyph.offset = offset;
        self.glyphs.insert(ch, glyph);
        Ok(())
    }

    fn check_tile(&self, ch: char, x: u32, y: u32) -> Result<(), ResourceError> {
        let tile = f64::from(self.tile_size);
        if !tile.is_finite() || tile < 1.0 {
            return Err(invalid_glyph(ch, format!("tile size {tile} is below one pixel")));
        }
        let (width, height) = (self.texture.width(), self.texture.height());
        let fits = |index: u32, extent: u32| (f64::from(index) + 1.0) * tile <= f64::from(extent);
        if !fits(x, width) || !fits(y, height) {
            return Err(invalid_glyph(
                ch,
                format!("tile ({x}, {y}) is outside the {width}x{height} font texture"),
            ));
        }
        Ok(())
    }

    fn tile_glyph(&self, x: u32, y: u32) -> Glyph {
        let texture = self.texture.size();
        let tile = self.tile_size;
        let (x, y) = (x as f32, y as f32);
        Glyph {
            min: Vec2::new(x * tile / texture.x, (y + 1.0) * tile / texture.y),
            max: Vec2::new((x + 1.0) * tile / texture.x, y * tile / texture.y),
            size: Vec2::ONE,
            offset: 0.0,
        }
    }

    /// Shrinks the tile to the bounding box of its non transparent pixels.
    /// Empty tiles keep their full size.
    fn cut_glyph(&self, ch: char, x: u32, y: u32) -> Result<Glyph> {
        let tile = self.tile_size as u32;
        let (Some(cols), Some(rows)) = (tile_span(x, tile), tile_span(y, tile)) else {
            return Err(invalid_glyph(ch, format!("tile ({x}, {y}) overflows the pixel range")).into());
        };
        let bounds = self
            .texture
            .with_rgba(|image| {
                let mut bounds: Option<(i64, i64, i64, i64)> = None;
                for py in rows.start..rows.end.min(image.height()) {
                    for px in cols.start..cols.end.min(image.width()) {
                        if image.get_pixel(px, py)[3] == 0 {
                            continue;
                        }
                        let (px, py) = (px as i64, py as i64);
                        bounds = Some(match bounds {
                            None => (px, py, px, py),
                            Some((min_x, min_y, max_x, max_y)) => {
                                (min_x.min(px), min_y.min(py), max_x.max(px), max_y.max(py))
                            }
                        });
                    }
                }
                bounds
            })
            .ok_or_else(|| {
                anyhow!("font texture must be loaded with keep_data to cut characters")
            })?;

        let Some((min_x, min_y, max_x, max_y)) = bounds else {
            return Ok(self.tile_glyph(x, y));
        };
        let (min_x, min_y) = (min_x - CUT_PADDING, min_y - CUT_PADDING);
        let (max_x, max_y) = (max_x + CUT_PADDING, max_y + CUT_PADDING);
        let texture = self.texture.size();
        Ok(Glyph {
            min: Vec2::new(min_x as f32 / texture.x, max_y as f32 / texture.y),
            max: Vec2::new(max_x as f32 / texture.x, min_y as f32 / texture.y),
            size: Vec2::new(
                (max_x - min_x) as f32 / self.tile_size,
                (max_y - min_y) as f32 / self.tile_size,
            ),
            offset: 0.0,
        })
    }
}

fn invalid_glyph(glyph: char, reason: String) -> ResourceError {
    ResourceError::InvalidGlyph { glyph, reason }
}

/// Converts a tile coordinate of the glyph table. Tiles are counted in
/// whole, non negative steps.
fn tile_index(ch: char, axis: &str, value: f32) -> Result<u32, ResourceError> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value >= u32::MAX as f32 {
        return Err(invalid_glyph(ch, format!("{axis} = {value} is not a tile index")));
    }
    Ok(value as u32)
}

/// Pixel range covered by tile `index`.
fn tile_span(index: u32, tile: u32) -> Option<Range<u32>> {
    let start = index.checked_mul(tile)?;
    Some(start..start.checked_add(tile)?)
}

/// Quads of a laid out string, four vertices per glyph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextGeometry {
    pub indices: Vec<u32>,
    pub vertices: Vec<f32>,
    pub tex_coords: Vec<f32>,
}

impl TextGeometry {
    pub fn glyph_count(&self) -> usize {
        self.vertices.len() / 8
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Lays `text` out left to right starting at the origin, lines growing
/// downwards. Returns the quads and the unscaled bounds.
pub fn layout(font: &Font, text: &str) -> (TextGeometry, Vec2) {
    let mut geometry = TextGeometry::default();
    let mut cursor = Vec2::ZERO;
    let mut bounds = Vec2::ZERO;

    for ch in text.chars() {
        match ch {
            ' ' => {
                cursor.x += font.space;
                continue;
            }
            '\t' => {
                cursor.x += font.tab;
                continue;
            }
            '\n' => {
                cursor.x = 0.0;
                cursor.y -= font.line;
                continue;
            }
            _ => {}
        }
        let Some(glyph) = font.glyph(ch) else {
            continue;
        };

        let base = (geometry.vertices.len() / 2) as u32;
        let (x, y) = (cursor.x, cursor.y + glyph.offset);
        let (w, h) = (glyph.size.x, glyph.size.y);
        geometry
            .vertices
            .extend_from_slice(&[x, y, x + w, y, x, y + h, x + w, y + h]);
        geometry.tex_coords.extend_from_slice(&[
            glyph.min.x,
            glyph.min.y,
            glyph.max.x,
            glyph.min.y,
            glyph.min.x,
            glyph.max.y,
            glyph.max.x,
            glyph.max.y,
        ]);
        geometry
            .indices
            .extend_from_slice(&[base, base + 1, base + 2, base + 1, base + 2, base + 3]);

        cursor.x += glyph.size.x + font.char_padding.x;
        bounds.x = bounds.x.max(cursor.x);
        bounds.y = bounds.y.max(-cursor.y + font.line);
    }
    (geometry, bounds)
}

/// Renderable text. `revision` changes whenever the geometry does.
#[derive(Debug, Clone)]
pub struct TextComponent {
    pub color: Vec4,
    text: String,
    bounds: Vec2,
    geometry: TextGeometry,
    revision: u64,
}

impl Default for TextComponent {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            text: String::new(),
            bounds: Vec2::ZERO,
            geometry: TextGeometry::default(),
            revision: 0,
        }
    }
}

impl TextComponent {
    pub fn new(font: &Font, text: &str) -> Self {
        let mut component = Self::default();
        component.set_text(font, text);
        component
    }

    pub fn set_text(&mut self, font: &Font, text: &str) {
        let (geometry, bounds) = layout(font, text);
        self.text = text.to_string();
        self.geometry = geometry;
        self.bounds = bounds;
        self.revision += 1;
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Bounds in glyph units, before the position's size and scale apply.
    pub fn bounds(&self) -> Vec2 {
        self.bounds
    }

    pub fn geometry(&self) -> &TextGeometry {
        &self.geometry
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// An actor showing a string.
pub struct Text {
    id: ActorId,
    pub pos: Shared<Pos2D>,
    pub text: Shared<TextComponent>,
}

impl Text {
    pub fn new(font: &Font, text: &str) -> Self {
        Self {
            id: ActorId::next(),
            pos: shared(Pos2D::default()),
            text: shared(TextComponent::new(font, text)),
        }
    }

    pub fn set_text(&self, font: &Font, text: &str) {
        self.text.write().set_text(font, text);
    }

    pub fn text(&self) -> String {
        self.text.read().text().to_string()
    }

    /// Bounds scaled by the position's size and scale.
    pub fn bounds(&self) -> Vec2 {
        self.text.read().bounds() * self.pos.read().scaled_size()
    }
}

impl Actor for Text {
    fn id(&self) -> ActorId {
        self.id
    }

    fn pos_2d(&self) -> Option<Shared<Pos2D>> {
        Some(self.pos.clone())
    }

    fn text(&self) -> Option<Shared<TextComponent>> {
        Some(self.text.clone())
    }
}

struct TextBuffers {
    revision: u64,
    indices: GpuBuffer,
    vertices: GpuBuffer,
    tex_coords: GpuBuffer,
}

struct TextEntry {
    id: ActorId,
    pos: Shared<Pos2D>,
    text: Shared<TextComponent>,
    buffers: Option<TextBuffers>,
}

/// Renders texts with one font. Nothing is drawn until a font is set.
pub struct TextRenderer {
    pub pos: Pos2D,
    camera: Shared<Camera>,
    font: Option<Arc<Font>>,
    texts: Vec<TextEntry>,
}

impl TextRenderer {
    pub fn new(camera: Shared<Camera>, font: Option<Arc<Font>>) -> Self {
        Self {
            pos: Pos2D::default(),
            camera,
            font,
            texts: Vec::new(),
        }
    }

    pub fn font(&self) -> Option<&Arc<Font>> {
        self.font.as_ref()
    }

    pub fn set_font(&mut self, font: Option<Arc<Font>>) {
        self.font = font;
    }

    pub fn set_camera(&mut self, camera: Shared<Camera>) {
        self.camera = camera;
    }

    pub fn add(&mut self, id: ActorId, pos: Shared<Pos2D>, text: Shared<TextComponent>) -> bool {
        if self.texts.iter().any(|entry| entry.id == id) {
            return false;
        }
        self.texts.push(TextEntry {
            id,
            pos,
            text,
            buffers: None,
        });
        true
    }

    pub fn add_text(&mut self, text: &Text) -> bool {
        self.add(text.id, text.pos.clone(), text.text.clone())
    }

    pub fn transform(&self) -> Mat3 {
        self.camera.read().ortho() * self.pos.model()
    }
}

impl System for TextRenderer {
    fn name(&self) -> &str {
        TEXT_RENDERER_NAME
    }

    fn render(&mut self, frame: &mut Frame<'_, '_>) -> Result<()> {
        let Some(font) = self.font.clone() else {
            return Ok(());
        };
        let transform = self.transform();

        for entry in &mut self.texts {
            let model = {
                let pos = entry.pos.read();
                if !pos.visible {
                    continue;
                }
                pos.model()
            };
            let text = entry.text.read();
            let geometry = text.geometry();
            if geometry.is_empty() {
                continue;
            }

            let gpu = frame.gpu();
            match &mut entry.buffers {
                Some(buffers) if buffers.revision == text.revision() => {}
                Some(buffers) => {
                    buffers.indices.update(&gpu.device, &gpu.queue, &geometry.indices);
                    buffers.vertices.update(&gpu.device, &gpu.queue, &geometry.vertices);
                    buffers
                        .tex_coords
                        .update(&gpu.device, &gpu.queue, &geometry.tex_coords);
                    buffers.revision = text.revision();
                }
                None => {
                    entry.buffers = Some(TextBuffers {
                        revision: text.revision(),
                        indices: GpuBuffer::index(&gpu.device, "text-indices", &geometry.indices),
                        vertices: GpuBuffer::vertex(&gpu.device, "text-vertices", &geometry.vertices),
                        tex_coords: GpuBuffer::vertex(
                            &gpu.device,
                            "text-tex-coords",
                            &geometry.tex_coords,
                        ),
                    });
                }
            }
            let Some(buffers) = &entry.buffers else {
                continue;
            };

            let uniforms = Uniform2D::new(transform * model, text.color);
            frame.draw(DrawCall {
                shader: ShaderKind::Text,
                uniforms: &uniforms,
                texture: font.texture(),
                positions: &buffers.vertices,
                tex_coords: &buffers.tex_coords,
                indices: &buffers.indices,
            })?;
        }
        Ok(())
    }

    /// Accepts actors with a position and a text component.
    fn add_actor(&mut self, actor: &dyn Actor) -> bool {
        match (actor.pos_2d(), actor.text()) {
            (Some(pos), Some(text)) => self.add(actor.id(), pos, text),
            _ => false,
        }
    }

    fn remove_by_id(&mut self, id: ActorId) -> bool {
        let before = self.texts.len();
        self.texts.retain(|entry| entry.id != id);
        before != self.texts.len()
    }

    fn remove_all(&mut self) {
        self.texts.clear();
    }

    fn len(&self) -> usize {
        self.texts.len()
    }

    fn cleanup(&mut self) {
        for entry in &mut self.texts {
            entry.buffers = None;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::math::Viewport;
    use crate::texture::TextureFilter;

    fn font_texture(keep_data: bool) -> Arc<Texture> {
        let mut image = RgbaImage::new(8, 8);
        image.put_pixel(5, 1, Rgba([255, 255, 255, 255]));
        image.put_pixel(6, 2, Rgba([255, 255, 255, 128]));
        Arc::new(Texture::from_rgba(image, TextureFilter::Nearest, keep_data))
    }

    fn font() -> Font {
        let mut font = Font::new(font_texture(true), 4.0);
        font.load_json_str(
            r#"[{"char": "a", "x": 0, "y": 0}, {"char": "b", "x": 1, "y": 0, "offset": 0.5},
                {"char": "c", "x": 0, "y": 1}, {"char": "too long", "x": 1, "y": 1}]"#,
            false,
        )
        .unwrap();
        font
    }

    #[test]
    fn multi_character_entries_are_ignored() {
        let font = font();
        assert_eq!(font.len(), 3);
        assert!(font.glyph('t').is_none());
        assert_eq!(font.glyph('b').map(|g| g.offset), Some(0.5));
    }

    #[test]
    fn tile_glyphs_span_the_whole_tile() {
        let font = font();
        let glyph = font.glyph('c').copied().unwrap();
        assert_eq!(glyph.min, Vec2::new(0.0, 1.0));
        assert_eq!(glyph.max, Vec2::new(0.5, 0.5));
        assert_eq!(glyph.size, Vec2::ONE);
    }

    #[test]
    fn cut_glyphs_shrink_to_opaque_pixels() {
        let mut font = Font::new(font_texture(true), 4.0);
        font.add_glyph('x', 1, 0, 0.0, true).unwrap();
        let glyph = font.glyph('x').copied().unwrap();
        assert_eq!(glyph.min, Vec2::new(3.0 / 8.0, 4.0 / 8.0));
        assert_eq!(glyph.max, Vec2::new(1.0, -1.0 / 8.0));
        assert_eq!(glyph.size, Vec2::new(1.25, 1.25));

        // The first tile is fully transparent.
        font.add_glyph('y', 0, 0, 0.0, true).unwrap();
        assert_eq!(font.glyph('y').map(|g| g.size), Some(Vec2::ONE));
    }

    #[test]
    fn cutting_needs_pixel_data() {
        let mut font = Font::new(font_texture(false), 4.0);
        let err = font
            .load_json_str(r#"[{"char": "a", "x": 1, "y": 0}]"#, true)
            .unwrap_err();
        assert!(err.to_string().contains("keep_data"));
    }

    fn glyph_error(json: &str, cut: bool) -> String {
        let mut font = Font::new(font_texture(true), 4.0);
        let err = font.load_json_str(json, cut).unwrap_err();
        let resource = err.downcast_ref::<ResourceError>().unwrap();
        assert!(matches!(resource, ResourceError::InvalidGlyph { glyph: 'a', .. }));
        assert!(font.is_empty());
        err.to_string()
    }

    #[test]
    fn negative_and_fractional_tiles_are_rejected() {
        let err = glyph_error(r#"[{"char": "a", "x": -3, "y": 0}]"#, false);
        assert_eq!(err, "glyph 'a' is invalid: x = -3 is not a tile index");
        let err = glyph_error(r#"[{"char": "a", "x": 0, "y": 0.5}]"#, false);
        assert_eq!(err, "glyph 'a' is invalid: y = 0.5 is not a tile index");
    }

    #[test]
    fn huge_tiles_are_rejected_without_overflow() {
        let err = glyph_error(r#"[{"char": "a", "x": 0, "y": 300000000}]"#, true);
        assert_eq!(
            err,
            "glyph 'a' is invalid: tile (0, 300000000) is outside the 8x8 font texture"
        );
        let err = glyph_error(r#"[{"char": "a", "x": 1e10, "y": 0}]"#, false);
        assert!(err.contains("is not a tile index"), "{err}");
    }

    #[test]
    fn tiles_outside_the_atlas_are_rejected() {
        let err = glyph_error(r#"[{"char": "a", "x": 2, "y": 0}]"#, false);
        assert_eq!(err, "glyph 'a' is invalid: tile (2, 0) is outside the 8x8 font texture");

        let mut font = Font::new(font_texture(true), 4.0);
        assert!(font.add_glyph('z', 1, 2, 0.0, true).is_err());
        assert!(font.add_glyph('z', 1, 1, 0.0, true).is_ok());
    }

    #[test]
    fn tile_size_must_cover_a_pixel() {
        let mut font = Font::new(font_texture(true), 0.0);
        let err = font.add_glyph('a', 0, 0, 0.0, false).unwrap_err();
        assert!(err.to_string().contains("below one pixel"), "{err}");
    }

    #[test]
    fn layout_breaks_lines_and_skips_unknown_characters() {
        let font = font();
        let (geometry, bounds) = layout(&font, "ab\n?c");
        assert_eq!(geometry.glyph_count(), 3);
        assert_eq!(geometry.indices.len(), 18);
        assert_eq!(&geometry.indices[6..12], &[4, 5, 6, 5, 6, 7]);
        assert!((bounds.x - 2.1).abs() < 1e-5);
        assert_eq!(bounds.y, 2.0);

        // "b" is raised by its offset, "c" starts the second line.
        assert!((geometry.vertices[8] - 1.05).abs() < 1e-5);
        assert_eq!(geometry.vertices[9], 0.5);
        assert_eq!(&geometry.vertices[16..18], &[0.0, -1.0]);
    }

    #[test]
    fn whitespace_moves_the_cursor_without_quads() {
        let font = font();
        let (geometry, bounds) = layout(&font, " \ta");
        assert_eq!(geometry.glyph_count(), 1);
        assert!((geometry.vertices[0] - 1.5).abs() < 1e-5);
        assert!((bounds.x - 2.55).abs() < 1e-5);
        assert_eq!(layout(&font, "   ").1, Vec2::ZERO);
    }

    #[test]
    fn text_bounds_scale_with_position() {
        let font = font();
        let text = Text::new(&font, "a");
        {
            let mut pos = text.pos.write();
            pos.size = Vec2::splat(16.0);
            pos.scale = Vec2::new(2.0, 1.0);
        }
        let bounds = text.bounds();
        assert!((bounds.x - 1.05 * 32.0).abs() < 1e-4);
        assert_eq!(bounds.y, 16.0);

        let revision = text.text.read().revision();
        text.set_text(&font, "ab");
        assert_eq!(text.text(), "ab");
        assert!(text.text.read().revision() > revision);
        assert_eq!(text.text.read().color, Vec4::ONE);
    }

    #[test]
    fn renderer_tracks_text_actors() {
        let font = font();
        let camera = shared(Camera::new(Viewport::new(0.0, 0.0, 100.0, 100.0)));
        let mut renderer = TextRenderer::new(camera, None);
        assert!(renderer.font().is_none());
        let text = Text::new(&font, "hi");
        assert!(renderer.add_actor(&text));
        assert!(!renderer.add_text(&text));
        assert_eq!(renderer.len(), 1);
        renderer.set_font(Some(Arc::new(font)));
        assert!(renderer.font().is_some());
        assert!(renderer.remove_by_id(text.id()));
    }
}
