//! Resource loaders for PNG textures and ASCII PLY meshes.

use std::any::Any;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use image::ImageFormat;

use crate::resource::{ResourceData, ResourceLoader};
use crate::texture::{Texture, TextureFilter};

/// Decodes PNG files into [`Texture`] resources.
///
/// With `keep_data` the decoded pixels remain readable on the CPU after
/// upload, which font cutting relies on.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngLoader {
    pub filter: TextureFilter,
    pub keep_data: bool,
}

impl PngLoader {
    pub fn new(filter: TextureFilter, keep_data: bool) -> Self {
        Self { filter, keep_data }
    }
}

impl ResourceLoader for PngLoader {
    fn ext(&self) -> &str {
        "png"
    }

    fn load(&self, path: &Path) -> Result<ResourceData> {
        let bytes = fs::read(path).with_context(|| format!("unable to read {}", path.display()))?;
        let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .with_context(|| format!("{} is not a valid PNG", path.display()))?;
        Ok(Arc::new(Texture::from_rgba(
            image.to_rgba8(),
            self.filter,
            self.keep_data,
        )))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Loads ASCII PLY files into [`Ply`] resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlyLoader;

impl ResourceLoader for PlyLoader {
    fn ext(&self) -> &str {
        "ply"
    }

    fn load(&self, path: &Path) -> Result<ResourceData> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        let ply = parse_ply(&contents)
            .with_context(|| format!("failed to parse PLY mesh {}", path.display()))?;
        Ok(Arc::new(ply))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Triangle mesh data read from a PLY file.
///
/// `vertices` holds xyz triples, `normals` xyz triples and `tex_coords`
/// st pairs, one per vertex.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ply {
    pub indices: Vec<u32>,
    pub vertices: Vec<f32>,
    pub normals: Option<Vec<f32>>,
    pub tex_coords: Option<Vec<f32>>,
}

impl Ply {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }
}

#[derive(Debug, PartialEq)]
enum ElementKind {
    Vertex,
    Face,
    Other(String),
}

#[derive(Debug)]
struct Element {
    kind: ElementKind,
    count: usize,
    properties: Vec<String>,
}

struct VertexLayout {
    position: [usize; 3],
    normal: Option<[usize; 3]>,
    tex_coord: Option<[usize; 2]>,
    columns: usize,
}

impl VertexLayout {
    fn from_properties(properties: &[String]) -> Result<Self> {
        let column = |name: &str| properties.iter().position(|p| p == name);
        let (Some(x), Some(y), Some(z)) = (column("x"), column("y"), column("z")) else {
            bail!("ply must have vertex data");
        };
        let normal = match (column("nx"), column("ny"), column("nz")) {
            (Some(nx), Some(ny), Some(nz)) => Some([nx, ny, nz]),
            _ => None,
        };
        let tex_coord = match (column("s"), column("t")) {
            (Some(s), Some(t)) => Some([s, t]),
            _ => match (column("u"), column("v")) {
                (Some(u), Some(v)) => Some([u, v]),
                _ => None,
            },
        };
        Ok(Self {
            position: [x, y, z],
            normal,
            tex_coord,
            columns: properties.len(),
        })
    }
}

/// Parses an ASCII PLY document.
///
/// Faces must be triangles. Elements other than `vertex` and `face` are
/// skipped, and vertex properties are read in the order the header lists
/// them.
pub fn parse_ply(data: &str) -> Result<Ply> {
    let mut lines = data
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()));

    match lines.next() {
        Some((_, first)) if first.eq_ignore_ascii_case("ply") => {}
        _ => bail!("file is not of type ply"),
    }

    let mut elements: Vec<Element> = Vec::new();
    let mut header_closed = false;
    for (line_no, line) in lines.by_ref() {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            continue;
        };
        match keyword.to_ascii_lowercase().as_str() {
            "format" => {
                let format = parts.next().unwrap_or_default();
                if !format.eq_ignore_ascii_case("ascii") {
                    bail!(
                        "unsupported ply format '{format}' on line {line_no}, only ascii is supported"
                    );
                }
            }
            "comment" | "obj_info" => {}
            "element" => {
                let name = parts
                    .next()
                    .ok_or_else(|| anyhow!("missing element name on line {line_no}"))?
                    .to_ascii_lowercase();
                let count = parts
                    .next()
                    .ok_or_else(|| anyhow!("missing element count on line {line_no}"))?
                    .parse::<usize>()
                    .with_context(|| format!("invalid element count on line {line_no}"))?;
                let kind = match name.as_str() {
                    "vertex" => ElementKind::Vertex,
                    "face" => ElementKind::Face,
                    _ => ElementKind::Other(name),
                };
                elements.push(Element {
                    kind,
                    count,
                    properties: Vec::new(),
                });
            }
            "property" => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| anyhow!("property outside of element on line {line_no}"))?;
                let name = parts
                    .last()
                    .ok_or_else(|| anyhow!("missing property name on line {line_no}"))?;
                element.properties.push(name.to_ascii_lowercase());
            }
            "end_header" => {
                header_closed = true;
                break;
            }
            other => bail!("unknown header keyword '{other}' on line {line_no}"),
        }
    }
    if !header_closed {
        bail!("ply header is missing end_header");
    }

    let vertex_element = elements
        .iter()
        .find(|element| element.kind == ElementKind::Vertex)
        .ok_or_else(|| anyhow!("ply must have vertex data"))?;
    let layout = VertexLayout::from_properties(&vertex_element.properties)?;

    let mut ply = Ply::default();
    let mut normals = layout.normal.map(|_| Vec::new());
    let mut tex_coords = layout.tex_coord.map(|_| Vec::new());
    let mut body = lines.filter(|(_, line)| !line.is_empty());

    for element in &elements {
        for remaining in (1..=element.count).rev() {
            let Some((line_no, line)) = body.next() else {
                bail!(
                    "unexpected end of file, {remaining} {} line(s) missing",
                    element_name(&element.kind)
                );
            };
            match element.kind {
                ElementKind::Vertex => {
                    let values = parse_floats(line, layout.columns)
                        .with_context(|| format!("invalid vertex data on line {line_no}"))?;
                    ply.vertices
                        .extend(layout.position.iter().map(|&column| values[column]));
                    if let (Some(columns), Some(out)) = (layout.normal, normals.as_mut()) {
                        out.extend(columns.iter().map(|&column| values[column]));
                    }
                    if let (Some(columns), Some(out)) = (layout.tex_coord, tex_coords.as_mut()) {
                        out.extend(columns.iter().map(|&column| values[column]));
                    }
                }
                ElementKind::Face => {
                    let triangle = parse_triangle(line)
                        .with_context(|| format!("invalid face on line {line_no}"))?;
                    ply.indices.extend_from_slice(&triangle);
                }
                ElementKind::Other(_) => {}
            }
        }
    }

    let vertex_count = ply.vertex_count();
    if let Some(index) = ply.indices.iter().find(|&&index| index as usize >= vertex_count) {
        bail!("face index {index} out of range for {vertex_count} vertices");
    }

    ply.normals = normals;
    ply.tex_coords = tex_coords;
    Ok(ply)
}

fn element_name(kind: &ElementKind) -> &str {
    match kind {
        ElementKind::Vertex => "vertex",
        ElementKind::Face => "face",
        ElementKind::Other(name) => name,
    }
}

fn parse_floats(line: &str, expected: usize) -> Result<Vec<f32>> {
    let values = line
        .split_whitespace()
        .map(|part| part.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() < expected {
        bail!("expected {expected} values, found {}", values.len());
    }
    Ok(values)
}

fn parse_triangle(line: &str) -> Result<[u32; 3]> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 4 || parts[0] != "3" {
        bail!("expected triangles for indices");
    }
    Ok([
        parts[1].parse::<u32>()?,
        parts[2].parse::<u32>()?,
        parts[3].parse::<u32>()?,
    ])
}
