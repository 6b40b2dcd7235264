use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info};
use parking_lot::{Mutex, RwLock};

use crate::render::common::PipelineKey;
use crate::render::shader::{Shader, ShaderKind};
use crate::render::texture::GpuTexture;
use crate::texture::{Texture, TextureId};

/// Device, queue and the state shared by every renderer system.
///
/// Textures are uploaded lazily the first time they are drawn and cached
/// by id. Pipelines are built on demand for each target format and render
/// state combination.
#[derive(Debug)]
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    shaders: Vec<Shader>,
    pipelines: Mutex<HashMap<(ShaderKind, PipelineKey), wgpu::RenderPipeline>>,
    textures: RwLock<HashMap<TextureId, Arc<GpuTexture>>>,
    missing_textures: Mutex<HashSet<TextureId>>,
    uniforms: Mutex<UniformRing>,
}

/// Smallest uniform slot handed to a draw call. Equals the default
/// `min_uniform_buffer_offset_alignment`.
pub const UNIFORM_SLOT_SIZE: u64 = 256;
const INITIAL_UNIFORM_SLOTS: u64 = 64;

/// One uniform buffer shared by every draw of a frame, addressed through
/// dynamic offsets.
#[derive(Debug)]
struct UniformRing {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    slot_size: u64,
    slots: u64,
    next: u64,
}

impl UniformRing {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, slot_size: u64, slots: u64) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform-ring"),
            size: slot_size * slots,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform-ring-bind-group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(slot_size),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            slot_size,
            slots,
            next: 0,
        }
    }
}

impl GpuContext {
    /// Requests an adapter, compatible with `surface` when one is given,
    /// and creates the device.
    pub async fn new(instance: &wgpu::Instance, surface: Option<&wgpu::Surface<'_>>) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        Self::from_adapter(&adapter).await
    }

    pub async fn from_adapter(adapter: &wgpu::Adapter) -> Result<Self> {
        info!("Using GPU adapter {}", adapter.get_info().name);
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("pebble-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: Default::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .context("failed to create GPU device")?;
        Ok(Self::from_device(device, queue))
    }

    /// Context without a window, for offscreen rendering.
    pub fn headless() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        pollster::block_on(Self::new(&instance, None))
    }

    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform-bind-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pebble-pipeline-layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        let slot_size = u64::from(device.limits().min_uniform_buffer_offset_alignment)
            .max(UNIFORM_SLOT_SIZE);
        let uniforms = UniformRing::new(&device, &uniform_layout, slot_size, INITIAL_UNIFORM_SLOTS);
        let shaders = ShaderKind::ALL
            .iter()
            .map(|kind| Shader::new(&device, *kind))
            .collect();

        Self {
            device,
            queue,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            shaders,
            pipelines: Mutex::new(HashMap::new()),
            textures: RwLock::new(HashMap::new()),
            missing_textures: Mutex::new(HashSet::new()),
            uniforms: Mutex::new(uniforms),
        }
    }

    pub fn texture_layout(&self) -> &wgpu::BindGroupLayout {
        &self.texture_layout
    }

    /// Returns the GPU copy of `texture`, uploading it on first use.
    ///
    /// A texture without pixel data is reported once and then skipped.
    pub fn texture(&self, texture: &Texture) -> Option<Arc<GpuTexture>> {
        if let Some(uploaded) = self.textures.read().get(&texture.id()) {
            return Some(Arc::clone(uploaded));
        }
        if self.missing_textures.lock().contains(&texture.id()) {
            return None;
        }
        let Some(pixels) = texture.take_upload_data() else {
            error!("texture {:?} has no pixel data to upload", texture.id());
            self.missing_textures.lock().insert(texture.id());
            return None;
        };
        let uploaded = Arc::new(GpuTexture::from_rgba(
            &self.device,
            &self.queue,
            &self.texture_layout,
            &pixels,
            texture.filter(),
            "sprite-texture",
        ));
        debug!(
            "uploaded texture {:?} ({}x{})",
            texture.id(),
            texture.width(),
            texture.height()
        );
        self.textures
            .write()
            .insert(texture.id(), Arc::clone(&uploaded));
        Some(uploaded)
    }

    /// Makes an existing GPU texture drawable under `id`.
    pub fn register_texture(&self, id: TextureId, texture: Arc<GpuTexture>) {
        self.textures.write().insert(id, texture);
    }

    pub fn release_texture(&self, id: TextureId) -> bool {
        self.textures.write().remove(&id).is_some()
    }

    pub fn release_all_textures(&self) -> usize {
        let mut textures = self.textures.write();
        let count = textures.len();
        textures.clear();
        self.missing_textures.lock().clear();
        count
    }

    pub fn pipeline(&self, kind: ShaderKind, key: PipelineKey) -> Result<wgpu::RenderPipeline> {
        let mut pipelines = self.pipelines.lock();
        if let Some(pipeline) = pipelines.get(&(kind, key)) {
            return Ok(pipeline.clone());
        }
        let shader = self
            .shaders
            .iter()
            .find(|shader| shader.kind() == kind)
            .ok_or_else(|| anyhow!("shader {} is not loaded", kind.label()))?;
        let pipeline = shader.create_pipeline(&self.device, &self.pipeline_layout, key);
        pipelines.insert((kind, key), pipeline.clone());
        Ok(pipeline)
    }

    /// Starts a new frame of uniform writes, reusing every slot.
    ///
    /// Writes are staged on the queue, so slots of a frame that was already
    /// submitted can be overwritten safely.
    pub fn reset_uniforms(&self) {
        self.uniforms.lock().next = 0;
    }

    /// Copies `contents` into the next free uniform slot. Returns the bind
    /// group to set at group 0 together with the slot's dynamic offset.
    ///
    /// A full ring is replaced by one twice its size. Draws already recorded
    /// keep the old buffer alive.
    pub fn push_uniforms(&self, contents: &[u8]) -> Result<(wgpu::BindGroup, u32)> {
        let mut ring = self.uniforms.lock();
        if contents.len() as u64 > ring.slot_size {
            return Err(anyhow!(
                "uniform block of {} bytes exceeds the {} byte slot",
                contents.len(),
                ring.slot_size
            ));
        }
        if ring.next == ring.slots {
            let slots = ring.slots * 2;
            debug!("growing uniform ring to {slots} slots");
            *ring = UniformRing::new(&self.device, &self.uniform_layout, ring.slot_size, slots);
        }
        let offset = ring.next * ring.slot_size;
        self.queue.write_buffer(&ring.buffer, offset, contents);
        ring.next += 1;
        let offset = u32::try_from(offset).context("uniform ring offset exceeds u32")?;
        Ok((ring.bind_group.clone(), offset))
    }

    /// Slots handed out since the last [`GpuContext::reset_uniforms`] and
    /// the current ring capacity.
    pub fn uniform_usage(&self) -> (u64, u64) {
        let ring = self.uniforms.lock();
        (ring.next, ring.slots)
    }
}
