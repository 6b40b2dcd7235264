use bytemuck::Pod;
use wgpu::util::DeviceExt;

/// Vertex or index buffer holding `len` elements.
///
/// `update` rewrites the contents in place while they fit and reallocates
/// otherwise.
pub struct GpuBuffer {
    buffer: wgpu::Buffer,
    usage: wgpu::BufferUsages,
    len: u32,
    stride: u64,
    label: String,
}

impl GpuBuffer {
    pub fn vertex<T: Pod>(device: &wgpu::Device, label: &str, data: &[T]) -> Self {
        Self::new(device, label, wgpu::BufferUsages::VERTEX, data)
    }

    pub fn index(device: &wgpu::Device, label: &str, data: &[u32]) -> Self {
        Self::new(device, label, wgpu::BufferUsages::INDEX, data)
    }

    fn new<T: Pod>(
        device: &wgpu::Device,
        label: &str,
        usage: wgpu::BufferUsages,
        data: &[T],
    ) -> Self {
        let usage = usage | wgpu::BufferUsages::COPY_DST;
        Self {
            buffer: create(device, label, usage, data),
            usage,
            len: data.len() as u32,
            stride: std::mem::size_of::<T>() as u64,
            label: label.to_string(),
        }
    }

    pub fn update<T: Pod>(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if !bytes.is_empty() && bytes.len() as u64 <= self.buffer.size() {
            queue.write_buffer(&self.buffer, 0, bytes);
        } else {
            self.buffer = create(device, &self.label, self.usage, data);
        }
        self.len = data.len() as u32;
        self.stride = std::mem::size_of::<T>() as u64;
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slice over the valid elements. Must not be called on an empty buffer.
    pub fn slice(&self) -> wgpu::BufferSlice<'_> {
        self.buffer.slice(..self.len as u64 * self.stride)
    }
}

fn create<T: Pod>(
    device: &wgpu::Device,
    label: &str,
    usage: wgpu::BufferUsages,
    data: &[T],
) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(data),
        usage,
    })
}
