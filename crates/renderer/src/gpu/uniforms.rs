use crate::uniform::UniformTarget;

/// Uniform block storage on the GPU, written through the queue.
///
/// Cloning shares the same buffer; each scene binder holds one clone.
#[derive(Clone)]
pub(crate) struct UniformBuffer {
    queue: wgpu::Queue,
    buffer: wgpu::Buffer,
}

impl UniformBuffer {
    pub(crate) fn new(device: &wgpu::Device, queue: &wgpu::Queue, size: u64) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("parallax uniforms"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            queue: queue.clone(),
            buffer,
        }
    }

    pub(crate) fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

impl UniformTarget for UniformBuffer {
    fn write(&self, offset: u64, data: &[u8]) {
        self.queue.write_buffer(&self.buffer, offset, data);
    }
}
