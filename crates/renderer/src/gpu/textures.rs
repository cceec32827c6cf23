use anyhow::{bail, Result};
use image::RgbaImage;
use wgpu::util::{DeviceExt, TextureDataOrder};

/// Number of images the fragment shader samples: colour then depth.
pub(crate) const IMAGE_COUNT: usize = 2;

struct ImageTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

/// Colour and depth textures bound together at set 1.
pub(crate) struct TexturePair {
    _textures: [ImageTexture; IMAGE_COUNT],
    bind_group: wgpu::BindGroup,
    image_aspect: f32,
}

impl TexturePair {
    /// Uploads `images` in request order: index 0 is the colour image.
    pub(crate) fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        images: &[RgbaImage],
        max_dimension: u32,
    ) -> Result<Self> {
        let [colour, depth] = images else {
            bail!("expected {IMAGE_COUNT} images, got {}", images.len());
        };
        let image_aspect = image_aspect(colour)?;

        let textures = [
            upload(device, queue, colour, 0, max_dimension)?,
            upload(device, queue, depth, 1, max_dimension)?,
        ];
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("image bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&textures[0].view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&textures[0].sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&textures[1].view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&textures[1].sampler),
                },
            ],
        });

        tracing::debug!(
            colour = ?colour.dimensions(),
            depth = ?depth.dimensions(),
            image_aspect,
            "uploaded image textures"
        );
        Ok(Self {
            _textures: textures,
            bind_group,
            image_aspect,
        })
    }

    pub(crate) fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Colour image `height / width`.
    pub(crate) fn image_aspect(&self) -> f32 {
        self.image_aspect
    }
}

fn image_aspect(image: &RgbaImage) -> Result<f32> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        bail!("colour image has no pixels ({width}x{height})");
    }
    Ok(height as f32 / width as f32)
}

fn upload(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    image: &RgbaImage,
    index: usize,
    max_dimension: u32,
) -> Result<ImageTexture> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        bail!("image #{index} has no pixels");
    }
    if width > max_dimension || height > max_dimension {
        bail!(
            "image #{index} is {width}x{height}, larger than the GPU limit of {max_dimension}"
        );
    }

    // Rows go up top-first, matching the top-left fragment origin.
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(&format!("image texture #{index}")),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        image.as_raw(),
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(&format!("image sampler #{index}")),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });

    Ok(ImageTexture {
        _texture: texture,
        view,
        sampler,
    })
}

/// Layout of set 1: texture/sampler pairs for the colour and depth images.
pub(crate) fn layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(IMAGE_COUNT * 2);
    for index in 0..IMAGE_COUNT as u32 {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: index * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: index * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_is_height_over_width() {
        let image = RgbaImage::new(800, 600);
        assert!((image_aspect(&image).unwrap() - 0.75).abs() < 1e-6);
        assert!(image_aspect(&RgbaImage::new(0, 10)).is_err());
    }

    #[test]
    fn layout_pairs_textures_with_samplers() {
        let entries = layout_entries();
        assert_eq!(entries.len(), 4);
        assert!(matches!(entries[0].ty, wgpu::BindingType::Texture { .. }));
        assert!(matches!(entries[1].ty, wgpu::BindingType::Sampler(_)));
        assert_eq!(entries[2].binding, 2);
        assert!(matches!(entries[3].ty, wgpu::BindingType::Sampler(_)));
    }
}
