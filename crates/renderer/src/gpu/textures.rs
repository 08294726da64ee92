/// A texture and its default view, recreated whenever the requested size
/// changes.
pub(crate) struct SizedTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: (u32, u32),
}

impl SizedTexture {
    pub(crate) fn new(
        device: &wgpu::Device,
        label: &str,
        size: (u32, u32),
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size,
        }
    }

    /// Returns the texture held in `slot`, replacing it when the size differs.
    /// The returned flag is `true` when a new texture was created.
    pub(crate) fn ensure<'a>(
        slot: &'a mut Option<SizedTexture>,
        device: &wgpu::Device,
        label: &str,
        size: (u32, u32),
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> (&'a SizedTexture, bool) {
        let size = (size.0.max(1), size.1.max(1));
        if slot.as_ref().is_some_and(|texture| texture.size != size) {
            *slot = None;
        }
        let created = slot.is_none();
        let texture =
            slot.get_or_insert_with(|| SizedTexture::new(device, label, size, format, usage));
        (texture, created)
    }

    /// Writes tightly packed rows of `bytes_per_pixel` bytes, row 0 first.
    pub(crate) fn write(&self, queue: &wgpu::Queue, data: &[u8], bytes_per_pixel: u32) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.size.0 * bytes_per_pixel),
                rows_per_image: Some(self.size.1),
            },
            extent(self.size),
        );
    }
}

pub(crate) fn extent(size: (u32, u32)) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.0,
        height: size.1,
        depth_or_array_layers: 1,
    }
}

/// Premultiplied RGBA8 layer drawn by the CPU.
pub(crate) const LAYER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Single-channel float image: raster coverage and density fields.
pub(crate) const SCALAR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

pub(crate) fn layer_usage() -> wgpu::TextureUsages {
    wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST
}

pub(crate) fn coverage_usage() -> wgpu::TextureUsages {
    wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING
}
