use std::path::Path;

use anyhow::{bail, Context, Result};

use super::textures::extent;

/// Bytes per row of a texture-to-buffer copy, padded to the copy alignment.
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Drops row padding and swaps blue and red for BGRA targets.
pub(crate) fn unpad_rows(
    data: &[u8],
    size: (u32, u32),
    padded: u32,
    format: wgpu::TextureFormat,
) -> Vec<u8> {
    let row = size.0 as usize * 4;
    let mut pixels = Vec::with_capacity(row * size.1 as usize);
    for y in 0..size.1 as usize {
        let start = y * padded as usize;
        pixels.extend_from_slice(&data[start..start + row]);
    }
    if matches!(
        format,
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
    ) {
        for pixel in pixels.chunks_exact_mut(4) {
            pixel.swap(0, 2);
        }
    }
    pixels
}

/// Copies `texture` back to the host and returns tightly packed RGBA8 rows.
pub(crate) fn read_rgba(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    size: (u32, u32),
    format: wgpu::TextureFormat,
) -> Result<Vec<u8>> {
    if format.block_copy_size(None) != Some(4) {
        bail!("cannot read back {format:?} targets");
    }
    let padded = padded_bytes_per_row(size.0);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback buffer"),
        size: u64::from(padded) * u64::from(size.1),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(size.1),
            },
        },
        extent(size),
    );
    queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .context("device poll failed during readback")?;
    rx.recv()
        .context("readback callback dropped")?
        .context("failed to map readback buffer")?;

    let pixels = {
        let data = slice.get_mapped_range();
        unpad_rows(&data, size, padded, format)
    };
    buffer.unmap();
    Ok(pixels)
}

pub(crate) fn save_png(path: &Path, pixels: Vec<u8>, size: (u32, u32)) -> Result<()> {
    let image = image::RgbaImage::from_raw(size.0, size.1, pixels)
        .context("readback size does not match the frame")?;
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "saved frame");
    Ok(())
}
