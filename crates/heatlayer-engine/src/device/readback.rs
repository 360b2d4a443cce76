use anyhow::{Context, Result};

use crate::geo::PixelSize;

/// Copies an `Rgba8Unorm` texture to the CPU, tightly packed, rows top to bottom.
///
/// Blocks until the GPU has finished all previously submitted work.
pub fn read_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    size: PixelSize,
) -> Result<Vec<u8>> {
    anyhow::ensure!(!size.is_empty(), "cannot read back an empty texture");

    let unpadded_bytes_per_row = size.width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("heatlayer readback buffer"),
        size: padded_bytes_per_row as u64 * size.height as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("heatlayer readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(size.height),
            },
        },
        size.extent(),
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .context("device poll failed during readback")?;
    rx.recv()
        .context("readback map callback never ran")?
        .context("failed to map readback buffer")?;

    let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * size.height) as usize);
    {
        let mapped = slice.get_mapped_range();
        for row in mapped.chunks(padded_bytes_per_row as usize) {
            pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
        }
    }
    staging.unmap();
    staging.destroy();

    Ok(pixels)
}
