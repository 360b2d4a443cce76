use wgpu::util::DeviceExt;

use super::RenderCtx;
use super::ledger::{ResourceKind, ResourceLedger};

/// A vertex buffer and the number of elements it holds.
///
/// `count` is in elements (vertices or instances), not floats.
pub struct DrawBuffer {
    count: u32,
    buffer: wgpu::Buffer,
}

impl DrawBuffer {
    /// Uploads `data` as `count` elements of `components` floats each.
    pub fn from_f32(ctx: &RenderCtx<'_>, label: &str, data: &[f32], components: usize) -> Self {
        debug_assert!(components > 0 && data.len() % components == 0);
        let count = (data.len() / components) as u32;

        // wgpu rejects empty buffer slices; keep a placeholder element so the
        // buffer stays bindable while `count` reports nothing to draw.
        let placeholder = [0.0f32; 4];
        let contents: &[f32] = if data.is_empty() { &placeholder } else { data };

        let buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(contents),
            usage: wgpu::BufferUsages::VERTEX,
        });
        ctx.ledger.allocated(ResourceKind::Buffer);

        Self { count, buffer }
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn slice(&self) -> wgpu::BufferSlice<'_> {
        self.buffer.slice(..)
    }

    /// Frees the GPU buffer immediately.
    pub fn destroy(self, ledger: &ResourceLedger) {
        self.buffer.destroy();
        ledger.released(ResourceKind::Buffer);
    }
}
