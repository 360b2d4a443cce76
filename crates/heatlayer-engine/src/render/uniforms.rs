//! Uniform staging (CPU byte images addressed by resolved handles) and the
//! dynamic-offset ring that holds one block per draw.

use bytemuck::Pod;

use super::RenderCtx;
use super::ledger::{ResourceKind, ResourceLedger};

/// Where a named uniform lives.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum UniformHandle {
    /// A member of a `var<uniform>` block, addressed by byte range.
    Field {
        group: u32,
        binding: u32,
        offset: u64,
        size: u64,
    },
    /// A whole binding (uniform block, texture or sampler).
    Resource { group: u32, binding: u32 },
}

impl UniformHandle {
    #[inline]
    pub fn binding(self) -> u32 {
        match self {
            UniformHandle::Field { binding, .. } | UniformHandle::Resource { binding, .. } => {
                binding
            }
        }
    }
}

/// Byte image of one uniform block, filled through handles.
///
/// Writes through an unresolved (`None`) handle or a handle for another binding
/// are ignored, so callers can set every uniform they know about regardless of
/// which ones a shader actually declares.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    binding: u32,
    bytes: Vec<u8>,
}

impl UniformBlock {
    pub fn new(binding: u32, size: u64) -> Self {
        Self {
            binding,
            bytes: vec![0; size as usize],
        }
    }

    /// Writes `values` at the handle's offset, truncated to the field size.
    ///
    /// Returns whether anything was written.
    pub fn set<T: Pod>(&mut self, handle: Option<UniformHandle>, values: &[T]) -> bool {
        let Some(UniformHandle::Field { binding, offset, size, .. }) = handle else {
            return false;
        };
        if binding != self.binding {
            return false;
        }

        let src: &[u8] = bytemuck::cast_slice(values);
        let start = offset as usize;
        let end = (start + (size as usize).min(src.len())).min(self.bytes.len());
        if start >= end {
            return false;
        }
        self.bytes[start..end].copy_from_slice(&src[..end - start]);
        true
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// One uniform buffer holding `capacity` blocks at aligned strides, bound
/// through a single bind group with a dynamic offset.
pub struct UniformRing {
    label: String,
    block_size: u64,
    stride: u64,
    capacity: usize,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl UniformRing {
    pub fn new(
        ctx: &RenderCtx<'_>,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        block_size: u64,
        capacity: usize,
    ) -> Self {
        let align = ctx.device.limits().min_uniform_buffer_offset_alignment as u64;
        let stride = block_stride(block_size, align);
        let (buffer, bind_group) = allocate(ctx, label, layout, block_size, stride, capacity);

        Self {
            label: label.to_string(),
            block_size,
            stride,
            capacity,
            buffer,
            bind_group,
        }
    }

    /// Grows the ring so it holds at least `required` blocks.
    ///
    /// Returns whether the buffer (and its bind group) was replaced.
    pub fn ensure_capacity(
        &mut self,
        ctx: &RenderCtx<'_>,
        layout: &wgpu::BindGroupLayout,
        required: usize,
    ) -> bool {
        if required <= self.capacity {
            return false;
        }

        let new_cap = required.next_power_of_two().max(4);
        let (buffer, bind_group) =
            allocate(ctx, &self.label, layout, self.block_size, self.stride, new_cap);
        let old_buffer = std::mem::replace(&mut self.buffer, buffer);
        let old_group = std::mem::replace(&mut self.bind_group, bind_group);
        release(old_buffer, old_group, ctx.ledger);

        log::debug!("{}: uniform ring {} -> {} blocks", self.label, self.capacity, new_cap);
        self.capacity = new_cap;
        true
    }

    /// Uploads `blocks` starting at slot 0.
    pub fn write(&self, queue: &wgpu::Queue, blocks: &[UniformBlock]) {
        debug_assert!(blocks.len() <= self.capacity);
        if blocks.is_empty() {
            return;
        }

        let mut bytes = vec![0u8; self.stride as usize * blocks.len()];
        for (i, block) in blocks.iter().enumerate() {
            let start = i * self.stride as usize;
            let src = block.as_bytes();
            let len = src.len().min(self.block_size as usize);
            bytes[start..start + len].copy_from_slice(&src[..len]);
        }
        queue.write_buffer(&self.buffer, 0, &bytes);
    }

    /// Dynamic offset of slot `index`.
    #[inline]
    pub fn offset(&self, index: usize) -> u32 {
        (index as u64 * self.stride) as u32
    }

    #[inline]
    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn destroy(self, ledger: &ResourceLedger) {
        release(self.buffer, self.bind_group, ledger);
    }
}

/// Distance between consecutive blocks for a device offset alignment.
#[inline]
pub fn block_stride(block_size: u64, align: u64) -> u64 {
    block_size.div_ceil(align.max(1)) * align.max(1)
}

fn allocate(
    ctx: &RenderCtx<'_>,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    block_size: u64,
    stride: u64,
    capacity: usize,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: stride * capacity as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("{label} bind group")),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: std::num::NonZeroU64::new(block_size),
            }),
        }],
    });
    ctx.ledger.allocated(ResourceKind::Buffer);
    ctx.ledger.allocated(ResourceKind::BindGroup);
    (buffer, bind_group)
}

fn release(buffer: wgpu::Buffer, bind_group: wgpu::BindGroup, ledger: &ResourceLedger) {
    drop(bind_group);
    buffer.destroy();
    ledger.released(ResourceKind::BindGroup);
    ledger.released(ResourceKind::Buffer);
}
