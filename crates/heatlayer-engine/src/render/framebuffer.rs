//! Offscreen color + depth render targets.

use crate::error::{HeatmapError, Result};
use crate::geo::PixelSize;

use super::RenderCtx;
use super::ledger::{ResourceKind, ResourceLedger};

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// How a pass treats the existing attachment contents.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PassLoad {
    /// Transparent black, depth 1.0.
    Clear,
    /// Keep what previous passes drew.
    Keep,
}

struct Attachments {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
}

/// A color + depth attachment pair with the sampler used to read the color.
///
/// Storage is allocated lazily by [`FrameBuffer::bind`]; a fresh framebuffer
/// has size `(0, 0)` and no textures.
pub struct FrameBuffer {
    label: String,
    size: PixelSize,
    generation: u64,
    attachments: Option<Attachments>,
    color_sampler: wgpu::Sampler,
}

/// True when storage at `current` cannot serve `requested`.
#[inline]
pub fn needs_resize(current: PixelSize, requested: PixelSize) -> bool {
    current != requested
}

impl FrameBuffer {
    pub fn create(ctx: &RenderCtx<'_>, label: &str) -> Self {
        let color_sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{label} color sampler")),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        ctx.ledger.allocated(ResourceKind::FrameBuffer);
        ctx.ledger.allocated(ResourceKind::Sampler);

        Self {
            label: label.to_string(),
            size: PixelSize::zero(),
            generation: 0,
            attachments: None,
            color_sampler,
        }
    }

    /// Makes storage match `size`. Returns whether the textures were reallocated.
    ///
    /// Reallocation discards the previous contents.
    pub fn bind(&mut self, ctx: &RenderCtx<'_>, size: PixelSize) -> Result<bool> {
        if !needs_resize(self.size, size) && self.attachments.is_some() {
            return Ok(false);
        }
        validate_size(ctx.device, size)?;

        if let Some(old) = self.attachments.take() {
            release(old, ctx.ledger);
        }

        let color = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("{} color", self.label)),
            size: size.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("{} depth", self.label)),
            size: size.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        ctx.ledger.allocated(ResourceKind::Texture);
        ctx.ledger.allocated(ResourceKind::Texture);

        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        log::debug!(
            "{}: storage {}x{} -> {}x{}",
            self.label,
            self.size.width,
            self.size.height,
            size.width,
            size.height
        );

        self.attachments = Some(Attachments { color, color_view, depth, depth_view });
        self.size = size;
        self.generation += 1;
        Ok(true)
    }

    /// Opens a pass on both attachments with the viewport covering the storage.
    ///
    /// Returns `None` before the first successful [`bind`](Self::bind).
    pub fn begin_pass<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        load: PassLoad,
    ) -> Option<wgpu::RenderPass<'e>> {
        let att = self.attachments.as_ref()?;

        let (color_load, depth_load) = match load {
            PassLoad::Clear => {
                (wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT), wgpu::LoadOp::Clear(1.0))
            }
            PassLoad::Keep => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &att.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &att.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        pass.set_viewport(
            0.0,
            0.0,
            self.size.width as f32,
            self.size.height as f32,
            0.0,
            1.0,
        );
        Some(pass)
    }

    #[inline]
    pub fn size(&self) -> PixelSize {
        self.size
    }

    /// Bumped on every reallocation; views taken earlier are stale once it moves.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn color(&self) -> Option<&wgpu::Texture> {
        self.attachments.as_ref().map(|a| &a.color)
    }

    pub fn color_view(&self) -> Option<&wgpu::TextureView> {
        self.attachments.as_ref().map(|a| &a.color_view)
    }

    pub fn depth(&self) -> Option<&wgpu::Texture> {
        self.attachments.as_ref().map(|a| &a.depth)
    }

    pub fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.attachments.as_ref().map(|a| &a.depth_view)
    }

    #[inline]
    pub fn color_sampler(&self) -> &wgpu::Sampler {
        &self.color_sampler
    }

    pub fn destroy(mut self, ledger: &ResourceLedger) {
        log::debug!("destroying framebuffer `{}`", self.label);
        if let Some(att) = self.attachments.take() {
            release(att, ledger);
        }
        ledger.released(ResourceKind::Sampler);
        ledger.released(ResourceKind::FrameBuffer);
    }
}

fn release(att: Attachments, ledger: &ResourceLedger) {
    drop(att.color_view);
    drop(att.depth_view);
    att.color.destroy();
    att.depth.destroy();
    ledger.released(ResourceKind::Texture);
    ledger.released(ResourceKind::Texture);
}

/// Rejects sizes the device cannot allocate.
pub(crate) fn validate_size(device: &wgpu::Device, size: PixelSize) -> Result<()> {
    let max = device.limits().max_texture_dimension_2d;
    let reason = if size.is_empty() {
        "zero-sized target".to_string()
    } else if size.width > max || size.height > max {
        format!("exceeds device limit of {max}")
    } else {
        return Ok(());
    };

    Err(HeatmapError::ResourceAllocation {
        what: "framebuffer",
        width: size.width,
        height: size.height,
        reason,
    })
}
