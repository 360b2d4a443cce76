//! GPU rendering subsystem.
//!
//! The heatmap layer records into a host-owned command encoder. Every pass is
//! a scoped `wgpu::RenderPass`, so no binding state survives a draw call.
//!
//! Convention:
//! - world-plane positions go through the host's view-projection matrix
//! - sprite sizes are physical pixels
//! - output textures are `Rgba8Unorm` color + `Depth32Float` depth

mod ctx;
pub mod draw_buffer;
pub mod framebuffer;
pub mod heatmap;
pub mod ledger;
pub mod program;
mod reflect;
pub mod uniforms;

pub use ctx::RenderCtx;
pub use draw_buffer::DrawBuffer;
pub use framebuffer::{FrameBuffer, PassLoad};
pub use heatmap::{FrameStats, HeatmapRenderer, LayerOutput, PointAccessor, RenderProps, World};
pub use ledger::{LedgerSnapshot, ResourceKind, ResourceLedger};
pub use program::{AttributeDesc, DrawCall, PipelineState, Program, ProgramDesc};
pub use uniforms::{UniformBlock, UniformHandle, UniformRing};
