//! Headless GPU device management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue without a surface
//! - reading rendered textures back to the CPU
//!
//! Hosts that already own a device skip this module and hand their own
//! device/queue to [`crate::render::RenderCtx`].

mod gpu;
mod init;
mod readback;

pub use gpu::Gpu;
pub use init::GpuInit;
pub use readback::read_rgba8;
