use super::ledger::ResourceLedger;

/// Renderer-facing context (device/queue + resource ledger).
///
/// The host owns the device and queue; the layer borrows them per call and
/// never assumes GPU state persists between calls.
pub struct RenderCtx<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub ledger: &'a ResourceLedger,
}

impl<'a> RenderCtx<'a> {
    #[inline]
    pub fn new(
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        ledger: &'a ResourceLedger,
    ) -> Self {
        Self { device, queue, ledger }
    }
}
