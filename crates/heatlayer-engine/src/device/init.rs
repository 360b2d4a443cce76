/// Initialization parameters for the headless GPU context.
///
/// Keep this structure minimal. Add flags only when a concrete backend
/// requirement exists.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Backends wgpu may pick from.
    pub backends: wgpu::Backends,

    /// Adapter preference; offscreen layers rarely need the discrete GPU.
    pub power_preference: wgpu::PowerPreference,

    /// Force a software adapter (useful on CI machines without a GPU).
    pub force_fallback_adapter: bool,

    /// Required wgpu features. The heatmap layer needs none.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    ///
    /// Downlevel defaults keep GL/WebGL2 class adapters usable.
    pub required_limits: wgpu::Limits,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::LowPower,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_webgl2_defaults(),
        }
    }
}
