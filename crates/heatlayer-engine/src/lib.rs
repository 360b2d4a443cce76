//! Heatlayer engine crate.
//!
//! A two-pass GPU heatmap layer for map renderers: weighted points are splatted
//! into an offscreen density buffer, then colorized through a gradient ramp.
//! Hosts lend their wgpu device per call through [`render::RenderCtx`].

pub mod config;
pub mod data;
pub mod device;
pub mod error;
pub mod geo;
pub mod logging;
pub mod paint;
pub mod render;

pub use config::HeatmapConfig;
pub use data::{Point, VertexData};
pub use error::{ContractViolation, HeatmapError, Result};
pub use render::{HeatmapRenderer, RenderCtx, RenderProps, World};
