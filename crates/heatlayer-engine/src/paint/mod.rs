//! Color ramp model for the colorize pass.
//!
//! Scope:
//! - stop colors as supplied by hosts (`0..=255` RGB, `0..=1` alpha)
//! - gradients and their GPU-ready mapped form
//!
//! Geometry types remain in `geo`.

pub mod color;
pub mod gradient;

pub use color::StopColor;
pub use gradient::{Gradient, GradientStop, MAX_GRADIENT_STOPS, MappedGradient, map_gradient};
