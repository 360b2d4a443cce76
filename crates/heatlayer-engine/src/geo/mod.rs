//! Geographic and world-plane coordinate types.
//!
//! Canonical spaces:
//! - `LngLat`: degrees, longitude first
//! - `WorldCoordinates`: the host map's world plane, `[-1, 1]` on both axes for
//!   the spherical mercator projection, +Y north
//! - `PixelSize`: physical viewport pixels

mod lnglat;
mod projection;
mod size;
mod world;

pub use lnglat::LngLat;
pub use projection::{Projection, SphericalMercator};
pub use size::PixelSize;
pub use world::WorldCoordinates;
