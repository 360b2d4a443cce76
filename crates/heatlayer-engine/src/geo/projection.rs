use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use super::{LngLat, WorldCoordinates};

/// Transform between geographic coordinates and the host's world plane.
///
/// The host map owns the projection; the renderer only calls it while building
/// vertex data.
pub trait Projection {
    fn to_world_coordinates(&self, coordinates: LngLat) -> WorldCoordinates;

    fn from_world_coordinates(&self, world: WorldCoordinates) -> LngLat;
}

impl<P: Projection + ?Sized> Projection for &P {
    #[inline]
    fn to_world_coordinates(&self, coordinates: LngLat) -> WorldCoordinates {
        (**self).to_world_coordinates(coordinates)
    }

    #[inline]
    fn from_world_coordinates(&self, world: WorldCoordinates) -> LngLat {
        (**self).from_world_coordinates(world)
    }
}

/// Spherical (web) mercator onto the `[-1, 1]` world square.
///
/// Latitudes are clamped to the square's edge so the poles stay finite.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct SphericalMercator;

impl SphericalMercator {
    /// Latitude mapped onto `y = ±1`.
    pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;
}

impl Projection for SphericalMercator {
    fn to_world_coordinates(&self, coordinates: LngLat) -> WorldCoordinates {
        let lat = coordinates
            .lat
            .clamp(-Self::MAX_LATITUDE, Self::MAX_LATITUDE)
            .to_radians();
        let x = coordinates.lng / 180.0;
        let y = (FRAC_PI_4 + lat / 2.0).tan().ln() / PI;
        WorldCoordinates::new(x, y)
    }

    fn from_world_coordinates(&self, world: WorldCoordinates) -> LngLat {
        let lng = world.x * 180.0;
        let lat = (2.0 * (world.y * PI).exp().atan() - FRAC_PI_2).to_degrees();
        LngLat::new(lng, lat)
    }
}
