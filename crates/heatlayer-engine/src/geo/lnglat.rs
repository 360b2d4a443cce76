/// Geographic coordinate in degrees.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    #[inline]
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.lng.is_finite() && self.lat.is_finite()
    }
}

impl From<[f64; 2]> for LngLat {
    #[inline]
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}
