use core::ops::{Add, Neg, Sub};

/// Position on the host map's world plane.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct WorldCoordinates {
    pub x: f64,
    pub y: f64,
}

impl WorldCoordinates {
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub const fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Narrows to the `f32` pair uploaded to the GPU.
    #[inline]
    pub fn to_f32(self) -> [f32; 2] {
        [self.x as f32, self.y as f32]
    }
}

impl Add for WorldCoordinates {
    type Output = WorldCoordinates;
    #[inline]
    fn add(self, rhs: WorldCoordinates) -> WorldCoordinates {
        WorldCoordinates::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for WorldCoordinates {
    type Output = WorldCoordinates;
    #[inline]
    fn sub(self, rhs: WorldCoordinates) -> WorldCoordinates {
        WorldCoordinates::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for WorldCoordinates {
    type Output = WorldCoordinates;
    #[inline]
    fn neg(self) -> WorldCoordinates {
        WorldCoordinates::new(-self.x, -self.y)
    }
}
