/// Straight-alpha stop color in host units.
///
/// RGB channels are `0..=255`, alpha is `0..=1`. A missing alpha is treated as
/// fully opaque when the gradient is mapped.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct StopColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: Option<f32>,
}

impl StopColor {
    /// Creates an opaque color with implicit alpha.
    #[inline]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: None }
    }

    #[inline]
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a: Some(a) }
    }

    /// Returns normalized `[r, g, b, a]` with channels in `0..=1`.
    #[inline]
    pub fn normalized(self) -> [f32; 4] {
        [
            self.r / 255.0,
            self.g / 255.0,
            self.b / 255.0,
            self.a.unwrap_or(1.0),
        ]
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.r.is_finite()
            && self.g.is_finite()
            && self.b.is_finite()
            && self.a.is_none_or(f32::is_finite)
    }
}

impl From<[f32; 4]> for StopColor {
    #[inline]
    fn from([r, g, b, a]: [f32; 4]) -> Self {
        Self::rgba(r, g, b, a)
    }
}

impl From<[f32; 3]> for StopColor {
    #[inline]
    fn from([r, g, b]: [f32; 3]) -> Self {
        Self::rgb(r, g, b)
    }
}
