use crate::error::ContractViolation;

use super::StopColor;

/// Number of ramp slots addressable by the colorize shader.
pub const MAX_GRADIENT_STOPS: usize = 11;

/// A single gradient stop.
///
/// `offset` is a density in `[0, 1]`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GradientStop {
    pub color: StopColor,
    pub offset: f32,
}

impl GradientStop {
    #[inline]
    pub const fn new(color: StopColor, offset: f32) -> Self {
        Self { color, offset }
    }
}

/// Ordered color ramp applied to accumulated density.
///
/// Invariants, checked by [`Gradient::validate`]:
/// - 1 to [`MAX_GRADIENT_STOPS`] stops
/// - offsets in `[0, 1]`, non-decreasing
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub stops: Vec<GradientStop>,
}

impl Gradient {
    pub fn new(stops: Vec<GradientStop>) -> Self {
        Self { stops }
    }

    pub fn validate(&self) -> Result<(), ContractViolation> {
        if self.stops.is_empty() {
            return Err(ContractViolation::EmptyGradient);
        }
        if self.stops.len() > MAX_GRADIENT_STOPS {
            return Err(ContractViolation::TooManyStops {
                count: self.stops.len(),
                max: MAX_GRADIENT_STOPS,
            });
        }

        for (index, stop) in self.stops.iter().enumerate() {
            if !(0.0..=1.0).contains(&stop.offset) {
                return Err(ContractViolation::OffsetOutOfRange { index, offset: stop.offset });
            }
            if !stop.color.is_finite() {
                return Err(ContractViolation::InvalidOption {
                    name: "gradient.color",
                    value: f32::NAN,
                });
            }
        }

        if let Some(index) = self
            .stops
            .windows(2)
            .position(|w| w[1].offset < w[0].offset)
        {
            return Err(ContractViolation::UnsortedOffsets { index: index + 1 });
        }

        Ok(())
    }

    /// Maps this gradient to its GPU-ready form.
    pub fn mapped(&self) -> MappedGradient {
        map_gradient(&self.stops)
    }
}

impl Default for Gradient {
    /// White to blue to green to yellow to red.
    fn default() -> Self {
        Self::new(vec![
            GradientStop::new(StopColor::rgba(255.0, 255.0, 255.0, 0.0), 0.0),
            GradientStop::new(StopColor::rgba(212.0, 225.0, 255.0, 1.0), 0.2),
            GradientStop::new(StopColor::rgba(166.0, 255.0, 115.0, 1.0), 0.45),
            GradientStop::new(StopColor::rgba(255.0, 255.0, 0.0, 0.5), 0.75),
            GradientStop::new(StopColor::rgba(255.0, 0.0, 0.0, 1.0), 1.0),
        ])
    }
}

/// Flat normalized form of a gradient.
///
/// `colors` holds `4 * len()` floats (RGBA per stop), `offsets` holds `len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedGradient {
    pub colors: Vec<f32>,
    pub offsets: Vec<f32>,
}

/// Converts stops to normalized colors and parallel offsets, preserving order.
pub fn map_gradient(stops: &[GradientStop]) -> MappedGradient {
    let mut colors = Vec::with_capacity(stops.len() * 4);
    let mut offsets = Vec::with_capacity(stops.len());

    for stop in stops {
        colors.extend_from_slice(&stop.color.normalized());
        offsets.push(stop.offset);
    }

    MappedGradient { colors, offsets }
}

impl MappedGradient {
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    #[inline]
    pub fn color(&self, index: usize) -> [f32; 4] {
        let c = &self.colors[index * 4..index * 4 + 4];
        [c[0], c[1], c[2], c[3]]
    }

    /// Colors padded to the shader's fixed slot count. Unused slots are zero.
    pub fn padded_colors(&self) -> [[f32; 4]; MAX_GRADIENT_STOPS] {
        let mut out = [[0.0; 4]; MAX_GRADIENT_STOPS];
        for (i, slot) in out.iter_mut().enumerate().take(self.len()) {
            *slot = self.color(i);
        }
        out
    }

    /// Offsets packed four per `vec4` (the uniform array stride is 16 bytes).
    pub fn packed_offsets(&self) -> [[f32; 4]; 3] {
        let mut out = [[0.0; 4]; 3];
        for (i, &offset) in self.offsets.iter().enumerate().take(MAX_GRADIENT_STOPS) {
            out[i / 4][i % 4] = offset;
        }
        out
    }

    /// Resolves a density the way the colorize fragment shader does.
    ///
    /// Returns `None` where the shader discards: non-positive or >1 density,
    /// density past the last stop, or negative alpha after `opacity` is applied.
    pub fn sample(&self, density: f32, opacity: f32) -> Option<[f32; 4]> {
        if !(density > 0.0 && density <= 1.0) || self.is_empty() {
            return None;
        }

        let mut color = if density <= self.offsets[0] {
            self.color(0)
        } else {
            let i = (1..self.len()).find(|&i| density <= self.offsets[i])?;
            let (lo, hi) = (self.offsets[i - 1], self.offsets[i]);
            let t = (density - lo) / (hi - lo);
            mix(self.color(i - 1), self.color(i), t)
        };

        color[3] -= 1.0 - opacity;
        if color[3] < 0.0 {
            return None;
        }
        Some(color)
    }
}

#[inline]
fn mix(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}
