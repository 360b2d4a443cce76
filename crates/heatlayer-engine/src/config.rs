//! Heatmap layer configuration.

use crate::error::ContractViolation;
use crate::paint::Gradient;

/// Options recognized by the heatmap layer.
///
/// Defaults match the usual map heatmap look: a 32 px sprite (`size * density`)
/// with intensities normalized to `1`.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapConfig {
    /// Color ramp applied to accumulated density.
    pub gradient: Gradient,

    /// Sprite size multiplier.
    pub density: f32,

    /// Intensity that maps to full density before blur is applied.
    pub max: f32,

    /// Falloff strength; the sprite center reaches `intensity / max * blur`.
    pub blur: f32,

    /// Base sprite diameter in pixels.
    pub size: f32,

    /// Layer opacity subtracted from ramp alpha in the colorize pass.
    pub opacity: f32,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            gradient: Gradient::default(),
            density: 4.0,
            max: 1.0,
            blur: 1.0,
            size: 8.0,
            opacity: 1.0,
        }
    }
}

impl HeatmapConfig {
    pub fn with_gradient(mut self, gradient: Gradient) -> Self {
        self.gradient = gradient;
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_max(mut self, max: f32) -> Self {
        self.max = max;
        self
    }

    pub fn with_blur(mut self, blur: f32) -> Self {
        self.blur = blur;
        self
    }

    pub fn with_size(mut self, size: f32) -> Self {
        self.size = size;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    /// Sprite diameter in pixels.
    #[inline]
    pub fn sprite_diameter(&self) -> f32 {
        self.size * self.density
    }

    /// Checks every option once, at renderer construction.
    pub fn validate(&self) -> Result<(), ContractViolation> {
        positive("density", self.density)?;
        positive("max", self.max)?;
        positive("size", self.size)?;

        if !(self.blur.is_finite() && self.blur >= 0.0) {
            return Err(ContractViolation::InvalidOption { name: "blur", value: self.blur });
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(ContractViolation::InvalidOption { name: "opacity", value: self.opacity });
        }

        self.gradient.validate()
    }
}

fn positive(name: &'static str, value: f32) -> Result<(), ContractViolation> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ContractViolation::InvalidOption { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = HeatmapConfig::default();
        assert_eq!(c.validate(), Ok(()));
        assert_eq!((c.density, c.max, c.blur, c.size, c.opacity), (4.0, 1.0, 1.0, 8.0, 1.0));
        assert_eq!(c.sprite_diameter(), 32.0);
    }

    #[test]
    fn non_positive_scalars_are_rejected() {
        let err = HeatmapConfig::default().with_max(0.0).validate();
        assert_eq!(err, Err(ContractViolation::InvalidOption { name: "max", value: 0.0 }));

        assert!(HeatmapConfig::default().with_density(-1.0).validate().is_err());
        assert!(HeatmapConfig::default().with_size(f32::NAN).validate().is_err());
    }

    #[test]
    fn zero_blur_is_allowed_but_negative_is_not() {
        assert!(HeatmapConfig::default().with_blur(0.0).validate().is_ok());
        assert!(HeatmapConfig::default().with_blur(-0.1).validate().is_err());
    }

    #[test]
    fn opacity_must_stay_in_unit_range() {
        assert!(HeatmapConfig::default().with_opacity(0.0).validate().is_ok());
        assert!(HeatmapConfig::default().with_opacity(1.2).validate().is_err());
    }

    #[test]
    fn gradient_errors_surface_through_config() {
        let c = HeatmapConfig::default().with_gradient(Gradient::new(vec![]));
        assert_eq!(c.validate(), Err(ContractViolation::EmptyGradient));
    }
}
