//! Error types for heatmap construction and rendering.

use thiserror::Error;

/// Result type for renderer operations.
pub type Result<T> = std::result::Result<T, HeatmapError>;

/// Errors surfaced by the heatmap layer.
///
/// Every variant is local to the call that produced it. A failed render records
/// no commands into the host's encoder, so the host may simply skip the frame.
#[derive(Error, Debug)]
pub enum HeatmapError {
    /// A shader stage failed to compile or lacks its entry point.
    #[error("shader build failed for `{label}`: {message}")]
    ShaderBuild { label: String, message: String },

    /// A GPU resource could not be allocated at the requested size.
    #[error("cannot allocate {what} at {width}x{height}: {reason}")]
    ResourceAllocation {
        what: &'static str,
        width: u32,
        height: u32,
        reason: String,
    },

    /// The caller broke a documented precondition.
    #[error("precall contract violated: {0}")]
    ContractViolation(#[from] ContractViolation),
}

/// Misuse detected before any GPU work is issued.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractViolation {
    #[error("renderer used after destroy")]
    RenderAfterDestroy,

    #[error("renderer destroyed twice")]
    AlreadyDestroyed,

    #[error("gradient has no stops")]
    EmptyGradient,

    #[error("gradient has {count} stops, at most {max} are supported")]
    TooManyStops { count: usize, max: usize },

    #[error("gradient offset at stop {index} is lower than the previous one")]
    UnsortedOffsets { index: usize },

    #[error("gradient offset {offset} at stop {index} is outside [0, 1]")]
    OffsetOutOfRange { index: usize, offset: f32 },

    #[error("option `{name}` has invalid value {value}")]
    InvalidOption { name: &'static str, value: f32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_violation_converts_into_heatmap_error() {
        let err: HeatmapError = ContractViolation::TooManyStops { count: 12, max: 11 }.into();
        assert!(matches!(
            err,
            HeatmapError::ContractViolation(ContractViolation::TooManyStops { count: 12, .. })
        ));
        assert_eq!(
            err.to_string(),
            "precall contract violated: gradient has 12 stops, at most 11 are supported"
        );
    }

    #[test]
    fn allocation_error_names_the_resource() {
        let err = HeatmapError::ResourceAllocation {
            what: "color texture",
            width: 0,
            height: 10,
            reason: "zero-sized".into(),
        };
        assert_eq!(err.to_string(), "cannot allocate color texture at 0x10: zero-sized");
    }
}
