use thiserror::Error;

/// Failures raised by the integrators themselves.
///
/// Errors produced by a user-supplied [`crate::traits::OdeSystem`] are never
/// wrapped in this type; they reach the caller unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegratorError {
    #[error("Step size must be positive and finite, got {0}.")]
    InvalidStepSize(f64),

    #[error("Degenerate interval: t_end ({end}) must not precede t_start ({start}).")]
    DegenerateInterval { start: f64, end: f64 },

    #[error("State dimension mismatch. Expected {expected}, got {actual}.")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid system: {0}")]
    InvalidSystem(String),
}
