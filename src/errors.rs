use crate::alloc::string::String;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResidualError {
    #[error("landmark index {index} out of range for {count} landmarks")]
    LandmarkIndexOutOfRange { index: usize, count: usize },

    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("element index {index} out of range for a layout of {count} elements")]
    ElementIndexOutOfRange { index: usize, count: usize },

    #[error("element `{0}` is not part of the layout")]
    UnknownElement(String),

    #[error("element `{0}` appears more than once in the layout")]
    DuplicateElement(String),

    #[error("a robocentric residual needs at least one landmark")]
    EmptyLandmarkSet,

    #[error("time step must be finite and non-negative, got {0} s")]
    InvalidTimeStep(f64),
}

/// Shorthand for `DimensionMismatch` checks.
pub(crate) fn check_dim(
    what: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), ResidualError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ResidualError::DimensionMismatch {
            what,
            expected,
            actual,
        })
    }
}
