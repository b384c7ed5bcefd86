//! Shape errors for elementwise value operations.

use thiserror::Error;

/// Errors from elementwise `RandomVariable` operations.
///
/// These are shape errors only. Numerical edge cases (division by zero,
/// NaN, Inf) are not errors; they propagate as IEEE-754 special values.
///
/// # Examples
///
/// ```
/// use aad_core::types::{RandomVariable, ValueError};
///
/// let a = RandomVariable::from_paths(vec![1.0, 2.0]);
/// let b = RandomVariable::from_paths(vec![1.0, 2.0, 3.0]);
/// assert!(matches!(
///     a.add(&b),
///     Err(ValueError::PathCountMismatch { left: 2, right: 3 })
/// ));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueError {
    /// Two path-vectorised operands carry different path counts.
    #[error("path count mismatch: {left} vs {right}")]
    PathCountMismatch {
        /// Path count of the left operand.
        left: usize,
        /// Path count of the right operand.
        right: usize,
    },

    /// Per-path access on a deterministic (broadcast) value.
    #[error("per-path write at index {index} on a deterministic value")]
    Deterministic {
        /// The path index that was written.
        index: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_display() {
        let err = ValueError::PathCountMismatch { left: 4, right: 8 };
        assert_eq!(format!("{}", err), "path count mismatch: 4 vs 8");
    }

    #[test]
    fn test_error_trait_implementation() {
        let err = ValueError::Deterministic { index: 0 };
        let _: &dyn std::error::Error = &err;
    }
}
