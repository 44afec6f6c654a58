//! Error types for segmentation, cleanup and pruning.

use thiserror::Error;
use voxel_types::GridError;

/// Result type for segmentation operations.
pub type SegmentResult<T> = Result<T, SegmentError>;

/// Errors that can occur while segmenting or cleaning a voxel grid.
///
/// Configuration errors are reported before any data is touched. The
/// degenerate-result errors ([`SegmentError::NoFeaturesFound`],
/// [`SegmentError::AllFeaturesRemoved`]) are reported after the algorithm
/// ran; their output must not be trusted.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SegmentError {
    /// An error from the voxel data model.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// A parameter is outside its valid range.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A required array does not match the grid or its sibling arrays.
    #[error("array '{name}' has {actual} tuples, expected {expected}")]
    TupleCountMismatch {
        /// Name of the offending array.
        name: String,
        /// Required tuple count.
        expected: usize,
        /// Tuple count found.
        actual: usize,
    },

    /// A required array has the wrong number of components.
    #[error("array '{name}' has {actual} components, expected {expected}")]
    ComponentMismatch {
        /// Name of the offending array.
        name: String,
        /// Required component count.
        expected: usize,
        /// Component count found.
        actual: usize,
    },

    /// The selected phase does not occur in the feature table.
    #[error("phase {phase} is not present in the feature table")]
    PhaseNotPresent {
        /// The requested phase.
        phase: i32,
    },

    /// Segmentation finished without growing a single feature.
    #[error("no features found: the tolerance may be too tight or the mask excludes every voxel")]
    NoFeaturesFound,

    /// Pruning would deactivate every feature.
    #[error("all features would be removed by min_neighbors = {min_neighbors}")]
    AllFeaturesRemoved {
        /// The neighbor threshold that removed everything.
        min_neighbors: usize,
    },

    /// The run was canceled between stages.
    #[error("user canceled during {stage}")]
    Canceled {
        /// The last completed stage.
        stage: &'static str,
    },
}

impl SegmentError {
    /// Builds an [`SegmentError::InvalidParameter`].
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error reports a cancellation rather than bad data.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }
}

/// Checks that an array covers exactly `expected` tuples.
pub(crate) fn check_tuples(name: &str, expected: usize, actual: usize) -> SegmentResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SegmentError::TupleCountMismatch {
            name: name.to_string(),
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = SegmentError::AllFeaturesRemoved { min_neighbors: 100 };
        assert!(err.to_string().contains("all features would be removed"));

        let err = SegmentError::Canceled { stage: "segmentation" };
        assert!(err.is_canceled());
        assert_eq!(err.to_string(), "user canceled during segmentation");
    }

    #[test]
    fn test_check_tuples() {
        assert!(check_tuples("ids", 4, 4).is_ok());
        assert!(matches!(
            check_tuples("ids", 4, 3),
            Err(SegmentError::TupleCountMismatch { expected: 4, actual: 3, .. })
        ));
    }

    #[test]
    fn test_grid_error_converts() {
        let err: SegmentError = GridError::IntegerOverflow.into();
        assert!(matches!(err, SegmentError::Grid(GridError::IntegerOverflow)));

        let err: SegmentError = GridError::FeatureIdOverflow { rows: 1 << 31 }.into();
        assert!(err.to_string().contains("exhaust the i32 id range"));
    }
}
