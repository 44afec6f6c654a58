//! Error types for voxel data model operations.

use thiserror::Error;

/// Result type for voxel data model operations.
pub type GridResult<T> = Result<T, GridError>;

/// Errors that can occur while building or manipulating voxel data.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GridError {
    /// The grid dimensions are invalid.
    #[error("invalid grid dimensions: {nx}x{ny}x{nz}")]
    InvalidDimensions {
        /// Extent along X.
        nx: i64,
        /// Extent along Y.
        ny: i64,
        /// Extent along Z.
        nz: i64,
    },

    /// The voxel spacing must be positive and finite on every axis.
    #[error("voxel spacing must be positive and finite, got ({sx}, {sy}, {sz})")]
    InvalidSpacing {
        /// Spacing along X.
        sx: f64,
        /// Spacing along Y.
        sy: f64,
        /// Spacing along Z.
        sz: f64,
    },

    /// Integer overflow occurred while computing the voxel count.
    #[error("integer overflow computing voxel count")]
    IntegerOverflow,

    /// An array does not hold the tuple count its container requires.
    #[error("array '{name}' has {actual} tuples, expected {expected}")]
    TupleCountMismatch {
        /// Name of the offending array.
        name: String,
        /// Tuple count required by the container.
        expected: usize,
        /// Tuple count of the array.
        actual: usize,
    },

    /// The raw buffer length is not a multiple of the component count.
    #[error("array '{name}' has {len} values, not a multiple of {components} components")]
    RaggedArray {
        /// Name of the offending array.
        name: String,
        /// Number of raw values.
        len: usize,
        /// Components per tuple.
        components: usize,
    },

    /// The component count must be at least one.
    #[error("array '{name}' must have at least one component")]
    ZeroComponents {
        /// Name of the offending array.
        name: String,
    },

    /// An array with this name already exists.
    #[error("array '{name}' already exists")]
    DuplicateArray {
        /// The duplicate name.
        name: String,
    },

    /// The named array was not found.
    #[error("array '{name}' not found")]
    ArrayNotFound {
        /// The missing name.
        name: String,
    },

    /// The named array holds a different element type than requested.
    #[error("array '{name}' holds {actual} values, expected {expected}")]
    ElementTypeMismatch {
        /// Name of the array.
        name: String,
        /// Requested element type.
        expected: &'static str,
        /// Stored element type.
        actual: &'static str,
    },

    /// A keep mask does not cover every tuple.
    #[error("keep mask has {actual} entries, expected {expected}")]
    MaskLengthMismatch {
        /// Tuple count to be covered.
        expected: usize,
        /// Length of the mask.
        actual: usize,
    },

    /// A feature table already holds every id an `i32` can name.
    #[error("feature table is full: {rows} rows exhaust the i32 id range")]
    FeatureIdOverflow {
        /// Rows in the table, including the reserved row 0.
        rows: usize,
    },
}
