//! Data model for voxel feature segmentation.
//!
//! This crate provides the leaf data structures shared by the segmentation,
//! cleanup and pruning algorithms in `voxel-segment`:
//!
//! - [`GridGeometry`] - Dense 3D lattice (dims, spacing, origin) with linear indexing
//! - [`VoxelCoord`] and [`Direction`] - Lattice coordinates and the six face directions
//! - [`NeighborOffsets`] - Signed linear-index strides of the 6-neighborhood
//! - [`DataArray`] and [`AttributeArray`] - Typed per-voxel attribute arrays
//! - [`AttributeMatrix`] - Named arrays sharing one tuple count
//! - [`FeatureIds`] - Per-voxel feature labels
//! - [`FeatureTable`] - Per-feature records indexed by feature id
//!
//! # Layer 0 Crate
//!
//! This crate has no dependency on any pipeline, file format or GUI layer.
//!
//! # Indexing
//!
//! Voxels are stored in X-fastest order. Neighbor queries never wrap across
//! the faces of the grid; the six neighbors are always enumerated in the
//! canonical order -Z, -Y, -X, +X, +Y, +Z.
//!
//! # Example
//!
//! ```
//! use voxel_types::{AttributeMatrix, DataArray, FeatureIds, GridGeometry};
//!
//! let grid = GridGeometry::from_dims([4, 1, 1]).unwrap();
//!
//! let mut cells = AttributeMatrix::new(grid.voxel_count());
//! cells.insert(DataArray::from_scalars("Scalar", vec![0.0f32, 0.0, 5.0, 5.0])).unwrap();
//!
//! let ids = FeatureIds::new(grid.voxel_count());
//! assert_eq!(ids.len(), cells.tuple_count());
//! assert_eq!(grid.neighbor_indices(0).collect::<Vec<_>>(), vec![1]);
//! ```
//!
//! # Quality Standards
//!
//! - Zero `unwrap`/`expect` in library code
//! - Every tuple-level copy is bounds checked; no raw pointer arithmetic

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod array;
mod error;
mod feature;
mod geometry;
mod matrix;
mod voxel;

pub use array::{AttributeArray, DataArray, Element, ElementType};
pub use error::{GridError, GridResult};
pub use feature::{FeatureIds, FeatureTable};
pub use geometry::{GridGeometry, NeighborOffsets};
pub use matrix::AttributeMatrix;
pub use voxel::{Direction, VoxelCoord};

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, Vector3};
