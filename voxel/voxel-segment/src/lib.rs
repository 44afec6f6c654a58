//! Feature segmentation, cleanup and pruning on voxel grids.
//!
//! This crate groups the voxels of a [`GridGeometry`](voxel_types::GridGeometry)
//! into 6-connected features (grains) and post-processes the resulting label
//! field:
//!
//! - [`segment`] - Seeded breadth-first region growing driven by a [`ComparePredicate`]
//! - [`neighbor_orientation_correlation`] - Multi-level cleanup of low-confidence voxels
//! - [`prune_min_neighbors`] - Removal of features with too few neighbors, with fill
//! - [`randomize_feature_ids`] - Reproducible id shuffling
//! - [`identify_sample`] - Largest connected region of a good-voxel mask
//! - [`SegmentationPipeline`] - All of the above as cancelable stages
//!
//! Every cleanup stage is built on one primitive,
//! [`copy_from_best_neighbors`]: copy all attributes of voxel `best[i]` over
//! voxel `i`. Copies read a snapshot, so serial and parallel runs produce
//! identical output.
//!
//! # Layer 1 Crate
//!
//! Depends only on `voxel-types`. Crystallographic symmetry is consumed
//! through the [`MisorientationMetric`] trait; [`NoSymmetry`] is provided.
//!
//! # Quick Start
//!
//! ```
//! use voxel_types::{AttributeMatrix, DataArray, GridGeometry};
//! use voxel_segment::{CompareSpec, MinNeighborsParams, PipelineConfig, SegmentationPipeline};
//!
//! let grid = GridGeometry::from_dims([4, 3, 1]).unwrap();
//! let mut cells = AttributeMatrix::new(12);
//! cells.insert(DataArray::from_scalars("Scalar", vec![
//!     1.0f32, 1.0, 1.0, 2.0,
//!     1.0, 9.0, 1.0, 2.0,
//!     1.0, 1.0, 1.0, 2.0,
//! ])).unwrap();
//!
//! let config = PipelineConfig::new(CompareSpec::Scalar { array: "Scalar".into(), tolerance: 0.5 })
//!     .with_min_neighbors(MinNeighborsParams::new(2));
//! let output = SegmentationPipeline::new(config).run(&grid, &mut cells).unwrap();
//!
//! // The 9.0 voxel and the 2.0 column each touch only one feature and are absorbed.
//! assert_eq!(output.segmented_features, 3);
//! assert_eq!(output.table.feature_count(), 1);
//! ```
//!
//! # Logging
//!
//! Stages log through `tracing`: `info!` at stage boundaries, `debug!` per
//! sweep or pass, `warn!` for accepted but degenerate outcomes.
//!
//! # Quality Standards
//!
//! - Zero `unwrap`/`expect` in library code
//! - Configuration errors are reported before any data is modified

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod compare;
mod copy;
mod correlation;
mod error;
mod neighbors;
mod orientation;
mod pipeline;
mod progress;
mod prune;
mod randomize;
mod sample;
mod segment;

pub use compare::{
    BoolCompare, ComparePredicate, MisorientationCompare, ScalarCompare, ScalarTolerance,
    scalar_predicate,
};
pub use copy::{CopyMode, copy_from_best_neighbors};
pub use correlation::{
    CorrelationPass, CorrelationReport, MAX_LEVEL, NeighborCorrelationParams,
    neighbor_orientation_correlation,
};
pub use error::{SegmentError, SegmentResult};
pub use neighbors::{count_feature_neighbors, feature_neighbor_lists};
pub use orientation::{CrystalSymmetry, MisorientationMetric, NoSymmetry, quaternion_from_tuple};
pub use pipeline::{CompareSpec, PipelineConfig, PipelineOutput, SegmentationPipeline};
pub use progress::{CancelToken, NoProgress, ProgressSink, TracingProgress};
pub use prune::{MinNeighborsParams, PruneReport, prune_min_neighbors};
pub use randomize::{FeaturePermutation, draw_index, randomize_feature_ids};
pub use sample::{SampleReport, identify_sample};
pub use segment::{Segmentation, segment};
