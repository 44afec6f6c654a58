//! Seeded breadth-first region growing ("scan and grow").

use std::collections::VecDeque;

use tracing::{debug, info};
use voxel_types::{FeatureIds, FeatureTable, GridGeometry};

use crate::compare::ComparePredicate;
use crate::error::{SegmentError, SegmentResult, check_tuples};
use crate::progress::{ProgressSink, ProgressTicker};

/// Output of [`segment`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segmentation {
    /// Per-voxel labels: -1 for masked-out voxels, otherwise `1..table.len()`.
    pub feature_ids: FeatureIds,
    /// One row per feature plus the reserved row 0.
    pub table: FeatureTable,
    /// Seed voxel of every feature; `seeds[id - 1]` started feature `id`.
    pub seeds: Vec<usize>,
}

impl Segmentation {
    /// Number of features grown.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.table.feature_count()
    }
}

/// Groups the voxels of `geometry` into 6-connected features.
///
/// Voxels are scanned in linear index order. Every voxel that is still
/// unassigned and passes `mask` seeds a new feature, which then grows
/// breadth-first: each popped voxel offers its in-bounds face neighbors (in
/// canonical direction order) and an unassigned, unmasked neighbor joins when
/// `predicate.matches(popped, neighbor, feature)` accepts it.
///
/// The feature table row of a feature is appended when its seed is found,
/// before growth, and `predicate.on_seed` may fill it in.
///
/// # Errors
///
/// - [`SegmentError::TupleCountMismatch`] if `mask` does not cover every voxel.
/// - [`SegmentError::NoFeaturesFound`] if not a single feature was grown. The
///   computed labels are discarded in that case.
/// - [`SegmentError::Grid`] with [`GridError::FeatureIdOverflow`](voxel_types::GridError::FeatureIdOverflow)
///   if more features are found than an `i32` id can name.
///
/// # Example
///
/// ```
/// use voxel_types::{AttributeArray, DataArray, GridGeometry};
/// use voxel_segment::{NoProgress, scalar_predicate, segment};
///
/// let grid = GridGeometry::from_dims([4, 1, 1]).unwrap();
/// let values = AttributeArray::from(DataArray::from_scalars("Scalar", vec![0i32, 0, 5, 5]));
/// let predicate = scalar_predicate(&values, 0.0).unwrap();
///
/// let result = segment(&grid, predicate.as_ref(), None, &NoProgress).unwrap();
/// assert_eq!(result.feature_ids.as_slice(), &[1, 1, 2, 2]);
/// assert_eq!(result.table.len(), 3);
/// ```
pub fn segment(
    geometry: &GridGeometry,
    predicate: &dyn ComparePredicate,
    mask: Option<&[bool]>,
    progress: &dyn ProgressSink,
) -> SegmentResult<Segmentation> {
    let total = geometry.voxel_count();
    if let Some(mask) = mask {
        check_tuples("mask", total, mask.len())?;
    }
    let eligible = |index: usize| mask.is_none_or(|m| m.get(index).copied().unwrap_or(false));

    info!(voxels = total, masked = mask.is_some(), "Segmenting features");

    let mut ids = FeatureIds::new(total);
    if mask.is_some() {
        for (index, id) in ids.as_mut_slice().iter_mut().enumerate() {
            if !eligible(index) {
                *id = FeatureIds::EXCLUDED;
            }
        }
    }

    let mut table = FeatureTable::new();
    let mut seeds = Vec::new();
    let mut queue = VecDeque::new();
    let mut ticker = ProgressTicker::new(progress, "segment", total);

    for seed in 0..total {
        ticker.tick(seed);
        if ids[seed] != FeatureIds::UNASSIGNED {
            continue;
        }

        let feature = table.push_feature()?;
        predicate.on_seed(seed, feature, &mut table);
        seeds.push(seed);
        ids[seed] = feature;
        queue.push_back(seed);

        let mut size = 1usize;
        while let Some(current) = queue.pop_front() {
            for neighbor in geometry.neighbor_indices(current) {
                if ids[neighbor] == FeatureIds::UNASSIGNED
                    && predicate.matches(current, neighbor, feature)
                {
                    ids[neighbor] = feature;
                    queue.push_back(neighbor);
                    size += 1;
                }
            }
        }
        debug!(feature, seed, size, "Grew feature");
    }
    ticker.finish();

    if table.len() < 2 {
        return Err(SegmentError::NoFeaturesFound);
    }

    info!(features = table.feature_count(), "Segmentation complete");

    Ok(Segmentation {
        feature_ids: ids,
        table,
        seeds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{ScalarCompare, scalar_predicate};
    use crate::progress::NoProgress;
    use voxel_types::{AttributeArray, DataArray};

    #[test]
    fn test_two_plateaus() {
        let grid = GridGeometry::from_dims([4, 1, 1]).unwrap();
        let values = [0.0f32, 0.0, 5.0, 5.0];
        let p = ScalarCompare::new(&values, 0.0);
        let out = segment(&grid, &p, None, &NoProgress).unwrap();
        assert_eq!(out.feature_ids.as_slice(), &[1, 1, 2, 2]);
        assert_eq!(out.table.len(), 3);
        assert_eq!(out.seeds, vec![0, 2]);
        assert_eq!(out.feature_count(), 2);
    }

    #[test]
    fn test_uniform_plane_is_one_feature() {
        let grid = GridGeometry::from_dims([3, 3, 1]).unwrap();
        let array = AttributeArray::from(DataArray::from_scalars("s", vec![7u16; 9]));
        let p = scalar_predicate(&array, 0.0).unwrap();
        let out = segment(&grid, p.as_ref(), None, &NoProgress).unwrap();
        assert!(out.feature_ids.as_slice().iter().all(|&id| id == 1));
        assert_eq!(out.table.len(), 2);
    }

    #[test]
    fn test_mask_excludes_and_splits() {
        let grid = GridGeometry::from_dims([5, 1, 1]).unwrap();
        let values = [1u8; 5];
        let p = ScalarCompare::new(&values, 0.0);
        let mask = [true, true, false, true, true];
        let out = segment(&grid, &p, Some(&mask), &NoProgress).unwrap();
        assert_eq!(out.feature_ids.as_slice(), &[1, 1, -1, 2, 2]);
    }

    #[test]
    fn test_growth_does_not_chain_beyond_reference() {
        // Each step compares against the popped voxel, so a ramp with
        // tolerance 1 is one feature even though its ends differ by 3.
        let grid = GridGeometry::from_dims([4, 1, 1]).unwrap();
        let values = [0i32, 1, 2, 3];
        let p = ScalarCompare::new(&values, 1.0);
        let out = segment(&grid, &p, None, &NoProgress).unwrap();
        assert_eq!(out.feature_ids.as_slice(), &[1, 1, 1, 1]);
    }

    #[test]
    fn test_single_voxel_features() {
        let grid = GridGeometry::from_dims([2, 2, 1]).unwrap();
        let values = [0i64, 10, 20, 30];
        let p = ScalarCompare::new(&values, 0.0);
        let out = segment(&grid, &p, None, &NoProgress).unwrap();
        assert_eq!(out.feature_ids.as_slice(), &[1, 2, 3, 4]);
        assert_eq!(out.table.len(), 5);
    }

    #[test]
    fn test_everything_masked_is_an_error() {
        let grid = GridGeometry::from_dims([2, 1, 1]).unwrap();
        let values = [0u8; 2];
        let p = ScalarCompare::new(&values, 0.0);
        let err = segment(&grid, &p, Some(&[false, false]), &NoProgress).unwrap_err();
        assert!(matches!(err, SegmentError::NoFeaturesFound));
    }

    #[test]
    fn test_mask_length_checked() {
        let grid = GridGeometry::from_dims([2, 1, 1]).unwrap();
        let values = [0u8; 2];
        let p = ScalarCompare::new(&values, 0.0);
        assert!(matches!(
            segment(&grid, &p, Some(&[true]), &NoProgress),
            Err(SegmentError::TupleCountMismatch { expected: 2, actual: 1, .. })
        ));
    }
}
