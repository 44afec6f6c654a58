//! The neighbor-copy primitive shared by every cleanup stage.
//!
//! Given `best[i] = Some(j)`, every per-voxel tuple of voxel `j` is copied
//! over voxel `i`. Destinations are exclusive, and every destination reads
//! the value its source had before the sweep, so all [`CopyMode`]s produce
//! the same output.

use rayon::prelude::*;
use voxel_types::{AttributeArray, AttributeMatrix, FeatureIds};

use crate::error::{SegmentResult, check_tuples};

/// How a neighbor-copy sweep is split across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CopyMode {
    /// Single-threaded.
    Serial,
    /// One task per attribute array (plus one for the feature ids).
    #[default]
    PerArray,
    /// Arrays in turn, each split into voxel ranges.
    PerVoxelRange,
}

impl CopyMode {
    /// Returns `true` for the multi-threaded modes.
    #[must_use]
    pub const fn is_parallel(self) -> bool {
        !matches!(self, Self::Serial)
    }
}

/// Copies every tuple of `cells` (and of `ids`, if given) from `best[i]` to `i`.
///
/// Returns the number of destinations written.
///
/// # Errors
///
/// Returns [`SegmentError::TupleCountMismatch`](crate::SegmentError::TupleCountMismatch)
/// if `best`, `cells` and `ids` disagree on the voxel count; nothing is
/// copied in that case.
///
/// # Example
///
/// ```
/// use voxel_types::{AttributeMatrix, DataArray, FeatureIds};
/// use voxel_segment::{CopyMode, copy_from_best_neighbors};
///
/// let mut cells = AttributeMatrix::new(3);
/// cells.insert(DataArray::from_scalars("CI", vec![0.9f32, 0.1, 0.8])).unwrap();
/// let mut ids = FeatureIds::from_vec(vec![1, 2, 1]);
///
/// let written = copy_from_best_neighbors(&mut cells, Some(&mut ids), &[None, Some(0), None], CopyMode::PerArray).unwrap();
/// assert_eq!(written, 1);
/// assert_eq!(ids.as_slice(), &[1, 1, 1]);
/// assert_eq!(cells.get_as::<f32>("CI").unwrap().as_slice(), &[0.9, 0.9, 0.8]);
/// ```
pub fn copy_from_best_neighbors(
    cells: &mut AttributeMatrix,
    ids: Option<&mut FeatureIds>,
    best: &[Option<usize>],
    mode: CopyMode,
) -> SegmentResult<usize> {
    check_tuples("cells", best.len(), cells.tuple_count())?;
    if let Some(ids) = ids.as_deref() {
        check_tuples("feature_ids", best.len(), ids.len())?;
    }
    let written = best
        .iter()
        .enumerate()
        .filter(|&(dst, src)| src.is_some_and(|s| s != dst && s < best.len()))
        .count();

    match mode {
        CopyMode::Serial => {
            cells.copy_tuples_from(best, false);
            if let Some(ids) = ids {
                ids.copy_from_sources(best, false);
            }
        }
        CopyMode::PerArray => {
            let arrays: Vec<&mut AttributeArray> = cells.iter_mut().collect();
            rayon::join(
                || {
                    arrays
                        .into_par_iter()
                        .for_each(|array| array.copy_tuples_from(best, false));
                },
                || {
                    if let Some(ids) = ids {
                        ids.copy_from_sources(best, false);
                    }
                },
            );
        }
        CopyMode::PerVoxelRange => {
            for array in cells.iter_mut() {
                array.copy_tuples_from(best, true);
            }
            if let Some(ids) = ids {
                ids.copy_from_sources(best, true);
            }
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel_types::DataArray;

    fn cells() -> AttributeMatrix {
        let mut m = AttributeMatrix::new(4);
        m.insert(DataArray::from_scalars("a", vec![1i32, 2, 3, 4])).unwrap();
        m.insert(DataArray::new("q", 2, vec![0.0f32, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5]).unwrap())
            .unwrap();
        m.insert(DataArray::from_scalars("b", vec![true, false, true, false])).unwrap();
        m
    }

    #[test]
    fn test_all_modes_agree() {
        // Chains and shared sources: 0 <- 1, 1 <- 2, 3 <- 2.
        let best = [Some(1), Some(2), None, Some(2)];
        let mut outputs = Vec::new();
        for mode in [CopyMode::Serial, CopyMode::PerArray, CopyMode::PerVoxelRange] {
            let mut m = cells();
            let mut ids = FeatureIds::from_vec(vec![1, 2, 3, 4]);
            let written = copy_from_best_neighbors(&mut m, Some(&mut ids), &best, mode).unwrap();
            assert_eq!(written, 3);
            outputs.push((m, ids));
        }
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[0], outputs[2]);
        assert_eq!(outputs[0].1.as_slice(), &[2, 3, 3, 3]);
    }

    #[test]
    fn test_without_ids() {
        let mut m = cells();
        copy_from_best_neighbors(&mut m, None, &[None, None, None, Some(0)], CopyMode::PerArray)
            .unwrap();
        assert_eq!(m.get_as::<i32>("a").unwrap().as_slice(), &[1, 2, 3, 1]);
    }

    #[test]
    fn test_length_mismatch_copies_nothing() {
        let mut m = cells();
        let mut ids = FeatureIds::from_vec(vec![1, 2, 3]);
        let before = m.clone();
        assert!(copy_from_best_neighbors(&mut m, Some(&mut ids), &[Some(1); 4], CopyMode::Serial).is_err());
        assert!(copy_from_best_neighbors(&mut m, None, &[Some(1); 3], CopyMode::Serial).is_err());
        assert_eq!(m, before);
        assert_eq!(ids.as_slice(), &[1, 2, 3]);
    }
}
