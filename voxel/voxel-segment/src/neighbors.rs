//! Feature adjacency: which features share a voxel face.

use hashbrown::HashSet;
use tracing::debug;
use voxel_types::{FeatureIds, GridGeometry};

use crate::error::{SegmentResult, check_tuples};

/// Lists, per feature id, the distinct features sharing at least one voxel face.
///
/// The result has `table_len` entries; entry 0 and entries of unused ids are
/// empty. Lists are sorted. Voxels with labels outside `1..table_len` are
/// ignored on both sides of a face.
///
/// # Errors
///
/// Returns [`SegmentError::TupleCountMismatch`](crate::SegmentError::TupleCountMismatch)
/// if `ids` does not cover the grid.
///
/// # Example
///
/// ```
/// use voxel_types::{FeatureIds, GridGeometry};
/// use voxel_segment::feature_neighbor_lists;
///
/// let grid = GridGeometry::from_dims([4, 1, 1]).unwrap();
/// let ids = FeatureIds::from_vec(vec![1, 2, 2, 3]);
/// let lists = feature_neighbor_lists(&grid, &ids, 4).unwrap();
/// assert_eq!(lists[2], vec![1, 3]);
/// ```
pub fn feature_neighbor_lists(
    geometry: &GridGeometry,
    ids: &FeatureIds,
    table_len: usize,
) -> SegmentResult<Vec<Vec<i32>>> {
    check_tuples("feature_ids", geometry.voxel_count(), ids.len())?;

    let valid = |id: i32| usize::try_from(id).ok().filter(|&i| i > 0 && i < table_len);
    let mut sets: Vec<HashSet<i32>> = vec![HashSet::new(); table_len];

    for (index, &id) in ids.as_slice().iter().enumerate() {
        let Some(row) = valid(id) else { continue };
        for neighbor in geometry.neighbor_indices(index) {
            let other = ids[neighbor];
            if other != id && valid(other).is_some() {
                sets[row].insert(other);
            }
        }
    }

    let lists: Vec<Vec<i32>> = sets
        .into_iter()
        .map(|set| {
            let mut list: Vec<i32> = set.into_iter().collect();
            list.sort_unstable();
            list
        })
        .collect();
    debug!(features = table_len.saturating_sub(1), "Built feature neighbor lists");
    Ok(lists)
}

/// Number of distinct face-adjacent features per feature id.
///
/// This is the usual input of [`prune_min_neighbors`](crate::prune_min_neighbors).
///
/// # Errors
///
/// Fails like [`feature_neighbor_lists`].
pub fn count_feature_neighbors(
    geometry: &GridGeometry,
    ids: &FeatureIds,
    table_len: usize,
) -> SegmentResult<Vec<usize>> {
    Ok(feature_neighbor_lists(geometry, ids, table_len)?
        .iter()
        .map(Vec::len)
        .collect())
}
