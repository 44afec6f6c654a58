//! Minimum-neighbors pruning: remove weakly connected features and fill their voxels.

use rayon::prelude::*;
use tracing::{debug, info, warn};
use voxel_types::{AttributeMatrix, FeatureIds, FeatureTable, GridGeometry};

use crate::copy::{CopyMode, copy_from_best_neighbors};
use crate::error::{SegmentError, SegmentResult, check_tuples};

/// Parameters for [`prune_min_neighbors`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MinNeighborsParams {
    /// Features with fewer distinct neighbors are removed.
    pub min_neighbors: usize,
    /// When set, only features of this phase are subject to removal.
    pub phase_filter: Option<i32>,
    /// Also fill voxels that were already excluded (id < 0) before pruning,
    /// such as mask background. Off by default, so only the voxels of
    /// removed features are filled.
    pub fill_excluded: bool,
    /// Threading of the fill sweeps.
    pub copy_mode: CopyMode,
    /// Drop removed rows from the table and renumber voxel ids densely.
    pub compact: bool,
}

impl Default for MinNeighborsParams {
    fn default() -> Self {
        Self {
            min_neighbors: 2,
            phase_filter: None,
            fill_excluded: false,
            copy_mode: CopyMode::default(),
            compact: true,
        }
    }
}

impl MinNeighborsParams {
    /// Creates parameters with the given threshold and defaults otherwise.
    #[must_use]
    pub fn new(min_neighbors: usize) -> Self {
        Self {
            min_neighbors,
            ..Self::default()
        }
    }

    /// Restricts removal to one phase.
    #[must_use]
    pub const fn with_phase_filter(mut self, phase: i32) -> Self {
        self.phase_filter = Some(phase);
        self
    }

    /// Sets whether pre-existing excluded voxels are filled.
    #[must_use]
    pub const fn with_fill_excluded(mut self, fill_excluded: bool) -> Self {
        self.fill_excluded = fill_excluded;
        self
    }

    /// Sets the threading mode.
    #[must_use]
    pub const fn with_copy_mode(mut self, copy_mode: CopyMode) -> Self {
        self.copy_mode = copy_mode;
        self
    }

    /// Sets whether the table is compacted afterwards.
    #[must_use]
    pub const fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] if `min_neighbors` is zero.
    pub fn validate(&self) -> SegmentResult<()> {
        if self.min_neighbors == 0 {
            return Err(SegmentError::invalid("min_neighbors", "must be at least 1"));
        }
        Ok(())
    }
}

/// Result of [`prune_min_neighbors`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PruneReport {
    /// Active mask indexed by the feature ids from before pruning.
    pub active: Vec<bool>,
    /// Features removed.
    pub removed: usize,
    /// Fill sweeps that assigned at least one voxel.
    pub sweeps: usize,
    /// Voxels filled from a neighbor.
    pub filled: usize,
    /// Fillable voxels left excluded because no feature could reach them.
    pub unresolved: usize,
    /// Old to new id map when the table was compacted.
    pub remap: Option<Vec<i32>>,
}

/// Removes features with fewer than `min_neighbors` neighbors and grows the
/// surviving features into the freed voxels.
///
/// `neighbor_counts[id]` is the number of distinct features adjacent to `id`
/// (see [`count_feature_neighbors`](crate::count_feature_neighbors)). Voxels of
/// removed features are reset to [`FeatureIds::EXCLUDED`] and then filled
/// sweep by sweep: each fillable voxel picks the face neighbor whose feature
/// is most common around it (ties go to the earlier direction) and copies all
/// of that neighbor's attributes. Sweeps repeat until one assigns nothing.
///
/// # Errors
///
/// Every error is returned before `ids`, `table` or `cells` is modified:
///
/// - [`SegmentError::InvalidParameter`] from [`MinNeighborsParams::validate`],
///   or if `ids` references a row beyond the table.
/// - [`SegmentError::TupleCountMismatch`] if the inputs disagree on sizes.
/// - [`SegmentError::PhaseNotPresent`] if the phase filter names a phase no feature has.
/// - [`SegmentError::AllFeaturesRemoved`] if no feature would survive.
///
/// # Example
///
/// ```
/// use voxel_types::{AttributeMatrix, FeatureIds, FeatureTable, GridGeometry};
/// use voxel_segment::{MinNeighborsParams, count_feature_neighbors, prune_min_neighbors};
///
/// // Features 2 and 3 each touch only feature 1.
/// let grid = GridGeometry::from_dims([4, 3, 1]).unwrap();
/// let mut ids = FeatureIds::from_vec(vec![
///     1, 1, 1, 3,
///     1, 2, 1, 3,
///     1, 1, 1, 3,
/// ]);
/// let mut table = FeatureTable::with_features(3);
/// let mut cells = AttributeMatrix::new(12);
///
/// let counts = count_feature_neighbors(&grid, &ids, table.len()).unwrap();
/// let report = prune_min_neighbors(&grid, &mut ids, &mut table, &mut cells, &counts, &MinNeighborsParams::new(2)).unwrap();
/// assert_eq!(report.removed, 2);
/// assert!(ids.as_slice().iter().all(|&id| id == 1));
/// assert_eq!(table.len(), 2);
/// ```
pub fn prune_min_neighbors(
    geometry: &GridGeometry,
    ids: &mut FeatureIds,
    table: &mut FeatureTable,
    cells: &mut AttributeMatrix,
    neighbor_counts: &[usize],
    params: &MinNeighborsParams,
) -> SegmentResult<PruneReport> {
    params.validate()?;
    let total = geometry.voxel_count();
    check_tuples("feature_ids", total, ids.len())?;
    check_tuples("cells", total, cells.tuple_count())?;
    check_tuples("neighbor_counts", table.len(), neighbor_counts.len())?;
    let max_id = usize::try_from(ids.max_id()).unwrap_or(0);
    if max_id >= table.len() {
        return Err(SegmentError::invalid(
            "feature_ids",
            format!("id {max_id} has no row in a table of {} rows", table.len()),
        ));
    }
    if let Some(phase) = params.phase_filter {
        if !table.phases().iter().skip(1).any(|&p| p == phase) {
            return Err(SegmentError::PhaseNotPresent { phase });
        }
    }

    info!(
        features = table.feature_count(),
        min_neighbors = params.min_neighbors,
        phase_filter = ?params.phase_filter,
        "Pruning features by neighbor count"
    );

    let active: Vec<bool> = (0..table.len())
        .map(|row| {
            let exempt = params
                .phase_filter
                .is_some_and(|phase| table.phase(row) != Some(phase));
            row > 0
                && table.active().get(row).copied().unwrap_or(false)
                && (exempt || neighbor_counts[row] >= params.min_neighbors)
        })
        .collect();
    if !active.iter().any(|&a| a) {
        return Err(SegmentError::AllFeaturesRemoved {
            min_neighbors: params.min_neighbors,
        });
    }
    let removed = table.active().iter().filter(|&&a| a).count() - active.iter().filter(|&&a| a).count();

    let mut fillable = vec![false; total];
    for (id, fill) in ids.as_mut_slice().iter_mut().zip(&mut fillable) {
        if *id > 0 && !active[usize::try_from(*id).unwrap_or(0)] {
            *id = FeatureIds::EXCLUDED;
            *fill = true;
        } else if *id < 0 && params.fill_excluded {
            *fill = true;
        }
    }
    table.set_active(&active)?;

    let (sweeps, filled) = fill_from_neighbors(geometry, ids, cells, &fillable, params.copy_mode)?;
    let unresolved = ids
        .as_slice()
        .iter()
        .zip(&fillable)
        .filter(|&(&id, &fill)| fill && id < 0)
        .count();
    if unresolved > 0 {
        warn!(unresolved, "Voxels left excluded: no surviving feature reaches them");
    }

    let remap = if params.compact {
        let remap = table.compact(&active)?;
        ids.remap(&remap);
        Some(remap)
    } else {
        None
    };

    info!(removed, sweeps, filled, remaining = table.feature_count(), "Pruning complete");

    Ok(PruneReport {
        active,
        removed,
        sweeps,
        filled,
        unresolved,
        remap,
    })
}

/// Repeats vote-and-copy sweeps over excluded, fillable voxels until a sweep assigns nothing.
///
/// Returns the number of productive sweeps and of voxels filled.
fn fill_from_neighbors(
    geometry: &GridGeometry,
    ids: &mut FeatureIds,
    cells: &mut AttributeMatrix,
    fillable: &[bool],
    mode: CopyMode,
) -> SegmentResult<(usize, usize)> {
    let mut sweeps = 0;
    let mut filled = 0;
    loop {
        let best: Vec<Option<usize>> = {
            let labels = ids.as_slice();
            let vote = |i: usize| {
                (fillable[i] && labels[i] < 0)
                    .then(|| most_common_neighbor(geometry, labels, i))
                    .flatten()
            };
            if mode.is_parallel() {
                (0..labels.len()).into_par_iter().map(vote).collect()
            } else {
                (0..labels.len()).map(vote).collect()
            }
        };
        let written = copy_from_best_neighbors(cells, Some(&mut *ids), &best, mode)?;
        if written == 0 {
            break;
        }
        sweeps += 1;
        filled += written;
        debug!(sweep = sweeps, filled = written, "Fill sweep");
    }
    Ok((sweeps, filled))
}

/// Neighbor whose feature first reaches the highest running count around `index`.
fn most_common_neighbor(geometry: &GridGeometry, labels: &[i32], index: usize) -> Option<usize> {
    let mut hits: [(i32, u8); 6] = [(0, 0); 6];
    let mut distinct = 0;
    let mut most = 0;
    let mut choice = None;
    for neighbor in geometry.neighbor_indices(index) {
        let feature = labels[neighbor];
        if feature <= 0 {
            continue;
        }
        let slot = match hits[..distinct].iter().position(|&(f, _)| f == feature) {
            Some(slot) => slot,
            None => {
                hits[distinct] = (feature, 0);
                distinct += 1;
                distinct - 1
            }
        };
        hits[slot].1 += 1;
        if hits[slot].1 > most {
            most = hits[slot].1;
            choice = Some(neighbor);
        }
    }
    choice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbors::count_feature_neighbors;
    use voxel_types::DataArray;

    /// Features 2 and 3 each touch only feature 1.
    const ENCLOSED: [i32; 12] = [1, 1, 1, 3, 1, 2, 1, 3, 1, 1, 1, 3];

    fn setup(dims: [i64; 3], ids: Vec<i32>, features: usize) -> (GridGeometry, FeatureIds, FeatureTable, AttributeMatrix) {
        let grid = GridGeometry::from_dims(dims).unwrap();
        let n = grid.voxel_count();
        let mut cells = AttributeMatrix::new(n);
        cells
            .insert(DataArray::from_scalars("Value", ids.iter().map(|&id| id * 10).collect()))
            .unwrap();
        (grid, FeatureIds::from_vec(ids), FeatureTable::with_features(features), cells)
    }

    #[test]
    fn test_params_validate() {
        assert!(MinNeighborsParams::new(0).validate().is_err());
        assert!(MinNeighborsParams::default().validate().is_ok());
    }

    #[test]
    fn test_all_removed_leaves_field_unchanged() {
        // Three 2-voxel features in a row.
        let (grid, mut ids, mut table, mut cells) = setup([6, 1, 1], vec![1, 1, 2, 2, 3, 3], 3);
        let before = (ids.clone(), table.clone(), cells.clone());
        let counts = count_feature_neighbors(&grid, &ids, table.len()).unwrap();
        let err = prune_min_neighbors(&grid, &mut ids, &mut table, &mut cells, &counts, &MinNeighborsParams::new(100))
            .unwrap_err();
        assert!(err.to_string().contains("all features would be removed"));
        assert_eq!((ids, table, cells), before);
    }

    #[test]
    fn test_removed_feature_filled_and_compacted() {
        let (grid, mut ids, mut table, mut cells) = setup([4, 3, 1], ENCLOSED.to_vec(), 3);
        let counts = count_feature_neighbors(&grid, &ids, table.len()).unwrap();
        assert_eq!(counts, vec![0, 2, 1, 1]);

        let params = MinNeighborsParams::new(2);
        let report = prune_min_neighbors(&grid, &mut ids, &mut table, &mut cells, &counts, &params).unwrap();
        assert_eq!(report.active, vec![false, true, false, false]);
        assert_eq!(report.removed, 2);
        assert_eq!(report.unresolved, 0);
        assert!(ids.as_slice().iter().all(|&id| id == 1));
        assert_eq!(table.len(), 2);
        assert!(cells.get_as::<i32>("Value").unwrap().as_slice().iter().all(|&v| v == 10));
    }

    #[test]
    fn test_phase_filter_exempts_other_phases() {
        let (grid, mut ids, mut table, mut cells) = setup([4, 3, 1], ENCLOSED.to_vec(), 3);
        table.set_phase(1, 1);
        table.set_phase(2, 2);
        table.set_phase(3, 1);
        let counts = count_feature_neighbors(&grid, &ids, table.len()).unwrap();
        let params = MinNeighborsParams::new(2).with_phase_filter(2);
        let report = prune_min_neighbors(&grid, &mut ids, &mut table, &mut cells, &counts, &params).unwrap();
        assert_eq!(report.active, vec![false, true, false, true]);
        assert_eq!(ids.as_slice(), &[1, 1, 1, 2, 1, 1, 1, 2, 1, 1, 1, 2]);
        assert_eq!(report.remap, Some(vec![0, 1, -1, 2]));
    }

    #[test]
    fn test_missing_phase_rejected() {
        let (grid, mut ids, mut table, mut cells) = setup([2, 1, 1], vec![1, 2], 2);
        let counts = vec![0, 1, 1];
        let err = prune_min_neighbors(
            &grid,
            &mut ids,
            &mut table,
            &mut cells,
            &counts,
            &MinNeighborsParams::new(1).with_phase_filter(7),
        );
        assert!(matches!(err, Err(SegmentError::PhaseNotPresent { phase: 7 })));
    }

    #[test]
    fn test_fill_excluded_toggle() {
        // Pre-existing background at both ends; nothing is removed.
        let base = setup([4, 1, 1], vec![-1, 1, 2, -1], 2);
        let counts = vec![0, 1, 1];

        let (grid, mut ids, mut table, mut cells) = base.clone();
        let report =
            prune_min_neighbors(&grid, &mut ids, &mut table, &mut cells, &counts, &MinNeighborsParams::new(1)).unwrap();
        assert_eq!(ids.as_slice(), &[-1, 1, 2, -1]);
        assert_eq!(cells.get_as::<i32>("Value").unwrap().as_slice(), &[-10, 10, 20, -10]);
        assert_eq!(report.sweeps, 0);

        let (grid, mut ids, mut table, mut cells) = base;
        let params = MinNeighborsParams::new(1).with_fill_excluded(true);
        let report = prune_min_neighbors(&grid, &mut ids, &mut table, &mut cells, &counts, &params).unwrap();
        assert_eq!(ids.as_slice(), &[1, 1, 2, 2]);
        assert_eq!(report.filled, 2);
        assert_eq!(report.sweeps, 1);
    }

    #[test]
    fn test_fill_takes_several_sweeps() {
        let (grid, mut ids, mut table, mut cells) = setup([5, 1, 1], vec![1, -1, -1, -1, -1], 1);
        let counts = vec![0, 1];
        let params = MinNeighborsParams::new(1).with_fill_excluded(true);
        let report = prune_min_neighbors(&grid, &mut ids, &mut table, &mut cells, &counts, &params).unwrap();
        assert_eq!(report.sweeps, 4);
        assert_eq!(ids.as_slice(), &[1; 5]);
    }

    #[test]
    fn test_most_common_neighbor_running_count() {
        // Voxel 4 in a 3x3 plane: neighbors -Y=1, -X=3, +X=5, +Y=7.
        let grid = GridGeometry::from_dims([3, 3, 1]).unwrap();
        let labels = [0, 8, 0, 9, -1, 9, 0, 8, 0];
        // Feature 8 leads first, feature 9 overtakes at +X (voxel 5), 8 then only ties.
        assert_eq!(most_common_neighbor(&grid, &labels, 4), Some(5));
        let labels = [0, -1, 0, -1, -1, -1, 0, -1, 0];
        assert_eq!(most_common_neighbor(&grid, &labels, 4), None);
    }
}
