//! Feature id fields and per-feature tables.

use std::ops::{Index, IndexMut};

use rayon::prelude::*;

use crate::array::AttributeArray;
use crate::error::{GridError, GridResult};
use crate::matrix::AttributeMatrix;

/// Per-voxel feature labels.
///
/// Values are [`FeatureIds::EXCLUDED`] (-1, background or "bad" voxels),
/// [`FeatureIds::UNASSIGNED`] (0, only seen while segmentation is growing
/// features) or a feature id `1..N` indexing a [`FeatureTable`] row.
///
/// # Example
///
/// ```
/// use voxel_types::FeatureIds;
///
/// let ids = FeatureIds::from_vec(vec![1, 1, 2, -1]);
/// assert_eq!(ids.max_id(), 2);
/// assert_eq!(ids.count_of(1), 2);
/// assert_eq!(ids[3], FeatureIds::EXCLUDED);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureIds(Vec<i32>);

impl FeatureIds {
    /// Label of voxels outside every feature.
    pub const EXCLUDED: i32 = -1;
    /// Label of voxels not yet grouped.
    pub const UNASSIGNED: i32 = 0;

    /// Creates a field of `voxel_count` unassigned voxels.
    #[must_use]
    pub fn new(voxel_count: usize) -> Self {
        Self(vec![Self::UNASSIGNED; voxel_count])
    }

    /// Wraps existing labels.
    #[must_use]
    pub const fn from_vec(ids: Vec<i32>) -> Self {
        Self(ids)
    }

    /// Returns the number of voxels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the field covers no voxels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the labels.
    #[must_use]
    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }

    /// Returns the labels mutably.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [i32] {
        &mut self.0
    }

    /// Consumes the field and returns the labels.
    #[must_use]
    pub fn into_vec(self) -> Vec<i32> {
        self.0
    }

    /// Largest label present, or 0 if no voxel carries a feature id.
    #[must_use]
    pub fn max_id(&self) -> i32 {
        self.0.iter().copied().max().unwrap_or(0).max(0)
    }

    /// Number of voxels carrying `id`.
    #[must_use]
    pub fn count_of(&self, id: i32) -> usize {
        self.0.iter().filter(|&&v| v == id).count()
    }

    /// Voxel counts per feature id, indexed `0..table_len`.
    ///
    /// Labels outside `1..table_len` are not counted.
    #[must_use]
    pub fn histogram(&self, table_len: usize) -> Vec<usize> {
        let mut counts = vec![0usize; table_len];
        for &id in &self.0 {
            if let Some(slot) = usize::try_from(id)
                .ok()
                .filter(|&i| i > 0)
                .and_then(|i| counts.get_mut(i))
            {
                *slot += 1;
            }
        }
        counts
    }

    /// For every voxel `i` with `sources[i] == Some(j)`, copies the label of `j` to `i`.
    ///
    /// Reads see the labels from before the call; see
    /// [`DataArray::copy_tuples_from`](crate::DataArray::copy_tuples_from).
    pub fn copy_from_sources(&mut self, sources: &[Option<usize>], parallel: bool) {
        let snapshot = self.0.clone();
        let apply = |id: &mut i32, source: &Option<usize>| {
            if let Some(&value) = source.and_then(|src| snapshot.get(src)) {
                *id = value;
            }
        };
        if parallel {
            self.0
                .par_iter_mut()
                .zip(sources.par_iter())
                .for_each(|(id, source)| apply(id, source));
        } else {
            self.0
                .iter_mut()
                .zip(sources)
                .for_each(|(id, source)| apply(id, source));
        }
    }

    /// Relabels every positive id through `remap` (`new = remap[old]`).
    ///
    /// Ids without a remap entry, zero and negative ids are left unchanged.
    pub fn remap(&mut self, remap: &[i32]) {
        for id in &mut self.0 {
            if let Some(&new_id) = usize::try_from(*id)
                .ok()
                .filter(|&i| i > 0)
                .and_then(|i| remap.get(i))
            {
                *id = new_id;
            }
        }
    }
}

impl Index<usize> for FeatureIds {
    type Output = i32;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl IndexMut<usize> for FeatureIds {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl From<Vec<i32>> for FeatureIds {
    fn from(ids: Vec<i32>) -> Self {
        Self(ids)
    }
}

/// Per-feature records indexed by feature id.
///
/// Row 0 is reserved and never describes a real feature. Segmentation appends
/// one row per discovered feature, keeping `len() == 1 + max assigned id`.
/// Every row carries an `active` flag and a phase; callers may attach further
/// per-feature columns, which grow and shrink with the table.
///
/// # Example
///
/// ```
/// use voxel_types::FeatureTable;
///
/// let mut table = FeatureTable::new();
/// assert_eq!(table.len(), 1);
///
/// let a = table.push_feature().unwrap();
/// let b = table.push_feature().unwrap();
/// assert_eq!((a, b), (1, 2));
/// assert_eq!(table.feature_count(), 2);
///
/// // Drop feature 1; feature 2 becomes feature 1.
/// let remap = table.compact(&[true, false, true]).unwrap();
/// assert_eq!(remap, vec![0, -1, 1]);
/// assert_eq!(table.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureTable {
    active: Vec<bool>,
    phases: Vec<i32>,
    columns: AttributeMatrix,
}

impl Default for FeatureTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Id of the row appended to a table of `rows` rows.
fn next_feature_id(rows: usize) -> GridResult<i32> {
    i32::try_from(rows).map_err(|_| GridError::FeatureIdOverflow { rows })
}

impl FeatureTable {
    /// Creates a table holding only the reserved row 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: vec![false],
            phases: vec![0],
            columns: AttributeMatrix::new(1),
        }
    }

    /// Creates a table with `features` active rows after the reserved row.
    ///
    /// Ids are only handed out by [`FeatureTable::push_feature`], so rows
    /// beyond the `i32` range are unreachable by voxel labels.
    #[must_use]
    pub fn with_features(features: usize) -> Self {
        let rows = features + 1;
        let mut active = vec![true; rows];
        active[0] = false;
        Self {
            active,
            phases: vec![0; rows],
            columns: AttributeMatrix::new(rows),
        }
    }

    /// Number of rows including the reserved row 0.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Always `false`; the reserved row is always present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of feature rows, excluding the reserved row.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.len().saturating_sub(1)
    }

    /// Appends an active row and returns its feature id.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::FeatureIdOverflow`] once the next id would not
    /// fit in an `i32`; the table is unchanged in that case.
    pub fn push_feature(&mut self) -> GridResult<i32> {
        let id = next_feature_id(self.active.len())?;
        self.active.push(true);
        self.phases.push(0);
        self.columns.resize_tuples(self.active.len());
        Ok(id)
    }

    /// Active flags, indexed by feature id.
    #[must_use]
    pub fn active(&self) -> &[bool] {
        &self.active
    }

    /// Returns whether `id` names an active feature; row 0 never does.
    #[must_use]
    pub fn is_active(&self, id: i32) -> bool {
        usize::try_from(id)
            .ok()
            .filter(|&i| i > 0)
            .and_then(|i| self.active.get(i))
            .copied()
            .unwrap_or(false)
    }

    /// Replaces the active flags; row 0 is forced inactive.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::MaskLengthMismatch`] if `active` has a different length.
    pub fn set_active(&mut self, active: &[bool]) -> GridResult<()> {
        if active.len() != self.active.len() {
            return Err(GridError::MaskLengthMismatch {
                expected: self.active.len(),
                actual: active.len(),
            });
        }
        self.active.copy_from_slice(active);
        self.active[0] = false;
        Ok(())
    }

    /// Phases, indexed by feature id.
    #[must_use]
    pub fn phases(&self) -> &[i32] {
        &self.phases
    }

    /// Phase of one feature.
    #[must_use]
    pub fn phase(&self, id: usize) -> Option<i32> {
        self.phases.get(id).copied()
    }

    /// Sets the phase of one feature; returns `false` if `id` is out of range.
    pub fn set_phase(&mut self, id: usize, phase: i32) -> bool {
        match self.phases.get_mut(id) {
            Some(slot) if id > 0 => {
                *slot = phase;
                true
            }
            _ => false,
        }
    }

    /// Caller-supplied per-feature columns.
    #[must_use]
    pub const fn columns(&self) -> &AttributeMatrix {
        &self.columns
    }

    /// Caller-supplied per-feature columns, mutably.
    pub fn columns_mut(&mut self) -> &mut AttributeMatrix {
        &mut self.columns
    }

    /// Attaches a per-feature column with one tuple per row.
    ///
    /// # Errors
    ///
    /// Fails like [`AttributeMatrix::insert`].
    pub fn add_column(&mut self, column: impl Into<AttributeArray>) -> GridResult<()> {
        self.columns.insert(column)
    }

    /// Removes rows whose `keep` entry is `false` and returns the id remap.
    ///
    /// `remap[old_id]` is the new id of a kept row and
    /// [`FeatureIds::EXCLUDED`] for a removed one. Row 0 is always kept.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::MaskLengthMismatch`] if `keep` has a different length;
    /// the table is unchanged in that case.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn compact(&mut self, keep: &[bool]) -> GridResult<Vec<i32>> {
        if keep.len() != self.len() {
            return Err(GridError::MaskLengthMismatch {
                expected: self.len(),
                actual: keep.len(),
            });
        }
        let mut keep = keep.to_vec();
        keep[0] = true;

        let mut remap = Vec::with_capacity(keep.len());
        let mut next = 0i32;
        for &kept in &keep {
            if kept {
                remap.push(next);
                next += 1;
            } else {
                remap.push(FeatureIds::EXCLUDED);
            }
        }

        self.columns.remove_tuples(&keep)?;
        self.active = retain_by(&self.active, &keep);
        self.phases = retain_by(&self.phases, &keep);
        Ok(remap)
    }

    /// Reorders rows so that new row `i` is old row `source_of[i]`.
    ///
    /// `source_of` must be a permutation of `0..len()`; the caller keeps
    /// `source_of[0] == 0`.
    pub fn reorder(&mut self, source_of: &[usize]) {
        self.active = source_of
            .iter()
            .map(|&src| self.active.get(src).copied().unwrap_or(false))
            .collect();
        self.phases = source_of
            .iter()
            .map(|&src| self.phases.get(src).copied().unwrap_or(0))
            .collect();
        self.columns.reorder_tuples(source_of);
    }
}

fn retain_by<T: Copy>(values: &[T], keep: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(keep)
        .filter_map(|(&v, &k)| k.then_some(v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::DataArray;

    #[test]
    fn test_feature_ids_basics() {
        let ids = FeatureIds::new(4);
        assert_eq!(ids.len(), 4);
        assert_eq!(ids.max_id(), 0);
        let ids = FeatureIds::from_vec(vec![-1, -1]);
        assert_eq!(ids.max_id(), 0);
    }

    #[test]
    fn test_histogram_ignores_background() {
        let ids = FeatureIds::from_vec(vec![1, 2, 2, -1, 0, 7]);
        assert_eq!(ids.histogram(3), vec![0, 1, 2]);
    }

    #[test]
    fn test_copy_from_sources_snapshot() {
        let mut ids = FeatureIds::from_vec(vec![-1, -1, 3]);
        ids.copy_from_sources(&[Some(1), Some(2), None], true);
        assert_eq!(ids.as_slice(), &[-1, 3, 3]);
    }

    #[test]
    fn test_remap_skips_background() {
        let mut ids = FeatureIds::from_vec(vec![-1, 0, 1, 2, 5]);
        ids.remap(&[0, 2, 1]);
        assert_eq!(ids.as_slice(), &[-1, 0, 2, 1, 5]);
    }

    #[test]
    fn test_table_push_and_flags() {
        let mut table = FeatureTable::new();
        assert!(!table.is_empty());
        assert_eq!(table.feature_count(), 0);
        assert_eq!(table.push_feature().unwrap(), 1);
        assert!(table.is_active(1));
        assert!(!table.is_active(0));
        assert!(!table.is_active(-1));
        assert!(!table.is_active(5));
        assert!(table.set_phase(1, 3));
        assert!(!table.set_phase(0, 3));
        assert_eq!(table.phase(1), Some(3));
    }

    #[test]
    fn test_next_feature_id_stops_at_i32_range() {
        let last = usize::try_from(i32::MAX).unwrap();
        assert_eq!(next_feature_id(last).unwrap(), i32::MAX);
        assert!(matches!(
            next_feature_id(last + 1),
            Err(GridError::FeatureIdOverflow { rows }) if rows == last + 1
        ));
    }

    #[test]
    fn test_with_features_matches_pushes() {
        let mut pushed = FeatureTable::new();
        for _ in 0..3 {
            pushed.push_feature().unwrap();
        }
        assert_eq!(FeatureTable::with_features(3), pushed);
        assert_eq!(FeatureTable::with_features(0), FeatureTable::new());
    }

    #[test]
    fn test_set_active_forces_reserved_row() {
        let mut table = FeatureTable::with_features(2);
        table.set_active(&[true, false, true]).unwrap();
        assert_eq!(table.active(), &[false, false, true]);
        assert!(table.set_active(&[true]).is_err());
    }

    #[test]
    fn test_columns_track_rows() {
        let mut table = FeatureTable::new();
        table
            .add_column(DataArray::from_scalars("NumCells", vec![0u32]))
            .unwrap();
        table.push_feature().unwrap();
        table.push_feature().unwrap();
        assert_eq!(table.columns().tuple_count(), 3);

        let counts = table.columns_mut().get_mut("NumCells").unwrap();
        counts.as_typed_mut::<u32>().unwrap().as_mut_slice()[2] = 7;
        assert_eq!(table.columns().get_as::<u32>("NumCells").unwrap().as_slice(), &[0, 0, 7]);

        let remap = table.compact(&[false, true, false]).unwrap();
        assert_eq!(remap, vec![0, 1, -1]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns().tuple_count(), 2);
    }

    #[test]
    fn test_reorder_rows() {
        let mut table = FeatureTable::with_features(2);
        table.set_phase(1, 10);
        table.set_phase(2, 20);
        table.reorder(&[0, 2, 1]);
        assert_eq!(table.phases(), &[0, 20, 10]);
    }
}
