//! Random relabeling of feature ids.
//!
//! Segmentation numbers features in scan order, so neighboring features get
//! neighboring ids and look alike under a color map. Shuffling the ids fixes
//! that without touching the topology.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::info;
use voxel_types::{FeatureIds, FeatureTable};

use crate::error::{SegmentError, SegmentResult};

/// A relabeling of feature ids `1..total` that keeps id 0 fixed.
///
/// # Example
///
/// ```
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
/// use voxel_types::FeatureIds;
/// use voxel_segment::FeaturePermutation;
///
/// let original = FeatureIds::from_vec(vec![-1, 1, 1, 2, 3]);
/// let mut ids = original.clone();
///
/// let permutation = FeaturePermutation::shuffled(4, &mut StdRng::seed_from_u64(7));
/// permutation.apply(&mut ids);
/// permutation.inverse().apply(&mut ids);
/// assert_eq!(ids, original);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeaturePermutation {
    new_id_of: Vec<i32>,
}

impl FeaturePermutation {
    /// The permutation that maps every id to itself.
    #[must_use]
    pub fn identity(total: usize) -> Self {
        Self {
            new_id_of: (0..total).map(to_id).collect(),
        }
    }

    /// A uniformly random permutation of `1..total`, via Fisher-Yates.
    #[must_use]
    pub fn shuffled(total: usize, rng: &mut impl RngCore) -> Self {
        let mut permutation = Self::identity(total);
        let ids = &mut permutation.new_id_of;
        for i in (2..total).rev() {
            // Swap position i with a uniform position in 1..=i.
            let j = 1 + draw_index(rng, i - 1);
            ids.swap(i, j);
        }
        permutation
    }

    /// Wraps an explicit mapping, `mapping[old] == new`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] unless `mapping` is a
    /// permutation of `0..mapping.len()` with `mapping[0] == 0`.
    pub fn from_mapping(mapping: Vec<i32>) -> SegmentResult<Self> {
        let total = mapping.len();
        let mut seen = vec![false; total];
        for &id in &mapping {
            match usize::try_from(id).ok().and_then(|i| seen.get_mut(i)) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(SegmentError::invalid(
                        "mapping",
                        format!("{id} is out of range or repeated"),
                    ));
                }
            }
        }
        if mapping.first().is_some_and(|&first| first != 0) {
            return Err(SegmentError::invalid("mapping", "id 0 must map to itself"));
        }
        Ok(Self { new_id_of: mapping })
    }

    /// Number of ids covered, including the fixed id 0.
    #[must_use]
    pub fn len(&self) -> usize {
        self.new_id_of.len()
    }

    /// Returns `true` if no id is covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new_id_of.is_empty()
    }

    /// The mapping, indexed by old id.
    #[must_use]
    pub fn as_slice(&self) -> &[i32] {
        &self.new_id_of
    }

    /// New id of `old`, or `None` if `old` is not covered.
    #[must_use]
    pub fn new_id(&self, old: i32) -> Option<i32> {
        usize::try_from(old)
            .ok()
            .and_then(|i| self.new_id_of.get(i))
            .copied()
    }

    /// Relabels every voxel. Negative ids and ids beyond the permutation are kept.
    pub fn apply(&self, ids: &mut FeatureIds) {
        ids.remap(&self.new_id_of);
    }

    /// The permutation undoing this one.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let mut new_id_of = vec![0; self.new_id_of.len()];
        for (old, &new) in self.new_id_of.iter().enumerate() {
            if let Some(slot) = usize::try_from(new).ok().and_then(|n| new_id_of.get_mut(n)) {
                *slot = to_id(old);
            }
        }
        Self { new_id_of }
    }

    /// Moves table rows so that row `new_id(old)` holds what row `old` held.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::TupleCountMismatch`] if the table length differs
    /// from the permutation length; the table is unchanged in that case.
    pub fn apply_to_table(&self, table: &mut FeatureTable) -> SegmentResult<()> {
        crate::error::check_tuples("feature_table", self.len(), table.len())?;
        let source_of: Vec<usize> = self
            .inverse()
            .new_id_of
            .iter()
            .map(|&old| usize::try_from(old).unwrap_or(0))
            .collect();
        table.reorder(&source_of);
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
const fn to_id(index: usize) -> i32 {
    index as i32
}

/// Draws a uniform index in `0..=upper` without modulo bias.
///
/// Candidates are masked to the next power of two and redrawn while they
/// exceed `upper`, so fewer than two draws are needed on average.
#[allow(clippy::cast_possible_truncation)]
pub fn draw_index(rng: &mut impl RngCore, upper: usize) -> usize {
    let upper = upper as u64;
    let mask = u64::MAX >> (upper | 1).leading_zeros();
    loop {
        let candidate = rng.next_u64() & mask;
        if candidate <= upper {
            return candidate as usize;
        }
    }
}

/// Shuffles the feature ids `1..total` of `ids` in place.
///
/// `seed` makes the result reproducible; `None` draws a seed from the
/// operating system. The returned permutation can undo the relabeling or
/// reorder a matching [`FeatureTable`].
///
/// # Errors
///
/// Returns [`SegmentError::InvalidParameter`] if `ids` carries an id of
/// `total` or more; `ids` is unchanged in that case.
pub fn randomize_feature_ids(
    ids: &mut FeatureIds,
    total: usize,
    seed: Option<u64>,
) -> SegmentResult<FeaturePermutation> {
    let max_id = usize::try_from(ids.max_id()).unwrap_or(0);
    if max_id >= total.max(1) {
        return Err(SegmentError::invalid(
            "total",
            format!("feature id {max_id} is not below total {total}"),
        ));
    }

    let mut rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
    let permutation = FeaturePermutation::shuffled(total, &mut rng);
    permutation.apply(ids);
    info!(features = total.saturating_sub(1), seeded = seed.is_some(), "Randomized feature ids");
    Ok(permutation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shuffle_keeps_zero_and_is_permutation() {
        let mut rng = StdRng::seed_from_u64(42);
        for total in [0, 1, 2, 3, 10, 257] {
            let p = FeaturePermutation::shuffled(total, &mut rng);
            assert_eq!(p.len(), total);
            if total > 0 {
                assert_eq!(p.new_id(0), Some(0));
            }
            assert!(FeaturePermutation::from_mapping(p.as_slice().to_vec()).is_ok());
        }
    }

    #[test]
    fn test_seed_reproducible() {
        let a = FeaturePermutation::shuffled(50, &mut StdRng::seed_from_u64(3));
        let b = FeaturePermutation::shuffled(50, &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
        assert_ne!(a, FeaturePermutation::identity(50));
    }

    #[test]
    fn test_draw_index_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut seen = [false; 6];
        for _ in 0..500 {
            let i = draw_index(&mut rng, 5);
            assert!(i <= 5);
            seen[i] = true;
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(draw_index(&mut rng, 0), 0);
    }

    #[test]
    fn test_from_mapping_validates() {
        assert!(FeaturePermutation::from_mapping(vec![0, 2, 1]).is_ok());
        assert!(FeaturePermutation::from_mapping(vec![1, 0]).is_err());
        assert!(FeaturePermutation::from_mapping(vec![0, 1, 1]).is_err());
        assert!(FeaturePermutation::from_mapping(vec![0, 3, 1]).is_err());
        assert!(FeaturePermutation::from_mapping(vec![0, -1]).is_err());
    }

    #[test]
    fn test_inverse_round_trip() {
        let p = FeaturePermutation::from_mapping(vec![0, 3, 1, 2]).unwrap();
        let inv = p.inverse();
        assert_eq!(inv.as_slice(), &[0, 2, 3, 1]);
        assert_eq!(inv.inverse(), p);
    }

    #[test]
    fn test_apply_to_table_follows_ids() {
        let p = FeaturePermutation::from_mapping(vec![0, 3, 1, 2]).unwrap();
        let mut table = FeatureTable::with_features(3);
        table.set_phase(1, 10);
        table.set_phase(2, 20);
        table.set_phase(3, 30);
        p.apply_to_table(&mut table).unwrap();
        // Old feature 1 is now feature 3, and so on.
        assert_eq!(table.phases(), &[0, 20, 30, 10]);
        assert!(p.apply_to_table(&mut FeatureTable::new()).is_err());
    }

    #[test]
    fn test_randomize_rejects_short_total() {
        let mut ids = FeatureIds::from_vec(vec![1, 2, 3]);
        assert!(randomize_feature_ids(&mut ids, 3, Some(1)).is_err());
        assert_eq!(ids.as_slice(), &[1, 2, 3]);
        let p = randomize_feature_ids(&mut ids, 4, Some(1)).unwrap();
        let mut sorted = ids.clone().into_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3]);
        assert_eq!(ids.as_slice()[0], p.as_slice()[1]);
    }
}
