//! Neighbor orientation correlation: multi-level cleanup of low-confidence voxels.
//!
//! A voxel below the confidence threshold takes over all attributes of the
//! face neighbor that agrees best with the rest of its neighborhood. For
//! every pair of in-bounds neighbors `(j, k)` with the same phase and a
//! misorientation below tolerance, directions `j` and `k` each receive one
//! vote. The first direction with the highest vote wins, provided its vote
//! reaches the threshold of the current level.
//!
//! Levels run from 6 (unanimous neighborhoods only) down to the requested
//! level, each one a full vote sweep followed by a copy sweep.

use nalgebra::UnitQuaternion;
use rayon::prelude::*;
use tracing::{debug, info};
use voxel_types::{AttributeMatrix, FeatureIds, GridGeometry};

use crate::copy::{CopyMode, copy_from_best_neighbors};
use crate::error::{SegmentError, SegmentResult, check_tuples};
use crate::orientation::{CrystalSymmetry, MisorientationMetric, orientations};

/// Highest cleanup level: all six face neighbors.
pub const MAX_LEVEL: u8 = 6;

/// Parameters for [`neighbor_orientation_correlation`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NeighborCorrelationParams {
    /// Name of the single-component `f32` confidence array.
    pub confidence_array: String,
    /// Name of the 4-component `f32` quaternion array, `(x, y, z, w)`.
    pub quats_array: String,
    /// Name of the single-component `i32` phase array.
    pub phases_array: String,
    /// Voxels with confidence strictly below this value are cleaned.
    pub min_confidence: f32,
    /// Misorientation tolerance in degrees (exclusive).
    pub misorientation_tolerance: f32,
    /// Lowest level to run, `1..=6`.
    pub level: u8,
    /// Threading of the vote and copy sweeps.
    pub copy_mode: CopyMode,
}

impl Default for NeighborCorrelationParams {
    fn default() -> Self {
        Self {
            confidence_array: "Confidence Index".to_string(),
            quats_array: "Quats".to_string(),
            phases_array: "Phases".to_string(),
            min_confidence: 0.1,
            misorientation_tolerance: 5.0,
            level: MAX_LEVEL,
            copy_mode: CopyMode::default(),
        }
    }
}

impl NeighborCorrelationParams {
    /// Sets the confidence threshold.
    #[must_use]
    pub const fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Sets the misorientation tolerance in degrees.
    #[must_use]
    pub const fn with_misorientation_tolerance(mut self, degrees: f32) -> Self {
        self.misorientation_tolerance = degrees;
        self
    }

    /// Sets the lowest level to run.
    #[must_use]
    pub const fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    /// Sets the threading mode.
    #[must_use]
    pub const fn with_copy_mode(mut self, copy_mode: CopyMode) -> Self {
        self.copy_mode = copy_mode;
        self
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] for a level outside `1..=6`
    /// or a non-finite threshold or tolerance.
    pub fn validate(&self) -> SegmentResult<()> {
        if !(1..=MAX_LEVEL).contains(&self.level) {
            return Err(SegmentError::invalid(
                "level",
                format!("must be in 1..={MAX_LEVEL}, got {}", self.level),
            ));
        }
        if !self.min_confidence.is_finite() {
            return Err(SegmentError::invalid("min_confidence", "must be finite"));
        }
        if !self.misorientation_tolerance.is_finite() || self.misorientation_tolerance < 0.0 {
            return Err(SegmentError::invalid(
                "misorientation_tolerance",
                format!(
                    "must be finite and non-negative, got {}",
                    self.misorientation_tolerance
                ),
            ));
        }
        Ok(())
    }
}

/// Statistics of one cleanup level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CorrelationPass {
    /// Level of this pass.
    pub level: u8,
    /// Voxels below the confidence threshold at the start of the pass.
    pub low_confidence: usize,
    /// Voxels overwritten from a neighbor.
    pub reassigned: usize,
}

/// Result of [`neighbor_orientation_correlation`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CorrelationReport {
    /// One entry per level, highest level first.
    pub passes: Vec<CorrelationPass>,
}

impl CorrelationReport {
    /// Total voxels overwritten over all passes.
    #[must_use]
    pub fn total_reassigned(&self) -> usize {
        self.passes.iter().map(|p| p.reassigned).sum()
    }
}

struct Neighborhood<'a> {
    geometry: &'a GridGeometry,
    confidence: &'a [f32],
    phases: &'a [i32],
    orientations: Vec<Option<UnitQuaternion<f64>>>,
    crystal_structures: &'a [CrystalSymmetry],
    metric: &'a dyn MisorientationMetric,
    min_confidence: f32,
    tolerance: f64,
}

impl Neighborhood<'_> {
    fn is_low_confidence(&self, index: usize) -> bool {
        self.confidence
            .get(index)
            .is_some_and(|&c| c < self.min_confidence)
    }

    fn similar(&self, a: usize, b: usize) -> bool {
        let (Some(&phase), Some(&other)) = (self.phases.get(a), self.phases.get(b)) else {
            return false;
        };
        if phase != other || phase <= 0 {
            return false;
        }
        let Some(symmetry) = usize::try_from(phase)
            .ok()
            .and_then(|p| self.crystal_structures.get(p))
            .copied()
            .filter(|s| *s != CrystalSymmetry::Unknown)
        else {
            return false;
        };
        match (
            self.orientations.get(a).copied().flatten(),
            self.orientations.get(b).copied().flatten(),
        ) {
            (Some(qa), Some(qb)) => self.metric.misorientation(&qa, &qb, symmetry) < self.tolerance,
            _ => false,
        }
    }

    /// Best neighbor of a low-confidence voxel whose vote reaches `threshold`.
    fn best_neighbor(&self, index: usize, threshold: u32) -> Option<usize> {
        if !self.is_low_confidence(index) {
            return None;
        }
        let neighbors = self.geometry.face_neighbors(index);
        let mut votes = [0u32; 6];
        for j in 0..neighbors.len() {
            let Some(a) = neighbors[j] else { continue };
            for k in j + 1..neighbors.len() {
                let Some(b) = neighbors[k] else { continue };
                if self.similar(a, b) {
                    votes[j] += 1;
                    votes[k] += 1;
                }
            }
        }

        let mut best = 0;
        let mut choice = None;
        for (vote, neighbor) in votes.iter().zip(neighbors) {
            if *vote > best {
                best = *vote;
                choice = neighbor;
            }
        }
        choice.filter(|_| best >= threshold)
    }
}

/// Vote threshold of a level: a direction collects at most five votes.
fn level_threshold(level: u8) -> u32 {
    u32::from(level.saturating_sub(1).max(1))
}

/// Replaces low-confidence voxels by their best-agreeing face neighbor.
///
/// Every array of `cells` is copied, including the confidence, quaternion and
/// phase arrays, so a voxel that received a trusted neighbor's values is no
/// longer low-confidence in the next level. `feature_ids` is copied along when
/// given. `crystal_structures` is indexed by phase.
///
/// # Errors
///
/// Configuration errors are returned before anything is modified:
///
/// - [`SegmentError::InvalidParameter`] from [`NeighborCorrelationParams::validate`].
/// - [`SegmentError::Grid`] if a named array is missing or has the wrong element type.
/// - [`SegmentError::TupleCountMismatch`] if `cells` or `feature_ids` do not cover the grid.
/// - [`SegmentError::ComponentMismatch`] if the quaternion array is not 4-component.
pub fn neighbor_orientation_correlation(
    geometry: &GridGeometry,
    cells: &mut AttributeMatrix,
    mut feature_ids: Option<&mut FeatureIds>,
    crystal_structures: &[CrystalSymmetry],
    metric: &dyn MisorientationMetric,
    params: &NeighborCorrelationParams,
) -> SegmentResult<CorrelationReport> {
    params.validate()?;
    let total = geometry.voxel_count();
    check_tuples("cells", total, cells.tuple_count())?;
    if let Some(ids) = feature_ids.as_deref() {
        check_tuples("feature_ids", total, ids.len())?;
    }
    cells.get_as::<f32>(&params.confidence_array)?;
    cells.get_as::<i32>(&params.phases_array)?;
    let quats = cells.get_as::<f32>(&params.quats_array)?;
    if quats.components() != 4 {
        return Err(SegmentError::ComponentMismatch {
            name: params.quats_array.clone(),
            expected: 4,
            actual: quats.components(),
        });
    }

    info!(
        voxels = total,
        min_confidence = params.min_confidence,
        tolerance = params.misorientation_tolerance,
        level = params.level,
        "Running neighbor orientation correlation"
    );

    let tolerance = f64::from(params.misorientation_tolerance).to_radians();
    let parallel = params.copy_mode.is_parallel();
    let mut report = CorrelationReport::default();

    for level in (params.level..=MAX_LEVEL).rev() {
        let threshold = level_threshold(level);
        let (best, low_confidence) = {
            let hood = Neighborhood {
                geometry,
                confidence: cells.get_as::<f32>(&params.confidence_array)?.as_slice(),
                phases: cells.get_as::<i32>(&params.phases_array)?.as_slice(),
                orientations: orientations(cells.get_as::<f32>(&params.quats_array)?),
                crystal_structures,
                metric,
                min_confidence: params.min_confidence,
                tolerance,
            };
            let best: Vec<Option<usize>> = if parallel {
                (0..total)
                    .into_par_iter()
                    .map(|i| hood.best_neighbor(i, threshold))
                    .collect()
            } else {
                (0..total).map(|i| hood.best_neighbor(i, threshold)).collect()
            };
            let low = (0..total).filter(|&i| hood.is_low_confidence(i)).count();
            (best, low)
        };

        let reassigned =
            copy_from_best_neighbors(cells, feature_ids.as_deref_mut(), &best, params.copy_mode)?;
        debug!(level, threshold, low_confidence, reassigned, "Correlation pass");
        report.passes.push(CorrelationPass {
            level,
            low_confidence,
            reassigned,
        });
    }

    info!(
        reassigned = report.total_reassigned(),
        passes = report.passes.len(),
        "Neighbor orientation correlation complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orientation::NoSymmetry;
    use voxel_types::DataArray;

    const STRUCTURES: [CrystalSymmetry; 2] = [CrystalSymmetry::Unknown, CrystalSymmetry::CubicHigh];

    fn quat_z(degrees: f32) -> [f32; 4] {
        let half = degrees.to_radians() / 2.0;
        [0.0, 0.0, half.sin(), half.cos()]
    }

    fn cells(angles: &[f32], confidence: Vec<f32>, phases: Vec<i32>) -> AttributeMatrix {
        let mut m = AttributeMatrix::new(angles.len());
        let quats: Vec<f32> = angles.iter().flat_map(|&a| quat_z(a)).collect();
        m.insert(DataArray::new("Quats", 4, quats).unwrap()).unwrap();
        m.insert(DataArray::from_scalars("Confidence Index", confidence)).unwrap();
        m.insert(DataArray::from_scalars("Phases", phases)).unwrap();
        m
    }

    /// 3x3x1 plane; the center is a low-confidence outlier.
    fn plane() -> (GridGeometry, AttributeMatrix) {
        let grid = GridGeometry::from_dims([3, 3, 1]).unwrap();
        let mut angles = vec![10.0f32; 9];
        angles[4] = 60.0;
        let mut confidence = vec![0.9f32; 9];
        confidence[4] = 0.01;
        (grid, cells(&angles, confidence, vec![1; 9]))
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(level_threshold(6), 5);
        assert_eq!(level_threshold(4), 3);
        assert_eq!(level_threshold(2), 1);
        assert_eq!(level_threshold(1), 1);
    }

    #[test]
    fn test_params_validate() {
        assert!(NeighborCorrelationParams::default().validate().is_ok());
        assert!(NeighborCorrelationParams::default().with_level(0).validate().is_err());
        assert!(NeighborCorrelationParams::default().with_level(7).validate().is_err());
        assert!(
            NeighborCorrelationParams::default()
                .with_misorientation_tolerance(f32::NAN)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_high_level_requires_more_agreement() {
        // Center has four in-plane neighbors, so each direction gets 3 votes.
        let (grid, mut m) = plane();
        let report = neighbor_orientation_correlation(
            &grid,
            &mut m,
            None,
            &STRUCTURES,
            &NoSymmetry,
            &NeighborCorrelationParams::default(),
        )
        .unwrap();
        assert_eq!(report.total_reassigned(), 0);
        assert_eq!(report.passes.len(), 1);
        assert_eq!(report.passes[0].low_confidence, 1);
    }

    #[test]
    fn test_outlier_takes_first_agreeing_neighbor() {
        let (grid, mut m) = plane();
        let mut ids = FeatureIds::from_vec(vec![1, 1, 1, 1, 2, 1, 1, 1, 1]);
        let params = NeighborCorrelationParams::default().with_level(4);
        let report =
            neighbor_orientation_correlation(&grid, &mut m, Some(&mut ids), &STRUCTURES, &NoSymmetry, &params)
                .unwrap();

        let levels: Vec<u8> = report.passes.iter().map(|p| p.level).collect();
        assert_eq!(levels, vec![6, 5, 4]);
        assert_eq!(report.passes[2].reassigned, 1);
        assert_eq!(ids.as_slice(), &[1; 9]);
        let ci = m.get_as::<f32>("Confidence Index").unwrap();
        assert!((ci.as_slice()[4] - 0.9).abs() < f32::EPSILON);
        let q = m.get_as::<f32>("Quats").unwrap();
        assert_eq!(q.tuple(4), q.tuple(1));
    }

    #[test]
    fn test_dissimilar_neighbors_give_no_votes() {
        let grid = GridGeometry::from_dims([3, 1, 1]).unwrap();
        let mut m = cells(&[0.0, 40.0, 80.0], vec![0.9, 0.0, 0.9], vec![1, 1, 1]);
        let params = NeighborCorrelationParams::default().with_level(1);
        let report =
            neighbor_orientation_correlation(&grid, &mut m, None, &STRUCTURES, &NoSymmetry, &params)
                .unwrap();
        assert_eq!(report.total_reassigned(), 0);
        assert_eq!(report.passes.len(), 6);
    }

    #[test]
    fn test_serial_and_parallel_agree() {
        let grid = GridGeometry::from_dims([4, 4, 2]).unwrap();
        let n = grid.voxel_count();
        let angles: Vec<f32> = (0..n).map(|i| if i % 5 == 0 { 45.0 } else { 2.0 * (i % 2) as f32 }).collect();
        let confidence: Vec<f32> = (0..n).map(|i| if i % 3 == 0 { 0.0 } else { 0.8 }).collect();
        let base = cells(&angles, confidence, vec![1; n]);

        let mut results = Vec::new();
        for mode in [CopyMode::Serial, CopyMode::PerArray, CopyMode::PerVoxelRange] {
            let mut m = base.clone();
            let params = NeighborCorrelationParams::default().with_level(1).with_copy_mode(mode);
            let report =
                neighbor_orientation_correlation(&grid, &mut m, None, &STRUCTURES, &NoSymmetry, &params)
                    .unwrap();
            results.push((m, report));
        }
        assert_eq!(results[0], results[1]);
        assert_eq!(results[0], results[2]);
    }

    #[test]
    fn test_configuration_errors_leave_data_untouched() {
        let (grid, mut m) = plane();
        let before = m.clone();
        let mut params = NeighborCorrelationParams::default();
        params.phases_array = "Missing".to_string();
        assert!(matches!(
            neighbor_orientation_correlation(&grid, &mut m, None, &STRUCTURES, &NoSymmetry, &params),
            Err(SegmentError::Grid(_))
        ));

        let mut ids = FeatureIds::new(3);
        assert!(matches!(
            neighbor_orientation_correlation(
                &grid,
                &mut m,
                Some(&mut ids),
                &STRUCTURES,
                &NoSymmetry,
                &NeighborCorrelationParams::default()
            ),
            Err(SegmentError::TupleCountMismatch { .. })
        ));
        assert_eq!(m, before);
    }
}
