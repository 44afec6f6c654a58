//! Staged segmentation pipeline with cancellation and progress.
//!
//! Stages run in a fixed order: optional sample identification on the mask,
//! segmentation, optional neighbor orientation correlation, optional
//! min-neighbors pruning and optional id randomization. Cancellation is
//! checked between stages; a canceled run returns
//! [`SegmentError::Canceled`] and its partial output is dropped.

use tracing::info;
use voxel_types::{AttributeArray, AttributeMatrix, FeatureIds, FeatureTable, GridError, GridGeometry};

use crate::compare::{ComparePredicate, MisorientationCompare, scalar_predicate};
use crate::correlation::{CorrelationReport, NeighborCorrelationParams, neighbor_orientation_correlation};
use crate::error::{SegmentError, SegmentResult, check_tuples};
use crate::neighbors::count_feature_neighbors;
use crate::orientation::{CrystalSymmetry, MisorientationMetric, NoSymmetry};
use crate::progress::{CancelToken, NoProgress, ProgressSink};
use crate::prune::{MinNeighborsParams, PruneReport, prune_min_neighbors};
use crate::randomize::{FeaturePermutation, randomize_feature_ids};
use crate::sample::{SampleReport, identify_sample};
use crate::segment::segment;

/// How voxels are compared during segmentation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompareSpec {
    /// Single-component array of any element type, `|a - b| <= tolerance`.
    Scalar {
        /// Array name.
        array: String,
        /// Absolute tolerance.
        tolerance: f64,
    },
    /// Same phase and misorientation below a tolerance.
    Misorientation {
        /// 4-component `f32` quaternion array, `(x, y, z, w)`.
        quats_array: String,
        /// Single-component `i32` phase array.
        phases_array: String,
        /// Tolerance in degrees (exclusive).
        tolerance_degrees: f32,
    },
}

/// Configuration of a [`SegmentationPipeline`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineConfig {
    /// Predicate used to grow features.
    pub compare: CompareSpec,
    /// Optional `bool` or `u8` array of good voxels.
    pub mask_array: Option<String>,
    /// Keep only the largest connected region of the mask; `Some(true)` also fills enclosed holes.
    pub identify_sample: Option<bool>,
    /// Neighbor orientation correlation after segmentation.
    pub correlation: Option<NeighborCorrelationParams>,
    /// Min-neighbors pruning after correlation.
    pub min_neighbors: Option<MinNeighborsParams>,
    /// Shuffle feature ids at the end.
    pub randomize: bool,
    /// Seed for the shuffle; `None` seeds from the operating system.
    pub random_seed: Option<u64>,
}

impl PipelineConfig {
    /// Segmentation only, with the given predicate.
    #[must_use]
    pub const fn new(compare: CompareSpec) -> Self {
        Self {
            compare,
            mask_array: None,
            identify_sample: None,
            correlation: None,
            min_neighbors: None,
            randomize: false,
            random_seed: None,
        }
    }

    /// Gates seeding and growth by a mask array.
    #[must_use]
    pub fn with_mask(mut self, name: impl Into<String>) -> Self {
        self.mask_array = Some(name.into());
        self
    }

    /// Reduces the mask to its largest connected region first. Requires
    /// [`PipelineConfig::with_mask`].
    #[must_use]
    pub const fn with_identify_sample(mut self, fill_holes: bool) -> Self {
        self.identify_sample = Some(fill_holes);
        self
    }

    /// Enables neighbor orientation correlation.
    #[must_use]
    pub fn with_correlation(mut self, params: NeighborCorrelationParams) -> Self {
        self.correlation = Some(params);
        self
    }

    /// Enables min-neighbors pruning.
    #[must_use]
    pub fn with_min_neighbors(mut self, params: MinNeighborsParams) -> Self {
        self.min_neighbors = Some(params);
        self
    }

    /// Enables id randomization with an optional seed.
    #[must_use]
    pub const fn with_randomize(mut self, seed: Option<u64>) -> Self {
        self.randomize = true;
        self.random_seed = seed;
        self
    }

    /// Validates every stage's parameters.
    ///
    /// # Errors
    ///
    /// Returns the first [`SegmentError::InvalidParameter`] found, including
    /// sample identification requested without a mask.
    pub fn validate(&self) -> SegmentResult<()> {
        if self.identify_sample.is_some() && self.mask_array.is_none() {
            return Err(SegmentError::invalid("identify_sample", "requires a mask array"));
        }
        match &self.compare {
            CompareSpec::Scalar { tolerance, .. } => {
                if !tolerance.is_finite() || *tolerance < 0.0 {
                    return Err(SegmentError::invalid(
                        "tolerance",
                        format!("must be finite and non-negative, got {tolerance}"),
                    ));
                }
            }
            CompareSpec::Misorientation {
                tolerance_degrees, ..
            } => {
                if !tolerance_degrees.is_finite() || *tolerance_degrees < 0.0 {
                    return Err(SegmentError::invalid(
                        "misorientation_tolerance",
                        format!("must be finite and non-negative, got {tolerance_degrees}"),
                    ));
                }
            }
        }
        if let Some(params) = &self.correlation {
            params.validate()?;
        }
        if let Some(params) = &self.min_neighbors {
            params.validate()?;
        }
        Ok(())
    }
}

/// Result of [`SegmentationPipeline::run`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineOutput {
    /// Final per-voxel labels.
    pub feature_ids: FeatureIds,
    /// Final feature table.
    pub table: FeatureTable,
    /// Features grown by segmentation, before pruning.
    pub segmented_features: usize,
    /// Sample identification statistics, if it ran.
    pub sample: Option<SampleReport>,
    /// Correlation statistics, if it ran.
    pub correlation: Option<CorrelationReport>,
    /// Pruning statistics, if it ran.
    pub prune: Option<PruneReport>,
    /// Id shuffle, if it ran.
    pub permutation: Option<FeaturePermutation>,
}

/// Runs segmentation and its cleanup stages over one grid.
///
/// # Example
///
/// ```
/// use voxel_types::{AttributeMatrix, DataArray, GridGeometry};
/// use voxel_segment::{CompareSpec, PipelineConfig, SegmentationPipeline};
///
/// let grid = GridGeometry::from_dims([4, 1, 1]).unwrap();
/// let mut cells = AttributeMatrix::new(4);
/// cells.insert(DataArray::from_scalars("Scalar", vec![0u8, 0, 5, 5])).unwrap();
///
/// let config = PipelineConfig::new(CompareSpec::Scalar { array: "Scalar".into(), tolerance: 0.0 })
///     .with_randomize(Some(11));
/// let output = SegmentationPipeline::new(config).run(&grid, &mut cells).unwrap();
/// assert_eq!(output.table.len(), 3);
/// assert_eq!(output.feature_ids[0], output.feature_ids[1]);
/// assert_ne!(output.feature_ids[1], output.feature_ids[2]);
/// ```
pub struct SegmentationPipeline<'a> {
    config: PipelineConfig,
    metric: &'a dyn MisorientationMetric,
    crystal_structures: Vec<CrystalSymmetry>,
    progress: &'a dyn ProgressSink,
    cancel: CancelToken,
}

impl std::fmt::Debug for SegmentationPipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationPipeline")
            .field("config", &self.config)
            .field("crystal_structures", &self.crystal_structures)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl<'a> SegmentationPipeline<'a> {
    /// Creates a pipeline with the plain rotation-angle metric, no progress
    /// reporting and a fresh cancel token.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            metric: &NoSymmetry,
            crystal_structures: Vec::new(),
            progress: &NoProgress,
            cancel: CancelToken::new(),
        }
    }

    /// Uses a symmetry-aware misorientation metric.
    #[must_use]
    pub fn with_metric(mut self, metric: &'a dyn MisorientationMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Sets the crystal structure of each phase, indexed by phase.
    #[must_use]
    pub fn with_crystal_structures(mut self, structures: Vec<CrystalSymmetry>) -> Self {
        self.crystal_structures = structures;
        self
    }

    /// Reports stage progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Uses an externally held cancel token.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// A handle to this pipeline's cancel token.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs every configured stage over `cells`.
    ///
    /// `cells` is modified in place: sample identification writes the reduced
    /// mask back to the mask array, and the correlation and pruning stages
    /// copy attributes between voxels.
    ///
    /// # Errors
    ///
    /// Configuration errors are returned before anything runs. After that,
    /// any stage error is returned as is, and [`SegmentError::Canceled`] is
    /// returned if the cancel token fires between stages.
    pub fn run(&self, geometry: &GridGeometry, cells: &mut AttributeMatrix) -> SegmentResult<PipelineOutput> {
        self.config.validate()?;
        check_tuples("cells", geometry.voxel_count(), cells.tuple_count())?;
        let mut mask = self
            .config
            .mask_array
            .as_deref()
            .map(|name| read_mask(cells, name))
            .transpose()?;

        info!(
            voxels = geometry.voxel_count(),
            masked = mask.is_some(),
            correlation = self.config.correlation.is_some(),
            min_neighbors = self.config.min_neighbors.is_some(),
            randomize = self.config.randomize,
            "Running segmentation pipeline"
        );
        self.cancel.check("setup")?;

        let sample = match (
            self.config.identify_sample,
            self.config.mask_array.as_deref(),
            mask.as_deref_mut(),
        ) {
            (Some(fill_holes), Some(name), Some(good)) => {
                let report = identify_sample(geometry, good, fill_holes)?;
                write_mask(cells, name, good)?;
                Some(report)
            }
            _ => None,
        };

        let segmentation = {
            let predicate = self.predicate(cells)?;
            segment(geometry, predicate.as_ref(), mask.as_deref(), self.progress)?
        };
        let segmented_features = segmentation.feature_count();
        let mut ids = segmentation.feature_ids;
        let mut table = segmentation.table;
        self.cancel.check("segmentation")?;

        let correlation = match &self.config.correlation {
            Some(params) => {
                let report = neighbor_orientation_correlation(
                    geometry,
                    cells,
                    Some(&mut ids),
                    &self.crystal_structures,
                    self.metric,
                    params,
                )?;
                self.progress.update("neighbor correlation", 100);
                self.cancel.check("neighbor correlation")?;
                Some(report)
            }
            None => None,
        };

        let prune = match &self.config.min_neighbors {
            Some(params) => {
                let counts = count_feature_neighbors(geometry, &ids, table.len())?;
                let report = prune_min_neighbors(geometry, &mut ids, &mut table, cells, &counts, params)?;
                self.progress.update("min neighbors", 100);
                self.cancel.check("pruning")?;
                Some(report)
            }
            None => None,
        };

        let permutation = if self.config.randomize {
            let permutation = randomize_feature_ids(&mut ids, table.len(), self.config.random_seed)?;
            permutation.apply_to_table(&mut table)?;
            Some(permutation)
        } else {
            None
        };

        info!(
            segmented = segmented_features,
            features = table.feature_count(),
            "Segmentation pipeline complete"
        );

        Ok(PipelineOutput {
            feature_ids: ids,
            table,
            segmented_features,
            sample,
            correlation,
            prune,
            permutation,
        })
    }

    fn predicate<'c>(&'c self, cells: &'c AttributeMatrix) -> SegmentResult<Box<dyn ComparePredicate + 'c>> {
        match &self.config.compare {
            CompareSpec::Scalar { array, tolerance } => {
                let array = cells.get(array).ok_or_else(|| GridError::ArrayNotFound {
                    name: array.clone(),
                })?;
                scalar_predicate(array, *tolerance)
            }
            CompareSpec::Misorientation {
                quats_array,
                phases_array,
                tolerance_degrees,
            } => {
                let quats = cells.get_as::<f32>(quats_array)?;
                let phases = cells.get_as::<i32>(phases_array)?;
                if phases.components() != 1 {
                    return Err(SegmentError::ComponentMismatch {
                        name: phases_array.clone(),
                        expected: 1,
                        actual: phases.components(),
                    });
                }
                Ok(Box::new(MisorientationCompare::new(
                    quats,
                    phases.as_slice(),
                    &self.crystal_structures,
                    *tolerance_degrees,
                    self.metric,
                )?))
            }
        }
    }
}

/// Reads a single-component `bool` or `u8` array as a good-voxel mask.
fn read_mask(cells: &AttributeMatrix, name: &str) -> SegmentResult<Vec<bool>> {
    let array = cells.get(name).ok_or_else(|| GridError::ArrayNotFound {
        name: name.to_string(),
    })?;
    if array.components() != 1 {
        return Err(SegmentError::ComponentMismatch {
            name: name.to_string(),
            expected: 1,
            actual: array.components(),
        });
    }
    match array {
        AttributeArray::Bool(a) => Ok(a.as_slice().to_vec()),
        AttributeArray::UInt8(a) => Ok(a.as_slice().iter().map(|&v| v != 0).collect()),
        other => Err(GridError::ElementTypeMismatch {
            name: name.to_string(),
            expected: "bool or u8",
            actual: other.element_type().name(),
        }
        .into()),
    }
}

/// Stores `good` into the mask array read by [`read_mask`], keeping its element type.
fn write_mask(cells: &mut AttributeMatrix, name: &str, good: &[bool]) -> SegmentResult<()> {
    match cells.get_mut(name) {
        Some(AttributeArray::Bool(a)) => a.as_mut_slice().copy_from_slice(good),
        Some(AttributeArray::UInt8(a)) => {
            for (value, &g) in a.as_mut_slice().iter_mut().zip(good) {
                if (*value != 0) != g {
                    *value = u8::from(g);
                }
            }
        }
        _ => {
            return Err(GridError::ArrayNotFound {
                name: name.to_string(),
            }
            .into());
        }
    }
    Ok(())
}
