//! Pairwise voxel similarity predicates used to grow features.
//!
//! A [`ComparePredicate`] answers one question: may `neighbor` join the
//! feature currently growing through `reference`? The segmentation engine
//! owns the label field and performs the assignment itself after a positive
//! answer, so predicates are read-only and can be shared across threads.
//!
//! The concrete predicate is chosen once per run from the runtime element
//! type of the selected array ([`scalar_predicate`]), never per voxel.

use nalgebra::UnitQuaternion;
use voxel_types::{AttributeArray, DataArray, Element, FeatureTable};

use crate::error::{SegmentError, SegmentResult};
use crate::orientation::{CrystalSymmetry, MisorientationMetric, orientations};

/// Decides whether two adjacent voxels belong to the same feature.
pub trait ComparePredicate: Sync {
    /// Returns `true` if `neighbor` may join `feature`, which currently grows
    /// through `reference`.
    fn matches(&self, reference: usize, neighbor: usize, feature: i32) -> bool;

    /// Called once when `seed` starts a new feature, before growth.
    ///
    /// The table row for `feature` already exists; implementations may record
    /// per-feature properties taken from the seed.
    fn on_seed(&self, _seed: usize, _feature: i32, _table: &mut FeatureTable) {}
}

/// Element types that support a tolerance comparison.
pub trait ScalarTolerance: Element {
    /// Returns `true` if `|a - b| <= tolerance`.
    fn within(a: Self, b: Self, tolerance: Self) -> bool;

    /// Converts a user tolerance into the element type (saturating, truncating).
    fn tolerance_from_f64(tolerance: f64) -> Self;
}

macro_rules! signed_tolerance {
    ($($ty:ty),*) => {
        $(
            impl ScalarTolerance for $ty {
                fn within(a: Self, b: Self, tolerance: Self) -> bool {
                    a.abs_diff(b) <= tolerance.unsigned_abs()
                }

                #[allow(clippy::cast_possible_truncation)]
                fn tolerance_from_f64(tolerance: f64) -> Self {
                    tolerance as Self
                }
            }
        )*
    };
}

macro_rules! unsigned_tolerance {
    ($($ty:ty),*) => {
        $(
            impl ScalarTolerance for $ty {
                fn within(a: Self, b: Self, tolerance: Self) -> bool {
                    a.abs_diff(b) <= tolerance
                }

                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                fn tolerance_from_f64(tolerance: f64) -> Self {
                    tolerance as Self
                }
            }
        )*
    };
}

signed_tolerance!(i8, i16, i32, i64);
unsigned_tolerance!(u8, u16, u32, u64);

impl ScalarTolerance for f32 {
    fn within(a: Self, b: Self, tolerance: Self) -> bool {
        (a - b).abs() <= tolerance
    }

    #[allow(clippy::cast_possible_truncation)]
    fn tolerance_from_f64(tolerance: f64) -> Self {
        tolerance as Self
    }
}

impl ScalarTolerance for f64 {
    fn within(a: Self, b: Self, tolerance: Self) -> bool {
        (a - b).abs() <= tolerance
    }

    fn tolerance_from_f64(tolerance: f64) -> Self {
        tolerance
    }
}

/// Groups voxels whose scalar values differ by at most a tolerance.
///
/// The tolerance is converted to the element type, so integer arrays compare
/// against the truncated tolerance.
///
/// # Example
///
/// ```
/// use voxel_segment::{ComparePredicate, ScalarCompare};
///
/// let values = [0u8, 2, 5];
/// let predicate = ScalarCompare::new(&values, 2.9);
/// assert!(predicate.matches(0, 1, 1));
/// assert!(!predicate.matches(1, 2, 1));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ScalarCompare<'a, T> {
    values: &'a [T],
    tolerance: T,
}

impl<'a, T: ScalarTolerance> ScalarCompare<'a, T> {
    /// Creates a predicate over `values` with the given tolerance.
    #[must_use]
    pub fn new(values: &'a [T], tolerance: f64) -> Self {
        Self {
            values,
            tolerance: T::tolerance_from_f64(tolerance),
        }
    }

    /// Tolerance in the element type.
    #[must_use]
    pub const fn tolerance(&self) -> T {
        self.tolerance
    }
}

impl<T: ScalarTolerance> ComparePredicate for ScalarCompare<'_, T> {
    fn matches(&self, reference: usize, neighbor: usize, _feature: i32) -> bool {
        match (self.values.get(reference), self.values.get(neighbor)) {
            (Some(&a), Some(&b)) => T::within(a, b, self.tolerance),
            _ => false,
        }
    }
}

/// Groups voxels with equal boolean values.
#[derive(Debug, Clone, Copy)]
pub struct BoolCompare<'a> {
    values: &'a [bool],
}

impl<'a> BoolCompare<'a> {
    /// Creates a predicate over `values`.
    #[must_use]
    pub const fn new(values: &'a [bool]) -> Self {
        Self { values }
    }
}

impl ComparePredicate for BoolCompare<'_> {
    fn matches(&self, reference: usize, neighbor: usize, _feature: i32) -> bool {
        match (self.values.get(reference), self.values.get(neighbor)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Builds the scalar predicate matching the runtime element type of `array`.
///
/// # Errors
///
/// - [`SegmentError::ComponentMismatch`] if `array` is not single-component.
/// - [`SegmentError::InvalidParameter`] if `tolerance` is negative or not finite.
///
/// # Example
///
/// ```
/// use voxel_types::{AttributeArray, DataArray};
/// use voxel_segment::{ComparePredicate, scalar_predicate};
///
/// let array = AttributeArray::from(DataArray::from_scalars("Scalar", vec![0i16, 0, 5, 5]));
/// let predicate = scalar_predicate(&array, 0.0).unwrap();
/// assert!(predicate.matches(0, 1, 1));
/// assert!(!predicate.matches(1, 2, 1));
/// ```
pub fn scalar_predicate(
    array: &AttributeArray,
    tolerance: f64,
) -> SegmentResult<Box<dyn ComparePredicate + '_>> {
    fn boxed<T: ScalarTolerance>(a: &DataArray<T>, tol: f64) -> Box<dyn ComparePredicate + '_> {
        Box::new(ScalarCompare::new(a.as_slice(), tol))
    }

    if array.components() != 1 {
        return Err(SegmentError::ComponentMismatch {
            name: array.name().to_string(),
            expected: 1,
            actual: array.components(),
        });
    }
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(SegmentError::invalid(
            "tolerance",
            format!("must be finite and non-negative, got {tolerance}"),
        ));
    }

    Ok(match array {
        AttributeArray::Bool(a) => Box::new(BoolCompare::new(a.as_slice())),
        AttributeArray::Int8(a) => boxed(a, tolerance),
        AttributeArray::UInt8(a) => boxed(a, tolerance),
        AttributeArray::Int16(a) => boxed(a, tolerance),
        AttributeArray::UInt16(a) => boxed(a, tolerance),
        AttributeArray::Int32(a) => boxed(a, tolerance),
        AttributeArray::UInt32(a) => boxed(a, tolerance),
        AttributeArray::Int64(a) => boxed(a, tolerance),
        AttributeArray::UInt64(a) => boxed(a, tolerance),
        AttributeArray::Float(a) => boxed(a, tolerance),
        AttributeArray::Double(a) => boxed(a, tolerance),
    })
}

/// Groups voxels of the same phase whose orientations are closer than a
/// misorientation tolerance.
///
/// Voxels with phase <= 0, an unknown crystal structure or a degenerate
/// quaternion never match. On seeding, the seed's phase is written into the
/// feature table.
pub struct MisorientationCompare<'a> {
    orientations: Vec<Option<UnitQuaternion<f64>>>,
    phases: &'a [i32],
    crystal_structures: &'a [CrystalSymmetry],
    tolerance: f64,
    metric: &'a dyn MisorientationMetric,
}

impl std::fmt::Debug for MisorientationCompare<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MisorientationCompare")
            .field("voxels", &self.orientations.len())
            .field("crystal_structures", &self.crystal_structures)
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

impl<'a> MisorientationCompare<'a> {
    /// Creates a predicate from a 4-component `(x, y, z, w)` quaternion array.
    ///
    /// `crystal_structures` is indexed by phase; `tolerance_degrees` is the
    /// exclusive upper bound on the misorientation of matching voxels.
    ///
    /// # Errors
    ///
    /// - [`SegmentError::ComponentMismatch`] if `quats` is not 4-component.
    /// - [`SegmentError::TupleCountMismatch`] if `phases` does not cover every quaternion.
    /// - [`SegmentError::InvalidParameter`] if the tolerance is negative or not finite.
    pub fn new(
        quats: &DataArray<f32>,
        phases: &'a [i32],
        crystal_structures: &'a [CrystalSymmetry],
        tolerance_degrees: f32,
        metric: &'a dyn MisorientationMetric,
    ) -> SegmentResult<Self> {
        if quats.components() != 4 {
            return Err(SegmentError::ComponentMismatch {
                name: quats.name().to_string(),
                expected: 4,
                actual: quats.components(),
            });
        }
        crate::error::check_tuples("phases", quats.tuple_count(), phases.len())?;
        if !tolerance_degrees.is_finite() || tolerance_degrees < 0.0 {
            return Err(SegmentError::invalid(
                "misorientation_tolerance",
                format!("must be finite and non-negative, got {tolerance_degrees}"),
            ));
        }
        Ok(Self {
            orientations: orientations(quats),
            phases,
            crystal_structures,
            tolerance: f64::from(tolerance_degrees).to_radians(),
            metric,
        })
    }

    /// Tolerance in radians.
    #[must_use]
    pub const fn tolerance(&self) -> f64 {
        self.tolerance
    }

    fn symmetry_of(&self, phase: i32) -> Option<CrystalSymmetry> {
        usize::try_from(phase)
            .ok()
            .filter(|&p| p > 0)
            .and_then(|p| self.crystal_structures.get(p))
            .copied()
            .filter(|s| *s != CrystalSymmetry::Unknown)
    }
}

impl ComparePredicate for MisorientationCompare<'_> {
    fn matches(&self, reference: usize, neighbor: usize, _feature: i32) -> bool {
        let (Some(&phase), Some(&other_phase)) =
            (self.phases.get(reference), self.phases.get(neighbor))
        else {
            return false;
        };
        if phase != other_phase {
            return false;
        }
        let Some(symmetry) = self.symmetry_of(phase) else {
            return false;
        };
        match (
            self.orientations.get(reference).copied().flatten(),
            self.orientations.get(neighbor).copied().flatten(),
        ) {
            (Some(a), Some(b)) => self.metric.misorientation(&a, &b, symmetry) < self.tolerance,
            _ => false,
        }
    }

    fn on_seed(&self, seed: usize, feature: i32, table: &mut FeatureTable) {
        if let (Some(&phase), Ok(row)) = (self.phases.get(seed), usize::try_from(feature)) {
            table.set_phase(row, phase);
        }
    }
}
