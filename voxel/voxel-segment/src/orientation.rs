//! Orientation capability consumed by the misorientation-based algorithms.
//!
//! Crystallographic symmetry math is an external concern: algorithms in this
//! crate only need "given two orientations and a crystal symmetry class, the
//! misorientation angle in radians", expressed by [`MisorientationMetric`].
//! [`NoSymmetry`] is the plain rotation angle and is exact for triclinic
//! crystals.

use nalgebra::{Quaternion, UnitQuaternion};
use voxel_types::DataArray;

/// Laue class of a phase, numbered as in common EBSD data files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum CrystalSymmetry {
    /// Hexagonal 6/mmm.
    HexagonalHigh = 0,
    /// Cubic m-3m.
    CubicHigh = 1,
    /// Hexagonal 6/m.
    HexagonalLow = 2,
    /// Cubic m-3.
    CubicLow = 3,
    /// Triclinic -1.
    Triclinic = 4,
    /// Monoclinic 2/m.
    Monoclinic = 5,
    /// Orthorhombic mmm.
    Orthorhombic = 6,
    /// Tetragonal 4/m.
    TetragonalLow = 7,
    /// Tetragonal 4/mmm.
    TetragonalHigh = 8,
    /// Trigonal -3.
    TrigonalLow = 9,
    /// Trigonal -3m.
    TrigonalHigh = 10,
    /// Unknown or unindexed phase.
    #[default]
    Unknown = 999,
}

impl CrystalSymmetry {
    /// Converts the numeric Laue class code, mapping unknown codes to [`CrystalSymmetry::Unknown`].
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            0 => Self::HexagonalHigh,
            1 => Self::CubicHigh,
            2 => Self::HexagonalLow,
            3 => Self::CubicLow,
            4 => Self::Triclinic,
            5 => Self::Monoclinic,
            6 => Self::Orthorhombic,
            7 => Self::TetragonalLow,
            8 => Self::TetragonalHigh,
            9 => Self::TrigonalLow,
            10 => Self::TrigonalHigh,
            _ => Self::Unknown,
        }
    }

    /// Numeric Laue class code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// Symmetry-aware angular distance between two orientations.
pub trait MisorientationMetric: Sync {
    /// Misorientation between `a` and `b` in radians for crystals of `symmetry`.
    fn misorientation(
        &self,
        a: &UnitQuaternion<f64>,
        b: &UnitQuaternion<f64>,
        symmetry: CrystalSymmetry,
    ) -> f64;
}

/// Rotation angle between two orientations, ignoring crystal symmetry.
///
/// # Example
///
/// ```
/// use nalgebra::{UnitQuaternion, Vector3};
/// use voxel_segment::{CrystalSymmetry, MisorientationMetric, NoSymmetry};
/// use approx::assert_relative_eq;
///
/// let a = UnitQuaternion::identity();
/// let b = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.25);
/// let angle = NoSymmetry.misorientation(&a, &b, CrystalSymmetry::Triclinic);
/// assert_relative_eq!(angle, 0.25, epsilon = 1e-12);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymmetry;

impl MisorientationMetric for NoSymmetry {
    fn misorientation(
        &self,
        a: &UnitQuaternion<f64>,
        b: &UnitQuaternion<f64>,
        _symmetry: CrystalSymmetry,
    ) -> f64 {
        a.angle_to(b)
    }
}

/// Builds a unit quaternion from an `(x, y, z, w)` tuple.
///
/// Returns `None` for short tuples, non-finite values or a zero-norm quaternion.
#[must_use]
pub fn quaternion_from_tuple(tuple: &[f32]) -> Option<UnitQuaternion<f64>> {
    let &[x, y, z, w] = tuple.get(..4)? else {
        return None;
    };
    let q = Quaternion::new(f64::from(w), f64::from(x), f64::from(y), f64::from(z));
    let norm = q.norm();
    if !norm.is_finite() || norm <= f64::EPSILON {
        return None;
    }
    Some(UnitQuaternion::from_quaternion(q))
}

/// Converts every tuple of a 4-component quaternion array.
pub(crate) fn orientations(quats: &DataArray<f32>) -> Vec<Option<UnitQuaternion<f64>>> {
    quats
        .as_slice()
        .chunks_exact(4)
        .map(quaternion_from_tuple)
        .collect()
}
