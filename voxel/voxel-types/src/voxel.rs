//! Voxel coordinate and lattice direction types.

use nalgebra::Vector3;

/// A discrete 3D coordinate on the voxel lattice.
///
/// Coordinates are signed 64-bit so that neighbor arithmetic at the faces of a
/// grid (one step below zero) stays representable and can be rejected by a
/// bounds check instead of wrapping.
///
/// # Example
///
/// ```
/// use voxel_types::VoxelCoord;
///
/// let coord = VoxelCoord::new(1, 2, 3);
/// assert_eq!(coord.as_array(), [1, 2, 3]);
/// assert_eq!(coord.step(voxel_types::Direction::NegX), VoxelCoord::new(0, 2, 3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VoxelCoord {
    /// X coordinate (fastest varying in linear order).
    pub x: i64,
    /// Y coordinate.
    pub y: i64,
    /// Z coordinate (slowest varying in linear order).
    pub z: i64,
}

impl VoxelCoord {
    /// Creates a new voxel coordinate.
    #[must_use]
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Creates a coordinate at the origin (0, 0, 0).
    #[must_use]
    pub const fn origin() -> Self {
        Self::new(0, 0, 0)
    }

    /// Returns the coordinate as an array.
    #[must_use]
    pub const fn as_array(self) -> [i64; 3] {
        [self.x, self.y, self.z]
    }

    /// Returns the coordinate one step away in `direction`.
    ///
    /// Uses saturating arithmetic; callers check the result against the grid.
    #[must_use]
    pub const fn step(self, direction: Direction) -> Self {
        let [dx, dy, dz] = direction.delta();
        Self::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.z.saturating_add(dz),
        )
    }

    /// Returns the 6 face-adjacent coordinates in canonical [`Direction`] order.
    ///
    /// # Example
    ///
    /// ```
    /// use voxel_types::VoxelCoord;
    ///
    /// let neighbors = VoxelCoord::new(5, 5, 5).face_neighbors();
    /// assert_eq!(neighbors[0], VoxelCoord::new(5, 5, 4));
    /// assert_eq!(neighbors[5], VoxelCoord::new(5, 5, 6));
    /// ```
    #[must_use]
    pub const fn face_neighbors(self) -> [Self; 6] {
        [
            self.step(Direction::NegZ),
            self.step(Direction::NegY),
            self.step(Direction::NegX),
            self.step(Direction::PosX),
            self.step(Direction::PosY),
            self.step(Direction::PosZ),
        ]
    }

    /// Calculates the Manhattan distance to another coordinate.
    #[must_use]
    pub const fn manhattan_distance(self, other: Self) -> u64 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y) + self.z.abs_diff(other.z)
    }

    /// Converts to a floating-point vector.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.x as f64, self.y as f64, self.z as f64)
    }
}

impl From<(i64, i64, i64)> for VoxelCoord {
    fn from((x, y, z): (i64, i64, i64)) -> Self {
        Self::new(x, y, z)
    }
}

impl From<[i64; 3]> for VoxelCoord {
    fn from([x, y, z]: [i64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl std::fmt::Display for VoxelCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// One of the six face directions of the lattice.
///
/// The declaration order is the canonical neighbor enumeration order used by
/// every algorithm that walks the 6-neighborhood: -Z, -Y, -X, +X, +Y, +Z.
/// Tie-breaks that favor "the first direction" refer to this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// One slice down.
    NegZ,
    /// One row back.
    NegY,
    /// One column left.
    NegX,
    /// One column right.
    PosX,
    /// One row forward.
    PosY,
    /// One slice up.
    PosZ,
}

impl Direction {
    /// All six directions in canonical order.
    pub const ALL: [Self; 6] = [
        Self::NegZ,
        Self::NegY,
        Self::NegX,
        Self::PosX,
        Self::PosY,
        Self::PosZ,
    ];

    /// Position of this direction in [`Direction::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::NegZ => 0,
            Self::NegY => 1,
            Self::NegX => 2,
            Self::PosX => 3,
            Self::PosY => 4,
            Self::PosZ => 5,
        }
    }

    /// Unit lattice displacement for this direction.
    #[must_use]
    pub const fn delta(self) -> [i64; 3] {
        match self {
            Self::NegZ => [0, 0, -1],
            Self::NegY => [0, -1, 0],
            Self::NegX => [-1, 0, 0],
            Self::PosX => [1, 0, 0],
            Self::PosY => [0, 1, 0],
            Self::PosZ => [0, 0, 1],
        }
    }

    /// The direction pointing the other way.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::NegZ => Self::PosZ,
            Self::NegY => Self::PosY,
            Self::NegX => Self::PosX,
            Self::PosX => Self::NegX,
            Self::PosY => Self::NegY,
            Self::PosZ => Self::NegZ,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_array() {
        let coord = VoxelCoord::new(1, -2, 3);
        assert_eq!(coord.as_array(), [1, -2, 3]);
        assert_eq!(VoxelCoord::from((1, -2, 3)), coord);
        assert_eq!(VoxelCoord::from([1, -2, 3]), coord);
    }

    #[test]
    fn test_face_neighbors_canonical_order() {
        let coord = VoxelCoord::new(5, 5, 5);
        let neighbors = coord.face_neighbors();
        for (dir, n) in Direction::ALL.iter().zip(neighbors) {
            assert_eq!(coord.step(*dir), n);
            assert_eq!(coord.manhattan_distance(n), 1);
        }
    }

    #[test]
    fn test_direction_index_matches_all() {
        for (i, dir) in Direction::ALL.iter().enumerate() {
            assert_eq!(dir.index(), i);
        }
    }

    #[test]
    fn test_opposite_cancels() {
        let coord = VoxelCoord::new(3, 4, 5);
        for dir in Direction::ALL {
            assert_eq!(coord.step(dir).step(dir.opposite()), coord);
            assert_eq!(dir.opposite().opposite(), dir);
        }
    }

    #[test]
    fn test_step_saturates() {
        let coord = VoxelCoord::new(i64::MIN, 0, 0);
        assert_eq!(coord.step(Direction::NegX).x, i64::MIN);
    }

    #[test]
    fn test_display() {
        assert_eq!(VoxelCoord::new(1, 2, 3).to_string(), "(1, 2, 3)");
    }
}
