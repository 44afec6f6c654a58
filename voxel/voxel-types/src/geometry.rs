//! Dense voxel lattice geometry.

use nalgebra::{Point3, Vector3};

use crate::error::{GridError, GridResult};
use crate::voxel::{Direction, VoxelCoord};

/// Geometry of a dense, regular 3D voxel lattice.
///
/// A grid is described by its integer extent along each axis, the world-space
/// size of one voxel along each axis and the world-space position of the
/// minimum corner of voxel (0, 0, 0). Voxels are addressed by a linear index
/// in X-fastest order: `index = x + nx * (y + ny * z)`.
///
/// Per-voxel attributes live in separate arrays (see
/// [`AttributeMatrix`](crate::AttributeMatrix)) whose tuple count must equal
/// [`GridGeometry::voxel_count`].
///
/// # Example
///
/// ```
/// use voxel_types::{GridGeometry, VoxelCoord};
/// use nalgebra::{Point3, Vector3};
///
/// let grid = GridGeometry::try_new(
///     [4, 3, 2],
///     Vector3::new(0.5, 0.5, 1.0),
///     Point3::origin(),
/// ).unwrap();
///
/// assert_eq!(grid.voxel_count(), 24);
/// assert_eq!(grid.index_of(VoxelCoord::new(1, 2, 1)), Some(21));
/// assert_eq!(grid.coord_of(21), VoxelCoord::new(1, 2, 1));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridGeometry {
    dims: [i64; 3],
    extent: [usize; 3],
    spacing: Vector3<f64>,
    origin: Point3<f64>,
    voxel_count: usize,
}

impl GridGeometry {
    /// Creates a grid geometry, validating dimensions and spacing.
    ///
    /// # Errors
    ///
    /// - [`GridError::InvalidDimensions`] if any extent is not positive.
    /// - [`GridError::InvalidSpacing`] if any spacing is not positive and finite.
    /// - [`GridError::IntegerOverflow`] if the voxel count does not fit in `usize`.
    pub fn try_new(
        dims: [i64; 3],
        spacing: Vector3<f64>,
        origin: Point3<f64>,
    ) -> GridResult<Self> {
        let [nx, ny, nz] = dims;
        if nx <= 0 || ny <= 0 || nz <= 0 {
            return Err(GridError::InvalidDimensions { nx, ny, nz });
        }
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(GridError::InvalidSpacing {
                sx: spacing.x,
                sy: spacing.y,
                sz: spacing.z,
            });
        }

        let to_usize = |v: i64| usize::try_from(v).map_err(|_| GridError::IntegerOverflow);
        let extent = [to_usize(nx)?, to_usize(ny)?, to_usize(nz)?];
        let voxel_count = extent[0]
            .checked_mul(extent[1])
            .and_then(|v| v.checked_mul(extent[2]))
            .ok_or(GridError::IntegerOverflow)?;
        // Linear indices must stay representable as i64 for signed stride math.
        i64::try_from(voxel_count).map_err(|_| GridError::IntegerOverflow)?;

        Ok(Self {
            dims,
            extent,
            spacing,
            origin,
            voxel_count,
        })
    }

    /// Creates a grid with unit spacing and its origin at zero.
    ///
    /// # Errors
    ///
    /// Same as [`GridGeometry::try_new`].
    ///
    /// # Example
    ///
    /// ```
    /// use voxel_types::GridGeometry;
    ///
    /// let grid = GridGeometry::from_dims([3, 3, 1]).unwrap();
    /// assert_eq!(grid.voxel_count(), 9);
    /// assert!(GridGeometry::from_dims([0, 3, 1]).is_err());
    /// ```
    pub fn from_dims(dims: [i64; 3]) -> GridResult<Self> {
        Self::try_new(dims, Vector3::new(1.0, 1.0, 1.0), Point3::origin())
    }

    /// Returns the grid extent (nx, ny, nz).
    #[must_use]
    pub const fn dims(&self) -> [i64; 3] {
        self.dims
    }

    /// Returns the voxel spacing along each axis.
    #[must_use]
    pub const fn spacing(&self) -> &Vector3<f64> {
        &self.spacing
    }

    /// Returns the world position of the minimum corner of voxel (0, 0, 0).
    #[must_use]
    pub const fn origin(&self) -> &Point3<f64> {
        &self.origin
    }

    /// Returns `nx * ny * nz`.
    #[must_use]
    pub const fn voxel_count(&self) -> usize {
        self.voxel_count
    }

    /// Checks if a coordinate lies inside the grid.
    #[must_use]
    pub const fn contains(&self, coord: VoxelCoord) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && coord.z >= 0
            && coord.x < self.dims[0]
            && coord.y < self.dims[1]
            && coord.z < self.dims[2]
    }

    /// Converts a coordinate to its linear index, or `None` if outside the grid.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn index_of(&self, coord: VoxelCoord) -> Option<usize> {
        if !self.contains(coord) {
            return None;
        }
        // In-bounds coordinates are non-negative and below the usize extent.
        let (x, y, z) = (coord.x as usize, coord.y as usize, coord.z as usize);
        Some(x + self.extent[0] * (y + self.extent[1] * z))
    }

    /// Converts a linear index to its coordinate.
    ///
    /// Indices past the end of the grid map to coordinates outside it.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn coord_of(&self, index: usize) -> VoxelCoord {
        let (x, y, z) = self.split(index);
        VoxelCoord::new(x as i64, y as i64, z as i64)
    }

    const fn split(&self, index: usize) -> (usize, usize, usize) {
        let plane = self.extent[0] * self.extent[1];
        let z = index / plane;
        let rem = index % plane;
        (rem % self.extent[0], rem / self.extent[0], z)
    }

    /// Returns the neighbor of `index` one step in `direction`.
    ///
    /// Returns `None` when the step would leave the grid through one of its
    /// faces; linear indices never wrap from one row or slice to the next.
    ///
    /// # Example
    ///
    /// ```
    /// use voxel_types::{Direction, GridGeometry};
    ///
    /// let grid = GridGeometry::from_dims([4, 1, 1]).unwrap();
    /// assert_eq!(grid.neighbor(0, Direction::NegX), None);
    /// assert_eq!(grid.neighbor(0, Direction::PosX), Some(1));
    /// assert_eq!(grid.neighbor(3, Direction::PosX), None);
    /// assert_eq!(grid.neighbor(1, Direction::PosY), None);
    /// ```
    #[must_use]
    pub fn neighbor(&self, index: usize, direction: Direction) -> Option<usize> {
        if index >= self.voxel_count {
            return None;
        }
        let (x, y, z) = self.split(index);
        self.step(index, (x, y, z), direction)
    }

    /// Returns all six face neighbors of `index` in canonical [`Direction`] order.
    ///
    /// Entries are `None` at the faces of the grid.
    #[must_use]
    pub fn face_neighbors(&self, index: usize) -> [Option<usize>; 6] {
        if index >= self.voxel_count {
            return [None; 6];
        }
        let xyz = self.split(index);
        Direction::ALL.map(|dir| self.step(index, xyz, dir))
    }

    /// Iterates the in-bounds face neighbors of `index` in canonical order.
    pub fn neighbor_indices(&self, index: usize) -> impl Iterator<Item = usize> + use<> {
        self.face_neighbors(index).into_iter().flatten()
    }

    fn step(&self, index: usize, (x, y, z): (usize, usize, usize), dir: Direction) -> Option<usize> {
        let [nx, ny, nz] = self.extent;
        let plane = nx * ny;
        match dir {
            Direction::NegZ => (z > 0).then(|| index - plane),
            Direction::NegY => (y > 0).then(|| index - nx),
            Direction::NegX => (x > 0).then(|| index - 1),
            Direction::PosX => (x + 1 < nx).then(|| index + 1),
            Direction::PosY => (y + 1 < ny).then(|| index + nx),
            Direction::PosZ => (z + 1 < nz).then(|| index + plane),
        }
    }

    /// Checks if the voxel touches one of the six faces of the grid.
    #[must_use]
    pub fn is_boundary(&self, index: usize) -> bool {
        self.face_neighbors(index).iter().any(Option::is_none)
    }

    /// Returns the world-space center of a voxel.
    ///
    /// # Example
    ///
    /// ```
    /// use voxel_types::{GridGeometry, VoxelCoord};
    /// use nalgebra::{Point3, Vector3};
    /// use approx::assert_relative_eq;
    ///
    /// let grid = GridGeometry::try_new(
    ///     [2, 2, 2],
    ///     Vector3::new(0.1, 0.2, 0.5),
    ///     Point3::new(1.0, 0.0, 0.0),
    /// ).unwrap();
    /// let center = grid.voxel_center(VoxelCoord::new(1, 0, 1));
    /// assert_relative_eq!(center.x, 1.15, epsilon = 1e-12);
    /// assert_relative_eq!(center.y, 0.1, epsilon = 1e-12);
    /// assert_relative_eq!(center.z, 0.75, epsilon = 1e-12);
    /// ```
    #[must_use]
    pub fn voxel_center(&self, coord: VoxelCoord) -> Point3<f64> {
        let offset = (coord.to_vector() + Vector3::repeat(0.5)).component_mul(&self.spacing);
        self.origin + offset
    }

    /// Volume of a single voxel in world units.
    #[must_use]
    pub fn voxel_volume(&self) -> f64 {
        self.spacing.x * self.spacing.y * self.spacing.z
    }

    /// Returns the signed linear-index strides for this grid.
    #[must_use]
    pub const fn offsets(&self) -> NeighborOffsets {
        NeighborOffsets::new(self.dims)
    }
}

/// Signed linear-index displacements of the six face neighbors.
///
/// Derived purely from the grid dims; it does not know about faces, so it is
/// only valid together with a bounds check such as [`GridGeometry::neighbor`].
///
/// # Example
///
/// ```
/// use voxel_types::{Direction, NeighborOffsets};
///
/// let offsets = NeighborOffsets::new([4, 3, 2]);
/// assert_eq!(offsets.offset(Direction::NegZ), -12);
/// assert_eq!(offsets.offset(Direction::PosY), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborOffsets {
    strides: [i64; 6],
}

impl NeighborOffsets {
    /// Builds the offsets for a grid with the given dims.
    #[must_use]
    pub const fn new(dims: [i64; 3]) -> Self {
        let plane = dims[0].saturating_mul(dims[1]);
        let row = dims[0];
        Self {
            strides: [-plane, -row, -1, 1, row, plane],
        }
    }

    /// Linear-index displacement for one direction.
    #[must_use]
    pub const fn offset(&self, direction: Direction) -> i64 {
        self.strides[direction.index()]
    }

    /// All six displacements in canonical order.
    #[must_use]
    pub const fn as_array(&self) -> [i64; 6] {
        self.strides
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(dims: [i64; 3]) -> GridGeometry {
        GridGeometry::from_dims(dims).unwrap()
    }

    #[test]
    fn test_try_new_rejects_bad_dims() {
        assert!(matches!(
            GridGeometry::from_dims([0, 1, 1]),
            Err(GridError::InvalidDimensions { nx: 0, .. })
        ));
        assert!(matches!(
            GridGeometry::from_dims([1, -1, 1]),
            Err(GridError::InvalidDimensions { ny: -1, .. })
        ));
    }

    #[test]
    fn test_try_new_rejects_bad_spacing() {
        let result =
            GridGeometry::try_new([1, 1, 1], Vector3::new(1.0, 0.0, 1.0), Point3::origin());
        assert!(matches!(result, Err(GridError::InvalidSpacing { .. })));

        let result =
            GridGeometry::try_new([1, 1, 1], Vector3::new(1.0, f64::NAN, 1.0), Point3::origin());
        assert!(matches!(result, Err(GridError::InvalidSpacing { .. })));
    }

    #[test]
    fn test_try_new_overflow() {
        let result = GridGeometry::from_dims([i64::MAX, i64::MAX, 2]);
        assert!(matches!(result, Err(GridError::IntegerOverflow)));
    }

    #[test]
    fn test_index_roundtrip() {
        let g = grid([4, 3, 2]);
        for index in 0..g.voxel_count() {
            let coord = g.coord_of(index);
            assert!(g.contains(coord));
            assert_eq!(g.index_of(coord), Some(index));
        }
        assert_eq!(g.index_of(VoxelCoord::new(4, 0, 0)), None);
        assert_eq!(g.index_of(VoxelCoord::new(-1, 0, 0)), None);
    }

    #[test]
    fn test_neighbor_no_row_wrap() {
        let g = grid([3, 3, 1]);
        // Index 2 is the end of the first row; +X must not wrap to index 3.
        assert_eq!(g.neighbor(2, Direction::PosX), None);
        assert_eq!(g.neighbor(3, Direction::NegX), None);
        assert_eq!(g.neighbor(4, Direction::NegY), Some(1));
        assert_eq!(g.neighbor(4, Direction::PosZ), None);
    }

    #[test]
    fn test_face_neighbors_match_coords() {
        let g = grid([3, 4, 5]);
        for index in 0..g.voxel_count() {
            let coord = g.coord_of(index);
            let expected = coord.face_neighbors().map(|c| g.index_of(c));
            assert_eq!(g.face_neighbors(index), expected);
        }
    }

    #[test]
    fn test_offsets_match_neighbors_in_interior() {
        let g = grid([3, 4, 5]);
        let center = g.index_of(VoxelCoord::new(1, 1, 1)).unwrap();
        let offsets = g.offsets();
        for dir in Direction::ALL {
            let expected = i64::try_from(center).unwrap() + offsets.offset(dir);
            let actual = g.neighbor(center, dir).map(|n| i64::try_from(n).unwrap());
            assert_eq!(actual, Some(expected));
        }
    }

    #[test]
    fn test_neighbor_out_of_range_index() {
        let g = grid([2, 2, 2]);
        assert_eq!(g.neighbor(8, Direction::NegX), None);
        assert_eq!(g.face_neighbors(100), [None; 6]);
    }

    #[test]
    fn test_is_boundary() {
        let g = grid([3, 3, 3]);
        assert!(g.is_boundary(0));
        assert!(!g.is_boundary(13));
        let flat = grid([3, 3, 1]);
        assert!(flat.is_boundary(4));
    }

    #[test]
    fn test_voxel_volume_uses_spacing() {
        let g = GridGeometry::try_new([2, 2, 2], Vector3::new(0.5, 2.0, 3.0), Point3::origin()).unwrap();
        approx::assert_relative_eq!(g.voxel_volume(), 3.0);
        approx::assert_relative_eq!(grid([4, 4, 4]).voxel_volume(), 1.0);
    }

    #[test]
    fn test_neighbor_indices_count() {
        let g = grid([3, 3, 3]);
        assert_eq!(g.neighbor_indices(13).count(), 6);
        assert_eq!(g.neighbor_indices(0).count(), 3);
    }
}
