//! Collections of named arrays sharing one tuple count.

use rayon::prelude::*;

use crate::array::{AttributeArray, DataArray, Element};
use crate::error::{GridError, GridResult};

/// An ordered set of named [`AttributeArray`]s with a common tuple count.
///
/// Used both for per-voxel data (one tuple per voxel of a
/// [`GridGeometry`](crate::GridGeometry)) and for per-feature data (one tuple
/// per row of a [`FeatureTable`](crate::FeatureTable)).
///
/// # Example
///
/// ```
/// use voxel_types::{AttributeMatrix, DataArray};
///
/// let mut cells = AttributeMatrix::new(4);
/// cells.insert(DataArray::from_scalars("Confidence", vec![0.9f32, 0.1, 0.8, 0.7])).unwrap();
/// cells.insert(DataArray::from_scalars("Phases", vec![1i32, 1, 1, 2])).unwrap();
///
/// // Wrong tuple count is rejected.
/// assert!(cells.insert(DataArray::from_scalars("Bad", vec![0u8; 3])).is_err());
///
/// let phases = cells.get_as::<i32>("Phases").unwrap();
/// assert_eq!(phases.as_slice()[3], 2);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeMatrix {
    tuple_count: usize,
    arrays: Vec<AttributeArray>,
}

impl AttributeMatrix {
    /// Creates an empty matrix whose arrays must hold `tuple_count` tuples.
    #[must_use]
    pub const fn new(tuple_count: usize) -> Self {
        Self {
            tuple_count,
            arrays: Vec::new(),
        }
    }

    /// Returns the required tuple count.
    #[must_use]
    pub const fn tuple_count(&self) -> usize {
        self.tuple_count
    }

    /// Returns the number of arrays.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    /// Returns `true` if the matrix holds no arrays.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Adds an array.
    ///
    /// # Errors
    ///
    /// - [`GridError::TupleCountMismatch`] if the array length differs from the matrix.
    /// - [`GridError::DuplicateArray`] if an array with the same name exists.
    pub fn insert(&mut self, array: impl Into<AttributeArray>) -> GridResult<()> {
        let array = array.into();
        if array.tuple_count() != self.tuple_count {
            return Err(GridError::TupleCountMismatch {
                name: array.name().to_string(),
                expected: self.tuple_count,
                actual: array.tuple_count(),
            });
        }
        if self.contains(array.name()) {
            return Err(GridError::DuplicateArray {
                name: array.name().to_string(),
            });
        }
        self.arrays.push(array);
        Ok(())
    }

    /// Removes and returns the named array.
    pub fn remove(&mut self, name: &str) -> Option<AttributeArray> {
        let pos = self.arrays.iter().position(|a| a.name() == name)?;
        Some(self.arrays.remove(pos))
    }

    /// Checks if an array with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.arrays.iter().any(|a| a.name() == name)
    }

    /// Returns the named array.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeArray> {
        self.arrays.iter().find(|a| a.name() == name)
    }

    /// Returns the named array mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut AttributeArray> {
        self.arrays.iter_mut().find(|a| a.name() == name)
    }

    /// Returns the named array as a typed [`DataArray`].
    ///
    /// # Errors
    ///
    /// - [`GridError::ArrayNotFound`] if no array has this name.
    /// - [`GridError::ElementTypeMismatch`] if it stores another element type.
    pub fn get_as<T: Element>(&self, name: &str) -> GridResult<&DataArray<T>> {
        let array = self.get(name).ok_or_else(|| GridError::ArrayNotFound {
            name: name.to_string(),
        })?;
        array
            .as_typed::<T>()
            .ok_or_else(|| GridError::ElementTypeMismatch {
                name: name.to_string(),
                expected: T::TYPE.name(),
                actual: array.element_type().name(),
            })
    }

    /// Iterates the arrays in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &AttributeArray> {
        self.arrays.iter()
    }

    /// Iterates the arrays mutably.
    ///
    /// Callers must not change tuple counts through this iterator.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AttributeArray> {
        self.arrays.iter_mut()
    }

    /// Copies tuple `src` over tuple `dst` in every array.
    pub fn copy_tuple(&mut self, src: usize, dst: usize) {
        for array in &mut self.arrays {
            array.copy_tuple(src, dst);
        }
    }

    /// Applies [`DataArray::copy_tuples_from`] to every array.
    ///
    /// With `parallel`, arrays are processed concurrently (one task per array)
    /// and each array is additionally split into voxel ranges. Destination
    /// tuples are exclusive to one writer either way.
    pub fn copy_tuples_from(&mut self, sources: &[Option<usize>], parallel: bool) {
        if parallel {
            self.arrays
                .par_iter_mut()
                .for_each(|array| array.copy_tuples_from(sources, true));
        } else {
            for array in &mut self.arrays {
                array.copy_tuples_from(sources, false);
            }
        }
    }

    /// Keeps only tuples whose entry in `keep` is `true`, in every array.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::MaskLengthMismatch`] if `keep` does not have one
    /// entry per tuple; no array is modified in that case.
    pub fn remove_tuples(&mut self, keep: &[bool]) -> GridResult<()> {
        if keep.len() != self.tuple_count {
            return Err(GridError::MaskLengthMismatch {
                expected: self.tuple_count,
                actual: keep.len(),
            });
        }
        for array in &mut self.arrays {
            array.remove_tuples(keep)?;
        }
        self.tuple_count = keep.iter().filter(|&&k| k).count();
        Ok(())
    }

    /// Reorders every array so new tuple `i` is old tuple `source_of[i]`.
    pub fn reorder_tuples(&mut self, source_of: &[usize]) {
        for array in &mut self.arrays {
            array.reorder_tuples(source_of);
        }
        self.tuple_count = source_of.len();
    }

    /// Resizes every array to `tuples` tuples.
    pub fn resize_tuples(&mut self, tuples: usize) {
        for array in &mut self.arrays {
            array.resize_tuples(tuples);
        }
        self.tuple_count = tuples;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AttributeMatrix {
        let mut m = AttributeMatrix::new(3);
        m.insert(DataArray::from_scalars("a", vec![1u8, 2, 3])).unwrap();
        m.insert(DataArray::new("b", 2, vec![1.0f64, 1.5, 2.0, 2.5, 3.0, 3.5]).unwrap())
            .unwrap();
        m
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut m = sample();
        let err = m.insert(DataArray::from_scalars("a", vec![0u8; 3]));
        assert!(matches!(err, Err(GridError::DuplicateArray { .. })));
    }

    #[test]
    fn test_get_as_errors() {
        let m = sample();
        assert!(matches!(m.get_as::<u8>("x"), Err(GridError::ArrayNotFound { .. })));
        assert!(matches!(
            m.get_as::<i32>("a"),
            Err(GridError::ElementTypeMismatch { expected: "i32", actual: "u8", .. })
        ));
    }

    #[test]
    fn test_copy_tuple_all_arrays() {
        let mut m = sample();
        m.copy_tuple(2, 0);
        assert_eq!(m.get_as::<u8>("a").unwrap().as_slice(), &[3, 2, 3]);
        assert_eq!(m.get_as::<f64>("b").unwrap().tuple(0), Some(&[3.0, 3.5][..]));
    }

    #[test]
    fn test_copy_tuples_from_parallel_matches_serial() {
        let sources = [Some(1), None, Some(1)];
        let mut serial = sample();
        let mut parallel = sample();
        serial.copy_tuples_from(&sources, false);
        parallel.copy_tuples_from(&sources, true);
        assert_eq!(serial, parallel);
        assert_eq!(serial.get_as::<u8>("a").unwrap().as_slice(), &[2, 2, 2]);
    }

    #[test]
    fn test_remove_tuples_updates_count() {
        let mut m = sample();
        m.remove_tuples(&[false, true, true]).unwrap();
        assert_eq!(m.tuple_count(), 2);
        assert_eq!(m.get_as::<u8>("a").unwrap().as_slice(), &[2, 3]);
        assert!(m.remove_tuples(&[true]).is_err());
        assert_eq!(m.tuple_count(), 2);
    }

    #[test]
    fn test_reorder_and_resize() {
        let mut m = sample();
        m.reorder_tuples(&[2, 1, 0]);
        assert_eq!(m.get_as::<u8>("a").unwrap().as_slice(), &[3, 2, 1]);
        m.resize_tuples(4);
        assert_eq!(m.tuple_count(), 4);
        assert_eq!(m.get_as::<u8>("a").unwrap().as_slice(), &[3, 2, 1, 0]);
        assert!(m.remove("a").is_some());
        assert_eq!(m.len(), 1);
    }
}
