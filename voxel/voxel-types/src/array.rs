//! Typed per-voxel (or per-feature) attribute arrays.
//!
//! A [`DataArray`] owns a flat buffer of `tuple_count * components` values of
//! one element type. [`AttributeArray`] erases the element type behind an enum
//! so heterogeneous arrays can be stored together and have tuple-level
//! operations (copy, remove, reorder) applied uniformly. Dispatch on the
//! element type happens once per call, never per tuple.

use rayon::prelude::*;

use crate::error::{GridError, GridResult};

/// Runtime tag for the element type of an [`AttributeArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElementType {
    /// `bool`
    Bool,
    /// `i8`
    Int8,
    /// `u8`
    UInt8,
    /// `i16`
    Int16,
    /// `u16`
    UInt16,
    /// `i32`
    Int32,
    /// `u32`
    UInt32,
    /// `i64`
    Int64,
    /// `u64`
    UInt64,
    /// `f32`
    Float,
    /// `f64`
    Double,
}

impl ElementType {
    /// Rust spelling of the element type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "i8",
            Self::UInt8 => "u8",
            Self::Int16 => "i16",
            Self::UInt16 => "u16",
            Self::Int32 => "i32",
            Self::UInt32 => "u32",
            Self::Int64 => "i64",
            Self::UInt64 => "u64",
            Self::Float => "f32",
            Self::Double => "f64",
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An element type that can be stored in an [`AttributeArray`].
pub trait Element: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    /// Runtime tag of this type.
    const TYPE: ElementType;

    /// Wraps a typed array into the type-erased enum.
    fn wrap(array: DataArray<Self>) -> AttributeArray;

    /// Borrows the typed array if `array` stores this element type.
    fn downcast_ref(array: &AttributeArray) -> Option<&DataArray<Self>>;

    /// Mutably borrows the typed array if `array` stores this element type.
    fn downcast_mut(array: &mut AttributeArray) -> Option<&mut DataArray<Self>>;
}

/// A named array of fixed-width tuples.
///
/// # Example
///
/// ```
/// use voxel_types::DataArray;
///
/// // Three voxels, each with an RGB tuple.
/// let mut colors = DataArray::new("Colors", 3, vec![
///     255u8, 0, 0,
///     0, 255, 0,
///     0, 0, 255,
/// ]).unwrap();
///
/// assert_eq!(colors.tuple_count(), 3);
/// colors.copy_tuple(0, 2);
/// assert_eq!(colors.tuple(2), Some(&[255, 0, 0][..]));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataArray<T> {
    name: String,
    components: usize,
    data: Vec<T>,
}

impl<T: Element> DataArray<T> {
    /// Creates an array from a raw buffer of `components`-wide tuples.
    ///
    /// # Errors
    ///
    /// - [`GridError::ZeroComponents`] if `components` is zero.
    /// - [`GridError::RaggedArray`] if `data.len()` is not a multiple of `components`.
    pub fn new(name: impl Into<String>, components: usize, data: Vec<T>) -> GridResult<Self> {
        let name = name.into();
        if components == 0 {
            return Err(GridError::ZeroComponents { name });
        }
        if data.len() % components != 0 {
            return Err(GridError::RaggedArray {
                name,
                len: data.len(),
                components,
            });
        }
        Ok(Self {
            name,
            components,
            data,
        })
    }

    /// Creates a single-component array.
    #[must_use]
    pub fn from_scalars(name: impl Into<String>, data: Vec<T>) -> Self {
        Self {
            name: name.into(),
            components: 1,
            data,
        }
    }

    /// Creates an array of `tuples` tuples with every value set to `value`.
    ///
    /// A zero component count is bumped to one.
    #[must_use]
    pub fn filled(name: impl Into<String>, tuples: usize, components: usize, value: T) -> Self {
        let components = components.max(1);
        Self {
            name: name.into(),
            components,
            data: vec![value; tuples.saturating_mul(components)],
        }
    }

    /// Returns the array name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of values per tuple.
    #[must_use]
    pub const fn components(&self) -> usize {
        self.components
    }

    /// Returns the number of tuples.
    #[must_use]
    pub fn tuple_count(&self) -> usize {
        self.data.len() / self.components
    }

    /// Returns `true` if the array holds no tuples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the raw values.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Returns the raw values mutably.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consumes the array and returns the raw values.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Returns one tuple, or `None` if `index` is out of range.
    #[must_use]
    pub fn tuple(&self, index: usize) -> Option<&[T]> {
        let start = index.checked_mul(self.components)?;
        self.data.get(start..start + self.components)
    }

    /// Returns one tuple mutably, or `None` if `index` is out of range.
    pub fn tuple_mut(&mut self, index: usize) -> Option<&mut [T]> {
        let start = index.checked_mul(self.components)?;
        self.data.get_mut(start..start + self.components)
    }

    /// Copies tuple `src` over tuple `dst`.
    ///
    /// Returns `false` (and copies nothing) if either index is out of range.
    pub fn copy_tuple(&mut self, src: usize, dst: usize) -> bool {
        let count = self.tuple_count();
        if src >= count || dst >= count {
            return false;
        }
        let c = self.components;
        self.data.copy_within(src * c..(src + 1) * c, dst * c);
        true
    }

    /// Copies, for every tuple `i` with `sources[i] == Some(j)`, tuple `j` over tuple `i`.
    ///
    /// All reads see the values from before the call, so the result does not
    /// depend on the order in which destinations are written and is identical
    /// with `parallel` on or off. Destinations without an entry in `sources`
    /// and out-of-range sources are left unchanged.
    pub fn copy_tuples_from(&mut self, sources: &[Option<usize>], parallel: bool) {
        let c = self.components;
        let snapshot = self.data.clone();
        let apply = |tuple: &mut [T], source: &Option<usize>| {
            if let Some(values) = source.and_then(|src| snapshot.get(src * c..(src + 1) * c)) {
                tuple.copy_from_slice(values);
            }
        };

        if parallel {
            self.data
                .par_chunks_mut(c)
                .zip(sources.par_iter())
                .for_each(|(tuple, source)| apply(tuple, source));
        } else {
            self.data
                .chunks_mut(c)
                .zip(sources)
                .for_each(|(tuple, source)| apply(tuple, source));
        }
    }

    /// Keeps only the tuples whose entry in `keep` is `true`, preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::MaskLengthMismatch`] if `keep` does not have one
    /// entry per tuple.
    pub fn remove_tuples(&mut self, keep: &[bool]) -> GridResult<()> {
        if keep.len() != self.tuple_count() {
            return Err(GridError::MaskLengthMismatch {
                expected: self.tuple_count(),
                actual: keep.len(),
            });
        }
        let c = self.components;
        let mut kept = Vec::with_capacity(self.data.len());
        for (tuple, &keep_it) in self.data.chunks(c).zip(keep) {
            if keep_it {
                kept.extend_from_slice(tuple);
            }
        }
        self.data = kept;
        Ok(())
    }

    /// Rebuilds the array so that new tuple `i` is old tuple `source_of[i]`.
    ///
    /// The new tuple count is `source_of.len()`; out-of-range sources produce
    /// default-valued tuples.
    pub fn reorder_tuples(&mut self, source_of: &[usize]) {
        let c = self.components;
        let mut reordered = Vec::with_capacity(source_of.len() * c);
        for &src in source_of {
            match self.data.get(src * c..(src + 1) * c) {
                Some(values) => reordered.extend_from_slice(values),
                None => reordered.extend(std::iter::repeat_n(T::default(), c)),
            }
        }
        self.data = reordered;
    }

    /// Grows or shrinks to `tuples` tuples, filling new tuples with defaults.
    pub fn resize_tuples(&mut self, tuples: usize) {
        self.data.resize(tuples * self.components, T::default());
    }
}

macro_rules! attribute_arrays {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        /// A [`DataArray`] of any supported element type.
        #[derive(Debug, Clone, PartialEq)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum AttributeArray {
            $(
                #[doc = concat!("Array of `", stringify!($ty), "` values.")]
                $variant(DataArray<$ty>),
            )*
        }

        $(
            impl Element for $ty {
                const TYPE: ElementType = ElementType::$variant;

                fn wrap(array: DataArray<Self>) -> AttributeArray {
                    AttributeArray::$variant(array)
                }

                fn downcast_ref(array: &AttributeArray) -> Option<&DataArray<Self>> {
                    match array {
                        AttributeArray::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn downcast_mut(array: &mut AttributeArray) -> Option<&mut DataArray<Self>> {
                    match array {
                        AttributeArray::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<DataArray<$ty>> for AttributeArray {
                fn from(array: DataArray<$ty>) -> Self {
                    Self::$variant(array)
                }
            }
        )*
    };
}

attribute_arrays! {
    Bool => bool,
    Int8 => i8,
    UInt8 => u8,
    Int16 => i16,
    UInt16 => u16,
    Int32 => i32,
    UInt32 => u32,
    Int64 => i64,
    UInt64 => u64,
    Float => f32,
    Double => f64,
}

macro_rules! with_array {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            AttributeArray::Bool($inner) => $body,
            AttributeArray::Int8($inner) => $body,
            AttributeArray::UInt8($inner) => $body,
            AttributeArray::Int16($inner) => $body,
            AttributeArray::UInt16($inner) => $body,
            AttributeArray::Int32($inner) => $body,
            AttributeArray::UInt32($inner) => $body,
            AttributeArray::Int64($inner) => $body,
            AttributeArray::UInt64($inner) => $body,
            AttributeArray::Float($inner) => $body,
            AttributeArray::Double($inner) => $body,
        }
    };
}

impl AttributeArray {
    /// Returns the array name.
    #[must_use]
    pub fn name(&self) -> &str {
        with_array!(self, a => a.name())
    }

    /// Returns the runtime element type.
    #[must_use]
    pub fn element_type(&self) -> ElementType {
        fn tag<T: Element>(_: &DataArray<T>) -> ElementType {
            T::TYPE
        }
        with_array!(self, a => tag(a))
    }

    /// Returns the number of values per tuple.
    #[must_use]
    pub fn components(&self) -> usize {
        with_array!(self, a => a.components())
    }

    /// Returns the number of tuples.
    #[must_use]
    pub fn tuple_count(&self) -> usize {
        with_array!(self, a => a.tuple_count())
    }

    /// Borrows the typed array if it stores `T`.
    #[must_use]
    pub fn as_typed<T: Element>(&self) -> Option<&DataArray<T>> {
        T::downcast_ref(self)
    }

    /// Mutably borrows the typed array if it stores `T`.
    pub fn as_typed_mut<T: Element>(&mut self) -> Option<&mut DataArray<T>> {
        T::downcast_mut(self)
    }

    /// See [`DataArray::copy_tuple`].
    pub fn copy_tuple(&mut self, src: usize, dst: usize) -> bool {
        with_array!(self, a => a.copy_tuple(src, dst))
    }

    /// See [`DataArray::copy_tuples_from`].
    pub fn copy_tuples_from(&mut self, sources: &[Option<usize>], parallel: bool) {
        with_array!(self, a => a.copy_tuples_from(sources, parallel));
    }

    /// See [`DataArray::remove_tuples`].
    ///
    /// # Errors
    ///
    /// Returns [`GridError::MaskLengthMismatch`] if `keep` does not have one
    /// entry per tuple.
    pub fn remove_tuples(&mut self, keep: &[bool]) -> GridResult<()> {
        with_array!(self, a => a.remove_tuples(keep))
    }

    /// See [`DataArray::reorder_tuples`].
    pub fn reorder_tuples(&mut self, source_of: &[usize]) {
        with_array!(self, a => a.reorder_tuples(source_of));
    }

    /// See [`DataArray::resize_tuples`].
    pub fn resize_tuples(&mut self, tuples: usize) {
        with_array!(self, a => a.resize_tuples(tuples));
    }
}
