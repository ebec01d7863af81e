use crate::error::Error;
use aligned_vec::{AVec, ConstAlign};
use std::ops::Index;

const ALIGN: usize = 64;

/// Row-major 2D array with 64-byte aligned storage.
///
/// Used both for images (`width` x `height` pixels) and for per-site tables, where a row is one
/// site and `width` is the number of labels (or feature dimensions).
#[derive(Debug, Clone)]
pub struct Array2D<T> {
    pub data: AVec<T, ConstAlign<ALIGN>>,
    pub width: usize,
    pub height: usize,
}

impl<T> Array2D<T> {
    pub fn from_slice(data: &[T], width: usize, height: usize) -> Result<Self, Error>
    where
        T: Clone,
    {
        if data.len() != width * height {
            return Err(Error::DimensionMismatch {
                expected: width * height,
                found: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data: AVec::from_slice(ALIGN, data),
        })
    }

    /// Builds the array from a generator called with `(x, y)` in row-major order.
    pub fn from_fn<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let data: AVec<T, ConstAlign<ALIGN>> = AVec::from_iter(
            ALIGN,
            (0..height).flat_map(|y| (0..width).map(move |x| (x, y))).map(|(x, y)| f(x, y)),
        );
        Self {
            width,
            height,
            data,
        }
    }

    #[inline(always)]
    pub fn get_row(&self, row: usize) -> &[T] {
        debug_assert!(row < self.height, "Out-of-bounds row {row} < {}", self.height);
        &self.data[(self.width * row)..(self.width * row + self.width)]
    }

    #[inline(always)]
    pub fn get_index(&self, x: usize, y: usize) -> usize {
        debug_assert!(self.width > x);
        debug_assert!(self.height > y);
        self.width * y + x
    }

    pub fn rows(&self) -> std::slice::ChunksExact<'_, T> {
        self.data.chunks_exact(self.width.max(1))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

impl<T> Index<(usize, usize)> for Array2D<T> {
    type Output = T;
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.data[self.get_index(x, y)]
    }
}

/// Row-major 3D array (slices of `width` x `height`, `depth` of them).
#[derive(Debug, Clone)]
pub struct Array3D<T> {
    pub data: AVec<T, ConstAlign<ALIGN>>,
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl<T> Array3D<T> {
    pub fn from_slice(data: &[T], width: usize, height: usize, depth: usize) -> Result<Self, Error>
    where
        T: Clone,
    {
        if data.len() != width * height * depth {
            return Err(Error::DimensionMismatch {
                expected: width * height * depth,
                found: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            depth,
            data: AVec::from_slice(ALIGN, data),
        })
    }

    #[inline(always)]
    pub fn get_index(&self, x: usize, y: usize, z: usize) -> usize {
        debug_assert!(self.width > x);
        debug_assert!(self.height > y);
        debug_assert!(self.depth > z);
        (z * self.height + y) * self.width + x
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

impl<T> Index<(usize, usize, usize)> for Array3D<T> {
    type Output = T;
    fn index(&self, (x, y, z): (usize, usize, usize)) -> &Self::Output {
        &self.data[self.get_index(x, y, z)]
    }
}
