// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shape descriptors and dimension utilities.

use crate::TensorError;
use std::fmt;

/// Describes the dimensionality of a [`crate::Tensor`] or activation.
///
/// Shapes are immutable once created. Activations use NHWC order for
/// image-like data and `[batch, features]` for dense data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Creates a new shape from the given dimensions.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![1, 28, 28, 3]);
    /// assert_eq!(s.rank(), 4);
    /// assert_eq!(s.num_elements(), 2352);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Creates a scalar shape (rank 0).
    pub fn scalar() -> Self {
        Self { dims: vec![] }
    }

    /// Creates a 1-D shape.
    pub fn vector(len: usize) -> Self {
        Self { dims: vec![len] }
    }

    /// Creates a 2-D shape (matrix).
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            dims: vec![rows, cols],
        }
    }

    /// Returns the number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the total number of elements. A scalar holds one element.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns the dimensions as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the size of a specific dimension, or `None` if out of bounds.
    pub fn dim(&self, index: usize) -> Option<usize> {
        self.dims.get(index).copied()
    }

    /// Returns the innermost dimension, or `None` for scalars.
    pub fn last_dim(&self) -> Option<usize> {
        self.dims.last().copied()
    }

    /// Computes the memory footprint in bytes for a given [`crate::DType`].
    pub fn size_bytes(&self, dtype: crate::DType) -> usize {
        self.num_elements() * dtype.size_bytes()
    }

    /// Returns a copy with the last dimension replaced.
    ///
    /// Used for dense layers, which map `[..., in]` to `[..., units]`.
    pub fn with_last_dim(&self, last: usize) -> Shape {
        let mut dims = self.dims.clone();
        match dims.last_mut() {
            Some(d) => *d = last,
            None => dims.push(last),
        }
        Shape { dims }
    }

    /// Collapses every dimension after the first into one: `[N, ...] -> [N, prod]`.
    pub fn flatten_batch(&self) -> Shape {
        match self.dims.split_first() {
            Some((&batch, rest)) => Shape::matrix(batch, rest.iter().product()),
            None => Shape::vector(1),
        }
    }

    /// Resolves a reshape target that may contain a single `-1` wildcard.
    ///
    /// The resolved shape must hold exactly as many elements as `self`.
    pub fn resolve_reshape(&self, target: &[i64]) -> Result<Shape, TensorError> {
        let invalid = || TensorError::InvalidReshape {
            from: self.clone(),
            target: target.to_vec(),
        };

        let mut wildcard = None;
        let mut known = 1usize;
        let mut dims = Vec::with_capacity(target.len());
        for (i, &d) in target.iter().enumerate() {
            match d {
                -1 if wildcard.is_none() => {
                    wildcard = Some(i);
                    dims.push(0);
                }
                d if d > 0 => {
                    known *= d as usize;
                    dims.push(d as usize);
                }
                _ => return Err(invalid()),
            }
        }

        let total = self.num_elements();
        match wildcard {
            Some(i) => {
                if known == 0 || total % known != 0 {
                    return Err(invalid());
                }
                dims[i] = total / known;
            }
            None if known != total => return Err(invalid()),
            None => {}
        }
        Ok(Shape { dims })
    }

    /// Computes the numpy-style broadcast of two shapes, or `None` if the
    /// shapes are incompatible.
    pub fn broadcast(&self, other: &Shape) -> Option<Shape> {
        let rank = self.rank().max(other.rank());
        let mut dims = vec![0usize; rank];
        for i in 0..rank {
            let a = self.dims.iter().rev().nth(i).copied().unwrap_or(1);
            let b = other.dims.iter().rev().nth(i).copied().unwrap_or(1);
            dims[rank - 1 - i] = match (a, b) {
                (a, b) if a == b => a,
                (1, b) => b,
                (a, 1) => a,
                _ => return None,
            };
        }
        Some(Shape { dims })
    }

    /// Computes row-major (C-order) strides for this shape.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.dims.len()];
        for i in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::scalar();
        assert_eq!(s.rank(), 0);
        assert_eq!(s.num_elements(), 1);
        assert!(s.strides().is_empty());
    }

    #[test]
    fn test_matrix_shape() {
        let s = Shape::matrix(3, 4);
        assert_eq!(s.num_elements(), 12);
        assert_eq!(s.strides(), vec![4, 1]);
        assert_eq!(s.size_bytes(DType::F32), 48);
        assert_eq!(s.size_bytes(DType::I8), 12);
    }

    #[test]
    fn test_4d_strides() {
        let s = Shape::new(vec![1, 2, 3, 4]);
        assert_eq!(s.strides(), vec![24, 12, 4, 1]);
    }

    #[test]
    fn test_with_last_dim() {
        assert_eq!(Shape::matrix(1, 4).with_last_dim(2), Shape::matrix(1, 2));
        assert_eq!(
            Shape::new(vec![1, 5, 8]).with_last_dim(3),
            Shape::new(vec![1, 5, 3])
        );
    }

    #[test]
    fn test_flatten_batch() {
        let s = Shape::new(vec![2, 4, 4, 3]);
        assert_eq!(s.flatten_batch(), Shape::matrix(2, 48));
    }

    #[test]
    fn test_resolve_reshape_wildcard() {
        let s = Shape::new(vec![1, 4, 4, 2]);
        assert_eq!(s.resolve_reshape(&[1, -1]).unwrap(), Shape::matrix(1, 32));
        assert_eq!(
            s.resolve_reshape(&[1, 8, 4]).unwrap(),
            Shape::new(vec![1, 8, 4])
        );
    }

    #[test]
    fn test_resolve_reshape_rejects_bad_targets() {
        let s = Shape::matrix(2, 3);
        assert!(s.resolve_reshape(&[4, -1]).is_err());
        assert!(s.resolve_reshape(&[-1, -1]).is_err());
        assert!(s.resolve_reshape(&[7]).is_err());
        assert!(s.resolve_reshape(&[0, 6]).is_err());
    }

    #[test]
    fn test_broadcast() {
        let a = Shape::new(vec![1, 4, 4, 3]);
        let b = Shape::vector(3);
        assert_eq!(a.broadcast(&b), Some(a.clone()));
        assert_eq!(Shape::matrix(4, 1).broadcast(&Shape::matrix(1, 5)), Some(Shape::matrix(4, 5)));
        assert_eq!(Shape::matrix(2, 3).broadcast(&Shape::vector(2)), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Shape::new(vec![2, 3, 4])), "[2, 3, 4]");
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&Shape::matrix(4, 2)).unwrap();
        assert_eq!(json, "[4,2]");
    }
}
