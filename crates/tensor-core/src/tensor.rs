// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Owned tensor type.

use crate::{DType, Shape, TensorError};

/// An owned, n-dimensional tensor stored as a little-endian byte buffer.
///
/// `Tensor` is how weights travel through the pipeline: the loader fills it
/// from the source container, the optimization passes re-encode it, and the
/// serializer copies its bytes verbatim into the destination file.
///
/// # Memory Layout
/// Row-major (C) order. Typed access goes through [`Tensor::to_f32_vec`],
/// which decodes any floating-point dtype.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    dtype: DType,
    data: Vec<u8>,
}

impl Tensor {
    /// Creates a new tensor filled with zeros.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape, DType};
    /// let t = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
    /// assert_eq!(t.size_bytes(), 24);
    /// ```
    pub fn zeros(shape: Shape, dtype: DType) -> Self {
        let size = shape.size_bytes(dtype);
        Self {
            shape,
            dtype,
            data: vec![0u8; size],
        }
    }

    /// Creates a tensor from raw little-endian bytes.
    ///
    /// Returns an error if the buffer size does not match `shape.size_bytes(dtype)`.
    pub fn from_bytes(shape: Shape, dtype: DType, data: Vec<u8>) -> Result<Self, TensorError> {
        let expected = shape.size_bytes(dtype);
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, dtype, data })
    }

    /// Creates an `F32` tensor from a slice of values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.to_f32_vec().unwrap(), vec![1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        if values.len() != shape.num_elements() {
            return Err(TensorError::BufferSizeMismatch {
                expected: shape.size_bytes(DType::F32),
                actual: values.len() * DType::F32.size_bytes(),
            });
        }
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Ok(Self {
            shape,
            dtype: DType::F32,
            data,
        })
    }

    /// Creates an `I8` tensor from quantized values.
    pub fn from_i8(shape: Shape, values: &[i8]) -> Result<Self, TensorError> {
        let data = values.iter().map(|&v| v as u8).collect();
        Self::from_bytes(shape, DType::I8, data)
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the number of elements.
    pub fn num_elements(&self) -> usize {
        self.shape.num_elements()
    }

    /// Returns the raw byte slice backing this tensor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the tensor and returns its byte buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Returns the memory footprint of this tensor in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Decodes the buffer into `f32` values.
    ///
    /// `F16` and `BF16` are widened exactly. `I8` needs quantization
    /// parameters and is rejected here; use [`crate::dequantize_i8`].
    pub fn to_f32_vec(&self) -> Result<Vec<f32>, TensorError> {
        let values = match self.dtype {
            DType::F32 => self
                .data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            DType::F16 => self
                .data
                .chunks_exact(2)
                .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
            DType::BF16 => self
                .data
                .chunks_exact(2)
                .map(|c| half::bf16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
            DType::I8 => {
                return Err(TensorError::UnsupportedDType {
                    op: "to_f32_vec",
                    dtype: self.dtype,
                })
            }
        };
        Ok(values)
    }

    /// Reinterprets the buffer as signed bytes.
    pub fn to_i8_vec(&self) -> Result<Vec<i8>, TensorError> {
        if self.dtype != DType::I8 {
            return Err(TensorError::UnsupportedDType {
                op: "to_i8_vec",
                dtype: self.dtype,
            });
        }
        Ok(self.data.iter().map(|&b| b as i8).collect())
    }

    /// Returns the `(min, max)` of the decoded values, or `None` when the
    /// tensor is empty or holds a non-finite value.
    pub fn finite_range(&self) -> Result<Option<(f32, f32)>, TensorError> {
        let values = self.to_f32_vec()?;
        if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
            return Ok(None);
        }
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        Ok(Some((min, max)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let t = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
        assert_eq!(t.size_bytes(), 24);
        assert_eq!(t.shape(), &Shape::matrix(2, 3));
        assert!(t.to_f32_vec().unwrap().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_from_f32_little_endian() {
        let t = Tensor::from_f32(Shape::vector(1), &[1.0]).unwrap();
        assert_eq!(t.as_bytes(), &[0, 0, 128, 63]);
    }

    #[test]
    fn test_from_bytes_size_mismatch() {
        let result = Tensor::from_bytes(Shape::matrix(2, 3), DType::F32, vec![0u8; 10]);
        assert!(matches!(result, Err(TensorError::BufferSizeMismatch { expected: 24, actual: 10 })));
    }

    #[test]
    fn test_from_f32_count_mismatch() {
        assert!(Tensor::from_f32(Shape::vector(4), &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_decode_half_types() {
        let halves: Vec<u8> = [1.5f32, -2.0]
            .iter()
            .flat_map(|&v| half::f16::from_f32(v).to_le_bytes())
            .collect();
        let t = Tensor::from_bytes(Shape::vector(2), DType::F16, halves).unwrap();
        assert_eq!(t.to_f32_vec().unwrap(), vec![1.5, -2.0]);

        let brains: Vec<u8> = [0.5f32, 4.0]
            .iter()
            .flat_map(|&v| half::bf16::from_f32(v).to_le_bytes())
            .collect();
        let t = Tensor::from_bytes(Shape::vector(2), DType::BF16, brains).unwrap();
        assert_eq!(t.to_f32_vec().unwrap(), vec![0.5, 4.0]);
    }

    #[test]
    fn test_i8_requires_dequantization() {
        let t = Tensor::from_i8(Shape::vector(2), &[-1, 7]).unwrap();
        assert!(t.to_f32_vec().is_err());
        assert_eq!(t.to_i8_vec().unwrap(), vec![-1, 7]);
    }

    #[test]
    fn test_finite_range() {
        let t = Tensor::from_f32(Shape::vector(3), &[-1.0, 0.5, 3.0]).unwrap();
        assert_eq!(t.finite_range().unwrap(), Some((-1.0, 3.0)));

        let t = Tensor::from_f32(Shape::vector(2), &[f32::NAN, 1.0]).unwrap();
        assert_eq!(t.finite_range().unwrap(), None);
    }
}
