//! Bidirectional translation between the wire tensor form (shape + one
//! typed array) and the dense runtime tensor (shape + dtype + elements).
//!
//! `decode`/`encode` are inverses of each other on the directly-representable
//! subset of dtypes.

use crate::error::GatewayError;
use crate::wire::{TensorPayload, WireTensor};

/// Element dtype of a runtime tensor. `F32`/`I32`/`Bool`/`Complex64`/`Bytes`
/// are directly representable on the wire; the rest are runtime-only and
/// upcast to/from `I32` at the codec boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    F32,
    I32,
    Bool,
    Complex64,
    Bytes,
    I8,
    U8,
    I16,
    I64,
}

/// A dense, row-major, multi-dimensional array with a known dtype and shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: TensorData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    I32(Vec<i32>),
    Bool(Vec<bool>),
    /// (real, imag) pairs.
    Complex64(Vec<(i32, i32)>),
    Bytes(Vec<Vec<u8>>),
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    I64(Vec<i64>),
}

impl TensorData {
    pub fn dtype(&self) -> Dtype {
        match self {
            TensorData::F32(_) => Dtype::F32,
            TensorData::I32(_) => Dtype::I32,
            TensorData::Bool(_) => Dtype::Bool,
            TensorData::Complex64(_) => Dtype::Complex64,
            TensorData::Bytes(_) => Dtype::Bytes,
            TensorData::I8(_) => Dtype::I8,
            TensorData::U8(_) => Dtype::U8,
            TensorData::I16(_) => Dtype::I16,
            TensorData::I64(_) => Dtype::I64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::I32(v) => v.len(),
            TensorData::Bool(v) => v.len(),
            TensorData::Complex64(v) => v.len(),
            TensorData::Bytes(v) => v.len(),
            TensorData::I8(v) => v.len(),
            TensorData::U8(v) => v.len(),
            TensorData::I16(v) => v.len(),
            TensorData::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: TensorData) -> Self {
        Self { shape, data }
    }

    pub fn dtype(&self) -> Dtype {
        self.data.dtype()
    }

    /// Relabel this tensor's shape without touching element order. Caller
    /// is responsible for `new_shape`'s product matching the element count.
    pub fn reshaped(mut self, new_shape: Vec<usize>) -> Self {
        self.shape = new_shape;
        self
    }

    /// Wrap this tensor in a new leading dimension of size 1.
    pub fn wrapped_outer(self) -> Self {
        let mut shape = Vec::with_capacity(self.shape.len() + 1);
        shape.push(1);
        shape.extend(self.shape.iter().copied());
        self.reshaped(shape)
    }

    /// Extract the `k`-th slice along the leading dimension, dropping it
    /// from the resulting shape.
    pub fn slice_leading(&self, k: usize) -> Tensor {
        let rest = &self.shape[1..];
        let chunk: usize = rest.iter().product();
        let start = k * chunk;
        let end = start + chunk;

        macro_rules! slice_variant {
            ($variant:ident, $v:expr) => {
                TensorData::$variant($v[start..end].to_vec())
            };
        }

        let data = match &self.data {
            TensorData::F32(v) => slice_variant!(F32, v),
            TensorData::I32(v) => slice_variant!(I32, v),
            TensorData::Bool(v) => slice_variant!(Bool, v),
            TensorData::Complex64(v) => slice_variant!(Complex64, v),
            TensorData::Bytes(v) => slice_variant!(Bytes, v),
            TensorData::I8(v) => slice_variant!(I8, v),
            TensorData::U8(v) => slice_variant!(U8, v),
            TensorData::I16(v) => slice_variant!(I16, v),
            TensorData::I64(v) => slice_variant!(I64, v),
        };

        Tensor::new(rest.to_vec(), data)
    }

    /// Concatenate `parts` along a new leading dimension.
    pub fn stack_leading(parts: Vec<Tensor>) -> Tensor {
        debug_assert!(!parts.is_empty());
        let rest = parts[0].shape.clone();
        let mut shape = Vec::with_capacity(rest.len() + 1);
        shape.push(parts.len());
        shape.extend(rest);

        macro_rules! concat_variant {
            ($variant:ident) => {{
                let mut out = Vec::new();
                for p in &parts {
                    match &p.data {
                        TensorData::$variant(v) => out.extend(v.iter().cloned()),
                        _ => unreachable!("stack_leading called with mixed dtypes"),
                    }
                }
                TensorData::$variant(out)
            }};
        }

        let data = match &parts[0].data {
            TensorData::F32(_) => concat_variant!(F32),
            TensorData::I32(_) => concat_variant!(I32),
            TensorData::Bool(_) => concat_variant!(Bool),
            TensorData::Complex64(_) => concat_variant!(Complex64),
            TensorData::Bytes(_) => concat_variant!(Bytes),
            TensorData::I8(_) => concat_variant!(I8),
            TensorData::U8(_) => concat_variant!(U8),
            TensorData::I16(_) => concat_variant!(I16),
            TensorData::I64(_) => concat_variant!(I64),
        };

        Tensor::new(shape, data)
    }

    /// Concatenate `parts` along their existing leading dimension, growing
    /// it by the sum of each part's leading-dimension size. A single part
    /// is returned unchanged rather than wrapped in a dimension of one.
    pub fn concat_leading(parts: Vec<Tensor>) -> Tensor {
        debug_assert!(!parts.is_empty());
        let mut parts = parts;
        if parts.len() == 1 {
            return parts.remove(0);
        }

        let rest = parts[0].shape[1..].to_vec();
        let leading: usize = parts.iter().map(|p| p.shape[0]).sum();
        let mut shape = Vec::with_capacity(rest.len() + 1);
        shape.push(leading);
        shape.extend(rest);

        macro_rules! concat_variant {
            ($variant:ident) => {{
                let mut out = Vec::new();
                for p in &parts {
                    match &p.data {
                        TensorData::$variant(v) => out.extend(v.iter().cloned()),
                        _ => unreachable!("concat_leading called with mixed dtypes"),
                    }
                }
                TensorData::$variant(out)
            }};
        }

        let data = match &parts[0].data {
            TensorData::F32(_) => concat_variant!(F32),
            TensorData::I32(_) => concat_variant!(I32),
            TensorData::Bool(_) => concat_variant!(Bool),
            TensorData::Complex64(_) => concat_variant!(Complex64),
            TensorData::Bytes(_) => concat_variant!(Bytes),
            TensorData::I8(_) => concat_variant!(I8),
            TensorData::U8(_) => concat_variant!(U8),
            TensorData::I16(_) => concat_variant!(I16),
            TensorData::I64(_) => concat_variant!(I64),
        };

        Tensor::new(shape, data)
    }

    /// Cast an i32 tensor to one of the runtime-only narrower/wider int
    /// dtypes, per the codec's upcast/downcast table.
    pub fn cast_from_i32(&self, target: Dtype) -> Result<Tensor, GatewayError> {
        let TensorData::I32(v) = &self.data else {
            return Err(GatewayError::TensorTypeError(
                "cast_from_i32 called on a non-i32 tensor".into(),
            ));
        };
        let data = match target {
            Dtype::I8 => TensorData::I8(v.iter().map(|&x| x as i8).collect()),
            Dtype::U8 => TensorData::U8(v.iter().map(|&x| x as u8).collect()),
            Dtype::I16 => TensorData::I16(v.iter().map(|&x| x as i16).collect()),
            Dtype::I64 => TensorData::I64(v.iter().map(|&x| x as i64).collect()),
            Dtype::I32 => TensorData::I32(v.clone()),
            _ => {
                return Err(GatewayError::TensorTypeError(format!(
                    "cannot cast an int32 tensor to {target:?}"
                )))
            }
        };
        Ok(Tensor::new(self.shape.clone(), data))
    }
}

fn shape_product(shape: &[u64]) -> u64 {
    shape.iter().product()
}

fn check_shape(shape: &[u64], actual_elems: usize) -> Result<(), GatewayError> {
    let expected = shape_product(shape);
    if expected != actual_elems as u64 {
        return Err(GatewayError::MisshapenTensor(format!(
            "expected {expected} elements for a tensor with {shape:?} dimensions, got {actual_elems} elements"
        )));
    }
    Ok(())
}

/// Decode a wire tensor into its runtime representation.
///
/// Fails with `InvalidTensorMessage` if no payload variant is set, or
/// `MisshapenTensor` if the product of `dimensions` doesn't match the
/// payload length.
pub fn decode(wire: &WireTensor) -> Result<Tensor, GatewayError> {
    let payload = wire
        .payload
        .as_ref()
        .ok_or(GatewayError::InvalidTensorMessage)?;
    let shape: Vec<usize> = wire.dimensions.iter().map(|&d| d as usize).collect();

    let data = match payload {
        TensorPayload::FloatArray(v) => {
            check_shape(&wire.dimensions, v.len())?;
            TensorData::F32(v.clone())
        }
        TensorPayload::IntArray(v) => {
            check_shape(&wire.dimensions, v.len())?;
            TensorData::I32(v.clone())
        }
        TensorPayload::BoolArray(v) => {
            check_shape(&wire.dimensions, v.len())?;
            TensorData::Bool(v.clone())
        }
        TensorPayload::ComplexArray(v) => {
            if v.len() % 2 != 0 {
                return Err(GatewayError::MisshapenTensor(
                    "complex payload has an odd number of int32 components".into(),
                ));
            }
            let pairs: Vec<(i32, i32)> = v.chunks_exact(2).map(|c| (c[0], c[1])).collect();
            check_shape(&wire.dimensions, pairs.len())?;
            TensorData::Complex64(pairs)
        }
        TensorPayload::StringArray(v) => {
            check_shape(&wire.dimensions, v.len())?;
            TensorData::Bytes(v.clone())
        }
    };

    Ok(Tensor::new(shape, data))
}

/// Encode a runtime tensor into its wire representation.
///
/// Rejects with `TensorConversionError` any dtype outside the mapping
/// table below (none currently; every `Dtype` has a mapping, matching the
/// fact that Rust values are always native-endian — see DESIGN.md).
pub fn encode(tensor: &Tensor) -> Result<WireTensor, GatewayError> {
    let dimensions: Vec<u64> = tensor.shape.iter().map(|&d| d as u64).collect();

    let payload = match &tensor.data {
        TensorData::F32(v) => TensorPayload::FloatArray(v.clone()),
        TensorData::I32(v) => TensorPayload::IntArray(v.clone()),
        TensorData::Bool(v) => TensorPayload::BoolArray(v.clone()),
        TensorData::Complex64(v) => {
            let mut flat = Vec::with_capacity(v.len() * 2);
            for (re, im) in v {
                flat.push(*re);
                flat.push(*im);
            }
            TensorPayload::ComplexArray(flat)
        }
        TensorData::Bytes(v) => TensorPayload::StringArray(v.clone()),
        // Runtime-only dtypes are downcast to int32 at the codec boundary.
        TensorData::I8(v) => TensorPayload::IntArray(v.iter().map(|&x| x as i32).collect()),
        TensorData::U8(v) => TensorPayload::IntArray(v.iter().map(|&x| x as i32).collect()),
        TensorData::I16(v) => TensorPayload::IntArray(v.iter().map(|&x| x as i32).collect()),
        TensorData::I64(v) => TensorPayload::IntArray(v.iter().map(|&x| x as i32).collect()),
    };

    Ok(WireTensor {
        dimensions,
        payload: Some(payload),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_tensor(shape: Vec<usize>, elems: Vec<f32>) -> Tensor {
        Tensor::new(shape, TensorData::F32(elems))
    }

    #[test]
    fn round_trip_floats() {
        let t = float_tensor(vec![2, 3], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let wire = encode(&t).unwrap();
        let back = decode(&wire).unwrap();
        assert_eq!(t, back);
    }

    #[test]
    fn decode_rejects_missing_payload() {
        let wire = WireTensor {
            dimensions: vec![2],
            payload: None,
        };
        let err = decode(&wire).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidTensorMessage);
    }

    #[test]
    fn decode_rejects_mismatched_product() {
        let wire = WireTensor {
            dimensions: vec![2, 2],
            payload: Some(TensorPayload::FloatArray(vec![1.0, 2.0, 3.0])),
        };
        let err = decode(&wire).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MisshapenTensor);
    }

    #[test]
    fn zero_dimension_tensor_with_empty_payload_is_accepted() {
        let wire = WireTensor {
            dimensions: vec![0, 5],
            payload: Some(TensorPayload::FloatArray(vec![])),
        };
        let t = decode(&wire).unwrap();
        assert!(t.data.is_empty());
    }

    #[test]
    fn wire_round_trip_is_idempotent_across_two_round_trips() {
        let wire = WireTensor {
            dimensions: vec![3],
            payload: Some(TensorPayload::IntArray(vec![1, 2, 3])),
        };
        let uno = decode(&wire).unwrap();
        let dos = decode(&encode(&uno).unwrap()).unwrap();
        let tres = decode(&encode(&dos).unwrap()).unwrap();
        assert_eq!(uno, dos);
        assert_eq!(dos, tres);
    }

    #[test]
    fn complex_round_trip_preserves_pairs() {
        let t = Tensor::new(vec![2], TensorData::Complex64(vec![(1, 2), (3, 4)]));
        let wire = encode(&t).unwrap();
        let back = decode(&wire).unwrap();
        assert_eq!(t, back);
    }

    #[test]
    fn runtime_only_dtype_downcasts_to_int_array_on_encode() {
        let t = Tensor::new(vec![2], TensorData::I64(vec![10, 20]));
        let wire = encode(&t).unwrap();
        match wire.payload {
            Some(TensorPayload::IntArray(v)) => assert_eq!(v, vec![10, 20]),
            _ => panic!("expected IntArray payload"),
        }
    }

    #[test]
    fn slice_and_stack_leading_round_trips() {
        let t = float_tensor(vec![2, 3], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let first = t.slice_leading(0);
        let second = t.slice_leading(1);
        assert_eq!(first.shape, vec![3]);
        assert_eq!(second.data, TensorData::F32(vec![3.0, 4.0, 5.0]));
        let restacked = Tensor::stack_leading(vec![first, second]);
        assert_eq!(restacked, t);
    }

    #[test]
    fn concat_leading_returns_a_single_part_unchanged() {
        let t = float_tensor(vec![3], vec![1.0, 2.0, 3.0]);
        let out = Tensor::concat_leading(vec![t.clone()]);
        assert_eq!(out, t);
    }

    #[test]
    fn concat_leading_grows_the_existing_leading_axis() {
        let first = float_tensor(vec![1, 2], vec![0.0, 1.0]);
        let second = float_tensor(vec![1, 2], vec![2.0, 3.0]);
        let out = Tensor::concat_leading(vec![first, second]);
        assert_eq!(out.shape, vec![2, 2]);
        assert_eq!(out.data, TensorData::F32(vec![0.0, 1.0, 2.0, 3.0]));
    }

    #[test]
    fn wrapped_outer_adds_a_leading_dimension_of_one() {
        let t = float_tensor(vec![3], vec![1.0, 2.0, 3.0]);
        let wrapped = t.wrapped_outer();
        assert_eq!(wrapped.shape, vec![1, 3]);
    }

    #[test]
    fn cast_from_i32_produces_the_requested_runtime_dtype() {
        let t = Tensor::new(vec![2], TensorData::I32(vec![300, -5]));
        let cast = t.cast_from_i32(Dtype::U8).unwrap();
        assert_eq!(cast.data, TensorData::U8(vec![300u32 as u8, (-5i32) as u8]));
    }
}
