use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::numel;

/// Runtime value shared between the caller, the frame and kernels.
pub type SharedTensor = Arc<Mutex<TensorValue>>;

/// Supported element dtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    F32,
    F64,
    I32,
    I64,
    U8,
}

impl DType {
    /// Parse a dtype from its identifier string.
    pub fn from_ident(ident: &str) -> Result<Self> {
        match ident {
            "f32" => Ok(DType::F32),
            "f64" => Ok(DType::F64),
            "i32" => Ok(DType::I32),
            "i64" => Ok(DType::I64),
            "u8" => Ok(DType::U8),
            _ => Err(anyhow!("unsupported dtype: {}", ident)),
        }
    }

    /// Size of one element in bytes.
    pub fn size_of(self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::I64 => 8,
            DType::U8 => 1,
        }
    }
}

/// Flat typed storage.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
}

/// Element type that can be stored in a `TensorValue`.
pub trait TensorElement: bytemuck::Pod + Send + 'static {
    const DTYPE: DType;
    /// Wrap owned elements into typed storage.
    fn wrap(data: Vec<Self>) -> TensorData;
    /// Borrow the elements if the storage has this type.
    fn view(data: &TensorData) -> Option<&[Self]>;
    /// Mutably borrow the elements if the storage has this type.
    fn view_mut(data: &mut TensorData) -> Option<&mut [Self]>;
}

macro_rules! impl_tensor_element {
    ($t:ty, $variant:ident) => {
        impl TensorElement for $t {
            const DTYPE: DType = DType::$variant;

            fn wrap(data: Vec<Self>) -> TensorData {
                TensorData::$variant(data)
            }

            fn view(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(values) => Some(values),
                    _ => None,
                }
            }

            fn view_mut(data: &mut TensorData) -> Option<&mut [Self]> {
                match data {
                    TensorData::$variant(values) => Some(values),
                    _ => None,
                }
            }
        }
    };
}

impl_tensor_element!(f32, F32);
impl_tensor_element!(f64, F64);
impl_tensor_element!(i32, I32);
impl_tensor_element!(i64, I64);
impl_tensor_element!(u8, U8);

/// Dense tensor with a static shape.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorValue {
    shape: Vec<usize>,
    data: TensorData,
}

impl TensorValue {
    /// Build a tensor from elements, checking the element count against `shape`.
    pub fn from_vec<T: TensorElement>(shape: &[usize], data: Vec<T>) -> Result<Self> {
        let expected = numel(shape);
        if data.len() != expected {
            return Err(anyhow!(
                "tensor shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            shape: shape.to_vec(),
            data: T::wrap(data),
        })
    }

    /// Rank-0 tensor holding one element.
    pub fn scalar<T: TensorElement>(value: T) -> Self {
        Self {
            shape: Vec::new(),
            data: T::wrap(vec![value]),
        }
    }

    /// Zero-filled tensor.
    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        let len = numel(shape);
        let data = match dtype {
            DType::F32 => TensorData::F32(vec![0.0; len]),
            DType::F64 => TensorData::F64(vec![0.0; len]),
            DType::I32 => TensorData::I32(vec![0; len]),
            DType::I64 => TensorData::I64(vec![0; len]),
            DType::U8 => TensorData::U8(vec![0; len]),
        };
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// Wrap into the shared runtime representation.
    pub fn into_shared(self) -> SharedTensor {
        Arc::new(Mutex::new(self))
    }

    pub fn dtype(&self) -> DType {
        match &self.data {
            TensorData::F32(_) => DType::F32,
            TensorData::F64(_) => DType::F64,
            TensorData::I32(_) => DType::I32,
            TensorData::I64(_) => DType::I64,
            TensorData::U8(_) => DType::U8,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        numel(&self.shape)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Typed element slice, `None` on dtype mismatch.
    pub fn as_slice<T: TensorElement>(&self) -> Option<&[T]> {
        T::view(&self.data)
    }

    /// Mutable typed element slice, `None` on dtype mismatch.
    pub fn as_mut_slice<T: TensorElement>(&mut self) -> Option<&mut [T]> {
        T::view_mut(&mut self.data)
    }

    /// Typed element slice or an error naming both dtypes.
    pub fn typed<T: TensorElement>(&self) -> Result<&[T]> {
        let dtype = self.dtype();
        self.as_slice::<T>()
            .ok_or_else(|| anyhow!("expected {:?} tensor, got {:?}", T::DTYPE, dtype))
    }

    /// Mutable variant of [`TensorValue::typed`].
    pub fn typed_mut<T: TensorElement>(&mut self) -> Result<&mut [T]> {
        let dtype = self.dtype();
        self.as_mut_slice::<T>()
            .ok_or_else(|| anyhow!("expected {:?} tensor, got {:?}", T::DTYPE, dtype))
    }

    /// Raw little-endian bytes of the storage.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.data {
            TensorData::F32(values) => bytemuck::cast_slice(values),
            TensorData::F64(values) => bytemuck::cast_slice(values),
            TensorData::I32(values) => bytemuck::cast_slice(values),
            TensorData::I64(values) => bytemuck::cast_slice(values),
            TensorData::U8(values) => values,
        }
    }

    /// Check that this tensor has the given dtype and shape.
    pub fn ensure_matches(&self, dtype: DType, shape: &[usize]) -> Result<()> {
        if self.dtype() != dtype {
            return Err(anyhow!(
                "dtype mismatch: have {:?}, expected {:?}",
                self.dtype(),
                dtype
            ));
        }
        if self.shape != shape {
            return Err(anyhow!(
                "shape mismatch: have {:?}, expected {:?}",
                self.shape,
                shape
            ));
        }
        Ok(())
    }

    /// Copy contents from another tensor of identical dtype and shape.
    pub fn copy_from(&mut self, other: &TensorValue) -> Result<()> {
        self.ensure_matches(other.dtype(), other.shape())?;
        self.data.clone_from(&other.data);
        Ok(())
    }
}
