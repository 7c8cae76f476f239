//! Host-resident tensors fed to and fetched from a session
//!
//! Tensors are plain Rust values. Native backends copy them into runtime
//! memory for a run and copy fetched results back out.

use crate::error::GraphError;
use crate::graph::DataType;

/// Typed element storage, in row-major order
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Int32(Vec<i32>),
    Uint8(Vec<u8>),
    Int8(Vec<i8>),
    String(Vec<Vec<u8>>),
    Int64(Vec<i64>),
    Bool(Vec<bool>),
}

impl TensorData {
    pub fn dtype(&self) -> DataType {
        match self {
            TensorData::Float32(_) => DataType::Float32,
            TensorData::Float64(_) => DataType::Float64,
            TensorData::Int32(_) => DataType::Int32,
            TensorData::Uint8(_) => DataType::Uint8,
            TensorData::Int8(_) => DataType::Int8,
            TensorData::String(_) => DataType::String,
            TensorData::Int64(_) => DataType::Int64,
            TensorData::Bool(_) => DataType::Bool,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::Float32(v) => v.len(),
            TensorData::Float64(v) => v.len(),
            TensorData::Int32(v) => v.len(),
            TensorData::Uint8(v) => v.len(),
            TensorData::Int8(v) => v.len(),
            TensorData::String(v) => v.len(),
            TensorData::Int64(v) => v.len(),
            TensorData::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! impl_from_vec {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for TensorData {
                fn from(values: Vec<$ty>) -> Self {
                    TensorData::$variant(values)
                }
            }
        )*
    };
}

impl_from_vec!(
    f32 => Float32,
    f64 => Float64,
    i32 => Int32,
    u8 => Uint8,
    i8 => Int8,
    Vec<u8> => String,
    i64 => Int64,
    bool => Bool,
);

impl From<Vec<String>> for TensorData {
    fn from(values: Vec<String>) -> Self {
        TensorData::String(values.into_iter().map(String::into_bytes).collect())
    }
}

/// A dense tensor held in host memory
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    /// Create a tensor, checking that `data` fills `shape` exactly
    pub fn new(shape: Vec<usize>, data: impl Into<TensorData>) -> Result<Self, GraphError> {
        let data = data.into();
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| GraphError::TensorShapeMismatch {
                shape: shape.clone(),
                expected: usize::MAX,
                actual: data.len(),
            })?;
        if expected != data.len() {
            return Err(GraphError::TensorShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Rank-0 tensor holding one value
    pub fn scalar<T>(value: T) -> Self
    where
        Vec<T>: Into<TensorData>,
    {
        Self {
            shape: Vec::new(),
            data: vec![value].into(),
        }
    }

    /// Rank-1 tensor of byte strings, e.g. serialized `tf.Example` records
    pub fn from_strings<S: Into<Vec<u8>>>(values: impl IntoIterator<Item = S>) -> Self {
        let values: Vec<Vec<u8>> = values.into_iter().map(Into::into).collect();
        Self {
            shape: vec![values.len()],
            data: TensorData::String(values),
        }
    }

    pub fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    /// Get the total number of elements
    pub fn element_count(&self) -> usize {
        self.data.len()
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::Float32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.data {
            TensorData::Float64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match &self.data {
            TensorData::Int32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            TensorData::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[Vec<u8>]> {
        match &self.data {
            TensorData::String(v) => Some(v),
            _ => None,
        }
    }
}
