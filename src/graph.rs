use serde::{Deserialize, Serialize};

use crate::endpoint::TensorEndpoint;
use crate::error::GraphError;
use crate::protos::tensorflow::DataType as ProtoDataType;

/// Element types this crate can move across the native boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Float32,
    Float64,
    Int32,
    Uint8,
    Int8,
    String,
    Int64,
    Bool,
}

impl DataType {
    /// Width of one element in native memory, `None` for variable-length strings
    pub fn bytes_per_element(self) -> Option<usize> {
        match self {
            DataType::Float32 => Some(4),
            DataType::Float64 => Some(8),
            DataType::Int32 => Some(4),
            DataType::Uint8 => Some(1),
            DataType::Int8 => Some(1),
            DataType::Int64 => Some(8),
            // TF_BOOL is stored as one byte per element
            DataType::Bool => Some(1),
            DataType::String => None,
        }
    }

    /// `TF_DataType` / `tensorflow.DataType` code
    pub fn code(self) -> i32 {
        self.to_proto() as i32
    }

    pub fn from_code(code: i32) -> Result<Self, GraphError> {
        let proto = ProtoDataType::try_from(code).map_err(|_| GraphError::UnsupportedDataType {
            reason: format!("unknown data type code {code}"),
        })?;
        Self::from_proto(proto)
    }

    pub fn from_proto(proto: ProtoDataType) -> Result<Self, GraphError> {
        match proto {
            ProtoDataType::DtFloat => Ok(DataType::Float32),
            ProtoDataType::DtDouble => Ok(DataType::Float64),
            ProtoDataType::DtInt32 => Ok(DataType::Int32),
            ProtoDataType::DtUint8 => Ok(DataType::Uint8),
            ProtoDataType::DtInt8 => Ok(DataType::Int8),
            ProtoDataType::DtString => Ok(DataType::String),
            ProtoDataType::DtInt64 => Ok(DataType::Int64),
            ProtoDataType::DtBool => Ok(DataType::Bool),
            other => Err(GraphError::UnsupportedDataType {
                reason: format!("{other:?} tensors are not supported"),
            }),
        }
    }

    pub fn to_proto(self) -> ProtoDataType {
        match self {
            DataType::Float32 => ProtoDataType::DtFloat,
            DataType::Float64 => ProtoDataType::DtDouble,
            DataType::Int32 => ProtoDataType::DtInt32,
            DataType::Uint8 => ProtoDataType::DtUint8,
            DataType::Int8 => ProtoDataType::DtInt8,
            DataType::String => ProtoDataType::DtString,
            DataType::Int64 => ProtoDataType::DtInt64,
            DataType::Bool => ProtoDataType::DtBool,
        }
    }
}

/// A node of a loaded graph, as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub op_type: String,
    pub num_outputs: usize,
}

impl Operation {
    /// Reference to one output slot of this operation
    pub fn output(&self, index: usize) -> Result<Output, GraphError> {
        if index >= self.num_outputs {
            return Err(GraphError::OutputOutOfRange {
                operation: self.name.clone(),
                index,
                num_outputs: self.num_outputs,
            });
        }
        Ok(Output {
            operation: self.name.clone(),
            index,
        })
    }
}

/// An endpoint that has been checked against a live graph; used as a feed
/// or fetch key for [`crate::runtime::Session::run`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Output {
    pub operation: String,
    pub index: usize,
}

impl Output {
    /// The `OPNAME:INDEX` endpoint naming this output; fails if the index
    /// does not fit the endpoint's `u32`
    pub fn endpoint(&self) -> Result<TensorEndpoint, GraphError> {
        let index = u32::try_from(self.index).map_err(|_| GraphError::InvalidEndpoint {
            endpoint: self.to_string(),
            reason: format!("output index {} exceeds {}", self.index, u32::MAX),
        })?;
        Ok(TensorEndpoint {
            name: self.operation.clone(),
            index,
        })
    }
}

impl std::fmt::Display for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.operation, self.index)
    }
}
