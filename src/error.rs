use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Status codes reported by the native runtime (`TF_Code`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
    /// A code this crate does not know about
    Other(i32),
}

impl StatusCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => StatusCode::Ok,
            1 => StatusCode::Cancelled,
            2 => StatusCode::Unknown,
            3 => StatusCode::InvalidArgument,
            4 => StatusCode::DeadlineExceeded,
            5 => StatusCode::NotFound,
            6 => StatusCode::AlreadyExists,
            7 => StatusCode::PermissionDenied,
            8 => StatusCode::ResourceExhausted,
            9 => StatusCode::FailedPrecondition,
            10 => StatusCode::Aborted,
            11 => StatusCode::OutOfRange,
            12 => StatusCode::Unimplemented,
            13 => StatusCode::Internal,
            14 => StatusCode::Unavailable,
            15 => StatusCode::DataLoss,
            16 => StatusCode::Unauthenticated,
            other => StatusCode::Other(other),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DataLoss => "DATA_LOSS",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
            StatusCode::Other(code) => return write!(f, "CODE_{code}"),
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("buffer holds {length} bytes, more than the {limit}-byte decode limit")]
    OversizedPayload { length: usize, limit: usize },

    #[error("failed to decode protocol buffer: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("invalid tensor endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("native runtime failed to allocate a buffer")]
    BufferAllocationFailed,

    #[error("buffer reports {length} bytes but its data pointer is null")]
    NullBufferData { length: usize },

    #[error("failed to load native library `{}`: {source}", path.display())]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("native library does not export `{symbol}`: {source}")]
    MissingSymbol {
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("native runtime error ({code}): {message}")]
    Native { code: StatusCode, message: String },

    #[error("signature `{name}` not found in meta graph")]
    SignatureNotFound { name: String },

    #[error("signature `{signature}` has no {direction} named `{key}`")]
    SignatureKeyNotFound {
        signature: String,
        direction: &'static str,
        key: String,
    },

    #[error("tensor `{key}` is not a dense tensor endpoint ({encoding})")]
    UnsupportedTensorEncoding { key: String, encoding: &'static str },

    #[error("operation `{name}` not found in graph")]
    OperationNotFound { name: String },

    #[error("operation `{operation}` has {num_outputs} outputs, index {index} is out of range")]
    OutputOutOfRange {
        operation: String,
        index: usize,
        num_outputs: usize,
    },

    #[error("tensor shape {shape:?} needs {expected} elements, got {actual}")]
    TensorShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported tensor data type: {reason}")]
    UnsupportedDataType { reason: String },

    #[error("native runtime failed to allocate a tensor of {byte_len} bytes")]
    TensorAllocationFailed { byte_len: usize },

    #[error("invalid path or name `{value}`: {reason}")]
    InvalidPath { value: String, reason: String },

    #[error("no meta graph in `{}` matches tags {tags:?} (available: {available:?})", export_dir.display())]
    MetaGraphNotFound {
        export_dir: PathBuf,
        tags: Vec<String>,
        available: Vec<Vec<String>>,
    },

    #[error("I/O error on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl GraphError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GraphError::Io {
            path: path.into(),
            source,
        }
    }
}
