pub mod buffer;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod example;
pub mod executors;
pub mod ffi;
pub mod graph;
pub mod loader;
pub mod protos;
pub mod runtime;
pub mod saved_model;
pub mod tensor;
#[cfg(feature = "python")]
mod python;

pub use buffer::{Buffer, BufferAllocator, HostAllocator, MAX_DECODE_LEN};
pub use config::{BundleConfig, LibraryConfig, RuntimeConfig, SessionConfig};
pub use endpoint::TensorEndpoint;
pub use error::{GraphError, StatusCode};
pub use example::ExampleBuilder;
pub use executors::native::{NativeGraph, NativeRuntime, NativeSession};
pub use graph::{DataType, Operation, Output};
pub use loader::load_meta_graph;
pub use runtime::{Graph, Runtime, Session, SessionOptions};
pub use saved_model::{BundleSummary, SavedModelBundle};
pub use tensor::{Tensor, TensorData};
