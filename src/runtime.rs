//! Capability interface to the native runtime
//!
//! Everything this crate asks of the runtime goes through these traits:
//! buffer allocation ([`BufferAllocator`]), bundle loading ([`Runtime`]),
//! operation lookup ([`Graph`]) and execution ([`Session`]).

use std::collections::HashMap;
use std::path::Path;

use prost::Message;

use crate::buffer::Buffer;
pub use crate::buffer::BufferAllocator;
use crate::error::GraphError;
use crate::graph::{Operation, Output};
use crate::protos::tensorflow::ConfigProto;
use crate::tensor::Tensor;

/// Options applied to the session created for a bundle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOptions {
    /// Execution engine to connect to; empty for in-process
    pub target: Option<String>,
    /// Serialized `tensorflow.ConfigProto`
    pub config: Vec<u8>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_config(mut self, config: &ConfigProto) -> Self {
        self.config = config.encode_to_vec();
        self
    }
}

/// A native runtime able to load SavedModel bundles
pub trait Runtime: BufferAllocator {
    type Graph: Graph;
    type Session: Session;

    /// Load the bundle at `export_dir` whose meta graph carries `tags`.
    ///
    /// The serialized `MetaGraphDef` is written into `meta_graph`.
    fn load_saved_model(
        &self,
        export_dir: &Path,
        tags: &[&str],
        options: &SessionOptions,
        meta_graph: &mut Buffer<'_, Self>,
    ) -> Result<(Self::Graph, Self::Session), GraphError>;
}

/// Read access to a loaded computation graph
pub trait Graph {
    fn operation(&self, name: &str) -> Option<Operation>;

    fn operations(&self) -> Vec<Operation>;
}

/// Executes runs against a loaded graph
pub trait Session {
    /// Feed `feeds`, evaluate `fetches`, and return one tensor per fetch in
    /// fetch order.
    fn run(
        &mut self,
        feeds: &HashMap<Output, Tensor>,
        fetches: &[Output],
    ) -> Result<Vec<Tensor>, GraphError>;

    /// Release runtime resources held by the session.
    fn close(&mut self) -> Result<(), GraphError> {
        Ok(())
    }
}
