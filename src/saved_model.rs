//! Loading SavedModel bundles and running their signatures

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::Buffer;
use crate::endpoint::TensorEndpoint;
use crate::error::GraphError;
use crate::graph::{DataType, Output};
use crate::loader::meta_graph_tags;
use crate::protos::tensorflow::{tensor_info, MetaGraphDef, SignatureDef, TensorInfo};
use crate::runtime::{Graph, Runtime, Session, SessionOptions};
use crate::tensor::Tensor;

pub mod tag_constants {
    pub const SERVE: &str = "serve";
    pub const TRAIN: &str = "train";
    pub const GPU: &str = "gpu";
    pub const TPU: &str = "tpu";
}

pub mod signature_constants {
    pub const DEFAULT_SERVING_SIGNATURE_DEF_KEY: &str = "serving_default";

    pub const PREDICT_METHOD_NAME: &str = "tensorflow/serving/predict";
    pub const REGRESS_METHOD_NAME: &str = "tensorflow/serving/regress";
    pub const CLASSIFY_METHOD_NAME: &str = "tensorflow/serving/classify";

    pub const REGRESS_INPUTS: &str = "inputs";
    pub const REGRESS_OUTPUTS: &str = "outputs";
    pub const CLASSIFY_INPUTS: &str = "inputs";
    pub const CLASSIFY_OUTPUT_CLASSES: &str = "classes";
    pub const CLASSIFY_OUTPUT_SCORES: &str = "scores";
}

/// Look up a signature by key
pub fn signature<'a>(meta_graph: &'a MetaGraphDef, name: &str) -> Result<&'a SignatureDef, GraphError> {
    meta_graph
        .signature_def
        .get(name)
        .ok_or_else(|| GraphError::SignatureNotFound {
            name: name.to_string(),
        })
}

/// Parse the dense endpoint a `TensorInfo` refers to
pub fn tensor_endpoint(key: &str, info: &TensorInfo) -> Result<TensorEndpoint, GraphError> {
    match &info.encoding {
        Some(tensor_info::Encoding::Name(name)) => name.parse(),
        Some(tensor_info::Encoding::CooSparse(_)) => Err(GraphError::UnsupportedTensorEncoding {
            key: key.to_string(),
            encoding: "coo_sparse",
        }),
        None => Err(GraphError::UnsupportedTensorEncoding {
            key: key.to_string(),
            encoding: "none",
        }),
    }
}

fn signature_tensor<'a>(
    meta_graph: &'a MetaGraphDef,
    signature_name: &str,
    direction: &'static str,
    key: &str,
) -> Result<&'a TensorInfo, GraphError> {
    let sig = signature(meta_graph, signature_name)?;
    let tensors = if direction == "input" {
        &sig.inputs
    } else {
        &sig.outputs
    };
    tensors
        .get(key)
        .ok_or_else(|| GraphError::SignatureKeyNotFound {
            signature: signature_name.to_string(),
            direction,
            key: key.to_string(),
        })
}

/// Description of one signature tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub endpoint: Option<String>,
    pub dtype: Option<DataType>,
    /// `None` for unknown rank; `-1` marks an unknown dimension
    pub shape: Option<Vec<i64>>,
}

impl TensorSpec {
    fn from_info(info: &TensorInfo) -> Self {
        let endpoint = match &info.encoding {
            Some(tensor_info::Encoding::Name(name)) => Some(name.clone()),
            _ => None,
        };
        let shape = info
            .tensor_shape
            .as_ref()
            .filter(|shape| !shape.unknown_rank)
            .map(|shape| shape.dim.iter().map(|d| d.size).collect());
        Self {
            endpoint,
            dtype: DataType::from_code(info.dtype).ok(),
            shape,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureSummary {
    pub method_name: String,
    pub inputs: BTreeMap<String, TensorSpec>,
    pub outputs: BTreeMap<String, TensorSpec>,
}

/// Overview of a bundle's meta graph, in the spirit of `saved_model_cli show`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSummary {
    pub tags: Vec<String>,
    pub tensorflow_version: Option<String>,
    pub signatures: BTreeMap<String, SignatureSummary>,
}

impl BundleSummary {
    pub fn from_meta_graph(meta_graph: &MetaGraphDef) -> Self {
        let specs = |tensors: &HashMap<String, TensorInfo>| -> BTreeMap<String, TensorSpec> {
            tensors
                .iter()
                .map(|(key, info)| (key.clone(), TensorSpec::from_info(info)))
                .collect()
        };
        let signatures = meta_graph
            .signature_def
            .iter()
            .map(|(name, sig)| {
                (
                    name.clone(),
                    SignatureSummary {
                        method_name: sig.method_name.clone(),
                        inputs: specs(&sig.inputs),
                        outputs: specs(&sig.outputs),
                    },
                )
            })
            .collect();
        Self {
            tags: meta_graph_tags(meta_graph),
            tensorflow_version: meta_graph
                .meta_info_def
                .as_ref()
                .map(|info| info.tensorflow_version.clone())
                .filter(|v| !v.is_empty()),
            signatures,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A loaded bundle: its meta graph, graph and session
pub struct SavedModelBundle<R: Runtime> {
    pub meta_graph_def: MetaGraphDef,
    pub graph: R::Graph,
    pub session: R::Session,
}

impl<R: Runtime> SavedModelBundle<R> {
    /// Load the bundle at `export_dir` whose meta graph carries `tags`
    pub fn load(
        runtime: &R,
        export_dir: impl AsRef<Path>,
        tags: &[&str],
        options: &SessionOptions,
    ) -> Result<Self, GraphError> {
        let export_dir = export_dir.as_ref();
        debug!(export_dir = %export_dir.display(), ?tags, "loading saved model");

        let mut buffer = Buffer::new(runtime)?;
        let (graph, session) = runtime.load_saved_model(export_dir, tags, options, &mut buffer)?;
        let meta_graph_def = buffer.decode_meta_graph()?;
        buffer.release();

        debug!(
            signatures = meta_graph_def.signature_def.len(),
            "saved model loaded"
        );
        Ok(Self {
            meta_graph_def,
            graph,
            session,
        })
    }

    pub fn signature(&self, name: &str) -> Result<&SignatureDef, GraphError> {
        signature(&self.meta_graph_def, name)
    }

    /// Signature keys in sorted order
    pub fn signature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.meta_graph_def.signature_def.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn input_endpoint(&self, signature: &str, key: &str) -> Result<TensorEndpoint, GraphError> {
        let info = signature_tensor(&self.meta_graph_def, signature, "input", key)?;
        tensor_endpoint(key, info)
    }

    pub fn output_endpoint(&self, signature: &str, key: &str) -> Result<TensorEndpoint, GraphError> {
        let info = signature_tensor(&self.meta_graph_def, signature, "output", key)?;
        tensor_endpoint(key, info)
    }

    /// Resolve an endpoint against the loaded graph
    pub fn resolve(&self, endpoint: &TensorEndpoint) -> Result<Output, GraphError> {
        let operation =
            self.graph
                .operation(&endpoint.name)
                .ok_or_else(|| GraphError::OperationNotFound {
                    name: endpoint.name.clone(),
                })?;
        operation.output(endpoint.index as usize)
    }

    /// Run a signature by its logical input and output keys
    pub fn run_signature(
        &mut self,
        signature: &str,
        inputs: HashMap<&str, Tensor>,
        outputs: &[&str],
    ) -> Result<HashMap<String, Tensor>, GraphError> {
        let mut feeds = HashMap::with_capacity(inputs.len());
        for (key, tensor) in inputs {
            let output = self.resolve(&self.input_endpoint(signature, key)?)?;
            feeds.insert(output, tensor);
        }
        let fetches = outputs
            .iter()
            .map(|key| self.resolve(&self.output_endpoint(signature, key)?))
            .collect::<Result<Vec<_>, _>>()?;

        let results = self.session.run(&feeds, &fetches)?;
        Ok(outputs
            .iter()
            .map(|key| key.to_string())
            .zip(results)
            .collect())
    }

    pub fn describe(&self) -> BundleSummary {
        BundleSummary::from_meta_graph(&self.meta_graph_def)
    }
}
