//! SavedModel loading and signature execution against an in-process runtime
//!
//! `HalfPlusTwo` stands in for libtensorflow: it reads `saved_model.pb` from
//! the export directory, hands the meta graph back through the native buffer,
//! and evaluates `y = 0.5 * x + 2` for each fed `tf.Example`.
//!
//! Run with: cargo test --test test_saved_model

use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;
use std::ptr::NonNull;

use prost::Message;
use tfbind::example::{float_example, float_feature};
use tfbind::ffi::TF_Buffer;
use tfbind::loader::{load_meta_graph, SAVED_MODEL_FILENAME_PB};
use tfbind::protos::tensorflow::meta_graph_def::MetaInfoDef;
use tfbind::protos::tensorflow::{
    tensor_info, tensor_shape_proto, DataType as ProtoDataType, Example, GraphDef, MetaGraphDef,
    NodeDef, SavedModel, SignatureDef, TensorInfo, TensorShapeProto,
};
use tfbind::saved_model::{signature_constants, tag_constants};
use tfbind::{
    Buffer, BufferAllocator, Graph, GraphError, HostAllocator, Operation, Output, Runtime,
    SavedModelBundle, Session, SessionOptions, Tensor, TensorData,
};

const REGRESS_SIGNATURE: &str = "regress_x_to_y";

#[derive(Default)]
struct HalfPlusTwo {
    allocated: Cell<usize>,
    released: Cell<usize>,
}

// SAFETY: delegates to `HostAllocator`.
unsafe impl BufferAllocator for HalfPlusTwo {
    fn allocate_buffer(&self) -> Result<NonNull<TF_Buffer>, GraphError> {
        self.allocated.set(self.allocated.get() + 1);
        HostAllocator.allocate_buffer()
    }

    unsafe fn release_buffer(&self, buffer: NonNull<TF_Buffer>) {
        self.released.set(self.released.get() + 1);
        HostAllocator.release_buffer(buffer)
    }
}

struct FakeGraph {
    operations: Vec<Operation>,
}

impl Graph for FakeGraph {
    fn operation(&self, name: &str) -> Option<Operation> {
        self.operations.iter().find(|op| op.name == name).cloned()
    }

    fn operations(&self) -> Vec<Operation> {
        self.operations.clone()
    }
}

struct HalfPlusTwoSession;

fn half_plus_two(x: f32) -> f32 {
    0.5 * x + 2.0
}

impl Session for HalfPlusTwoSession {
    fn run(
        &mut self,
        feeds: &HashMap<Output, Tensor>,
        fetches: &[Output],
    ) -> Result<Vec<Tensor>, GraphError> {
        let examples = Output {
            operation: "x_input_example_tensor".to_string(),
            index: 0,
        };
        let x = Output {
            operation: "x".to_string(),
            index: 0,
        };

        let xs: Vec<f32> = if let Some(tensor) = feeds.get(&examples) {
            let records = tensor.as_strings().ok_or_else(|| GraphError::UnsupportedDataType {
                reason: "examples must be strings".to_string(),
            })?;
            records
                .iter()
                .map(|record| -> Result<f32, GraphError> {
                    let example = Example::decode(record.as_slice())?;
                    Ok(float_feature(&example, "x").unwrap_or_default()[0])
                })
                .collect::<Result<_, _>>()?
        } else if let Some(tensor) = feeds.get(&x) {
            tensor.as_f32().unwrap_or_default().to_vec()
        } else {
            return Err(GraphError::UnsupportedDataType {
                reason: "nothing fed".to_string(),
            });
        };

        fetches
            .iter()
            .map(|fetch| {
                assert_eq!(fetch.to_string(), "y:0");
                let ys: Vec<f32> = xs.iter().copied().map(half_plus_two).collect();
                Tensor::new(vec![ys.len(), 1], ys)
            })
            .collect()
    }
}

impl Runtime for HalfPlusTwo {
    type Graph = FakeGraph;
    type Session = HalfPlusTwoSession;

    fn load_saved_model(
        &self,
        export_dir: &Path,
        tags: &[&str],
        _options: &SessionOptions,
        meta_graph: &mut Buffer<'_, Self>,
    ) -> Result<(FakeGraph, HalfPlusTwoSession), GraphError> {
        let meta = load_meta_graph(export_dir, tags)?;
        let operations = meta
            .graph_def
            .iter()
            .flat_map(|graph| &graph.node)
            .map(|node| Operation {
                name: node.name.clone(),
                op_type: node.op.clone(),
                num_outputs: 1,
            })
            .collect();
        meta_graph.fill(meta.encode_to_vec());
        Ok((FakeGraph { operations }, HalfPlusTwoSession))
    }
}

fn tensor_info(name: &str, dtype: ProtoDataType, dims: &[i64]) -> TensorInfo {
    TensorInfo {
        dtype: dtype as i32,
        tensor_shape: Some(TensorShapeProto {
            dim: dims
                .iter()
                .map(|&size| tensor_shape_proto::Dim {
                    size,
                    name: String::new(),
                })
                .collect(),
            unknown_rank: false,
        }),
        encoding: Some(tensor_info::Encoding::Name(name.to_string())),
    }
}

fn signature(method: &str, inputs: &[(&str, TensorInfo)], outputs: &[(&str, TensorInfo)]) -> SignatureDef {
    SignatureDef {
        inputs: inputs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
        outputs: outputs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
        method_name: method.to_string(),
    }
}

fn node(name: &str, op: &str, inputs: &[&str]) -> NodeDef {
    NodeDef {
        name: name.to_string(),
        op: op.to_string(),
        input: inputs.iter().map(|s| s.to_string()).collect(),
        device: String::new(),
    }
}

/// Write a half_plus_two export with a `serve` meta graph
fn write_half_plus_two(dir: &Path) {
    let examples = tensor_info("x_input_example_tensor:0", ProtoDataType::DtString, &[-1]);
    let x = tensor_info("x:0", ProtoDataType::DtFloat, &[-1]);
    let y = tensor_info("y:0", ProtoDataType::DtFloat, &[-1, 1]);

    let mut signature_def = HashMap::new();
    signature_def.insert(
        REGRESS_SIGNATURE.to_string(),
        signature(
            signature_constants::REGRESS_METHOD_NAME,
            &[("inputs", examples)],
            &[("outputs", y.clone())],
        ),
    );
    signature_def.insert(
        signature_constants::DEFAULT_SERVING_SIGNATURE_DEF_KEY.to_string(),
        signature(
            signature_constants::PREDICT_METHOD_NAME,
            &[("x", x)],
            &[("y", y.clone())],
        ),
    );
    signature_def.insert(
        "missing_op".to_string(),
        signature(
            signature_constants::PREDICT_METHOD_NAME,
            &[("x", tensor_info("not_in_graph:0", ProtoDataType::DtFloat, &[-1]))],
            &[("y", y.clone())],
        ),
    );
    signature_def.insert(
        "bad_index".to_string(),
        signature(
            signature_constants::PREDICT_METHOD_NAME,
            &[("x", tensor_info("x:3", ProtoDataType::DtFloat, &[-1]))],
            &[("y", y.clone())],
        ),
    );
    signature_def.insert(
        "bad_endpoint".to_string(),
        signature(
            signature_constants::PREDICT_METHOD_NAME,
            &[("x", tensor_info("x", ProtoDataType::DtFloat, &[-1]))],
            &[("y", y)],
        ),
    );

    let meta_graph = MetaGraphDef {
        meta_info_def: Some(MetaInfoDef {
            tags: vec![tag_constants::SERVE.to_string()],
            tensorflow_version: "2.15.0".to_string(),
            ..Default::default()
        }),
        graph_def: Some(GraphDef {
            node: vec![
                node("x_input_example_tensor", "Placeholder", &[]),
                node("x", "ParseExample", &["x_input_example_tensor"]),
                node("a", "Const", &[]),
                node("b", "Const", &[]),
                node("Mul", "Mul", &["a", "x"]),
                node("y", "Add", &["Mul", "b"]),
            ],
            versions: None,
        }),
        signature_def,
        ..Default::default()
    };
    let saved_model = SavedModel {
        saved_model_schema_version: 1,
        meta_graphs: vec![meta_graph],
    };
    std::fs::write(dir.join(SAVED_MODEL_FILENAME_PB), saved_model.encode_to_vec()).unwrap();
}

fn load(runtime: &HalfPlusTwo, dir: &Path) -> SavedModelBundle<HalfPlusTwo> {
    SavedModelBundle::load(runtime, dir, &[tag_constants::SERVE], &SessionOptions::new()).unwrap()
}

#[test]
fn test_regress_half_plus_two() {
    let dir = tempfile::tempdir().unwrap();
    write_half_plus_two(dir.path());
    let runtime = HalfPlusTwo::default();
    let mut bundle = load(&runtime, dir.path());

    assert_eq!(
        bundle.input_endpoint(REGRESS_SIGNATURE, "inputs").unwrap().to_string(),
        "x_input_example_tensor:0"
    );
    assert_eq!(
        bundle.output_endpoint(REGRESS_SIGNATURE, "outputs").unwrap().to_string(),
        "y:0"
    );

    let examples = Tensor::from_strings([0.0f32, 1.0, 2.0, 3.0].map(|x| float_example("x", x)));
    let mut inputs = HashMap::new();
    inputs.insert("inputs", examples);
    let outputs = bundle
        .run_signature(REGRESS_SIGNATURE, inputs, &["outputs"])
        .unwrap();

    let y = &outputs["outputs"];
    assert_eq!(y.shape(), &[4, 1]);
    assert_eq!(y.as_f32().unwrap(), &[2.0, 2.5, 3.0, 3.5]);
}

#[test]
fn test_predict_signature_with_floats() {
    let dir = tempfile::tempdir().unwrap();
    write_half_plus_two(dir.path());
    let runtime = HalfPlusTwo::default();
    let mut bundle = load(&runtime, dir.path());

    let mut inputs = HashMap::new();
    inputs.insert("x", Tensor::new(vec![2], vec![10.0f32, -4.0]).unwrap());
    let outputs = bundle
        .run_signature(
            signature_constants::DEFAULT_SERVING_SIGNATURE_DEF_KEY,
            inputs,
            &["y"],
        )
        .unwrap();
    assert_eq!(outputs["y"].data(), &TensorData::Float32(vec![7.0, 0.0]));
}

#[test]
fn test_meta_graph_buffer_released_once() {
    let dir = tempfile::tempdir().unwrap();
    write_half_plus_two(dir.path());
    let runtime = HalfPlusTwo::default();
    let bundle = load(&runtime, dir.path());

    assert_eq!(runtime.allocated.get(), 1);
    assert_eq!(runtime.released.get(), 1);
    assert_eq!(bundle.signature_names().len(), 5);
    assert_eq!(bundle.graph.operations().len(), 6);
}

#[test]
fn test_missing_tags_releases_buffer() {
    let dir = tempfile::tempdir().unwrap();
    write_half_plus_two(dir.path());
    let runtime = HalfPlusTwo::default();

    let result = SavedModelBundle::load(
        &runtime,
        dir.path(),
        &[tag_constants::TRAIN],
        &SessionOptions::new(),
    );
    assert!(matches!(result, Err(GraphError::MetaGraphNotFound { .. })));
    assert_eq!(runtime.allocated.get(), 1);
    assert_eq!(runtime.released.get(), 1);
}

#[test]
fn test_missing_export_dir() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = HalfPlusTwo::default();
    let result = SavedModelBundle::load(
        &runtime,
        dir.path().join("does_not_exist"),
        &[tag_constants::SERVE],
        &SessionOptions::new(),
    );
    assert!(matches!(result, Err(GraphError::Io { .. })));
}

#[test]
fn test_signature_errors() {
    let dir = tempfile::tempdir().unwrap();
    write_half_plus_two(dir.path());
    let runtime = HalfPlusTwo::default();
    let mut bundle = load(&runtime, dir.path());

    let feed = || {
        let mut inputs = HashMap::new();
        inputs.insert("x", Tensor::new(vec![1], vec![1.0f32]).unwrap());
        inputs
    };

    assert!(matches!(
        bundle.run_signature("no_such_signature", feed(), &["y"]),
        Err(GraphError::SignatureNotFound { name }) if name == "no_such_signature"
    ));
    assert!(matches!(
        bundle.run_signature(REGRESS_SIGNATURE, feed(), &["outputs"]),
        Err(GraphError::SignatureKeyNotFound { key, .. }) if key == "x"
    ));
    assert!(matches!(
        bundle.run_signature("missing_op", feed(), &["y"]),
        Err(GraphError::OperationNotFound { name }) if name == "not_in_graph"
    ));
    assert!(matches!(
        bundle.run_signature("bad_index", feed(), &["y"]),
        Err(GraphError::OutputOutOfRange { index: 3, num_outputs: 1, .. })
    ));
    assert!(matches!(
        bundle.run_signature("bad_endpoint", feed(), &["y"]),
        Err(GraphError::InvalidEndpoint { endpoint, .. }) if endpoint == "x"
    ));
}

#[test]
fn test_describe_bundle() {
    let dir = tempfile::tempdir().unwrap();
    write_half_plus_two(dir.path());
    let runtime = HalfPlusTwo::default();
    let bundle = load(&runtime, dir.path());

    let summary = bundle.describe();
    assert_eq!(summary.tags, vec!["serve".to_string()]);
    assert_eq!(summary.tensorflow_version.as_deref(), Some("2.15.0"));
    let regress = &summary.signatures[REGRESS_SIGNATURE];
    assert_eq!(regress.method_name, signature_constants::REGRESS_METHOD_NAME);

    let json = summary.to_json().unwrap();
    assert!(json.contains("x_input_example_tensor:0"));
}
