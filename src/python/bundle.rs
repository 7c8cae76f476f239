use std::collections::HashMap;
use std::path::PathBuf;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict, PyList};

use super::to_py_err;
use crate::config::RuntimeConfig;
use crate::executors::native::NativeRuntime;
use crate::runtime::{Graph, SessionOptions};
use crate::saved_model::SavedModelBundle;
use crate::tensor::{Tensor, TensorData};

/// A SavedModel bundle loaded into a TensorFlow session
#[pyclass(name = "SavedModel", unsendable)]
pub struct PySavedModel {
    export_dir: String,
    tags: Vec<String>,
    bundle: SavedModelBundle<NativeRuntime>,
}

fn tensor_from_py(key: &str, value: &Bound<'_, PyAny>) -> PyResult<Tensor> {
    if let Ok(strings) = value.extract::<Vec<Vec<u8>>>() {
        return Ok(Tensor::from_strings(strings));
    }
    if let Ok(floats) = value.extract::<Vec<f32>>() {
        return Tensor::new(vec![floats.len()], floats).map_err(to_py_err);
    }
    Err(PyValueError::new_err(format!(
        "input `{key}` must be a list of bytes or a list of floats"
    )))
}

fn tensor_to_py(py: Python<'_>, tensor: &Tensor) -> PyObject {
    let values = match tensor.data() {
        TensorData::Float32(v) => v.to_object(py),
        TensorData::Float64(v) => v.to_object(py),
        TensorData::Int32(v) => v.to_object(py),
        TensorData::Uint8(v) => v.to_object(py),
        TensorData::Int8(v) => v.to_object(py),
        TensorData::Int64(v) => v.to_object(py),
        TensorData::Bool(v) => v.to_object(py),
        TensorData::String(v) => {
            PyList::new_bound(py, v.iter().map(|s| PyBytes::new_bound(py, s))).into_py(py)
        }
    };
    (tensor.shape().to_vec(), values).into_py(py)
}

#[pymethods]
impl PySavedModel {
    /// Load a SavedModel
    ///
    /// Args:
    ///     export_dir: Directory holding saved_model.pb and variables/
    ///     tags: Tag set of the meta graph to load (default ["serve"])
    ///     library: Path to libtensorflow (default: platform library name)
    ///     config: Optional TOML runtime configuration file
    #[new]
    #[pyo3(signature = (export_dir, tags=None, library=None, config=None))]
    fn new(
        export_dir: &str,
        tags: Option<Vec<String>>,
        library: Option<PathBuf>,
        config: Option<PathBuf>,
    ) -> PyResult<Self> {
        let mut runtime_config = match config {
            Some(path) => RuntimeConfig::load(&path).map_err(to_py_err)?,
            None => RuntimeConfig::default(),
        };
        if library.is_some() {
            runtime_config.library.path = library;
        }
        if let Some(tags) = tags {
            runtime_config.bundle.tags = tags;
        }

        let runtime = NativeRuntime::from_config(&runtime_config.library).map_err(to_py_err)?;
        let options = SessionOptions::from(&runtime_config.session);
        let bundle = SavedModelBundle::load(
            &runtime,
            export_dir,
            &runtime_config.bundle.tag_refs(),
            &options,
        )
        .map_err(to_py_err)?;

        Ok(Self {
            export_dir: export_dir.to_string(),
            tags: runtime_config.bundle.tags,
            bundle,
        })
    }

    /// Same as the constructor
    #[staticmethod]
    #[pyo3(signature = (export_dir, tags=None, library=None, config=None))]
    fn load(
        export_dir: &str,
        tags: Option<Vec<String>>,
        library: Option<PathBuf>,
        config: Option<PathBuf>,
    ) -> PyResult<Self> {
        Self::new(export_dir, tags, library, config)
    }

    fn __repr__(&self) -> String {
        format!(
            "SavedModel(export_dir={:?}, tags={:?}, signatures={:?})",
            self.export_dir,
            self.tags,
            self.bundle.signature_names()
        )
    }

    /// Signature keys defined by the loaded meta graph
    fn signatures(&self) -> Vec<String> {
        self.bundle.signature_names()
    }

    /// Resolve a signature input key to its `OPNAME:INDEX` endpoint
    fn input_endpoint(&self, signature: &str, key: &str) -> PyResult<String> {
        Ok(self
            .bundle
            .input_endpoint(signature, key)
            .map_err(to_py_err)?
            .to_string())
    }

    /// Resolve a signature output key to its `OPNAME:INDEX` endpoint
    fn output_endpoint(&self, signature: &str, key: &str) -> PyResult<String> {
        Ok(self
            .bundle
            .output_endpoint(signature, key)
            .map_err(to_py_err)?
            .to_string())
    }

    /// Names of every operation in the loaded graph
    fn operation_names(&self) -> Vec<String> {
        self.bundle
            .graph
            .operations()
            .into_iter()
            .map(|op| op.name)
            .collect()
    }

    /// JSON summary of tags, TensorFlow version and signatures
    fn describe(&self) -> PyResult<String> {
        self.bundle
            .describe()
            .to_json()
            .map_err(|e| pyo3::exceptions::PyRuntimeError::new_err(e.to_string()))
    }

    /// Run a signature
    ///
    /// Args:
    ///     signature: Signature key, e.g. "regress_x_to_y"
    ///     inputs: Dict of input key to a list of bytes or a list of floats
    ///     outputs: Output keys to fetch
    ///
    /// Returns:
    ///     Dict of output key to a (shape, values) tuple
    fn run(
        &mut self,
        py: Python<'_>,
        signature: &str,
        inputs: &Bound<'_, PyDict>,
        outputs: Vec<String>,
    ) -> PyResult<Py<PyDict>> {
        let mut keys = Vec::with_capacity(inputs.len());
        let mut tensors = Vec::with_capacity(inputs.len());
        for (key, value) in inputs.iter() {
            let key: String = key.extract()?;
            tensors.push(tensor_from_py(&key, &value)?);
            keys.push(key);
        }
        let feeds: HashMap<&str, Tensor> = keys.iter().map(String::as_str).zip(tensors).collect();
        let fetches: Vec<&str> = outputs.iter().map(String::as_str).collect();

        let results = self
            .bundle
            .run_signature(signature, feeds, &fetches)
            .map_err(to_py_err)?;

        let dict = PyDict::new_bound(py);
        for (key, tensor) in &results {
            dict.set_item(key, tensor_to_py(py, tensor))?;
        }
        Ok(dict.unbind())
    }
}
