//! Python bindings for loading and running SavedModel bundles

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::endpoint::TensorEndpoint;
use crate::error::GraphError;

mod bundle;

pub use bundle::PySavedModel;

pub(crate) fn to_py_err(err: GraphError) -> PyErr {
    match err {
        GraphError::InvalidEndpoint { .. }
        | GraphError::SignatureNotFound { .. }
        | GraphError::SignatureKeyNotFound { .. }
        | GraphError::UnsupportedDataType { .. }
        | GraphError::TensorShapeMismatch { .. }
        | GraphError::InvalidPath { .. } => PyValueError::new_err(err.to_string()),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

/// Split an `OPNAME:INDEX` endpoint into its name and output index
///
/// Raises:
///     ValueError: if the endpoint is malformed
#[pyfunction]
fn parse_endpoint(endpoint: &str) -> PyResult<(String, u32)> {
    let parsed: TensorEndpoint = endpoint.parse().map_err(to_py_err)?;
    Ok((parsed.name, parsed.index))
}

/// TensorFlow SavedModel Python module
#[pymodule]
fn _tfbind(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PySavedModel>()?;
    m.add_function(wrap_pyfunction!(parse_endpoint, m)?)?;
    m.add("MAX_DECODE_LEN", crate::buffer::MAX_DECODE_LEN)?;
    Ok(())
}
