//! `OPNAME:INDEX` tensor endpoint names, as stored in `TensorInfo.name`.

use std::fmt;
use std::str::FromStr;

use crate::error::GraphError;

/// One output slot of a named graph node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorEndpoint {
    pub name: String,
    pub index: u32,
}

impl TensorEndpoint {
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl FromStr for TensorEndpoint {
    type Err = GraphError;

    fn from_str(endpoint: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| GraphError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };

        let parts: Vec<&str> = endpoint.split(':').collect();
        let [name, index] = parts.as_slice() else {
            return Err(invalid(format!(
                "expected exactly one ':' separator, found {}",
                parts.len() - 1
            )));
        };
        if name.is_empty() {
            return Err(invalid("operation name is empty".to_string()));
        }
        // u32::from_str accepts a leading '+'
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(format!(
                "output index `{index}` is not a non-negative integer"
            )));
        }
        let index = index
            .parse::<u32>()
            .map_err(|e| invalid(format!("output index `{index}`: {e}")))?;

        Ok(TensorEndpoint {
            name: name.to_string(),
            index,
        })
    }
}

impl fmt::Display for TensorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.index)
    }
}
