//! Reading SavedModel directories without the native runtime
//!
//! Useful for inspecting signatures before (or instead of) loading a bundle
//! into a session.

use std::collections::BTreeSet;
use std::path::Path;

use prost::Message;
use tracing::debug;

use crate::buffer::MAX_DECODE_LEN;
use crate::error::GraphError;
use crate::protos::tensorflow::{MetaGraphDef, SavedModel};

pub const SAVED_MODEL_FILENAME_PB: &str = "saved_model.pb";
pub const SAVED_MODEL_FILENAME_PBTXT: &str = "saved_model.pbtxt";

/// True if `export_dir` contains a SavedModel protocol buffer
pub fn is_saved_model_dir(export_dir: &Path) -> bool {
    export_dir.join(SAVED_MODEL_FILENAME_PB).is_file()
        || export_dir.join(SAVED_MODEL_FILENAME_PBTXT).is_file()
}

/// Read and decode `<export_dir>/saved_model.pb`
pub fn read_saved_model(export_dir: &Path) -> Result<SavedModel, GraphError> {
    let path = export_dir.join(SAVED_MODEL_FILENAME_PB);
    if !path.is_file() && export_dir.join(SAVED_MODEL_FILENAME_PBTXT).is_file() {
        return Err(GraphError::InvalidPath {
            value: export_dir.display().to_string(),
            reason: "only binary saved_model.pb files are supported".to_string(),
        });
    }
    let metadata = std::fs::metadata(&path).map_err(|e| GraphError::io(&path, e))?;
    let length = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
    if length > MAX_DECODE_LEN {
        return Err(GraphError::OversizedPayload {
            length,
            limit: MAX_DECODE_LEN,
        });
    }
    let bytes = std::fs::read(&path).map_err(|e| GraphError::io(&path, e))?;
    let saved_model = SavedModel::decode(bytes.as_slice())?;
    debug!(
        path = %path.display(),
        meta_graphs = saved_model.meta_graphs.len(),
        "read saved model"
    );
    Ok(saved_model)
}

/// Tags of one meta graph, empty when it has no `meta_info_def`
pub fn meta_graph_tags(meta_graph: &MetaGraphDef) -> Vec<String> {
    meta_graph
        .meta_info_def
        .as_ref()
        .map(|info| info.tags.clone())
        .unwrap_or_default()
}

/// Pick the meta graph whose tag set equals `tags` (order and duplicates
/// are ignored)
pub fn find_meta_graph(
    saved_model: SavedModel,
    export_dir: &Path,
    tags: &[&str],
) -> Result<MetaGraphDef, GraphError> {
    let wanted: BTreeSet<&str> = tags.iter().copied().collect();
    let mut available = Vec::new();
    for meta_graph in saved_model.meta_graphs {
        let graph_tags = meta_graph_tags(&meta_graph);
        let have: BTreeSet<&str> = graph_tags.iter().map(String::as_str).collect();
        if have == wanted {
            return Ok(meta_graph);
        }
        available.push(graph_tags);
    }
    Err(GraphError::MetaGraphNotFound {
        export_dir: export_dir.to_path_buf(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        available,
    })
}

/// Read the meta graph tagged `tags` from a SavedModel directory
pub fn load_meta_graph(export_dir: &Path, tags: &[&str]) -> Result<MetaGraphDef, GraphError> {
    let saved_model = read_saved_model(export_dir)?;
    find_meta_graph(saved_model, export_dir, tags)
}
