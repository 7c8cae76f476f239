//! Runtime configuration
//!
//! Parsed from a TOML file such as:
//!
//! ```toml
//! [library]
//! path = "/opt/tensorflow/lib/libtensorflow.so.2"
//!
//! [session]
//! intra_op_threads = 4
//! allow_soft_placement = true
//!
//! [bundle]
//! tags = ["serve"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::protos::tensorflow::ConfigProto;
use crate::runtime::SessionOptions;
use crate::saved_model::tag_constants;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub bundle: BundleConfig,
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path).map_err(|e| GraphError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, GraphError> {
        Ok(toml::from_str(content)?)
    }
}

/// Where to find `libtensorflow`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Explicit library path; the platform's default name is used otherwise
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub intra_op_threads: Option<i32>,
    #[serde(default)]
    pub inter_op_threads: Option<i32>,
    #[serde(default)]
    pub allow_soft_placement: bool,
    #[serde(default)]
    pub log_device_placement: bool,
}

impl SessionConfig {
    pub fn to_config_proto(&self) -> ConfigProto {
        ConfigProto {
            intra_op_parallelism_threads: self.intra_op_threads.unwrap_or_default(),
            inter_op_parallelism_threads: self.inter_op_threads.unwrap_or_default(),
            allow_soft_placement: self.allow_soft_placement,
            log_device_placement: self.log_device_placement,
            ..Default::default()
        }
    }
}

impl From<&SessionConfig> for SessionOptions {
    fn from(config: &SessionConfig) -> Self {
        let mut options = SessionOptions::new();
        if let Some(target) = &config.target {
            options = options.with_target(target.clone());
        }
        let proto = config.to_config_proto();
        // An all-default ConfigProto encodes to nothing; leave it unset then.
        if proto != ConfigProto::default() {
            options = options.with_config(&proto);
        }
        options
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Tag set identifying the meta graph to load
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            tags: default_tags(),
        }
    }
}

impl BundleConfig {
    pub fn tag_refs(&self) -> Vec<&str> {
        self.tags.iter().map(String::as_str).collect()
    }
}

fn default_tags() -> Vec<String> {
    vec![tag_constants::SERVE.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RuntimeConfig::from_toml_str("").unwrap();
        assert_eq!(config.library.path, None);
        assert_eq!(config.bundle.tags, vec!["serve".to_string()]);
        assert_eq!(SessionOptions::from(&config.session), SessionOptions::default());
    }

    #[test]
    fn test_full_config() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [library]
            path = "/opt/tf/libtensorflow.so.2"

            [session]
            target = "local"
            intra_op_threads = 4
            inter_op_threads = 2
            allow_soft_placement = true

            [bundle]
            tags = ["serve", "gpu"]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.library.path.as_deref(),
            Some(Path::new("/opt/tf/libtensorflow.so.2"))
        );
        assert_eq!(config.bundle.tag_refs(), vec!["serve", "gpu"]);

        let options = SessionOptions::from(&config.session);
        assert_eq!(options.target.as_deref(), Some("local"));
        let proto = ConfigProto::decode(options.config.as_slice()).unwrap();
        assert_eq!(proto.intra_op_parallelism_threads, 4);
        assert_eq!(proto.inter_op_parallelism_threads, 2);
        assert!(proto.allow_soft_placement);
        assert!(!proto.log_device_placement);
    }

    #[test]
    fn test_invalid_config() {
        let err = RuntimeConfig::from_toml_str("[session]\nintra_op_threads = \"many\"").unwrap_err();
        assert!(matches!(err, GraphError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tfbind.toml");
        std::fs::write(&path, "[bundle]\ntags = [\"train\"]\n").unwrap();
        let config = RuntimeConfig::load(&path).unwrap();
        assert_eq!(config.bundle.tags, vec!["train".to_string()]);

        let missing = RuntimeConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, GraphError::Io { .. }));
    }
}
