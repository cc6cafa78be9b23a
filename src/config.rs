//! Transcoding configuration
//!
//! Built-in defaults, optionally overlaid by a YAML file; the binary then
//! applies command-line overrides on top.

use crate::error::ConfigError;
use crate::sanitize::sanitize;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Config file name searched for when no explicit path is given
pub const CONFIG_FILE_NAME: &str = "json_to_openmetrics.yaml";

/// Directories searched, in order, for [`CONFIG_FILE_NAME`]
pub const CONFIG_SEARCH_DIRS: &[&str] = &[".", "../conf"];

/// What to do with an input file whose name breaks the filename contract
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenamePolicy {
    /// Abort the whole run on the first bad filename
    #[default]
    FailFast,
    /// Log the file, leave its stream untouched, and continue
    Skip,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Record field holding the event time
    pub time_field: String,

    /// strftime formats tried in order when parsing the time field
    pub time_formats: Vec<String>,

    /// Output file
    pub out: Option<PathBuf>,

    /// Watermark store
    pub positions_file: PathBuf,

    /// Echo every metric line to stdout and log verbosely
    pub debug: bool,

    /// Default label name used when a stream has no override
    pub default_label: String,

    /// Per-stream default label name overrides
    pub default_labelname: HashMap<String, String>,

    /// Label keys that may absorb a value key when they are the only labels
    pub common_label_names: BTreeSet<String>,

    pub filename_policy: FilenamePolicy,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        TranscodeConfig {
            time_field: String::from("time"),
            time_formats: vec![String::from("%Y-%m-%d")],
            out: None,
            positions_file: PathBuf::from("positions.yaml"),
            debug: false,
            default_label: String::from("table"),
            default_labelname: HashMap::new(),
            common_label_names: BTreeSet::new(),
            filename_policy: FilenamePolicy::FailFast,
        }
    }
}

impl TranscodeConfig {
    /// Parse a YAML document; keys not present keep their defaults
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|source| ConfigError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `explicit` if given, otherwise search [`CONFIG_SEARCH_DIRS`]
    ///
    /// Returns the configuration and the file it came from, if any. A missing
    /// file in the search path is not an error; an explicit path must exist.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let config = Self::from_yaml(&text, path)?;
            return Ok((config, Some(path.to_path_buf())));
        }

        for dir in CONFIG_SEARCH_DIRS {
            let path = Path::new(dir).join(CONFIG_FILE_NAME);
            match fs::read_to_string(&path) {
                Ok(text) => {
                    let config = Self::from_yaml(&text, &path)?;
                    return Ok((config, Some(path)));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(ConfigError::Read { path, source }),
            }
        }

        Ok((Self::default(), None))
    }

    /// Check settings required before any file is processed
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.out.as_deref().map_or(true, |p| p.as_os_str().is_empty()) {
            return Err(ConfigError::MissingOutput);
        }
        if self.time_formats.is_empty() {
            return Err(ConfigError::NoTimeFormats);
        }
        Ok(())
    }

    /// Default label name for `stream`
    ///
    /// Override keys match after sanitizing, like stream names do.
    pub fn default_label_for(&self, stream: &str) -> &str {
        if let Some(label) = self.default_labelname.get(stream) {
            return label;
        }
        let stream = sanitize(stream);
        self.default_labelname
            .iter()
            .find(|(name, _)| sanitize(name) == stream)
            .map(|(_, label)| label.as_str())
            .unwrap_or(&self.default_label)
    }

    /// True if the sanitized label `key` is one of the common label names
    pub fn is_common_label(&self, key: &str) -> bool {
        let key = sanitize(key);
        self.common_label_names.iter().any(|name| sanitize(name) == key)
    }
}
