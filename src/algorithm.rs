//! Analysis algorithms
//!
//! The catalog of algorithms the backend can run, and the per-session
//! selection record that carries the user's choices and supplementary files.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Static description of an algorithm offered by the backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmSpec {
    /// Identifier used in `signal_start/{id}` and as the multipart field name.
    pub id: String,

    /// Human readable name shown in progress messages.
    pub name: String,

    /// Whether the algorithm needs a supplementary file besides the APK.
    #[serde(default)]
    pub requires_additional_input: bool,

    /// Accepted supplementary file extensions, e.g. `[".gif"]`. Empty accepts anything.
    #[serde(default)]
    pub accepted_file_types: Vec<String>,
}

impl AlgorithmSpec {
    fn new(id: &str, name: &str, accepted: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            requires_additional_input: !accepted.is_empty(),
            accepted_file_types: accepted.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Algorithms known to the analysis backend.
pub fn default_catalog() -> Vec<AlgorithmSpec> {
    vec![
        AlgorithmSpec::new("storydistiller", "StoryDistiller", &[]),
        AlgorithmSpec::new("xbot", "Xbot", &[]),
        AlgorithmSpec::new("owleye", "OwlEye", &[]),
        AlgorithmSpec::new("tappability", "Tappability", &[]),
        AlgorithmSpec::new("gifdroid", "GifDroid", &[".gif"]),
        AlgorithmSpec::new("uichecker", "UI Checker", &[".json"]),
    ]
}

/// A supplementary input file collected for one algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplementaryFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SupplementaryFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// One algorithm's entry in the submission state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmSelection {
    pub id: String,
    pub name: String,
    pub selected: bool,
    pub requires_additional_input: bool,
    pub accepted_file_types: Vec<String>,

    /// Attached files, append-only until submission.
    pub files: Vec<SupplementaryFile>,
}

impl AlgorithmSelection {
    /// Returns true if `file_name` passes this algorithm's file-type filter.
    pub fn accepts(&self, file_name: &str) -> bool {
        if self.accepted_file_types.is_empty() {
            return true;
        }
        let lower = file_name.to_lowercase();
        self.accepted_file_types.iter().any(|ext| {
            let ext = ext.to_lowercase();
            if ext.starts_with('.') {
                lower.ends_with(&ext)
            } else {
                lower.ends_with(&format!(".{}", ext))
            }
        })
    }

    /// The file transmitted for this algorithm. Only the first attachment is sent.
    pub fn primary_file(&self) -> Option<&SupplementaryFile> {
        self.files.first()
    }

    /// Selected, needs extra input and has none yet.
    pub fn is_missing_input(&self) -> bool {
        self.selected && self.requires_additional_input && self.files.is_empty()
    }
}

impl From<&AlgorithmSpec> for AlgorithmSelection {
    fn from(spec: &AlgorithmSpec) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.name.clone(),
            selected: false,
            requires_additional_input: spec.requires_additional_input,
            accepted_file_types: spec.accepted_file_types.clone(),
            files: Vec::new(),
        }
    }
}

impl Display for AlgorithmSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.requires_additional_input {
            write!(
                f,
                "{:<16} {:<16} requires {}",
                self.id,
                self.name,
                self.accepted_file_types.join(", ")
            )
        } else {
            write!(f, "{:<16} {}", self.id, self.name)
        }
    }
}
