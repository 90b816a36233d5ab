//! Core domain types shared by the compiler and the verifier.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::NamingConfig;
use crate::error::{PromptgenError, Result};

// ---------------------------------------------------------------------------
// SourceDocument
// ---------------------------------------------------------------------------

/// One command-definition document, identified by its storage path.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Absolute path of the document.
    pub path: PathBuf,
    /// Raw UTF-8 text as read from disk.
    pub raw: String,
}

impl SourceDocument {
    /// Read a source document from disk.
    pub fn read(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path).map_err(|e| PromptgenError::io(&path, e))?;
        Ok(Self { path, raw })
    }

    /// File stem, e.g. `new-project` for `commands/gsd/new-project.md`.
    pub fn base_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name including extension, used in log lines.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Directory containing the document; relative references resolve against it.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// The tool declaration of a source header, in original casing.
///
/// `HeaderFields::tools == None` means the field was absent; an empty
/// `original` list means it was present but declared nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolDeclaration {
    pub original: Vec<String>,
}

impl ToolDeclaration {
    pub fn new(original: Vec<String>) -> Self {
        Self { original }
    }

    /// Lowercased names, used for case-insensitive table lookups.
    pub fn normalized(&self) -> Vec<String> {
        self.original.iter().map(|t| t.to_lowercase()).collect()
    }
}

/// Parsed header of a source document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    /// Scalar `key: value` pairs, quotes stripped.
    pub values: BTreeMap<String, String>,
    /// The tool list field, if the header declared one.
    pub tools: Option<ToolDeclaration>,
}

impl HeaderFields {
    /// Non-empty scalar value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name")
    }

    pub fn description(&self) -> Option<&str> {
        self.get("description")
    }

    pub fn argument_hint(&self) -> Option<&str> {
        self.get("argument-hint")
    }
}

// ---------------------------------------------------------------------------
// ArtifactName
// ---------------------------------------------------------------------------

/// Derived artifact identity: `<namespace>.<base>.<suffix>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactName(String);

impl ArtifactName {
    /// Artifact name for the source document with the given base name.
    pub fn for_base(base: &str, naming: &NamingConfig) -> Self {
        Self(format!("{}.{base}.{}", naming.namespace, naming.suffix))
    }

    pub fn for_source(source: &SourceDocument, naming: &NamingConfig) -> Self {
        Self::for_base(&source.base_name(), naming)
    }

    /// Whether a file name in the artifact directory looks like an artifact.
    pub fn matches_suffix(file_name: &str, naming: &NamingConfig) -> bool {
        file_name.ends_with(&format!(".{}", naming.suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtifactName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// The verifier check a diagnostic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckKind {
    Coverage,
    ToolAccuracy,
    Structure,
    Staleness,
    Threshold,
}

impl CheckKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Coverage => "coverage",
            Self::ToolAccuracy => "tool-accuracy",
            Self::Structure => "structure",
            Self::Staleness => "staleness",
            Self::Threshold => "threshold",
        }
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single verifier finding. `artifact` is empty for run-level findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub check: CheckKind,
    pub artifact: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(check: CheckKind, artifact: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            check,
            artifact: artifact.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.artifact.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.artifact, self.message)
        }
    }
}
