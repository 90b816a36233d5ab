//! Project configuration for promptgen.
//!
//! Project config lives at `<root>/promptgen.toml` and is optional.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PromptgenError, Result};

/// Default configuration file name, looked up at the project root.
pub const CONFIG_FILE_NAME: &str = "promptgen.toml";

// ---------------------------------------------------------------------------
// Config structs (matching promptgen.toml schema)
// ---------------------------------------------------------------------------

/// Top-level project config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where sources, artifacts, and the tool table live.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Artifact naming.
    #[serde(default)]
    pub naming: NamingConfig,

    /// Target-runtime vocabulary.
    #[serde(default)]
    pub target: TargetConfig,

    /// Verifier thresholds and markers.
    #[serde(default)]
    pub verify: VerifyConfig,
}

/// `[paths]` section. All paths are relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the source command documents.
    #[serde(default = "default_commands_dir")]
    pub commands_dir: String,

    /// Directory the artifacts are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Persisted tool-mapping table (JSON object).
    #[serde(default = "default_tool_table")]
    pub tool_table: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            commands_dir: default_commands_dir(),
            output_dir: default_output_dir(),
            tool_table: default_tool_table(),
        }
    }
}

fn default_commands_dir() -> String {
    "commands/gsd".into()
}
fn default_output_dir() -> String {
    ".github/prompts".into()
}
fn default_tool_table() -> String {
    "scripts/tools.json".into()
}

/// `[naming]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Namespace prefix of every artifact name (`<namespace>.<base>.<suffix>`).
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Artifact file suffix, without the leading dot.
    #[serde(default = "default_suffix")]
    pub suffix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            suffix: default_suffix(),
        }
    }
}

fn default_namespace() -> String {
    "gsd".into()
}
fn default_suffix() -> String {
    "prompt.md".into()
}

/// `[target]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Target-runtime tool providing interactive questions. Its presence in a
    /// mapped tool list triggers the adapter block.
    #[serde(default = "default_question_tool")]
    pub question_tool: String,

    /// Value of the fixed capability-routing header field.
    #[serde(default = "default_agent")]
    pub agent: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            question_tool: default_question_tool(),
            agent: default_agent(),
        }
    }
}

impl TargetConfig {
    /// The token the adapter block uses to invoke the question tool.
    pub fn adapter_token(&self) -> String {
        format!("#tool:{}", self.question_tool)
    }
}

fn default_question_tool() -> String {
    "vscode/askQuestions".into()
}
fn default_agent() -> String {
    "agent".into()
}

/// `[verify]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Fewer source documents than this raises a threshold warning.
    #[serde(default = "default_min_command_count")]
    pub min_command_count: usize,

    /// Marker blocks that must survive compilation when the source has them.
    #[serde(default = "default_structural_markers")]
    pub structural_markers: Vec<String>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            min_command_count: default_min_command_count(),
            structural_markers: default_structural_markers(),
        }
    }
}

fn default_min_command_count() -> usize {
    20
}
fn default_structural_markers() -> Vec<String> {
    vec!["<execution_context>".into()]
}

impl AppConfig {
    /// Absolute location of the source command directory.
    pub fn commands_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.paths.commands_dir)
    }

    /// Absolute location of the artifact directory.
    pub fn output_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.paths.output_dir)
    }

    /// Absolute location of the tool-mapping table.
    pub fn tool_table_path(&self, root: &Path) -> PathBuf {
        root.join(&self.paths.tool_table)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Path of the config file for a project root.
pub fn config_file_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

/// Load the project config. Returns defaults if the file does not exist.
pub fn load_config(root: &Path) -> Result<AppConfig> {
    let path = config_file_path(root);

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the project config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PromptgenError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PromptgenError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default config file at the project root.
/// Returns the path to the created file.
pub fn init_config(root: &Path) -> Result<PathBuf> {
    let path = config_file_path(root);
    if path.exists() {
        return Err(PromptgenError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| PromptgenError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PromptgenError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
