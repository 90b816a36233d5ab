//! Shared types, error model, and configuration for promptgen.
//!
//! This crate is the foundation depended on by all other promptgen crates.
//! It provides:
//! - [`PromptgenError`]: the unified error type
//! - Domain types ([`SourceDocument`], [`HeaderFields`], [`ArtifactName`], [`Diagnostic`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CONFIG_FILE_NAME, NamingConfig, PathsConfig, TargetConfig, VerifyConfig,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{PromptgenError, Result};
pub use types::{
    ArtifactName, CheckKind, Diagnostic, HeaderFields, SourceDocument, ToolDeclaration,
};
