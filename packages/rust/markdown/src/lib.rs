//! Text passes over command documents.
//!
//! Everything here is pure string processing except the reference rewriter,
//! which checks file existence before touching a reference:
//! - [`frontmatter`]: restricted header parser
//! - [`eol`]: line-ending detection and restoration
//! - [`rewrite`]: include bullets, runtime-path localization, reference resolution
//! - [`fences`]: fenced code block balance check

pub mod eol;
pub mod fences;
pub mod frontmatter;
pub mod rewrite;

pub use eol::{LineEnding, to_lf};
pub use fences::{FenceBalance, check_fences};
pub use frontmatter::{ParseAnomaly, ParsedDocument, TOOL_KEYS};
pub use rewrite::{ReferenceRewriter, Rewritten, convert_includes, normalize_runtime_paths};
