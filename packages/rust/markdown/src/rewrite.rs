//! Body rewrites that make runtime paths and file references resolve
//! relative to the project root.
//!
//! Every rewrite is conservative: a reference that cannot be proven to point
//! at an existing file inside the root is left exactly as written.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

/// Runtime namespaces whose home/root-anchored directories are localized.
pub const RUNTIME_NAMESPACES: &[&str] = &["claude", "opencode", "gemini"];

static RUNTIME_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = RUNTIME_NAMESPACES.join("|");
    Regex::new(&format!(r"(~?)/\.({alternation})/")).expect("valid regex")
});

static PARENT_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\.\./[^\s"'`)>\]]+"#).expect("valid regex"));

static ANCHOR_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@([\w./][^\s"'`)>\]]*/[^\s"'`)>\]]*)"#).expect("valid regex")
});

// ---------------------------------------------------------------------------
// Include lines
// ---------------------------------------------------------------------------

/// Turn `@path` / `@include path` lines into `- Read file at: path` bullets.
///
/// Only lines whose first non-blank character is `@` are touched.
pub fn convert_includes(text: &str) -> String {
    text.split('\n')
        .map(|line| match include_target(line) {
            Some(path) => format!("- Read file at: {path}"),
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn include_target(line: &str) -> Option<&str> {
    let rest = line.trim_start_matches([' ', '\t']).strip_prefix('@')?;
    let rest = match rest.strip_prefix("include") {
        Some(after) if after.starts_with([' ', '\t']) && !after.trim().is_empty() => after,
        _ => rest,
    };
    let target = rest.trim();
    (!target.is_empty()).then_some(target)
}

// ---------------------------------------------------------------------------
// Runtime paths
// ---------------------------------------------------------------------------

/// Rewrite `~/.claude/...` and root-anchored `/.claude/...` to `./.claude/...`.
///
/// A root-anchored match must not be preceded by a path character, so
/// `./.claude/` and `some/dir/.claude/` stay as written.
pub fn normalize_runtime_paths(text: &str) -> String {
    RUNTIME_PATH_RE
        .replace_all(text, |caps: &Captures| {
            let whole = caps.get(0).expect("group 0 always present");
            let localized = format!("./.{}/", &caps[2]);
            if &caps[1] == "~" {
                return localized;
            }
            match text[..whole.start()].chars().next_back() {
                Some(prev) if is_path_char(prev) => whole.as_str().to_string(),
                _ => localized,
            }
        })
        .into_owned()
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | '~' | '$' | '}')
}

// ---------------------------------------------------------------------------
// File references
// ---------------------------------------------------------------------------

/// Result of a reference rewrite pass.
#[derive(Debug, Clone, Default)]
pub struct Rewritten {
    pub text: String,
    /// References that exist but resolve outside the project root. Left for
    /// the caller to log.
    pub escaped: Vec<String>,
}

/// Resolves `../` and `@dir/file` references for one source document.
#[derive(Debug, Clone)]
pub struct ReferenceRewriter {
    root: PathBuf,
    source_dir: PathBuf,
}

impl ReferenceRewriter {
    /// `root` and `source_dir` should be absolute.
    pub fn new(root: &Path, source_dir: &Path) -> Self {
        Self {
            root: normalize(root),
            source_dir: normalize(source_dir),
        }
    }

    /// Run both reference passes: parent-relative first, then anchored.
    pub fn rewrite(&self, text: &str) -> Rewritten {
        let mut escaped = Vec::new();
        let text = self.rewrite_parent_refs(text, &mut escaped);
        let text = self.rewrite_anchor_refs(&text);
        Rewritten { text, escaped }
    }

    fn rewrite_parent_refs(&self, text: &str, escaped: &mut Vec<String>) -> String {
        PARENT_REF_RE
            .replace_all(text, |caps: &Captures| {
                let whole = caps.get(0).expect("group 0 always present");
                let reference = whole.as_str();

                // `http://x/../y` and `a/../b` are not standalone references.
                if matches!(text[..whole.start()].chars().next_back(), Some(':' | '/')) {
                    return reference.to_string();
                }

                let target = normalize(&self.source_dir.join(reference));
                if !target.exists() {
                    return reference.to_string();
                }
                match self.root_relative(&target) {
                    Some(rel) => {
                        debug!(from = reference, to = %rel, "rewrote relative reference");
                        rel
                    }
                    None => {
                        escaped.push(reference.to_string());
                        reference.to_string()
                    }
                }
            })
            .into_owned()
    }

    fn rewrite_anchor_refs(&self, text: &str) -> String {
        ANCHOR_REF_RE
            .replace_all(text, |caps: &Captures| {
                let whole = caps.get(0).expect("group 0 always present");
                let prev = text[..whole.start()].chars().next_back();
                if prev.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-') {
                    return whole.as_str().to_string();
                }

                let reference = &caps[1];
                [&self.root, &self.source_dir]
                    .into_iter()
                    .map(|base| normalize(&base.join(reference)))
                    .find(|target| target.exists())
                    .and_then(|target| self.root_relative(&target))
                    .map(|rel| format!("@{rel}"))
                    .unwrap_or_else(|| whole.as_str().to_string())
            })
            .into_owned()
    }

    /// Slash-separated path of `target` relative to the root, if inside it.
    fn root_relative(&self, target: &Path) -> Option<String> {
        let rel = target.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        (!parts.is_empty()).then(|| parts.join("/"))
    }
}

/// Lexically resolve `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
