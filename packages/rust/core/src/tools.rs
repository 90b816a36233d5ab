//! Tool-mapping table and the source → target tool-name mapper.
//!
//! The table is a flat JSON object persisted in the project
//! (`scripts/tools.json` by default): keys are source-runtime tool names in
//! their authored casing, values are target-runtime names or `"UNMAPPED"`.
//! Lookups are case-insensitive.

use std::collections::BTreeSet;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use promptgen_shared::{PromptgenError, Result};

use crate::assembler::write_atomic;

/// Sentinel value for tools with no target equivalent.
pub const UNMAPPED: &str = "UNMAPPED";

/// Tool names with this prefix are runtime-provided and pass through as-is.
pub const PASSTHROUGH_PREFIX: &str = "mcp__";

// ---------------------------------------------------------------------------
// ToolTable
// ---------------------------------------------------------------------------

/// Right-hand side of a table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolTarget {
    Mapped(String),
    Unmapped,
}

impl ToolTarget {
    fn from_value(value: &str) -> Self {
        if value == UNMAPPED {
            Self::Unmapped
        } else {
            Self::Mapped(value.to_string())
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Self::Mapped(name) => name,
            Self::Unmapped => UNMAPPED,
        }
    }
}

/// In-memory tool-mapping table, entries kept in on-disk order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolTable {
    entries: Vec<(String, ToolTarget)>,
}

impl ToolTable {
    /// Load the table from `path`.
    ///
    /// A missing file yields an empty table. An unreadable or malformed file
    /// is an error: a corrupt table must never be replaced by stub write-back.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "tool table not found, using empty table");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| PromptgenError::io(path, e))?;
        let table = Self::parse(&content).map_err(|msg| PromptgenError::tool_table(path, msg))?;
        debug!(path = %path.display(), entries = table.len(), "loaded tool table");
        Ok(table)
    }

    /// Parse the JSON form. Errors are plain messages; [`load`](Self::load)
    /// attaches the path.
    pub fn parse(json: &str) -> std::result::Result<Self, String> {
        let value: Value = serde_json::from_str(json).map_err(|e| format!("invalid JSON: {e}"))?;
        let Value::Object(map) = value else {
            return Err("expected a JSON object".into());
        };

        let entries = map
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(target) => Ok((key, ToolTarget::from_value(&target))),
                other => Err(format!("value for \"{key}\" must be a string, got {other}")),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { entries })
    }

    /// Case-insensitive lookup of a source tool name.
    pub fn lookup(&self, name: &str) -> Option<&ToolTarget> {
        let wanted = name.to_lowercase();
        self.entries
            .iter()
            .find(|(key, _)| key.to_lowercase() == wanted)
            .map(|(_, target)| target)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A copy with `stubs` appended as `UNMAPPED`. Existing entries keep
    /// their position and value.
    pub fn with_stubs<'a>(&self, stubs: impl IntoIterator<Item = &'a str>) -> Self {
        let mut merged = self.clone();
        for stub in stubs {
            if merged.lookup(stub).is_none() {
                merged.entries.push((stub.to_string(), ToolTarget::Unmapped));
            }
        }
        merged
    }

    /// Pretty-printed JSON with a trailing newline.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(key, target)| (key.clone(), Value::String(target.as_str().to_string())))
            .collect();
        let mut json = serde_json::to_string_pretty(&Value::Object(map))?;
        json.push('\n');
        Ok(json)
    }

    /// Persist the table atomically. Nothing is written if serialization
    /// fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self
            .to_json()
            .map_err(|e| PromptgenError::tool_table(path, format!("cannot serialize: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PromptgenError::io(parent, e))?;
        }
        write_atomic(path, &json)
    }
}

impl<K: Into<String>, V: AsRef<str>> FromIterator<(K, V)> for ToolTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), ToolTarget::from_value(v.as_ref())))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// PendingStubs
// ---------------------------------------------------------------------------

/// Tool names seen this run with no table entry, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingStubs(Vec<String>);

impl PendingStubs {
    /// Record `name`; returns `false` if it was already pending.
    pub fn insert(&mut self, name: &str) -> bool {
        if self.0.iter().any(|n| n == name) {
            return false;
        }
        self.0.push(name.to_string());
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Result of mapping one document's tool list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedTools {
    /// Target names, sorted and deduplicated.
    pub tools: Vec<String>,
    /// Distinct source names with no target equivalent, in declaration order.
    pub omitted: Vec<String>,
    /// The subset of `omitted` missing from the table entirely.
    pub unknown: Vec<String>,
}

/// Map lowercased source tool names to target names.
///
/// Names missing from the table are added to `pending`; names mapped to the
/// sentinel are omitted without being re-stubbed. Nothing is logged here:
/// callers decide how loudly to report omissions.
pub fn map_tools(names: &[String], table: &ToolTable, pending: &mut PendingStubs) -> MappedTools {
    let mut tools = BTreeSet::new();
    let mut omitted: Vec<String> = Vec::new();
    let mut unknown: Vec<String> = Vec::new();

    for name in names {
        if name.starts_with(PASSTHROUGH_PREFIX) {
            tools.insert(name.clone());
            continue;
        }

        match table.lookup(name) {
            Some(ToolTarget::Mapped(target)) => {
                tools.insert(target.clone());
                continue;
            }
            Some(ToolTarget::Unmapped) => {}
            None => {
                pending.insert(name);
                if !unknown.contains(name) {
                    unknown.push(name.clone());
                }
            }
        }

        if !omitted.contains(name) {
            omitted.push(name.clone());
        }
    }

    MappedTools {
        tools: tools.into_iter().collect(),
        omitted,
        unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ToolTable {
        [
            ("Read", "read"),
            ("Write", "edit"),
            ("AskUserQuestion", "vscode/askQuestions"),
            ("WebFetch", "web/fetch"),
            ("Task", UNMAPPED),
        ]
        .into_iter()
        .collect()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_rejects_non_object_and_non_string_values() {
        assert!(ToolTable::parse("[1, 2]").unwrap_err().contains("JSON object"));
        assert!(ToolTable::parse(r#"{"Read": 3}"#).unwrap_err().contains("\"Read\""));
        assert!(ToolTable::parse("{not json").unwrap_err().contains("invalid JSON"));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let t = table();
        assert_eq!(t.lookup("read"), Some(&ToolTarget::Mapped("read".into())));
        assert_eq!(t.lookup("READ"), t.lookup("Read"));
        assert_eq!(t.lookup("task"), Some(&ToolTarget::Unmapped));
        assert_eq!(t.lookup("nope"), None);
    }

    #[test]
    fn map_sorts_dedupes_and_passes_mcp_through() {
        let mut pending = PendingStubs::default();
        let mapped = map_tools(
            &names(&["write", "read", "mcp__context7__*", "read"]),
            &table(),
            &mut pending,
        );
        assert_eq!(mapped.tools, vec!["edit", "mcp__context7__*", "read"]);
        assert!(mapped.omitted.is_empty());
        assert!(pending.is_empty());
    }

    #[test]
    fn unknown_tools_are_stubbed_once_and_reported_once() {
        let mut pending = PendingStubs::default();
        let mapped = map_tools(
            &names(&["read", "glob", "glob", "task"]),
            &table(),
            &mut pending,
        );
        assert_eq!(mapped.tools, vec!["read"]);
        assert_eq!(mapped.omitted, vec!["glob", "task"]);
        assert_eq!(mapped.unknown, vec!["glob"]);
        assert_eq!(pending.iter().collect::<Vec<_>>(), vec!["glob"]);

        // A second document reports again but does not stub again.
        let mapped = map_tools(&names(&["glob"]), &table(), &mut pending);
        assert_eq!(mapped.omitted, vec!["glob"]);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn empty_input_maps_to_nothing() {
        let mut pending = PendingStubs::default();
        assert_eq!(
            map_tools(&[], &table(), &mut pending),
            MappedTools::default()
        );
    }

    #[test]
    fn with_stubs_preserves_existing_entries_and_order() {
        let t = table().with_stubs(["glob", "read", "grep"]);
        let json = t.to_json().unwrap();
        assert!(json.ends_with("}\n"));
        let read_at = json.find("\"Read\"").unwrap();
        let task_at = json.find("\"Task\"").unwrap();
        let glob_at = json.find("\"glob\"").unwrap();
        let grep_at = json.find("\"grep\"").unwrap();
        assert!(read_at < task_at && task_at < glob_at && glob_at < grep_at);
        assert!(json.contains("\"glob\": \"UNMAPPED\""));
        assert_eq!(t.len(), 7);
    }

    #[test]
    fn save_replaces_existing_table_with_full_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tools.json");
        std::fs::write(&path, "{\n  \"Read\": \"read\"\n}\n").unwrap();

        let t = table().with_stubs(["glob"]);
        t.save(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, t.to_json().unwrap());
        assert_ne!(written.trim(), "{}");
        assert_eq!(ToolTable::parse(&written).unwrap().len(), 6);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("scripts/tools.json");
        let t = table().with_stubs(["glob"]);
        t.save(&path).unwrap();
        assert_eq!(ToolTable::load(&path).unwrap(), t);
    }

    #[test]
    fn load_missing_is_empty_and_corrupt_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tools.json");
        assert!(ToolTable::load(&path).unwrap().is_empty());

        std::fs::write(&path, "{ \"Read\": ").unwrap();
        let err = ToolTable::load(&path).unwrap_err();
        assert!(matches!(err, PromptgenError::ToolTable { .. }));
    }
}
