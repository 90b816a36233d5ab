//! Artifact assembly and storage.
//!
//! Renders a processed [`PipelineContext`] into the final artifact text and
//! owns every write into the artifact directory.
//!
//! Artifact layout:
//! ```text
//! ---
//! name: gsd.new-project
//! description: "..."
//! argument-hint: "..."        (only when the source has one)
//! tools: ['read', 'edit']     (omitted when the source declared no tools)
//! agent: agent
//! ---
//!
//! <!-- upstream-tools: ["Read","Write"] -->
//! <!-- omitted-tools: [...] (no target equivalent found) -->
//!
//! ## Runtime Adapter ...      (only when the question tool is mapped)
//!
//! <rewritten body>
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info};

use promptgen_shared::{ArtifactName, NamingConfig, PromptgenError, Result, TargetConfig};

use crate::pipeline::PipelineContext;

/// Assembled header fields and document text.
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Command name emitted in the artifact header.
    pub command_name: String,
    pub text: String,
}

/// Build the artifact text (LF line endings, one trailing newline).
pub fn render(ctx: &PipelineContext, naming: &NamingConfig, target: &TargetConfig) -> Rendered {
    let command_name = match ctx.header.name() {
        Some(name) => name.replace(':', "."),
        None => format!("{}.{}", naming.namespace, ctx.source.base_name()),
    };

    let description = ctx.header.description().map_or_else(
        || format!("{} command {command_name}", naming.namespace.to_uppercase()),
        String::from,
    );

    let mut header = vec![
        format!("name: {command_name}"),
        format!("description: \"{}\"", escape_yaml(&description)),
    ];
    if let Some(hint) = ctx.header.argument_hint() {
        header.push(format!("argument-hint: \"{}\"", escape_yaml(hint)));
    }
    if ctx.upstream_tools.is_some() {
        let quoted: Vec<String> = ctx.tools.iter().map(|t| format!("'{t}'")).collect();
        header.push(format!("tools: [{}]", quoted.join(", ")));
    }
    header.push(format!("agent: {}", target.agent));
    let header = format!("---\n{}\n---", header.join("\n"));

    let mut annotations = vec![upstream_tools_comment(ctx)];
    if !ctx.omitted.is_empty() {
        annotations.push(format!(
            "<!-- omitted-tools: {} (no target equivalent found) -->",
            json_list(&ctx.omitted)
        ));
    }

    let adapter = if ctx.tools.iter().any(|t| *t == target.question_tool) {
        adapter_block(target)
    } else {
        String::new()
    };

    let mut text = join_blocks(&[&header, &annotations.join("\n"), &adapter, &ctx.body]);
    text.push('\n');

    Rendered { command_name, text }
}

/// The audit annotation recording the source declaration verbatim.
fn upstream_tools_comment(ctx: &PipelineContext) -> String {
    match &ctx.upstream_tools {
        Some(decl) => format!("<!-- upstream-tools: {} -->", json_list(&decl.original)),
        None => "<!-- upstream-tools: null (field absent in upstream command) -->".to_string(),
    }
}

fn json_list(items: &[String]) -> String {
    serde_json::Value::from(items.to_vec()).to_string()
}

fn escape_yaml(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Instructions bridging the source runtime's question tool to the target's.
fn adapter_block(target: &TargetConfig) -> String {
    let token = target.adapter_token();
    format!(
        "## Runtime Adapter (important)

The upstream command may tell you to use an `AskUserQuestion` tool. That tool does not exist here.
Do not try to call it. Wherever the instructions say \"Use AskUserQuestion\", use **{token}** instead:

- Merge the **Header** and **Question** into one clear question.
- When **Options** are given, offer them as numbered choices.
- When no options are given, ask a freeform question.

**Rules:**
1. If the user picks an option like \"Other\" or \"Let me explain\", follow up with a freeform question via {token}.
2. Follow the upstream branching and loop rules exactly as written.
3. If the upstream flow says to stop and run another command, tell the user which slash command to run next, then stop.
4. Ask with {token} whenever input is needed; never guess the user's intent.

---"
    )
}

/// Join non-empty blocks with exactly one blank line between them.
pub fn join_blocks(blocks: &[&str]) -> String {
    blocks
        .iter()
        .map(|b| b.trim_end())
        .filter(|b| !b.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// What happened to an artifact on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

/// Write `content` to `path` via a temp file and rename.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PromptgenError::validation(format!("not a file path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| PromptgenError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| PromptgenError::io(path, e))?;
    Ok(())
}

/// Write one artifact, leaving byte-identical files untouched.
pub fn write_artifact(dir: &Path, name: &ArtifactName, content: &str) -> Result<WriteOutcome> {
    let path = dir.join(name.as_str());

    if let Ok(existing) = std::fs::read_to_string(&path) {
        if existing == content {
            debug!(artifact = %name, "artifact unchanged");
            return Ok(WriteOutcome::Unchanged);
        }
    }

    write_atomic(&path, content)?;
    debug!(artifact = %name, size = content.len(), "wrote artifact");
    Ok(WriteOutcome::Written)
}

/// Names of the artifacts currently in `dir`, sorted.
pub fn list_artifacts(dir: &Path, naming: &NamingConfig) -> Result<BTreeSet<String>> {
    if !dir.exists() {
        return Ok(BTreeSet::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| PromptgenError::io(dir, e))?;
    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| PromptgenError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if ArtifactName::matches_suffix(&name, naming) && entry.path().is_file() {
            names.insert(name);
        }
    }
    Ok(names)
}

/// Delete every artifact in `dir` not named in `expected`. Returns the
/// removed names.
pub fn remove_orphans(
    dir: &Path,
    expected: &BTreeSet<ArtifactName>,
    naming: &NamingConfig,
) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    for name in list_artifacts(dir, naming)? {
        if expected.contains(&ArtifactName::from(name.as_str())) {
            continue;
        }
        let path = dir.join(&name);
        std::fs::remove_file(&path).map_err(|e| PromptgenError::io(&path, e))?;
        info!(artifact = %name, "removed orphan");
        removed.push(name);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use promptgen_shared::{HeaderFields, SourceDocument, ToolDeclaration};

    use super::*;

    fn ctx(header: HeaderFields, tools: &[&str], body: &str) -> PipelineContext {
        let source = SourceDocument {
            path: PathBuf::from("/p/commands/gsd/plan-phase.md"),
            raw: String::new(),
        };
        let mut ctx = PipelineContext::new(&source);
        ctx.upstream_tools = header.tools.clone();
        ctx.header = header;
        ctx.tools = tools.iter().map(|s| s.to_string()).collect();
        ctx.body = body.to_string();
        ctx
    }

    fn render_default(ctx: &PipelineContext) -> String {
        render(ctx, &NamingConfig::default(), &TargetConfig::default()).text
    }

    #[test]
    fn defaults_when_header_is_empty() {
        let out = render_default(&ctx(HeaderFields::default(), &[], "Body\n"));
        assert_eq!(
            out,
            "---\nname: gsd.plan-phase\ndescription: \"GSD command gsd.plan-phase\"\nagent: agent\n---\n\n<!-- upstream-tools: null (field absent in upstream command) -->\n\nBody\n"
        );
    }

    #[test]
    fn name_colons_become_dots_and_values_are_escaped() {
        let mut header = HeaderFields::default();
        header.values.insert("name".into(), "gsd:plan-phase".into());
        header.values.insert("description".into(), r#"Plan "it" \ now"#.into());
        header.values.insert("argument-hint".into(), "[phase]".into());
        let out = render_default(&ctx(header, &[], "Body"));
        assert!(out.contains("name: gsd.plan-phase\n"));
        assert!(out.contains(r#"description: "Plan \"it\" \\ now""#));
        assert!(out.contains("argument-hint: \"[phase]\"\n"));
    }

    #[test]
    fn empty_declaration_emits_empty_tools_field() {
        let header = HeaderFields {
            tools: Some(ToolDeclaration::default()),
            ..Default::default()
        };
        let out = render_default(&ctx(header, &[], "Body"));
        assert!(out.contains("\ntools: []\n"));
        assert!(out.contains("<!-- upstream-tools: [] -->"));
    }

    #[test]
    fn populated_tools_and_adapter_block() {
        let header = HeaderFields {
            tools: Some(ToolDeclaration::new(vec!["Read".into(), "AskUserQuestion".into()])),
            ..Default::default()
        };
        let out = render_default(&ctx(header, &["read", "vscode/askQuestions"], "Body"));
        assert!(out.contains("\ntools: ['read', 'vscode/askQuestions']\n"));
        assert!(out.contains(r#"<!-- upstream-tools: ["Read","AskUserQuestion"] -->"#));
        assert!(out.contains("#tool:vscode/askQuestions"));
        assert!(out.ends_with("\n\nBody\n"));
    }

    #[test]
    fn omitted_tools_are_annotated() {
        let header = HeaderFields {
            tools: Some(ToolDeclaration::new(vec!["Glob".into()])),
            ..Default::default()
        };
        let mut c = ctx(header, &[], "Body");
        c.omitted = vec!["glob".into()];
        let out = render_default(&c);
        assert!(out.contains("<!-- omitted-tools: [\"glob\"] (no target equivalent found) -->"));
        assert!(!out.contains("#tool:"));
    }

    #[test]
    fn annotation_lists_are_json_escaped() {
        let header = HeaderFields {
            tools: Some(ToolDeclaration::new(vec!["Odd\"Tool".into(), "Read".into()])),
            ..Default::default()
        };
        let out = render_default(&ctx(header, &["read"], "Body"));
        assert!(out.contains(r#"<!-- upstream-tools: ["Odd\"Tool","Read"] -->"#));
    }

    #[test]
    fn join_blocks_single_blank_line() {
        assert_eq!(join_blocks(&["a\n\n", "", "  \n", "b"]), "a\n\nb");
    }

    #[test]
    fn write_artifact_reports_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let name = ArtifactName::from("gsd.x.prompt.md");
        assert_eq!(
            write_artifact(tmp.path(), &name, "a\n").unwrap(),
            WriteOutcome::Written
        );
        assert_eq!(
            write_artifact(tmp.path(), &name, "a\n").unwrap(),
            WriteOutcome::Unchanged
        );
        assert_eq!(
            write_artifact(tmp.path(), &name, "b\n").unwrap(),
            WriteOutcome::Written
        );
        // No temp files left behind.
        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["gsd.x.prompt.md"]);
    }

    #[test]
    fn remove_orphans_keeps_expected_and_foreign_files() {
        let tmp = tempfile::tempdir().unwrap();
        let naming = NamingConfig::default();
        for name in ["gsd.a.prompt.md", "gsd.b.prompt.md", "README.md"] {
            std::fs::write(tmp.path().join(name), "x").unwrap();
        }
        let expected = BTreeSet::from([ArtifactName::from("gsd.a.prompt.md")]);
        let removed = remove_orphans(tmp.path(), &expected, &naming).unwrap();
        assert_eq!(removed, vec!["gsd.b.prompt.md"]);
        assert!(tmp.path().join("README.md").exists());
        assert_eq!(
            list_artifacts(tmp.path(), &naming).unwrap(),
            BTreeSet::from(["gsd.a.prompt.md".to_string()])
        );
    }
}
