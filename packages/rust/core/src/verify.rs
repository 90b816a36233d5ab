//! Verifier: re-derives what the compiler would produce and checks it
//! against the artifacts on disk.
//!
//! Five checks run on every invocation:
//! - coverage: every source has an artifact (error)
//! - tool accuracy: the artifact's tool field matches the current table (error)
//! - structure: marker blocks and the question adapter survived (error)
//! - staleness: recomputed content hashes equal the on-disk ones (warning)
//! - threshold: the source count is not suspiciously low (warning)
//!
//! Nothing here writes to disk.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use promptgen_markdown::{frontmatter, to_lf};
use promptgen_shared::{
    AppConfig, ArtifactName, CheckKind, Diagnostic, PromptgenError, Result, SourceDocument,
};

use crate::compiler::{list_sources, resolve_root};
use crate::pipeline::{Pipeline, PipelineSettings, RunAccumulator};
use crate::tools::{PendingStubs, ToolTable, map_tools};

static UPSTREAM_TOOLS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!-- upstream-tools: (\[.*\]) -->").expect("valid regex"));

/// Options for a verify run.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub root: PathBuf,
    pub config: AppConfig,
}

/// Accumulated diagnostics of a verify run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    /// Artifacts that were found and checked.
    pub checked: Vec<String>,
}

impl VerifyReport {
    /// Warnings never fail a run.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Diagnostics grouped by check kind, kinds in first-seen order.
    pub fn grouped(diagnostics: &[Diagnostic]) -> Vec<(CheckKind, Vec<&Diagnostic>)> {
        let mut groups: Vec<(CheckKind, Vec<&Diagnostic>)> = Vec::new();
        for diag in diagnostics {
            match groups.iter_mut().find(|(kind, _)| *kind == diag.check) {
                Some((_, items)) => items.push(diag),
                None => groups.push((diag.check, vec![diag])),
            }
        }
        groups
    }

    /// Number of distinct check kinds that produced errors.
    pub fn error_kinds(&self) -> usize {
        Self::grouped(&self.errors).len()
    }

    /// Warnings of one kind.
    pub fn warnings_of(&self, kind: CheckKind) -> impl Iterator<Item = &Diagnostic> {
        self.warnings.iter().filter(move |d| d.check == kind)
    }

    fn error(&mut self, check: CheckKind, artifact: &ArtifactName, message: impl Into<String>) {
        self.errors.push(Diagnostic::new(check, artifact.as_str(), message));
    }

    fn warning(&mut self, check: CheckKind, artifact: &str, message: impl Into<String>) {
        self.warnings.push(Diagnostic::new(check, artifact, message));
    }
}

/// Run every check against the project at `opts.root`.
#[instrument(skip_all, fields(root = %opts.root.display()))]
pub fn verify(opts: &VerifyOptions) -> Result<VerifyReport> {
    let root = resolve_root(&opts.root)?;
    let config = &opts.config;
    let commands_dir = config.commands_dir(&root);
    let output_dir = config.output_dir(&root);
    let table = ToolTable::load(&config.tool_table_path(&root))?;

    let sources = list_sources(&commands_dir)?;
    let mut report = VerifyReport::default();

    if sources.len() < config.verify.min_command_count {
        report.warning(
            CheckKind::Threshold,
            "",
            format!(
                "found {} command file(s), expected at least {}; upstream commands may be missing",
                sources.len(),
                config.verify.min_command_count
            ),
        );
    }

    let settings = PipelineSettings::new(&root, config);
    let pipeline = Pipeline::read_only(&settings, &table);

    for path in &sources {
        let source = SourceDocument::read(path)?;
        let name = ArtifactName::for_source(&source, &config.naming);
        let artifact_path = output_dir.join(name.as_str());

        if !artifact_path.is_file() {
            report.error(
                CheckKind::Coverage,
                &name,
                format!("missing artifact for {}", source.file_name()),
            );
            continue;
        }

        let artifact = std::fs::read_to_string(&artifact_path)
            .map_err(|e| PromptgenError::io(&artifact_path, e))?;

        check_tools(&mut report, &name, &artifact, &table);
        check_structure(&mut report, &name, &source, &artifact, config);
        check_staleness(&mut report, &name, &source, &artifact, &pipeline);

        debug!(artifact = %name, "checked");
        report.checked.push(name.to_string());
    }

    info!(
        checked = report.checked.len(),
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "verify complete"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// Upstream tool names recorded in the artifact. `None` when the annotation
/// is missing or records an absent field.
fn recorded_upstream_tools(artifact: &str) -> Option<Vec<String>> {
    let caps = UPSTREAM_TOOLS_RE.captures(artifact)?;
    serde_json::from_str(&caps[1]).ok()
}

/// Tool names declared in the artifact header, sorted.
fn declared_tools(artifact: &str) -> Vec<String> {
    let parsed = frontmatter::parse(artifact);
    let mut tools = parsed.header.tools.map(|t| t.original).unwrap_or_default();
    tools.sort();
    tools
}

fn check_tools(report: &mut VerifyReport, name: &ArtifactName, artifact: &str, table: &ToolTable) {
    let Some(upstream) = recorded_upstream_tools(artifact) else {
        return;
    };

    let normalized: Vec<String> = upstream.iter().map(|t| t.to_lowercase()).collect();
    // Scratch stubs: the verifier never writes the table.
    let mut scratch = PendingStubs::default();
    let expected = map_tools(&normalized, table, &mut scratch).tools;
    let actual = declared_tools(artifact);

    if expected != actual {
        report.error(
            CheckKind::ToolAccuracy,
            name,
            format!("tools {actual:?} do not match expected {expected:?}"),
        );
    }
}

fn check_structure(
    report: &mut VerifyReport,
    name: &ArtifactName,
    source: &SourceDocument,
    artifact: &str,
    config: &AppConfig,
) {
    for marker in &config.verify.structural_markers {
        if source.raw.contains(marker.as_str()) && !artifact.contains(marker.as_str()) {
            report.error(
                CheckKind::Structure,
                name,
                format!("{marker} block present in source but missing from artifact"),
            );
        }
    }

    let question_tool = &config.target.question_tool;
    if declared_tools(artifact).iter().any(|t| t == question_tool) {
        let token = config.target.adapter_token();
        if !artifact.contains(&token) {
            report.error(
                CheckKind::Structure,
                name,
                format!("declares {question_tool} but has no {token} adapter"),
            );
        }
    }
}

fn check_staleness(
    report: &mut VerifyReport,
    name: &ArtifactName,
    source: &SourceDocument,
    artifact: &str,
    pipeline: &Pipeline<'_>,
) {
    let mut scratch = RunAccumulator::default();
    let ctx = pipeline.run(source, &mut scratch);
    if ctx.skip_write {
        return;
    }

    if content_hash(&ctx.output) != content_hash(artifact) {
        report.warning(
            CheckKind::Staleness,
            name.as_str(),
            "content differs from a fresh compile; re-run generate",
        );
    }
}

/// SHA-256 of the text with LF line endings.
fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(to_lf(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, SilentProgress, compile};
    use std::io::Write;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// In-memory log sink for asserting on emitted events.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a WARN-level subscriber and return what it logged.
    fn warnings_logged_by(f: impl FnOnce()) -> String {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    struct Project {
        tmp: tempfile::TempDir,
        config: AppConfig,
    }

    impl Project {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            std::fs::create_dir_all(tmp.path().join("commands/gsd")).unwrap();
            std::fs::create_dir_all(tmp.path().join("scripts")).unwrap();
            std::fs::write(
                tmp.path().join("scripts/tools.json"),
                "{\n  \"Read\": \"read\",\n  \"Write\": \"edit\",\n  \"AskUserQuestion\": \"vscode/askQuestions\"\n}\n",
            )
            .unwrap();
            let mut config = AppConfig::default();
            config.verify.min_command_count = 1;
            Self { tmp, config }
        }

        fn root(&self) -> &Path {
            self.tmp.path()
        }

        fn source(&self, name: &str, text: &str) {
            std::fs::write(self.root().join("commands/gsd").join(name), text).unwrap();
        }

        fn artifact_path(&self, name: &str) -> PathBuf {
            self.root().join(".github/prompts").join(name)
        }

        fn edit_artifact(&self, name: &str, edit: impl FnOnce(String) -> String) {
            let path = self.artifact_path(name);
            let text = std::fs::read_to_string(&path).unwrap();
            std::fs::write(&path, edit(text)).unwrap();
        }

        fn compile(&self) {
            let opts = CompileOptions {
                root: self.root().to_path_buf(),
                config: self.config.clone(),
                strict: false,
            };
            compile(&opts, &SilentProgress).unwrap();
        }

        fn verify(&self) -> VerifyReport {
            verify(&VerifyOptions {
                root: self.root().to_path_buf(),
                config: self.config.clone(),
            })
            .unwrap()
        }

        fn sample(&self) {
            self.source(
                "new-project.md",
                "---\nname: gsd:new-project\nallowed-tools:\n  - Read\n  - AskUserQuestion\n---\n<execution_context>\nctx\n</execution_context>\n\nAsk the user.\n",
            );
            self.source("help.md", "---\ndescription: Show help\n---\nHelp text\n");
        }
    }

    #[test]
    fn fresh_compile_passes() {
        let p = Project::new();
        p.sample();
        p.compile();

        let report = p.verify();
        assert!(report.is_success(), "{:?}", report.errors);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.checked, vec!["gsd.help.prompt.md", "gsd.new-project.prompt.md"]);
    }

    #[test]
    fn missing_artifact_is_coverage_error() {
        let p = Project::new();
        p.sample();
        p.compile();
        std::fs::remove_file(p.artifact_path("gsd.help.prompt.md")).unwrap();

        let report = p.verify();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].check, CheckKind::Coverage);
        assert_eq!(report.errors[0].artifact, "gsd.help.prompt.md");
    }

    #[test]
    fn hand_edited_body_is_one_staleness_warning() {
        let p = Project::new();
        p.sample();
        p.compile();
        p.edit_artifact("gsd.help.prompt.md", |t| t.replace("Help text", "Help texT"));

        let report = p.verify();
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        let stale: Vec<_> = report.warnings_of(CheckKind::Staleness).collect();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].artifact, "gsd.help.prompt.md");
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn line_endings_do_not_count_as_stale() {
        let p = Project::new();
        p.sample();
        p.compile();
        p.edit_artifact("gsd.help.prompt.md", |t| t.replace('\n', "\r\n"));

        let report = p.verify();
        assert!(report.is_success());
        assert_eq!(report.warnings_of(CheckKind::Staleness).count(), 0);
    }

    #[test]
    fn wrong_tool_field_is_accuracy_error() {
        let p = Project::new();
        p.sample();
        p.compile();
        p.edit_artifact("gsd.new-project.prompt.md", |t| {
            t.replace("tools: ['read', 'vscode/askQuestions']", "tools: ['read']")
        });

        let report = p.verify();
        assert!(!report.is_success());
        assert!(report.errors.iter().any(|d| d.check == CheckKind::ToolAccuracy));
        // Hand edits are also stale.
        assert_eq!(report.warnings_of(CheckKind::Staleness).count(), 1);
    }

    #[test]
    fn table_change_after_compile_is_accuracy_error() {
        let p = Project::new();
        p.sample();
        p.compile();
        std::fs::write(
            p.root().join("scripts/tools.json"),
            "{\n  \"Read\": \"search/read\",\n  \"AskUserQuestion\": \"vscode/askQuestions\"\n}\n",
        )
        .unwrap();

        let report = p.verify();
        let accuracy: Vec<_> = report
            .errors
            .iter()
            .filter(|d| d.check == CheckKind::ToolAccuracy)
            .collect();
        assert_eq!(accuracy.len(), 1);
        assert_eq!(accuracy[0].artifact, "gsd.new-project.prompt.md");
    }

    #[test]
    fn dropped_marker_is_structure_error() {
        let p = Project::new();
        p.sample();
        p.compile();
        p.edit_artifact("gsd.new-project.prompt.md", |t| {
            t.replace("<execution_context>", "<context>")
        });

        let report = p.verify();
        let structure: Vec<_> = report
            .errors
            .iter()
            .filter(|d| d.check == CheckKind::Structure)
            .collect();
        assert_eq!(structure.len(), 1);
        assert!(structure[0].message.contains("<execution_context>"));
    }

    #[test]
    fn missing_adapter_is_structure_error() {
        let p = Project::new();
        p.sample();
        p.compile();
        p.edit_artifact("gsd.new-project.prompt.md", |t| {
            t.replace("#tool:vscode/askQuestions", "the question tool")
        });

        let report = p.verify();
        assert!(report
            .errors
            .iter()
            .any(|d| d.check == CheckKind::Structure && d.message.contains("adapter")));
    }

    #[test]
    fn marker_check_skips_sources_without_marker() {
        let p = Project::new();
        p.source("plain.md", "No markers here\n");
        p.compile();
        assert!(p.verify().is_success());
    }

    #[test]
    fn low_source_count_is_threshold_warning() {
        let mut p = Project::new();
        p.config.verify.min_command_count = 5;
        p.sample();
        p.compile();

        let report = p.verify();
        assert!(report.is_success());
        assert_eq!(report.warnings_of(CheckKind::Threshold).count(), 1);
    }

    #[test]
    fn omitted_tools_warn_on_compile_but_not_on_verify() {
        let p = Project::new();
        p.source("a.md", "---\nallowed-tools: Read, Glob\n---\nBody\n");

        let compile_logs = warnings_logged_by(|| p.compile());
        assert_eq!(compile_logs.matches("unknown tool, omitted").count(), 1);

        let verify_logs = warnings_logged_by(|| {
            let report = p.verify();
            assert!(report.is_success(), "{:?}", report.errors);
        });
        assert!(!verify_logs.contains("omitted"), "{verify_logs}");
        assert!(!verify_logs.contains("WARN"), "{verify_logs}");
    }

    #[test]
    fn verify_never_writes() {
        let p = Project::new();
        p.source("a.md", "---\nallowed-tools: Glob\n---\nBody\n");
        let table_path = p.root().join("scripts/tools.json");
        let before = std::fs::read_to_string(&table_path).unwrap();

        let report = p.verify();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(std::fs::read_to_string(&table_path).unwrap(), before);
        assert!(!p.root().join(".github/prompts").exists());
    }

    #[test]
    fn grouping_keeps_first_seen_order() {
        let diags = vec![
            Diagnostic::new(CheckKind::Structure, "a", "x"),
            Diagnostic::new(CheckKind::Coverage, "b", "y"),
            Diagnostic::new(CheckKind::Structure, "c", "z"),
        ];
        let groups = VerifyReport::grouped(&diags);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, CheckKind::Structure);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, CheckKind::Coverage);
    }
}
