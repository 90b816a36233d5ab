//! Compiler driver: every source document → one artifact on disk.
//!
//! After all documents are processed, orphaned artifacts are deleted and
//! newly discovered tool names are written back to the tool table in a
//! single write.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument, warn};

use promptgen_markdown::FenceBalance;
use promptgen_markdown::rewrite::normalize;
use promptgen_shared::{AppConfig, ArtifactName, PromptgenError, Result, SourceDocument};

use crate::assembler::{self, WriteOutcome};
use crate::pipeline::{Pipeline, PipelineSettings, RunAccumulator};
use crate::tools::ToolTable;

/// Options for a compile run.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Project root (made absolute before use).
    pub root: PathBuf,
    pub config: AppConfig,
    /// Treat omitted tools as a failure.
    pub strict: bool,
}

/// A document whose artifact was not written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FenceFailure {
    pub artifact: String,
    /// Line of the unclosed fence in the assembled artifact.
    pub line: usize,
}

/// A file reference left unchanged because it resolves outside the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscapedRef {
    pub artifact: String,
    pub reference: String,
}

/// Summary of a compile run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompileReport {
    pub source_count: usize,
    pub output_dir: PathBuf,
    pub written: Vec<String>,
    pub unchanged: Vec<String>,
    pub fence_failures: Vec<FenceFailure>,
    pub removed_orphans: Vec<String>,
    pub escaped_refs: Vec<EscapedRef>,
    /// Tool names newly stubbed as `UNMAPPED` in the tool table.
    pub new_stubs: Vec<String>,
    /// Omitted tool occurrences (once per distinct name per document).
    pub omitted_total: usize,
    pub omitted_names: Vec<String>,
    pub strict: bool,
}

impl CompileReport {
    /// Whether the run should exit successfully.
    pub fn is_success(&self) -> bool {
        self.fence_failures.is_empty() && !(self.strict && self.omitted_total > 0)
    }
}

/// Progress callback for reporting compile status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a document is compiled.
    fn document(&self, name: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &CompileReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn document(&self, _name: &str, _current: usize, _total: usize) {}
    fn done(&self, _report: &CompileReport) {}
}

/// Source documents in `dir`: `*.md` files, sorted by name. A missing
/// directory yields nothing.
pub fn list_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| PromptgenError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PromptgenError::io(dir, e))?;
        let path = entry.path();
        let is_markdown = path.extension().is_some_and(|ext| ext == "md");
        if is_markdown && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Absolute, lexically normalized project root.
pub fn resolve_root(root: &Path) -> Result<PathBuf> {
    let abs = std::path::absolute(root).map_err(|e| PromptgenError::io(root, e))?;
    Ok(normalize(&abs))
}

/// Compile every source document into its artifact.
#[instrument(skip_all, fields(root = %opts.root.display(), strict = opts.strict))]
pub fn compile(opts: &CompileOptions, progress: &dyn ProgressReporter) -> Result<CompileReport> {
    let root = resolve_root(&opts.root)?;
    let config = &opts.config;
    let commands_dir = config.commands_dir(&root);
    let output_dir = config.output_dir(&root);
    let table_path = config.tool_table_path(&root);

    let table = ToolTable::load(&table_path)?;

    let sources = list_sources(&commands_dir)?;
    if sources.is_empty() {
        return Err(PromptgenError::validation(format!(
            "no command files found at {}",
            commands_dir.display()
        )));
    }

    std::fs::create_dir_all(&output_dir).map_err(|e| PromptgenError::io(&output_dir, e))?;

    let settings = PipelineSettings::new(&root, config);
    let pipeline = Pipeline::new(&settings, &table);
    let mut acc = RunAccumulator::default();
    let mut expected = BTreeSet::new();
    let mut report = CompileReport {
        source_count: sources.len(),
        output_dir: output_dir.clone(),
        strict: opts.strict,
        ..Default::default()
    };

    info!(count = sources.len(), dir = %commands_dir.display(), "compiling command files");

    for (i, path) in sources.iter().enumerate() {
        let source = SourceDocument::read(path)?;
        let name = ArtifactName::for_source(&source, &config.naming);
        progress.document(name.as_str(), i + 1, sources.len());

        let ctx = pipeline.run(&source, &mut acc);
        report
            .escaped_refs
            .extend(ctx.escaped_refs.iter().map(|reference| EscapedRef {
                artifact: name.to_string(),
                reference: reference.clone(),
            }));

        if let FenceBalance::Unclosed { line } = ctx.fences {
            report.fence_failures.push(FenceFailure {
                artifact: name.to_string(),
                line,
            });
        } else {
            match assembler::write_artifact(&output_dir, &name, &ctx.output)? {
                WriteOutcome::Written => report.written.push(name.to_string()),
                WriteOutcome::Unchanged => report.unchanged.push(name.to_string()),
            }
        }

        expected.insert(name);
    }

    report.removed_orphans =
        assembler::remove_orphans(&output_dir, &expected, &config.naming)?;

    if !acc.pending_stubs.is_empty() {
        let updated = table.with_stubs(acc.pending_stubs.iter());
        updated.save(&table_path)?;
        report.new_stubs = acc.pending_stubs.iter().map(String::from).collect();
        warn!(
            count = report.new_stubs.len(),
            path = %table_path.display(),
            "auto-stubbed unknown tools as UNMAPPED"
        );
    }

    report.omitted_total = acc.omitted_total;
    report.omitted_names = acc.omitted_names;

    info!(
        sources = report.source_count,
        written = report.written.len(),
        unchanged = report.unchanged.len(),
        fence_failures = report.fence_failures.len(),
        orphans_removed = report.removed_orphans.len(),
        "compile complete"
    );

    progress.done(&report);
    Ok(report)
}
