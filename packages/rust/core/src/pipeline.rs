//! Per-document pipeline: source document → artifact text.
//!
//! Stages run in a fixed order, each taking and returning the document's
//! [`PipelineContext`]:
//!
//! 1. parse header
//! 2. normalize line endings to LF
//! 3. parse tool declarations (original casing + lowercased)
//! 4. map tools
//! 5. convert include lines
//! 6. localize runtime paths
//! 7. rewrite file references
//! 8. assemble the artifact
//! 9. restore the source line-ending convention
//! 10. validate fences
//!
//! Cross-document state (pending stubs, omitted-name totals) lives in a
//! [`RunAccumulator`] passed in by the caller.

use std::path::{Path, PathBuf};

use tracing::{debug, error, instrument, warn};

use promptgen_markdown::{
    FenceBalance, LineEnding, ReferenceRewriter, check_fences, convert_includes, frontmatter,
    normalize_runtime_paths, to_lf,
};
use promptgen_shared::{
    AppConfig, HeaderFields, NamingConfig, SourceDocument, TargetConfig, ToolDeclaration,
};

use crate::assembler;
use crate::tools::{PendingStubs, ToolTable, map_tools};

/// Settings shared by every document of a run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Absolute project root; references are rewritten relative to it.
    pub root: PathBuf,
    pub naming: NamingConfig,
    pub target: TargetConfig,
}

impl PipelineSettings {
    pub fn new(root: &Path, config: &AppConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            naming: config.naming.clone(),
            target: config.target.clone(),
        }
    }
}

/// State accumulated across all documents of one run.
#[derive(Debug, Clone, Default)]
pub struct RunAccumulator {
    /// Tool names missing from the table, flushed once after the run.
    pub pending_stubs: PendingStubs,
    /// Distinct omitted tool names across documents.
    pub omitted_names: Vec<String>,
    /// Omitted tool occurrences, counted once per document.
    pub omitted_total: usize,
}

/// The unit of work for one document.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub source: SourceDocument,
    pub header: HeaderFields,
    /// Evolving body; LF line endings from stage 2 on.
    pub body: String,
    pub eol: LineEnding,
    /// Tool declaration in original casing; `None` when absent.
    pub upstream_tools: Option<ToolDeclaration>,
    /// Lowercased tool names used for lookups; `None` when absent.
    pub normalized_tools: Option<Vec<String>>,
    /// Mapped target tool names, sorted.
    pub tools: Vec<String>,
    /// Source tool names with no target equivalent.
    pub omitted: Vec<String>,
    /// References left unchanged because they resolve outside the root.
    pub escaped_refs: Vec<String>,
    pub command_name: String,
    /// Final artifact text in the source line-ending convention.
    pub output: String,
    pub fences: FenceBalance,
    pub skip_write: bool,
}

impl PipelineContext {
    pub fn new(source: &SourceDocument) -> Self {
        Self {
            source: source.clone(),
            header: HeaderFields::default(),
            body: String::new(),
            eol: LineEnding::default(),
            upstream_tools: None,
            normalized_tools: None,
            tools: Vec::new(),
            omitted: Vec::new(),
            escaped_refs: Vec::new(),
            command_name: String::new(),
            output: String::new(),
            fences: FenceBalance::Balanced,
            skip_write: false,
        }
    }
}

/// Logs at `warn` on a writing run and at `debug` on a read-only re-run.
macro_rules! notice {
    ($pipeline:expr, $($arg:tt)+) => {
        if $pipeline.read_only {
            debug!($($arg)+)
        } else {
            warn!($($arg)+)
        }
    };
}

/// Runs the stage sequence for one document at a time.
pub struct Pipeline<'a> {
    settings: &'a PipelineSettings,
    table: &'a ToolTable,
    read_only: bool,
}

impl<'a> Pipeline<'a> {
    /// Pipeline for a compile run; per-document problems are logged as
    /// warnings.
    pub fn new(settings: &'a PipelineSettings, table: &'a ToolTable) -> Self {
        Self {
            settings,
            table,
            read_only: false,
        }
    }

    /// Pipeline for an in-memory re-run whose output is never written.
    /// Per-document problems are logged at debug level only.
    pub fn read_only(settings: &'a PipelineSettings, table: &'a ToolTable) -> Self {
        Self {
            read_only: true,
            ..Self::new(settings, table)
        }
    }

    /// Transform one source document. Never fails: per-document problems are
    /// recorded on the returned context.
    #[instrument(skip_all, fields(source = %source.file_name()))]
    pub fn run(&self, source: &SourceDocument, acc: &mut RunAccumulator) -> PipelineContext {
        let ctx = PipelineContext::new(source);
        let ctx = self.parse_header(ctx);
        let ctx = normalize_eol(ctx);
        let ctx = parse_tools(ctx);
        let ctx = self.map_tools(ctx, acc);
        let ctx = rewrite_includes(ctx);
        let ctx = localize_runtime_paths(ctx);
        let ctx = self.rewrite_references(ctx);
        let ctx = self.assemble(ctx);
        let ctx = restore_eol(ctx);
        self.validate_fences(ctx)
    }

    fn parse_header(&self, mut ctx: PipelineContext) -> PipelineContext {
        let parsed = frontmatter::parse(&ctx.source.raw);
        for anomaly in &parsed.anomalies {
            notice!(
                self,
                document = %ctx.source.file_name(),
                line = anomaly.line,
                text = %anomaly.text,
                "unexpected line in tools block, skipped"
            );
        }
        ctx.header = parsed.header;
        ctx.body = parsed.body;
        ctx
    }

    fn map_tools(&self, mut ctx: PipelineContext, acc: &mut RunAccumulator) -> PipelineContext {
        let names = ctx.normalized_tools.as_deref().unwrap_or_default();
        let mapped = map_tools(names, self.table, &mut acc.pending_stubs);

        for name in &mapped.omitted {
            if mapped.unknown.contains(name) {
                notice!(self, tool = %name, document = %ctx.source.file_name(), "unknown tool, omitted");
            } else {
                notice!(
                    self,
                    tool = %name,
                    document = %ctx.source.file_name(),
                    "tool is UNMAPPED in tool table, omitted"
                );
            }
        }

        acc.omitted_total += mapped.omitted.len();
        for name in &mapped.omitted {
            if !acc.omitted_names.contains(name) {
                acc.omitted_names.push(name.clone());
            }
        }

        ctx.tools = mapped.tools;
        ctx.omitted = mapped.omitted;
        ctx
    }

    fn rewrite_references(&self, mut ctx: PipelineContext) -> PipelineContext {
        let rewriter = ReferenceRewriter::new(&self.settings.root, ctx.source.dir());
        let rewritten = rewriter.rewrite(&ctx.body);
        for reference in &rewritten.escaped {
            notice!(
                self,
                document = %ctx.source.file_name(),
                reference = %reference,
                "reference resolves outside project root"
            );
        }
        ctx.body = rewritten.text;
        ctx.escaped_refs = rewritten.escaped;
        ctx
    }

    fn validate_fences(&self, mut ctx: PipelineContext) -> PipelineContext {
        ctx.fences = check_fences(&ctx.output);
        if let FenceBalance::Unclosed { line } = ctx.fences {
            if self.read_only {
                debug!(document = %ctx.source.file_name(), line, "unbalanced fenced code block");
            } else {
                error!(
                    document = %ctx.source.file_name(),
                    line,
                    "unbalanced fenced code block in output, file not written"
                );
            }
            ctx.skip_write = true;
        }
        ctx
    }

    fn assemble(&self, mut ctx: PipelineContext) -> PipelineContext {
        let rendered = assembler::render(&ctx, &self.settings.naming, &self.settings.target);
        ctx.command_name = rendered.command_name;
        ctx.output = rendered.text;
        ctx
    }
}

// ---------------------------------------------------------------------------
// Stages without run-level inputs
// ---------------------------------------------------------------------------

fn normalize_eol(mut ctx: PipelineContext) -> PipelineContext {
    ctx.eol = LineEnding::detect(&ctx.source.raw);
    ctx.body = to_lf(&ctx.body);
    ctx
}

fn parse_tools(mut ctx: PipelineContext) -> PipelineContext {
    ctx.upstream_tools = ctx.header.tools.clone();
    ctx.normalized_tools = ctx.upstream_tools.as_ref().map(ToolDeclaration::normalized);
    ctx
}

fn rewrite_includes(mut ctx: PipelineContext) -> PipelineContext {
    ctx.body = convert_includes(&ctx.body);
    ctx
}

fn localize_runtime_paths(mut ctx: PipelineContext) -> PipelineContext {
    ctx.body = normalize_runtime_paths(&ctx.body);
    ctx
}

fn restore_eol(mut ctx: PipelineContext) -> PipelineContext {
    ctx.output = ctx.eol.apply(&ctx.output);
    ctx
}
