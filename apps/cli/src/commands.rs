//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use promptgen_core::compiler::{self, CompileOptions, CompileReport, ProgressReporter};
use promptgen_core::verify::{self, VerifyOptions, VerifyReport};
use promptgen_shared::{AppConfig, Diagnostic, init_config, load_config, load_config_from};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// promptgen: compile agent command documents into prompt files.
#[derive(Parser)]
#[command(
    name = "promptgen",
    version,
    about = "Compile command documents into prompt artifacts for another agent runtime, and verify them.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Log verbosity (-d, -dd).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub debug: u8,

    /// Project root containing the command documents.
    #[arg(long, env = "PROMPTGEN_ROOT", default_value = ".", global = true)]
    pub root: PathBuf,

    /// Config file (defaults to <root>/promptgen.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Compile every command document into its prompt artifact.
    Generate {
        /// Fail when any declared tool had no target equivalent.
        #[arg(long)]
        strict: bool,

        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check the artifacts on disk against a fresh in-memory compile.
    Verify {
        /// Print a confirmation line per verified artifact.
        #[arg(long)]
        verbose: bool,

        /// Print the diagnostics as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so reports on
/// stdout stay machine-readable.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.debug {
        0 => "promptgen=info",
        1 => "promptgen=debug",
        _ => "promptgen=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate { strict, json } => {
            let config = resolve_config(&cli.root, cli.config.as_deref())?;
            cmd_generate(&cli.root, config, strict, json)
        }
        Command::Verify { verbose, json } => {
            let config = resolve_config(&cli.root, cli.config.as_deref())?;
            cmd_verify(&cli.root, config, verbose, json)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(&cli.root),
            ConfigAction::Show => {
                let config = resolve_config(&cli.root, cli.config.as_deref())?;
                cmd_config_show(&config)
            }
        },
    }
}

fn resolve_config(root: &Path, explicit: Option<&Path>) -> Result<AppConfig> {
    let config = match explicit {
        Some(path) => load_config_from(path)?,
        None => load_config(root)?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

fn cmd_generate(root: &Path, config: AppConfig, strict: bool, json: bool) -> Result<()> {
    info!(root = %root.display(), strict, "generating prompts");

    let opts = CompileOptions {
        root: root.to_path_buf(),
        config,
        strict,
    };
    let reporter = CliProgress::new();
    let report = compiler::compile(&opts, &reporter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_compile_summary(&report);
    }

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_compile_summary(report: &CompileReport) {
    for failure in &report.fence_failures {
        eprintln!(
            "  ✗ {}: unbalanced code fence opened at line {}, not written",
            failure.artifact, failure.line
        );
    }

    println!();
    println!(
        "  Generated {} prompt(s) in {}",
        report.written.len() + report.unchanged.len(),
        report.output_dir.display()
    );
    println!("  Written:   {}", report.written.len());
    println!("  Unchanged: {}", report.unchanged.len());
    if !report.removed_orphans.is_empty() {
        println!("  Removed:   {}", report.removed_orphans.join(", "));
    }
    for escaped in &report.escaped_refs {
        println!(
            "  Outside root: {} in {} (left unchanged)",
            escaped.reference, escaped.artifact
        );
    }
    if report.omitted_total > 0 {
        println!(
            "  Omitted:   {} tool reference(s) with no target equivalent ({})",
            report.omitted_total,
            report.omitted_names.join(", ")
        );
    }
    if !report.new_stubs.is_empty() {
        println!(
            "  Stubbed:   {} new tool(s) as UNMAPPED: {}",
            report.new_stubs.len(),
            report.new_stubs.join(", ")
        );
    }
    println!();

    if !report.fence_failures.is_empty() {
        eprintln!("{} file(s) failed fence validation", report.fence_failures.len());
    }
    if report.strict && report.omitted_total > 0 {
        eprintln!("--strict: {} tool reference(s) omitted", report.omitted_total);
    }
}

// ---------------------------------------------------------------------------
// verify
// ---------------------------------------------------------------------------

fn cmd_verify(root: &Path, config: AppConfig, verbose: bool, json: bool) -> Result<()> {
    info!(root = %root.display(), "verifying prompts");

    let report = verify::verify(&VerifyOptions {
        root: root.to_path_buf(),
        config,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_verify_report(&report, verbose);
    }

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_verify_report(report: &VerifyReport, verbose: bool) {
    print_groups(&report.warnings, "warning");
    print_groups(&report.errors, "error");

    if !report.is_success() {
        eprintln!(
            "{} error(s) across {} check type(s)",
            report.errors.len(),
            report.error_kinds()
        );
        return;
    }

    if verbose {
        for name in &report.checked {
            println!("  ✓ {name}");
        }
    }
    println!("All checks passed ({} prompts verified)", report.checked.len());
}

fn print_groups(diagnostics: &[Diagnostic], level: &str) {
    for (kind, items) in VerifyReport::grouped(diagnostics) {
        eprintln!("[{kind}] {} {level}(s):", items.len());
        for diag in items {
            eprintln!("  - {diag}");
        }
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid progress template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn document(&self, name: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Compiling [{current}/{total}] {name}"));
    }

    fn done(&self, _report: &CompileReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init(root: &Path) -> Result<()> {
    let path = init_config(root)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
