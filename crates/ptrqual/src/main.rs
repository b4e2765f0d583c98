//! The ptrqual command-line driver.
//!
//! Reads fact files produced by the extraction front end (JSON arrays, one
//! per translation unit), runs whole-program inference over all of them,
//! and reports:
//!
//! - `ptrqual solve <facts>...` - per-file qualifier statistics
//! - `ptrqual wild <facts>...` - WILD root causes, worst first
//! - `ptrqual retract <facts>... --var N` - what retracting a root cause frees
//!
//! Options:
//! - `--config` - Options file (TOML); flags override it
//! - `--json` - Machine-readable output
//! - `--dump-json` - Write the constraint set and variable store to a file
//! - `--verbose` - Debug logging (`RUST_LOG` takes precedence) and the
//!   analysis settings above the statistics table
//! - `--no-color` - Disable colorized output

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use ptrqual_common::SourceLoc;
use ptrqual_infer::diagnostics::{render_wild_root, render_wild_root_plain};
use ptrqual_infer::{Fact, Options, Retraction, Session, VarId};

#[derive(Parser)]
#[command(name = "ptrqual", version, about = "Checked-pointer qualifier inference")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Common {
    /// Fact files, one JSON array per translation unit
    #[arg(required = true)]
    facts: Vec<PathBuf>,

    /// Options file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Force arguments passed through `...` to Wild
    #[arg(long = "handle-varargs")]
    handle_varargs: bool,

    /// Do not link declarations of the same function across files
    #[arg(long = "separate-decls")]
    separate_decls: bool,

    /// Trusted bodiless function (repeatable; replaces the configured list)
    #[arg(long = "safe-extern")]
    safe_extern: Vec<String>,

    /// Upper bound on solve/reconcile rounds
    #[arg(long = "max-rounds")]
    max_rounds: Option<usize>,

    /// Output as JSON instead of human-readable text
    #[arg(long)]
    json: bool,

    /// Write the constraint set and variable store to this file
    #[arg(long = "dump-json")]
    dump_json: Option<PathBuf>,

    /// Debug logging, and print the analysis settings with the statistics
    #[arg(short, long)]
    verbose: bool,

    /// Disable colorized output
    #[arg(long = "no-color")]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve and print per-file statistics
    Solve {
        #[command(flatten)]
        common: Common,
    },
    /// Solve and list WILD root causes
    Wild {
        #[command(flatten)]
        common: Common,

        /// Directory source locations are relative to
        #[arg(long = "source-root")]
        source_root: Option<PathBuf>,

        /// Show at most this many root causes
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Solve, then speculatively retract the constraint forcing a slot Wild
    Retract {
        #[command(flatten)]
        common: Common,

        /// Solver slot to retract (as printed, without the `q`)
        #[arg(long)]
        var: u32,

        /// Retract every constraint sharing the reason
        #[arg(long = "by-reason")]
        by_reason: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Commands::Solve { common }
        | Commands::Wild { common, .. }
        | Commands::Retract { common, .. } => common.verbose,
    };
    init_tracing(verbose);

    let result = match cli.command {
        Commands::Solve { common } => solve(&common),
        Commands::Wild {
            common,
            source_root,
            limit,
        } => wild(&common, source_root.as_deref(), limit),
        Commands::Retract {
            common,
            var,
            by_reason,
        } => retract(&common, VarId(var), by_reason),
    };
    if let Err(e) = result {
        eprintln!("error: {:#}", e);
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// File options with command-line overrides applied.
fn load_options(common: &Common) -> Result<Options> {
    let mut opts = match &common.config {
        Some(path) => Options::from_file(path)?,
        None => Options::default(),
    };
    opts.handle_varargs |= common.handle_varargs;
    opts.separate_multiple_func_decls |= common.separate_decls;
    opts.verbose |= common.verbose;
    if !common.safe_extern.is_empty() {
        opts.safe_externs = common.safe_extern.clone();
    }
    if let Some(n) = common.max_rounds {
        opts.max_reconcile_rounds = n;
    }
    Ok(opts)
}

fn load_facts(paths: &[PathBuf]) -> Result<Vec<Fact>> {
    let mut all = Vec::new();
    for path in paths {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        let facts = ptrqual_infer::parse_facts(&text)
            .with_context(|| format!("failed to parse facts in '{}'", path.display()))?;
        debug!(file = %path.display(), facts = facts.len(), "loaded facts");
        all.extend(facts);
    }
    Ok(all)
}

/// Load, build, and solve; optionally dump the result.
fn run(common: &Common) -> Result<Session> {
    let opts = load_options(common)?;
    let facts = load_facts(&common.facts)?;
    let session = Session::new(opts);
    session.build(&facts).context("building constraints")?;
    session.solve().context("solving constraints")?;
    if let Some(path) = &common.dump_json {
        let dump = serde_json::to_string_pretty(&session.dump_json())?;
        std::fs::write(path, dump)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
    }
    Ok(session)
}

fn solve(common: &Common) -> Result<()> {
    let session = run(common)?;
    let stats = session.stats();
    if common.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print!("{}", stats.render());
    }
    Ok(())
}

fn wild(common: &Common, source_root: Option<&Path>, limit: Option<usize>) -> Result<()> {
    let session = run(common)?;
    let Some(ds) = session.disjoint() else {
        return Ok(());
    };
    let report = ds.report();
    if common.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} of {} Wild pointer slots are forced directly",
        report.real_wild, report.total_wild
    );
    let color = !common.no_color;
    for group in report.groups.iter().take(limit.unwrap_or(usize::MAX)) {
        let root = &group.root;
        let loc: Option<SourceLoc> = root
            .loc
            .clone()
            .or_else(|| ds.source_of(root.var).map(|k| k.loc()));
        let affected = group.indirect.len();
        let source = loc.as_ref().and_then(|l| {
            let path = match source_root {
                Some(dir) => dir.join(&l.file),
                None => PathBuf::from(&l.file),
            };
            std::fs::read_to_string(path).ok()
        });
        match (&loc, source) {
            (Some(l), Some(text)) if l.is_valid() => {
                print!("{}", render_wild_root(root, l, affected, &text, color));
            }
            _ => println!("{}", render_wild_root_plain(root, loc.as_ref(), affected)),
        }
    }
    Ok(())
}

fn retract(common: &Common, var: VarId, by_reason: bool) -> Result<()> {
    let session = run(common)?;
    let scope = if by_reason {
        Retraction::SameReason
    } else {
        Retraction::Single
    };
    let trial = session
        .speculate(var, scope)
        .with_context(|| format!("cannot retract {}", var))?;
    if common.json {
        let out = serde_json::json!({
            "var": var,
            "reason": trial.reason,
            "removed": trial.removed.len(),
            "wild_before": trial.wild_before,
            "wild_after": trial.wild_after,
            "now_checked": trial.now_checked,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "retracting {} constraint(s) ({}): {} -> {} Wild",
            trial.removed.len(),
            trial.reason,
            trial.wild_before,
            trial.wild_after
        );
        let freed: Vec<String> = trial.now_checked.iter().map(|v| v.to_string()).collect();
        if !freed.is_empty() {
            println!("now checked: {}", freed.join(", "));
        }
    }
    Ok(())
}
