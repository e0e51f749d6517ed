use anyhow::Context;
use clap::Parser;
use deepdiff_common::ensure_config;
use deepdiff_core::tools;
use deepdiff_core::DiffEngine;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod presenter;

#[derive(Parser)]
#[command(name = "deepdiff")]
#[command(version = "0.1.0")]
#[command(about = "In-depth comparison of files, archives and directories", long_about = None)]
struct Cli {
    /// First file, directory or archive to compare
    #[arg(required_unless_present = "list_tools")]
    path1: Option<PathBuf>,

    /// Second file, directory or archive to compare
    #[arg(required_unless_present = "list_tools")]
    path2: Option<PathBuf>,

    /// Output the difference tree as JSON
    #[arg(long)]
    json: bool,

    /// List the external tools used for deeper comparisons and exit
    #[arg(long)]
    list_tools: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Maximum number of lines fed into one line-diff (0 disables the cap)
    #[arg(long)]
    max_diff_input_lines: Option<usize>,

    /// Maximum number of diff lines retained per block (0 disables the cap)
    #[arg(long)]
    max_diff_block_lines_saved: Option<usize>,

    /// Fuzzy-matching threshold for renamed members (0 disables, 400 is high)
    #[arg(long)]
    fuzzy_threshold: Option<u32>,

    /// Byte budget for the rendered report (0 disables the cap)
    #[arg(long)]
    max_report_size: Option<usize>,

    /// Disable all default size limits
    #[arg(long)]
    no_default_limits: bool,
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so reports can be piped cleanly from stdout.
    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(2);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    if cli.list_tools {
        for tool in tools::required_tools() {
            match tools::package_hint(tool) {
                Some(package) => println!("{tool} (from {package})"),
                None => println!("{tool}"),
            }
        }
        return Ok(0);
    }

    // clap guarantees both paths are present past this point
    let (path1, path2) = match (&cli.path1, &cli.path2) {
        (Some(p1), Some(p2)) => (p1.clone(), p2.clone()),
        _ => anyhow::bail!("two paths are required"),
    };
    if !path1.exists() {
        anyhow::bail!("path does not exist: {}", path1.display());
    }
    if !path2.exists() {
        anyhow::bail!("path does not exist: {}", path2.display());
    }

    let loaded = ensure_config(false).context("loading configuration")?;
    let mut limits = loaded.config.limits;
    if cli.no_default_limits {
        limits = limits.without_default_limits();
    }
    if let Some(v) = cli.max_diff_input_lines {
        limits.max_diff_input_lines = v;
    }
    if let Some(v) = cli.max_diff_block_lines_saved {
        limits.max_diff_block_lines_saved = v;
    }
    if let Some(v) = cli.fuzzy_threshold {
        limits.fuzzy_threshold = v;
    }
    if let Some(v) = cli.max_report_size {
        limits.max_report_size = v;
    }

    // Ctrl-C sets the shared flag; the engine aborts at the next check
    // and kills any in-flight external tool.
    let cancel = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&cancel))
        .context("installing interrupt handler")?;

    let engine = DiffEngine::new(limits.clone()).with_cancel_flag(cancel);
    let diff = engine
        .compare_paths(&path1, &path2)
        .with_context(|| format!("comparing {} with {}", path1.display(), path2.display()))?;

    match diff {
        None => {
            info!("no differences found");
            Ok(0)
        }
        Some(diff) => {
            if cli.json {
                println!("{}", presenter::render_json(&diff)?);
            } else {
                print!("{}", presenter::render_text(&diff, &limits));
            }
            Ok(1)
        }
    }
}
