//! covtree - Browse test coverage as a tree
//!
//! covtree loads a JSON coverage report, aggregates it into a directory tree
//! and prints the rows a coverage view would show, optionally scoped to one
//! test and with every file's declarations expanded.

use covtree::config::{self, ViewConfig};
use covtree::filter::{filter_choices, find_test};
use covtree::output::{OutputFormat, render_rows};
use covtree::{CoverageReport, CoverageResult, CoverageTreeView, SortOrder};
use eyre::{Result, WrapErr};
use facet_args as args;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI arguments
#[derive(Debug, facet::Facet)]
struct Args {
    /// Coverage report (JSON)
    #[facet(args::positional)]
    report: PathBuf,

    /// Path to view config (YAML)
    #[facet(args::named, args::short = 'c', default)]
    config: Option<PathBuf>,

    /// Sort order: location, name, coverage
    #[facet(args::named, args::short = 's', default)]
    sort: Option<String>,

    /// Only show coverage from this test (label or id)
    #[facet(args::named, args::short = 't', default)]
    test: Option<String>,

    /// List the tests coverage can be filtered to, then exit
    #[facet(args::named, default)]
    list_tests: bool,

    /// Expand every file and load its declarations
    #[facet(args::named, args::short = 'e', default)]
    expand: bool,

    /// Output format: text, json
    #[facet(args::named, args::short = 'f', default)]
    format: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Args =
        facet_args::from_std_args().wrap_err("Failed to parse command line arguments")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .wrap_err("Failed to start runtime")?;
    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => {
            let loaded = config::load(path).await;
            if let Some(error) = &loaded.error {
                eprintln!("{} {}", "warning:".yellow().bold(), error);
            }
            loaded.config
        }
        None => ViewConfig::default(),
    };
    if let Some(sort) = &args.sort {
        config.sort_order = SortOrder::from_str(sort).ok_or_else(|| {
            eyre::eyre!("Unknown sort order '{sort}'. Use location, name or coverage")
        })?;
    }
    let format = match &args.format {
        Some(format) => OutputFormat::from_str(format)
            .ok_or_else(|| eyre::eyre!("Unknown format '{format}'. Use text or json"))?,
        None => OutputFormat::default(),
    };

    let report = CoverageReport::load(&args.report).await?;
    let coverage: Arc<dyn CoverageResult> = Arc::new(report.into_coverage());

    if args.list_tests {
        for choice in filter_choices(coverage.as_ref()) {
            match &choice.test {
                Some(id) => {
                    let id = id.to_string().replace('\0', "/");
                    println!("{}  {}", choice.label, id.dimmed());
                }
                None => println!("{}", choice.label.bold()),
            }
        }
        return Ok(());
    }

    let filter = match &args.test {
        Some(query) => Some(
            find_test(coverage.as_ref(), query)
                .ok_or_else(|| eyre::eyre!("No per-test coverage for '{query}'"))?,
        ),
        None => None,
    };

    let mut view = CoverageTreeView::new(config);
    view.set_input(coverage, filter);
    if args.expand {
        let loaded = view.expand_all_files().await?;
        info!(files = loaded, "Expanded file declarations");
    }

    print!("{}", render_rows(&view.rows(), format)?);
    Ok(())
}
