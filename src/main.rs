use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tpl_analyzer::analyzer::{Analyzer, BuildSummary, PreparedBuild, SearchSummary};
use tpl_analyzer::cli::{Cli, Commands, SearchArgs, SourceArgs};
use tpl_analyzer::config::{AnalyzerConfig, clear_db, resolve_db_path};
use tpl_analyzer::logging::init_logging;
use tpl_analyzer::report::{Reporter, create_reporter};
use tpl_analyzer::search::SearchKind;
use tpl_analyzer::store::{GraphStore, LmdbGraphStore};
use tracing::info;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    let db_path = resolve_db_path(&cli)?;

    match cli.command.clone() {
        Commands::Clear => {
            clear_db(&db_path)?;
            print_json(&ClearResult {
                db: db_path.to_string_lossy().to_string(),
                cleared: true,
            })?;
        }
        Commands::Stats => {
            let store = LmdbGraphStore::open_existing(&db_path)?;
            print_json(&store.stats()?)?;
        }
        Commands::Build { source } => {
            let (classes, jars) = source_dirs(&source)?.context("build needs --classes and --jars")?;
            let config = AnalyzerConfig::default().with_source(&source)?;
            let summary = rebuild(&db_path, &config, &classes, &jars)?;
            print_json(&summary)?;
        }
        Commands::Search {
            terms,
            search,
            source,
        } => {
            let output = run_search(&db_path, &terms, &search, &source, SearchKind::Archive)?;
            print_json(&output)?;
        }
        Commands::Deps {
            terms,
            search,
            source,
        } => {
            let output = run_search(&db_path, &terms, &search, &source, SearchKind::UserClass)?;
            print_json(&output)?;
        }
        Commands::Unused {
            timeout_minutes,
            archive_filters,
        } => {
            let config = AnalyzerConfig::default()
                .with_archive_filters(&archive_filters)?
                .with_timeout_minutes(timeout_minutes);
            let store = LmdbGraphStore::open_existing(&db_path)?;
            let report = Analyzer::new(&store, &config).unused()?;
            print_json(&report)?;
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct ClearResult {
    db: String,
    cleared: bool,
}

#[derive(Debug, Serialize)]
struct SearchOutput {
    build: Option<BuildSummary>,
    output_dir: String,
    #[serde(flatten)]
    summary: SearchSummary,
}

fn source_dirs(source: &SourceArgs) -> Result<Option<(PathBuf, PathBuf)>> {
    match (&source.classes, &source.jars) {
        (Some(classes), Some(jars)) => Ok(Some((classes.clone(), jars.clone()))),
        (None, None) => Ok(None),
        _ => anyhow::bail!("--classes and --jars must be given together"),
    }
}

/// Scans the sources, then replaces any previous graph with a fresh one.
/// The old graph is only cleared once the scan has succeeded.
fn rebuild(
    db_path: &Path,
    config: &AnalyzerConfig,
    classes: &Path,
    jars: &Path,
) -> Result<BuildSummary> {
    let prepared = PreparedBuild::scan(config, classes, jars)?;
    clear_db(db_path)?;
    let store = LmdbGraphStore::open(db_path)?;
    let summary = Analyzer::new(&store, config).write(prepared)?;
    info!(db = %db_path.display(), "graph written");
    Ok(summary)
}

fn run_search(
    db_path: &Path,
    terms: &[String],
    search: &SearchArgs,
    source: &SourceArgs,
    kind: SearchKind,
) -> Result<SearchOutput> {
    let config = AnalyzerConfig::default()
        .with_source(source)?
        .with_search(search)?;

    let build = match source_dirs(source)? {
        Some((classes, jars)) => Some(rebuild(db_path, &config, &classes, &jars)?),
        None => None,
    };

    let store = LmdbGraphStore::open_existing(db_path)?;
    let reporters = search
        .reporters
        .iter()
        .map(|kind| create_reporter(*kind, &search.output))
        .collect::<Result<Vec<Box<dyn Reporter>>>>()?;

    let summary = Analyzer::new(&store, &config).search(terms, kind, reporters)?;

    Ok(SearchOutput {
        build,
        output_dir: search.output.to_string_lossy().to_string(),
        summary,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
