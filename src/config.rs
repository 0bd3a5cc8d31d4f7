use anyhow::{Context, Result, bail};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{ArchiveFilterArgs, Cli, SearchArgs, SourceArgs};
use crate::scan::{ScanFilter, full_match};
use crate::store::{DATA_FILE, LOCK_FILE};

pub const DEFAULT_THREADS: usize = 5;
pub const DEFAULT_SEARCH_DEPTH: u32 = 5;
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 60;
pub const DEFAULT_UNUSED_BOUND: u32 = 12;

/// Every tunable of one run. Built once from the command line and passed
/// by reference to the builder and the search scheduler.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub threads: usize,
    pub search_depth: u32,
    pub search_timeout: Duration,
    pub single_thread_search: bool,
    pub exact_match: bool,
    pub filter_chains: bool,
    pub exclude_test_dirs: bool,
    pub dep_exclusions: Vec<Regex>,
    pub search_include: Vec<Regex>,
    pub search_exclude: Vec<Regex>,
    pub unused_bound: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            search_depth: DEFAULT_SEARCH_DEPTH,
            search_timeout: minutes(DEFAULT_TIMEOUT_MINUTES),
            single_thread_search: false,
            exact_match: false,
            filter_chains: false,
            exclude_test_dirs: false,
            dep_exclusions: Vec::new(),
            search_include: Vec::new(),
            search_exclude: Vec::new(),
            unused_bound: DEFAULT_UNUSED_BOUND,
        }
    }
}

impl AnalyzerConfig {
    pub fn with_source(mut self, source: &SourceArgs) -> Result<Self> {
        self.threads = source.threads.max(1);
        self.exclude_test_dirs = source.exclude_test_dirs;
        self.dep_exclusions = compile_all(&source.dep_exclusions, "--dep-exclusion")?;
        Ok(self)
    }

    pub fn with_search(mut self, search: &SearchArgs) -> Result<Self> {
        self.search_depth = search.depth.max(1);
        self.search_timeout = minutes(search.timeout_minutes);
        self.single_thread_search = search.single_thread;
        self.exact_match = search.exact;
        self.filter_chains = search.filter;
        self.with_archive_filters(&search.archive_filters)
    }

    pub fn with_archive_filters(mut self, filters: &ArchiveFilterArgs) -> Result<Self> {
        self.search_include = compile_all(&filters.search_include, "--search-include")?;
        self.search_exclude = compile_all(&filters.search_exclude, "--search-exclude")?;
        Ok(self)
    }

    pub fn with_timeout_minutes(mut self, timeout_minutes: u64) -> Self {
        self.search_timeout = minutes(timeout_minutes);
        self
    }

    pub fn scan_filter(&self) -> ScanFilter {
        ScanFilter {
            exclude_test_dirs: self.exclude_test_dirs,
            exclusions: self.dep_exclusions.clone(),
        }
    }

    pub fn search_threads(&self) -> usize {
        if self.single_thread_search { 1 } else { 2 }
    }

    /// Include patterns (if any) must match and no exclude pattern may.
    pub fn archive_allowed(&self, name: &str) -> bool {
        let included =
            self.search_include.is_empty() || self.search_include.iter().any(|re| re.is_match(name));
        included && !self.search_exclude.iter().any(|re| re.is_match(name))
    }
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60))
}

fn compile_all(patterns: &[String], flag: &str) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| full_match(p).with_context(|| format!("Invalid {flag} pattern: {p}")))
        .collect()
}

pub fn resolve_db_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.db.clone() {
        return Ok(p);
    }

    Ok(analyzer_home()?.join("graph"))
}

/// Removes the store files in `db_path`, then the directory itself if that
/// left it empty. Anything else in the directory is left alone. A missing
/// store is not an error.
pub fn clear_db(db_path: &Path) -> Result<()> {
    if !db_path.exists() {
        return Ok(());
    }
    if !db_path.is_dir() {
        bail!("Graph store path is not a directory: {}", db_path.display());
    }

    remove_file_if_exists(&db_path.join(DATA_FILE), "db")?;
    remove_file_if_exists(&db_path.join(LOCK_FILE), "db lock")?;

    let is_empty = std::fs::read_dir(db_path)
        .with_context(|| format!("Failed to read graph store directory: {}", db_path.display()))?
        .next()
        .is_none();
    if is_empty {
        std::fs::remove_dir(db_path).with_context(|| {
            format!("Failed to remove graph store directory: {}", db_path.display())
        })?;
    }
    Ok(())
}

fn analyzer_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve data directory"))?;
    Ok(base.join("tpl-analyzer"))
}

fn remove_file_if_exists(path: &Path, kind: &str) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove {kind} file: {}", path.display()))?;
    }
    Ok(())
}
