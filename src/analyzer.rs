//! Glue between scanning, extraction, graph building and searching.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::info;

use crate::builder::{BuildReport, GraphBuilder};
use crate::config::AnalyzerConfig;
use crate::inventory::Inventory;
use crate::report::Reporter;
use crate::results::{ProcessedSearch, ResultProcessor};
use crate::scan::{ScanFilter, scan_files};
use crate::search::{SearchKind, SearchScheduler, UnusedReport};
use crate::store::GraphStore;

#[derive(Debug, Serialize)]
pub struct BuildSummary {
    pub class_files: usize,
    pub archive_files: usize,
    pub classes: usize,
    pub custom_classes: usize,
    pub skipped_entries: usize,
    pub failed_archives: usize,
    pub graph: BuildReport,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SearchSummary {
    pub searches: Vec<ProcessedSearch>,
    pub duration_ms: u64,
}

/// Scanned and decoded artifacts, not yet written to any store.
#[derive(Debug)]
pub struct PreparedBuild {
    class_files: usize,
    archive_files: usize,
    inventory: Inventory,
    started: Instant,
}

impl PreparedBuild {
    /// Scans both directories and extracts every class. Nothing touches the
    /// store here, so missing directories and malformed codebase classes
    /// fail before an existing graph is cleared.
    pub fn scan(config: &AnalyzerConfig, classes_dir: &Path, jars_dir: &Path) -> Result<Self> {
        let started = Instant::now();

        let class_filter = ScanFilter {
            exclude_test_dirs: config.exclude_test_dirs,
            exclusions: Vec::new(),
        };
        let class_files = scan_files(classes_dir, "class", &class_filter)?;
        let jar_files = scan_files(jars_dir, "jar", &config.scan_filter())?;
        info!(
            class_files = class_files.len(),
            jars = jar_files.len(),
            "artifacts found"
        );

        let inventory = Inventory::collect(&class_files, &jar_files)?;
        info!(
            classes = inventory.classes().len(),
            custom = inventory.custom_count(),
            "extraction complete"
        );

        Ok(Self {
            class_files: class_files.len(),
            archive_files: jar_files.len(),
            inventory,
            started,
        })
    }
}

pub struct Analyzer<'a, S: ?Sized> {
    store: &'a S,
    config: &'a AnalyzerConfig,
}

impl<'a, S: GraphStore + ?Sized> Analyzer<'a, S> {
    pub fn new(store: &'a S, config: &'a AnalyzerConfig) -> Self {
        Self { store, config }
    }

    /// Scans, extracts and writes the graph in one go.
    pub fn build(&self, classes_dir: &Path, jars_dir: &Path) -> Result<BuildSummary> {
        let prepared = PreparedBuild::scan(self.config, classes_dir, jars_dir)?;
        self.write(prepared)
    }

    /// Writes already scanned artifacts to the store.
    pub fn write(&self, prepared: PreparedBuild) -> Result<BuildSummary> {
        let PreparedBuild {
            class_files,
            archive_files,
            inventory,
            started,
        } = prepared;

        let graph = GraphBuilder::new(self.store, self.config.threads).build(&inventory)?;

        Ok(BuildSummary {
            class_files,
            archive_files,
            classes: inventory.classes().len(),
            custom_classes: inventory.custom_count(),
            skipped_entries: inventory.skipped_entries(),
            failed_archives: inventory.failed_archives(),
            graph,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Searches each term in turn and streams the chains to `reporters`.
    pub fn search(
        &self,
        terms: &[String],
        kind: SearchKind,
        reporters: Vec<Box<dyn Reporter>>,
    ) -> Result<SearchSummary> {
        let start = Instant::now();
        let scheduler = SearchScheduler::new(self.store, self.config);
        let mut processor = ResultProcessor::new(self.store, self.config.filter_chains);
        for reporter in reporters {
            processor.register(reporter);
        }

        let mut searches = Vec::with_capacity(terms.len());
        for term in terms {
            let result = scheduler.search(term, kind)?;
            searches.push(processor.process(&result));
        }
        processor.finish();

        Ok(SearchSummary {
            searches,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    pub fn unused(&self) -> Result<UnusedReport> {
        SearchScheduler::new(self.store, self.config).find_unused()
    }
}
