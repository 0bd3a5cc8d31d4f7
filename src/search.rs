//! Searches over a built graph.
//!
//! Each matched target gets one task on a small rayon pool. A task starts at
//! the configured depth and, whenever the store reports a timeout, retries
//! the same target one hop shallower until depth 1 also times out.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

use crate::config::AnalyzerConfig;
use crate::model::archive_file_name;
use crate::store::{
    Direction, EdgeKind, EdgePattern, GraphStore, NodeKind, NodePath, NodeRecord, QueryOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    /// Archive term → user classes that reach it.
    Archive,
    /// User class term → archives it reaches.
    UserClass,
}

impl SearchKind {
    fn target_kind(self) -> NodeKind {
        match self {
            SearchKind::Archive => NodeKind::Jar,
            SearchKind::UserClass => NodeKind::UserClass,
        }
    }

    fn pattern(self) -> &'static EdgePattern {
        match self {
            SearchKind::Archive => &EdgePattern::ARCHIVE_TO_USER_CLASSES,
            SearchKind::UserClass => &EdgePattern::USER_CLASS_TO_ARCHIVES,
        }
    }
}

/// Raw outcome of one search term, shared by its tasks under a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub term: String,
    pub kind: SearchKind,
    pub matched: BTreeSet<String>,
    /// Paths as returned by the store, ordered from the search target.
    pub chains: Vec<NodePath>,
    /// Targets abandoned after timing out at depth 1 or failing outright.
    pub failed: Vec<String>,
}

impl QueryResult {
    pub fn new(term: &str, kind: SearchKind) -> Self {
        Self {
            term: term.to_string(),
            kind,
            matched: BTreeSet::new(),
            chains: Vec::new(),
            failed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnusedReport {
    pub checked: usize,
    pub unused: Vec<String>,
}

/// Runs `query` from `depth` downwards until it completes.
///
/// Returns the value with the depth that produced it, or `None` when the
/// query still timed out at depth 1.
pub fn run_with_depth_retry<T, E, F>(depth: u32, mut query: F) -> Result<Option<(T, u32)>, E>
where
    F: FnMut(u32) -> Result<QueryOutcome<T>, E>,
{
    let mut depth = depth.max(1);
    loop {
        match query(depth)? {
            QueryOutcome::Complete(value) => return Ok(Some((value, depth))),
            QueryOutcome::TimedOut if depth <= 1 => return Ok(None),
            QueryOutcome::TimedOut => {
                debug!(depth, retry_depth = depth - 1, "query timed out, reducing depth");
                depth -= 1;
            }
        }
    }
}

pub fn term_matches(name: &str, term: &str, exact: bool) -> bool {
    if exact {
        name == term
    } else {
        name.contains(term)
    }
}

pub struct SearchScheduler<'a, S: ?Sized> {
    store: &'a S,
    config: &'a AnalyzerConfig,
}

impl<'a, S: GraphStore + ?Sized> SearchScheduler<'a, S> {
    pub fn new(store: &'a S, config: &'a AnalyzerConfig) -> Self {
        Self { store, config }
    }

    pub fn search(&self, term: &str, kind: SearchKind) -> Result<QueryResult> {
        let candidates = self
            .store
            .find_all(kind.target_kind())
            .context("Failed to list search candidates")?;

        let mut result = QueryResult::new(term, kind);
        let targets = self.select_targets(term, kind, candidates, &mut result);
        info!(term, targets = targets.len(), matched = result.matched.len(), "searching");

        let shared = Mutex::new(result);
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.search_threads())
            .thread_name(|i| format!("search-{i}"))
            .build()
            .context("Failed to create search pool")?;

        pool.scope(|s| {
            let shared = &shared;
            for target in &targets {
                s.spawn(move |_| self.search_target(target, kind, shared));
            }
        });

        let mut result = shared.into_inner();
        result
            .chains
            .sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| names(a).cmp(&names(b))));
        result.failed.sort();
        info!(
            term,
            chains = result.chains.len(),
            failed = result.failed.len(),
            "search complete"
        );
        Ok(result)
    }

    /// Archives sharing a file name collapse to the first one seen; the
    /// rest only add their names to the matched set.
    fn select_targets(
        &self,
        term: &str,
        kind: SearchKind,
        mut candidates: Vec<NodeRecord>,
        result: &mut QueryResult,
    ) -> Vec<NodeRecord> {
        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        let exact = self.config.exact_match;

        match kind {
            SearchKind::UserClass => candidates
                .into_iter()
                .filter(|c| term_matches(&c.name, term, exact))
                .collect(),
            SearchKind::Archive => {
                let mut seen: HashSet<String> = HashSet::new();
                let mut targets = Vec::new();
                for candidate in candidates {
                    let file_name = archive_file_name(&candidate.name).to_string();
                    let hit = term_matches(&file_name, term, exact)
                        || term_matches(&candidate.name, term, exact);
                    if !hit || !self.config.archive_allowed(&candidate.name) {
                        continue;
                    }
                    result.matched.insert(candidate.name.clone());
                    if !seen.insert(file_name) {
                        debug!(archive = %candidate.name, "duplicate archive name, not searched again");
                        continue;
                    }
                    targets.push(candidate);
                }
                targets
            }
        }
    }

    fn search_target(&self, target: &NodeRecord, kind: SearchKind, shared: &Mutex<QueryResult>) {
        let timeout = self.config.search_timeout;
        let outcome = run_with_depth_retry(self.config.search_depth, |depth| {
            debug!(target = %target.name, depth, "path query");
            self.store
                .find_paths(target.id, kind.pattern(), 1, depth, timeout)
        });

        match outcome {
            Ok(Some((paths, depth))) => {
                debug!(target = %target.name, depth, paths = paths.len(), "target searched");
                let mut result = shared.lock();
                if kind == SearchKind::UserClass {
                    for path in &paths {
                        if let Some(last) = path.last() {
                            result.matched.insert(last.name.clone());
                        }
                    }
                }
                result.chains.extend(paths);
            }
            Ok(None) => {
                warn!(target = %target.name, "search timed out at depth 1, giving up");
                shared.lock().failed.push(target.name.clone());
            }
            Err(err) => {
                warn!(target = %target.name, error = %err, "search failed");
                shared.lock().failed.push(target.name.clone());
            }
        }
    }

    /// Archives none of whose classes any user class reaches within the
    /// configured bound. A timed-out check counts as reached.
    pub fn find_unused(&self) -> Result<UnusedReport> {
        let archives: Vec<NodeRecord> = self
            .store
            .find_all(NodeKind::Jar)
            .context("Failed to list archives")?
            .into_iter()
            .filter(|a| self.config.archive_allowed(&a.name))
            .collect();

        let unused = Mutex::new(Vec::new());
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.search_threads())
            .thread_name(|i| format!("unused-{i}"))
            .build()
            .context("Failed to create search pool")?;

        pool.scope(|s| {
            let unused = &unused;
            for archive in &archives {
                s.spawn(move |_| match self.archive_reached(archive) {
                    Ok(true) => {}
                    Ok(false) => unused.lock().push(archive.name.clone()),
                    Err(err) => {
                        warn!(archive = %archive.name, error = %err, "reachability check failed")
                    }
                });
            }
        });

        let mut unused = unused.into_inner();
        unused.sort();
        info!(checked = archives.len(), unused = unused.len(), "unused archive search complete");
        Ok(UnusedReport {
            checked: archives.len(),
            unused,
        })
    }

    fn archive_reached(&self, archive: &NodeRecord) -> Result<bool> {
        let members = self
            .store
            .related(archive.id, EdgeKind::Contains, Direction::Outgoing)?;
        for member in members {
            if member.kind == NodeKind::UserClass {
                return Ok(true);
            }
            let outcome = self.store.reachable(
                member.id,
                &EdgePattern::CLASS_TO_USER_CLASS,
                self.config.unused_bound,
                self.config.search_timeout,
            )?;
            match outcome {
                QueryOutcome::Complete(true) => return Ok(true),
                QueryOutcome::Complete(false) => {}
                QueryOutcome::TimedOut => {
                    warn!(archive = %archive.name, class = %member.name, "reachability timed out, treating as used");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

fn names(path: &NodePath) -> Vec<&str> {
    path.iter().map(|n| n.name.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NodeId;
    use crate::test_support::MemoryStore;
    use std::cell::RefCell;

    // widgets.jar ∋ lib.Widget <- App ; lib.Widget -> lib.Base ∈ base.jar
    fn sample(store: &MemoryStore) -> (NodeId, NodeId) {
        let widgets = store.create_node(NodeKind::Jar, "/jars/widgets.jar").unwrap();
        let base = store.create_node(NodeKind::Jar, "/jars/base.jar").unwrap();
        let widget = store.create_node(NodeKind::Class, "lib.Widget").unwrap();
        let base_class = store.create_node(NodeKind::Class, "lib.Base").unwrap();
        let app = store.create_node(NodeKind::UserClass, "App").unwrap();
        store.create_edge(EdgeKind::Contains, widgets, widget).unwrap();
        store.create_edge(EdgeKind::Contains, base, base_class).unwrap();
        store.create_edge(EdgeKind::DependsOn, app, widget).unwrap();
        store.create_edge(EdgeKind::DependsOn, widget, base_class).unwrap();
        (widgets, app)
    }

    #[test]
    fn retry_reduces_depth_one_step_at_a_time() {
        let tried = RefCell::new(Vec::new());
        let outcome = run_with_depth_retry::<_, (), _>(5, |depth| {
            tried.borrow_mut().push(depth);
            Ok(if depth > 2 {
                QueryOutcome::TimedOut
            } else {
                QueryOutcome::Complete("done")
            })
        });
        assert_eq!(outcome, Ok(Some(("done", 2))));
        assert_eq!(tried.into_inner(), vec![5, 4, 3, 2]);
    }

    #[test]
    fn retry_gives_up_after_depth_one() {
        let tried = RefCell::new(Vec::new());
        let outcome = run_with_depth_retry::<(), (), _>(3, |depth| {
            tried.borrow_mut().push(depth);
            Ok(QueryOutcome::TimedOut)
        });
        assert_eq!(outcome, Ok(None));
        assert_eq!(tried.into_inner(), vec![3, 2, 1]);
    }

    #[test]
    fn archive_search_finds_user_classes() -> Result<()> {
        let store = MemoryStore::new();
        sample(&store);
        let config = AnalyzerConfig::default();

        let result = SearchScheduler::new(&store, &config).search("widgets", SearchKind::Archive)?;
        assert_eq!(
            result.matched.iter().collect::<Vec<_>>(),
            vec!["/jars/widgets.jar"]
        );
        assert_eq!(result.chains.len(), 1);
        assert_eq!(names(&result.chains[0]), vec!["/jars/widgets.jar", "lib.Widget", "App"]);
        assert!(result.failed.is_empty());
        Ok(())
    }

    #[test]
    fn dependency_search_collects_reached_archives() -> Result<()> {
        let store = MemoryStore::new();
        sample(&store);
        let config = AnalyzerConfig {
            exact_match: true,
            ..AnalyzerConfig::default()
        };

        let result = SearchScheduler::new(&store, &config).search("App", SearchKind::UserClass)?;
        assert_eq!(
            result.matched.iter().collect::<Vec<_>>(),
            vec!["/jars/base.jar", "/jars/widgets.jar"]
        );
        assert_eq!(result.chains.len(), 2);
        assert_eq!(names(&result.chains[0]), vec!["App", "lib.Widget", "/jars/widgets.jar"]);

        let shallow = AnalyzerConfig {
            search_depth: 1,
            ..config
        };
        let result = SearchScheduler::new(&store, &shallow).search("App", SearchKind::UserClass)?;
        assert_eq!(result.chains.len(), 1);
        Ok(())
    }

    #[test]
    fn timeouts_retry_then_fail_the_target() -> Result<()> {
        let store = MemoryStore {
            timeout_above: Some(2),
            ..MemoryStore::new()
        };
        let (widgets, _) = sample(&store);
        let config = AnalyzerConfig::default();

        let result = SearchScheduler::new(&store, &config).search("widgets", SearchKind::Archive)?;
        assert_eq!(store.depths_tried(widgets), vec![5, 4, 3, 2]);
        assert_eq!(result.chains.len(), 1);

        let store = MemoryStore {
            timeout_above: Some(0),
            ..MemoryStore::new()
        };
        let (widgets, _) = sample(&store);
        let result = SearchScheduler::new(&store, &config).search("widgets", SearchKind::Archive)?;
        assert_eq!(store.depths_tried(widgets), vec![5, 4, 3, 2, 1]);
        assert!(result.chains.is_empty());
        assert_eq!(result.failed, vec!["/jars/widgets.jar".to_string()]);
        Ok(())
    }

    #[test]
    fn duplicate_archive_names_search_once() -> Result<()> {
        let store = MemoryStore::new();
        let (widgets, _) = sample(&store);
        let copy = store.create_node(NodeKind::Jar, "/mirror/widgets.jar")?;
        let config = AnalyzerConfig::default();

        let result = SearchScheduler::new(&store, &config).search("widgets", SearchKind::Archive)?;
        assert_eq!(result.matched.len(), 2);
        assert!(result.matched.contains("/mirror/widgets.jar"));
        let searched = store.depths_tried(widgets).len() + store.depths_tried(copy).len();
        assert_eq!(searched, 1);
        Ok(())
    }

    #[test]
    fn search_filters_exclude_archives() -> Result<()> {
        let store = MemoryStore::new();
        sample(&store);
        let config = AnalyzerConfig {
            search_exclude: vec![crate::scan::full_match(".*widgets.*")?],
            ..AnalyzerConfig::default()
        };

        let result = SearchScheduler::new(&store, &config).search(".jar", SearchKind::Archive)?;
        assert_eq!(result.matched.iter().collect::<Vec<_>>(), vec!["/jars/base.jar"]);
        Ok(())
    }

    #[test]
    fn exact_match_needs_whole_name() {
        assert!(term_matches("widgets.jar", "widgets", false));
        assert!(!term_matches("widgets.jar", "widgets", true));
        assert!(term_matches("widgets.jar", "widgets.jar", true));
    }

    #[test]
    fn unused_archives_are_those_no_user_class_reaches() -> Result<()> {
        let store = MemoryStore::new();
        sample(&store);
        let orphan_jar = store.create_node(NodeKind::Jar, "/jars/orphan.jar")?;
        let orphan = store.create_node(NodeKind::Class, "lib.Orphan")?;
        store.create_edge(EdgeKind::Contains, orphan_jar, orphan)?;
        let config = AnalyzerConfig::default();

        let report = SearchScheduler::new(&store, &config).find_unused()?;
        assert_eq!(report.checked, 3);
        assert_eq!(report.unused, vec!["/jars/orphan.jar".to_string()]);
        Ok(())
    }

    #[test]
    fn unused_search_treats_timeouts_as_reached() -> Result<()> {
        let store = MemoryStore {
            reach_times_out: true,
            ..MemoryStore::new()
        };
        let orphan_jar = store.create_node(NodeKind::Jar, "/jars/orphan.jar")?;
        let orphan = store.create_node(NodeKind::Class, "lib.Orphan")?;
        store.create_edge(EdgeKind::Contains, orphan_jar, orphan)?;
        let config = AnalyzerConfig::default();

        let report = SearchScheduler::new(&store, &config).find_unused()?;
        assert!(report.unused.is_empty());
        Ok(())
    }
}
