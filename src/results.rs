//! Turns raw search paths into reporter events.
//!
//! Chains are oriented user class first. The archive a chain ends on is not
//! linked; it is already in the matched set and in the owning archives of
//! the class before it.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::report::{Reporter, USER_JAR};
use crate::search::{QueryResult, SearchKind};
use crate::store::{Direction, EdgeKind, GraphStore, NodeId, NodeKind, NodePath, NodeRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainLink {
    pub class: String,
    pub jars: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedChain {
    pub user_class: Option<String>,
    pub links: Vec<ChainLink>,
}

/// What was emitted for one search term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedSearch {
    pub term: String,
    pub kind: SearchKind,
    pub matched: Vec<String>,
    pub chains: Vec<ProcessedChain>,
    pub failed: Vec<String>,
}

struct ReporterSlot {
    reporter: Box<dyn Reporter>,
    enabled: bool,
}

pub struct ResultProcessor<'s, S: ?Sized> {
    store: &'s S,
    filter_chains: bool,
    reporters: Vec<ReporterSlot>,
    owners: HashMap<NodeId, Vec<String>>,
}

impl<'s, S: GraphStore + ?Sized> ResultProcessor<'s, S> {
    pub fn new(store: &'s S, filter_chains: bool) -> Self {
        Self {
            store,
            filter_chains,
            reporters: Vec::new(),
            owners: HashMap::new(),
        }
    }

    pub fn register(&mut self, reporter: Box<dyn Reporter>) {
        self.reporters.push(ReporterSlot {
            reporter,
            enabled: true,
        });
    }

    pub fn process(&mut self, result: &QueryResult) -> ProcessedSearch {
        let matched: Vec<String> = result.matched.iter().cloned().collect();
        self.emit(|r| r.begin_search(&result.term, &matched));

        let mut seen_chains: HashSet<Vec<String>> = HashSet::new();
        let mut seen_pairs: HashSet<(String, String)> = HashSet::new();
        let mut chains = Vec::new();

        for raw in &result.chains {
            let oriented = orient(raw, result.kind);
            let Some((endpoint, classes)) = split_endpoint(&oriented) else {
                continue;
            };

            let names: Vec<String> = oriented.iter().map(|n| n.name.clone()).collect();
            if !seen_chains.insert(names) {
                continue;
            }
            if let Some(first) = classes.first()
                && self.filter_chains
                && !seen_pairs.insert((first.name.clone(), endpoint.name.clone()))
            {
                debug!(user_class = %first.name, archive = %endpoint.name, "chain filtered");
                continue;
            }

            chains.push(self.emit_chain(classes));
        }

        self.emit(|r| r.end_search(&result.term, &matched));

        ProcessedSearch {
            term: result.term.clone(),
            kind: result.kind,
            matched,
            chains,
            failed: result.failed.clone(),
        }
    }

    /// Tells every reporter still enabled that the run is over.
    pub fn finish(&mut self) {
        self.emit(|r| r.finish());
    }

    fn emit_chain(&mut self, classes: &[NodeRecord]) -> ProcessedChain {
        self.emit(|r| r.begin_chain());

        let mut chain = ProcessedChain {
            user_class: None,
            links: Vec::with_capacity(classes.len()),
        };
        for (i, node) in classes.iter().enumerate() {
            let jars = if i == 0 && node.kind == NodeKind::UserClass {
                self.emit(|r| r.mark_user_class(&node.name));
                chain.user_class = Some(node.name.clone());
                vec![USER_JAR.to_string()]
            } else {
                self.owning_archives(node)
            };
            self.emit(|r| r.link(&node.name, &jars));
            chain.links.push(ChainLink {
                class: node.name.clone(),
                jars,
            });
        }

        self.emit(|r| r.end_chain());
        chain
    }

    fn owning_archives(&mut self, node: &NodeRecord) -> Vec<String> {
        if let Some(cached) = self.owners.get(&node.id) {
            return cached.clone();
        }
        let mut jars: Vec<String> = match self
            .store
            .related(node.id, EdgeKind::Contains, Direction::Incoming)
        {
            Ok(owners) => owners.into_iter().map(|o| o.name).collect(),
            Err(err) => {
                warn!(class = %node.name, error = %err, "owning archive lookup failed");
                Vec::new()
            }
        };
        jars.sort();
        jars.dedup();
        self.owners.insert(node.id, jars.clone());
        jars
    }

    /// Sends one event to each enabled reporter; a reporter that fails is
    /// disabled for the rest of the run.
    fn emit(&mut self, mut event: impl FnMut(&mut dyn Reporter) -> anyhow::Result<()>) {
        for slot in self.reporters.iter_mut().filter(|s| s.enabled) {
            if let Err(err) = event(slot.reporter.as_mut()) {
                warn!(reporter = slot.reporter.name(), error = %err, "reporter failed, disabling it");
                slot.enabled = false;
            }
        }
    }
}

/// User class first, counterpart archive last.
fn orient(raw: &NodePath, kind: SearchKind) -> Vec<NodeRecord> {
    match kind {
        SearchKind::Archive => raw.iter().rev().cloned().collect(),
        SearchKind::UserClass => raw.clone(),
    }
}

fn split_endpoint(chain: &[NodeRecord]) -> Option<(&NodeRecord, &[NodeRecord])> {
    let (last, classes) = chain.split_last()?;
    if last.kind != NodeKind::Jar || classes.is_empty() {
        return None;
    }
    Some((last, classes))
}
