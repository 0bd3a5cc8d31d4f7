//! Two-phase population of the graph store.
//!
//! Phase 1 writes every class and archive node, then (after an inner join)
//! the archive membership edges. Phase 2 runs on a fresh pool and writes the
//! class-to-class reference edges. `ThreadPool::scope` is the barrier: it
//! returns only once every task spawned inside it has finished.

use anyhow::{Context, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

use crate::inventory::Inventory;
use crate::model::ClassEntity;
use crate::store::{EdgeKind, GraphStore, NodeKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub class_nodes: usize,
    pub archive_nodes: usize,
    pub contains_edges: usize,
    pub reference_edges: usize,
    pub write_failures: usize,
}

pub struct GraphBuilder<'s, S: ?Sized> {
    store: &'s S,
    threads: usize,
}

#[derive(Default)]
struct Tally {
    done: AtomicUsize,
    written: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn finish(&self, phase: &'static str, total: usize) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(phase, done, total, "task complete");
    }

    fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }

    fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

impl<'s, S: GraphStore + ?Sized> GraphBuilder<'s, S> {
    pub fn new(store: &'s S, threads: usize) -> Self {
        Self {
            store,
            threads: threads.max(1),
        }
    }

    pub fn build(&self, inventory: &Inventory) -> Result<BuildReport> {
        let mut report = BuildReport::default();

        let pool = self.pool()?;
        self.write_nodes(&pool, inventory, &mut report);
        self.write_contains_edges(&pool, inventory, &mut report);
        drop(pool);
        info!(
            classes = report.class_nodes,
            archives = report.archive_nodes,
            contains = report.contains_edges,
            "phase 1 complete"
        );

        let pool = self.pool()?;
        self.write_reference_edges(&pool, inventory, &mut report);
        drop(pool);
        info!(
            references = report.reference_edges,
            failures = report.write_failures,
            "phase 2 complete"
        );

        Ok(report)
    }

    fn pool(&self) -> Result<ThreadPool> {
        ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("graph-writer-{i}"))
            .build()
            .context("Failed to create graph writer pool")
    }

    fn write_nodes(&self, pool: &ThreadPool, inventory: &Inventory, report: &mut BuildReport) {
        let classes = inventory.classes();
        let archives = inventory.archives();
        let total = classes.len() + archives.len();
        let class_tally = Tally::default();
        let archive_tally = Tally::default();
        let store = self.store;

        pool.scope(|s| {
            let tally = &class_tally;
            for class in classes {
                s.spawn(move |_| {
                    match store.create_node(class.kind(), &class.name) {
                        Ok(id) => {
                            class.record_id(id);
                            tally.written.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            warn!(class = %class.name, error = %err, "failed to write class node");
                            tally.failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    tally.finish("nodes", total);
                });
            }

            let tally = &archive_tally;
            for archive in archives {
                s.spawn(move |_| {
                    let name = archive.name();
                    match store.create_node(NodeKind::Jar, &name) {
                        Ok(id) => {
                            archive.record_id(id);
                            tally.written.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            warn!(archive = %name, error = %err, "failed to write archive node");
                            tally.failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    tally.finish("nodes", total);
                });
            }
        });

        report.class_nodes = class_tally.written();
        report.archive_nodes = archive_tally.written();
        report.write_failures += class_tally.failed() + archive_tally.failed();
    }

    fn write_contains_edges(
        &self,
        pool: &ThreadPool,
        inventory: &Inventory,
        report: &mut BuildReport,
    ) {
        let total: usize = inventory.archives().iter().map(|a| a.members.len()).sum();
        let tally = Tally::default();
        let store = self.store;

        pool.scope(|s| {
            let tally = &tally;
            for archive in inventory.archives() {
                let Some(archive_id) = archive.id() else {
                    continue;
                };
                for member in inventory.members(archive) {
                    s.spawn(move |_| {
                        if let Some(class_id) = member.id() {
                            match store.create_edge(EdgeKind::Contains, archive_id, class_id) {
                                Ok(()) => {
                                    tally.written.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(err) => {
                                    warn!(class = %member.name, error = %err, "failed to write contains edge");
                                    tally.failed.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        }
                        tally.finish("contains", total);
                    });
                }
            }
        });

        report.contains_edges = tally.written();
        report.write_failures += tally.failed();
    }

    fn write_reference_edges(
        &self,
        pool: &ThreadPool,
        inventory: &Inventory,
        report: &mut BuildReport,
    ) {
        let total = inventory.classes().len();
        let tally = Tally::default();
        let store = self.store;

        pool.scope(|s| {
            let tally = &tally;
            for class in inventory.classes() {
                s.spawn(move |_| {
                    link_references(store, inventory, class, tally);
                    tally.finish("references", total);
                });
            }
        });

        report.reference_edges = tally.written();
        report.write_failures += tally.failed();
    }
}

fn link_references<S: GraphStore + ?Sized>(
    store: &S,
    inventory: &Inventory,
    class: &ClassEntity,
    tally: &Tally,
) {
    let (Some(from), Some(referenced)) = (class.id(), inventory.references(&class.name)) else {
        return;
    };

    for name in referenced {
        if *name == class.name {
            continue;
        }
        let Some(to) = inventory.class(name).and_then(|target| target.id()) else {
            continue;
        };
        match store.create_edge(EdgeKind::DependsOn, from, to) {
            Ok(()) => {
                tally.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                warn!(from = %class.name, to = %name, error = %err, "failed to write reference edge");
                tally.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
