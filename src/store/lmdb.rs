//! LMDB-backed graph store.
//!
//! Uses heed for storage. Layout:
//!
//! - `nodes`: zero-padded hex id → JSON `{kind, name}`
//! - `out_edges` / `in_edges`: one key per edge, `<node>/<kind>/<other>`, so a
//!   neighbour lookup in either direction is a prefix scan
//! - `meta`: the node id counter
//!
//! Each create call runs in its own write transaction; LMDB serialises
//! writers, so concurrent callers simply queue on the writer lock.
//!
//! On disk the store is the two LMDB files [`DATA_FILE`] and [`LOCK_FILE`].

use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::{
    Direction, EdgeKind, EdgePattern, GraphStore, NodeId, NodeKind, NodePath, NodeRecord,
    QueryOutcome, Step, StoreStats, find_paths_with, reachable_with,
};
use crate::error::StoreError;

pub const NODES_DB: &str = "nodes";
pub const OUT_EDGES_DB: &str = "out_edges";
pub const IN_EDGES_DB: &str = "in_edges";
pub const META_DB: &str = "meta";

pub const DATA_FILE: &str = "data.mdb";
pub const LOCK_FILE: &str = "lock.mdb";

const NEXT_ID_KEY: &str = "next_node_id";
const DEFAULT_MAP_SIZE: usize = 8 * 1024 * 1024 * 1024;
const DEFAULT_MAX_DBS: u32 = 8;

type StrDb = Database<Str, Str>;

#[derive(Debug, Serialize, Deserialize)]
struct StoredNode {
    kind: NodeKind,
    name: String,
}

#[derive(Debug)]
pub struct LmdbGraphStore {
    env: Env,
    nodes: StrDb,
    out_edges: StrDb,
    in_edges: StrDb,
    meta: StrDb,
}

impl LmdbGraphStore {
    /// Opens the store in `dir`, creating the directory and an empty store
    /// if needed.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        Self::open_env(dir)
    }

    /// Opens a store that a previous build wrote. Never creates anything.
    pub fn open_existing(dir: &Path) -> Result<Self, StoreError> {
        if !dir.join(DATA_FILE).is_file() {
            return Err(StoreError::NotFound(dir.to_path_buf()));
        }
        Self::open_env(dir)
    }

    fn open_env(dir: &Path) -> Result<Self, StoreError> {
        let mut options = EnvOpenOptions::new();
        options.map_size(DEFAULT_MAP_SIZE);
        options.max_dbs(DEFAULT_MAX_DBS);
        // SAFETY: the directory is owned by this tool and opened once per
        // process; default LMDB locking is kept.
        let env = unsafe { options.open(dir)? };

        let mut wtxn = env.write_txn()?;
        let nodes = env.create_database::<Str, Str>(&mut wtxn, Some(NODES_DB))?;
        let out_edges = env.create_database::<Str, Str>(&mut wtxn, Some(OUT_EDGES_DB))?;
        let in_edges = env.create_database::<Str, Str>(&mut wtxn, Some(IN_EDGES_DB))?;
        let meta = env.create_database::<Str, Str>(&mut wtxn, Some(META_DB))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            nodes,
            out_edges,
            in_edges,
            meta,
        })
    }

    fn node(&self, rtxn: &RoTxn<'_>, id: NodeId) -> Result<Option<NodeRecord>, StoreError> {
        let Some(raw) = self.nodes.get(rtxn, &node_key(id))? else {
            return Ok(None);
        };
        let stored: StoredNode =
            serde_json::from_str(raw).map_err(|source| StoreError::Record { id, source })?;
        Ok(Some(NodeRecord {
            id,
            kind: stored.kind,
            name: stored.name,
        }))
    }

    fn require_node(&self, rtxn: &RoTxn<'_>, id: NodeId) -> Result<NodeRecord, StoreError> {
        self.node(rtxn, id)?.ok_or(StoreError::MissingNode(id))
    }

    fn neighbor_ids(
        &self,
        rtxn: &RoTxn<'_>,
        id: NodeId,
        step: Step,
    ) -> Result<Vec<NodeId>, StoreError> {
        let db = match step.direction {
            Direction::Outgoing => &self.out_edges,
            Direction::Incoming => &self.in_edges,
        };
        let prefix = edge_prefix(id, step.edge);
        let mut ids = Vec::new();
        for item in db.prefix_iter(rtxn, &prefix)? {
            let (key, _) = item?;
            if let Some(other) = key.rsplit('/').next().and_then(parse_id) {
                ids.push(other);
            }
        }
        Ok(ids)
    }

    /// Neighbour records, memoised in `cache` for the lifetime of one query.
    fn lookup(
        &self,
        rtxn: &RoTxn<'_>,
        cache: &mut HashMap<NodeId, NodeRecord>,
        id: NodeId,
        step: Step,
    ) -> Result<Vec<NodeRecord>, StoreError> {
        let mut out = Vec::new();
        for other in self.neighbor_ids(rtxn, id, step)? {
            if let Some(record) = cache.get(&other) {
                out.push(record.clone());
                continue;
            }
            if let Some(record) = self.node(rtxn, other)? {
                cache.insert(other, record.clone());
                out.push(record);
            }
        }
        Ok(out)
    }
}

impl GraphStore for LmdbGraphStore {
    fn create_node(&self, kind: NodeKind, name: &str) -> Result<NodeId, StoreError> {
        let payload = serde_json::to_string(&StoredNode {
            kind,
            name: name.to_string(),
        })?;

        let mut wtxn = self.env.write_txn()?;
        let next = match self.meta.get(&wtxn, NEXT_ID_KEY)? {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| StoreError::Counter(raw.to_string()))?,
            None => 1,
        };
        let id = NodeId(next);
        self.nodes.put(&mut wtxn, &node_key(id), &payload)?;
        self.meta
            .put(&mut wtxn, NEXT_ID_KEY, &(next + 1).to_string())?;
        wtxn.commit()?;
        Ok(id)
    }

    fn create_edge(&self, kind: EdgeKind, from: NodeId, to: NodeId) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn()?;
        self.require_node(&wtxn, from)?;
        self.require_node(&wtxn, to)?;
        self.out_edges
            .put(&mut wtxn, &edge_key(from, kind, to), "")?;
        self.in_edges.put(&mut wtxn, &edge_key(to, kind, from), "")?;
        wtxn.commit()?;
        Ok(())
    }

    fn find_all(&self, kind: NodeKind) -> Result<Vec<NodeRecord>, StoreError> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::new();
        for item in self.nodes.iter(&rtxn)? {
            let (key, raw) = item?;
            let Some(id) = parse_id(key) else {
                continue;
            };
            let stored: StoredNode =
                serde_json::from_str(raw).map_err(|source| StoreError::Record { id, source })?;
            if stored.kind == kind {
                out.push(NodeRecord {
                    id,
                    kind: stored.kind,
                    name: stored.name,
                });
            }
        }
        Ok(out)
    }

    fn related(
        &self,
        id: NodeId,
        edge: EdgeKind,
        direction: Direction,
    ) -> Result<Vec<NodeRecord>, StoreError> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::new();
        for other in self.neighbor_ids(&rtxn, id, Step::new(edge, direction))? {
            if let Some(record) = self.node(&rtxn, other)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn find_paths(
        &self,
        start: NodeId,
        pattern: &EdgePattern,
        min_hops: u32,
        max_hops: u32,
        timeout: Duration,
    ) -> Result<QueryOutcome<Vec<NodePath>>, StoreError> {
        let rtxn = self.env.read_txn()?;
        let start = self.require_node(&rtxn, start)?;
        let mut cache = HashMap::new();
        find_paths_with(start, pattern, min_hops, max_hops, timeout, |id, step| {
            self.lookup(&rtxn, &mut cache, id, step)
        })
    }

    fn reachable(
        &self,
        start: NodeId,
        pattern: &EdgePattern,
        max_hops: u32,
        timeout: Duration,
    ) -> Result<QueryOutcome<bool>, StoreError> {
        let rtxn = self.env.read_txn()?;
        let start = self.require_node(&rtxn, start)?;
        let mut cache = HashMap::new();
        reachable_with(start, pattern, max_hops, timeout, |id, step| {
            self.lookup(&rtxn, &mut cache, id, step)
        })
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let rtxn = self.env.read_txn()?;
        let mut stats = StoreStats::default();

        for item in self.nodes.iter(&rtxn)? {
            let (key, raw) = item?;
            let id = parse_id(key).unwrap_or(NodeId(0));
            let stored: StoredNode =
                serde_json::from_str(raw).map_err(|source| StoreError::Record { id, source })?;
            match stored.kind {
                NodeKind::Class => stats.classes += 1,
                NodeKind::UserClass => stats.user_classes += 1,
                NodeKind::Jar => stats.jars += 1,
            }
        }

        for item in self.out_edges.iter(&rtxn)? {
            let (key, _) = item?;
            match key.split('/').nth(1) {
                Some(tag) if tag == EdgeKind::Contains.tag() => stats.contains_edges += 1,
                Some(tag) if tag == EdgeKind::DependsOn.tag() => stats.depends_on_edges += 1,
                _ => {}
            }
        }

        Ok(stats)
    }
}

fn node_key(id: NodeId) -> String {
    format!("{:016x}", id.0)
}

fn edge_prefix(id: NodeId, kind: EdgeKind) -> String {
    format!("{:016x}/{}/", id.0, kind.tag())
}

fn edge_key(from: NodeId, kind: EdgeKind, to: NodeId) -> String {
    format!("{:016x}/{}/{:016x}", from.0, kind.tag(), to.0)
}

fn parse_id(raw: &str) -> Option<NodeId> {
    u64::from_str_radix(raw, 16).ok().map(NodeId)
}
