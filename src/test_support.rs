use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use zip::write::FileOptions;

use crate::error::StoreError;
use crate::store::{
    Direction, EdgeKind, EdgePattern, GraphStore, NodeId, NodeKind, NodePath, NodeRecord,
    QueryOutcome, Step, StoreStats, find_paths_with, reachable_with,
};

static COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "tpl_analyzer_test_{}_{}_{}_{}",
        std::process::id(),
        nanos,
        n,
        name
    ))
}

pub fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

pub fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap();
}

/// Minimal class file emitter: real constant-pool layout, no code.
pub struct ClassFileWriter {
    pool: Vec<u8>,
    next_index: u16,
    this_class: u16,
    super_class: u16,
    fields: Vec<(u16, u16)>,
    methods: Vec<(u16, u16)>,
}

impl ClassFileWriter {
    pub fn new(internal_name: &str) -> Self {
        let mut writer = Self {
            pool: Vec::new(),
            next_index: 1,
            this_class: 0,
            super_class: 0,
            fields: Vec::new(),
            methods: Vec::new(),
        };
        writer.this_class = writer.class(internal_name);
        writer
    }

    pub fn super_class(mut self, internal_name: &str) -> Self {
        self.super_class = self.class(internal_name);
        self
    }

    pub fn reference(mut self, internal_name: &str) -> Self {
        self.class(internal_name);
        self
    }

    pub fn method_ref(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        let class = self.class(owner);
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let nat = self.push(12, &[name.to_be_bytes(), descriptor.to_be_bytes()].concat());
        self.push(10, &[class.to_be_bytes(), nat.to_be_bytes()].concat());
        self
    }

    pub fn field(mut self, name: &str, descriptor: &str) -> Self {
        let member = (self.utf8(name), self.utf8(descriptor));
        self.fields.push(member);
        self
    }

    pub fn method(mut self, name: &str, descriptor: &str) -> Self {
        let member = (self.utf8(name), self.utf8(descriptor));
        self.methods.push(member);
        self
    }

    pub fn long_constant(mut self, value: i64) -> Self {
        self.push(5, &value.to_be_bytes());
        self.next_index += 1;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&52u16.to_be_bytes());
        out.extend_from_slice(&self.next_index.to_be_bytes());
        out.extend_from_slice(&self.pool);
        out.extend_from_slice(&0x0021u16.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        for members in [&self.fields, &self.methods] {
            out.extend_from_slice(&(members.len() as u16).to_be_bytes());
            for (name, descriptor) in members.iter() {
                out.extend_from_slice(&0x0001u16.to_be_bytes());
                out.extend_from_slice(&name.to_be_bytes());
                out.extend_from_slice(&descriptor.to_be_bytes());
                out.extend_from_slice(&0u16.to_be_bytes());
            }
        }
        out.extend_from_slice(&0u16.to_be_bytes());
        out
    }

    fn utf8(&mut self, value: &str) -> u16 {
        let mut payload = (value.len() as u16).to_be_bytes().to_vec();
        payload.extend_from_slice(value.as_bytes());
        self.push(1, &payload)
    }

    fn class(&mut self, internal_name: &str) -> u16 {
        let name = self.utf8(internal_name);
        self.push(7, &name.to_be_bytes())
    }

    fn push(&mut self, tag: u8, payload: &[u8]) -> u16 {
        let index = self.next_index;
        self.pool.push(tag);
        self.pool.extend_from_slice(payload);
        self.next_index += 1;
        index
    }
}

/// Class bytes for `internal_name` referencing each of `refs`.
pub fn class_bytes(internal_name: &str, refs: &[&str]) -> Vec<u8> {
    refs.iter()
        .fold(
            ClassFileWriter::new(internal_name).super_class("java/lang/Object"),
            |writer, r| writer.reference(r),
        )
        .build()
}

/// In-memory graph store with scripted failures, for exercising the
/// builder and the searches without LMDB.
#[derive(Default)]
pub struct MemoryStore {
    pub(crate) inner: parking_lot::Mutex<MemoryGraph>,
    /// `find_paths` times out whenever `max_hops` exceeds this.
    pub timeout_above: Option<u32>,
    /// `reachable` always times out.
    pub reach_times_out: bool,
    /// Edge writes touching a node with this name are rejected.
    pub reject_edges_for: Option<String>,
    pub path_queries: parking_lot::Mutex<Vec<(NodeId, u32)>>,
}

#[derive(Default)]
struct MemoryGraph {
    nodes: Vec<NodeRecord>,
    edges: Vec<(EdgeKind, NodeId, NodeId)>,
}

impl MemoryGraph {
    fn get(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn neighbors(&self, id: NodeId, step: Step) -> Vec<NodeRecord> {
        self.edges
            .iter()
            .filter(|(kind, _, _)| *kind == step.edge)
            .filter_map(|(_, from, to)| match step.direction {
                Direction::Outgoing if *from == id => Some(*to),
                Direction::Incoming if *to == id => Some(*from),
                _ => None,
            })
            .filter_map(|n| self.get(n).cloned())
            .collect()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_named(&self, name: &str) -> Option<NodeRecord> {
        self.inner
            .lock()
            .nodes
            .iter()
            .find(|n| n.name == name)
            .cloned()
    }

    pub fn count_named(&self, name: &str) -> usize {
        self.inner
            .lock()
            .nodes
            .iter()
            .filter(|n| n.name == name)
            .count()
    }

    pub fn edges(&self) -> Vec<(EdgeKind, String, String)> {
        let graph = self.inner.lock();
        graph
            .edges
            .iter()
            .filter_map(|(kind, from, to)| {
                Some((*kind, graph.get(*from)?.name.clone(), graph.get(*to)?.name.clone()))
            })
            .collect()
    }

    pub fn depths_tried(&self, start: NodeId) -> Vec<u32> {
        self.path_queries
            .lock()
            .iter()
            .filter(|(id, _)| *id == start)
            .map(|(_, depth)| *depth)
            .collect()
    }
}

impl GraphStore for MemoryStore {
    fn create_node(&self, kind: NodeKind, name: &str) -> Result<NodeId, StoreError> {
        let mut graph = self.inner.lock();
        let id = NodeId(graph.nodes.len() as u64 + 1);
        graph.nodes.push(NodeRecord {
            id,
            kind,
            name: name.to_string(),
        });
        Ok(id)
    }

    fn create_edge(&self, kind: EdgeKind, from: NodeId, to: NodeId) -> Result<(), StoreError> {
        let mut graph = self.inner.lock();
        for id in [from, to] {
            let node = graph.get(id).ok_or(StoreError::MissingNode(id))?;
            if self.reject_edges_for.as_deref() == Some(node.name.as_str()) {
                return Err(StoreError::MissingNode(id));
            }
        }
        graph.edges.push((kind, from, to));
        Ok(())
    }

    fn find_all(&self, kind: NodeKind) -> Result<Vec<NodeRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .nodes
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect())
    }

    fn related(
        &self,
        id: NodeId,
        edge: EdgeKind,
        direction: Direction,
    ) -> Result<Vec<NodeRecord>, StoreError> {
        Ok(self.inner.lock().neighbors(id, Step::new(edge, direction)))
    }

    fn find_paths(
        &self,
        start: NodeId,
        pattern: &EdgePattern,
        min_hops: u32,
        max_hops: u32,
        timeout: Duration,
    ) -> Result<QueryOutcome<Vec<NodePath>>, StoreError> {
        self.path_queries.lock().push((start, max_hops));
        if self.timeout_above.is_some_and(|limit| max_hops > limit) {
            return Ok(QueryOutcome::TimedOut);
        }
        let graph = self.inner.lock();
        let start = graph.get(start).cloned().ok_or(StoreError::MissingNode(start))?;
        find_paths_with(start, pattern, min_hops, max_hops, timeout, |id, step| {
            Ok(graph.neighbors(id, step))
        })
    }

    fn reachable(
        &self,
        start: NodeId,
        pattern: &EdgePattern,
        max_hops: u32,
        timeout: Duration,
    ) -> Result<QueryOutcome<bool>, StoreError> {
        if self.reach_times_out {
            return Ok(QueryOutcome::TimedOut);
        }
        let graph = self.inner.lock();
        let start = graph.get(start).cloned().ok_or(StoreError::MissingNode(start))?;
        reachable_with(start, pattern, max_hops, timeout, |id, step| {
            Ok(graph.neighbors(id, step))
        })
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let graph = self.inner.lock();
        let mut stats = StoreStats::default();
        for node in &graph.nodes {
            match node.kind {
                NodeKind::Class => stats.classes += 1,
                NodeKind::UserClass => stats.user_classes += 1,
                NodeKind::Jar => stats.jars += 1,
            }
        }
        for (kind, _, _) in &graph.edges {
            match kind {
                EdgeKind::Contains => stats.contains_edges += 1,
                EdgeKind::DependsOn => stats.depends_on_edges += 1,
            }
        }
        Ok(stats)
    }
}
