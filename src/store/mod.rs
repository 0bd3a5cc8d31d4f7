//! Graph store capability consumed by the builder and the searches.
//!
//! Every call is its own transaction. Path and reachability queries take a
//! wall-clock budget and answer [`QueryOutcome::TimedOut`] instead of
//! blocking past it.

pub mod lmdb;
mod traverse;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::StoreError;

pub use lmdb::{DATA_FILE, LOCK_FILE, LmdbGraphStore};
pub(crate) use traverse::{find_paths_with, reachable_with};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Class,
    UserClass,
    Jar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Jar → class it packages.
    Contains,
    /// Class → class its bytecode references.
    DependsOn,
}

impl EdgeKind {
    pub fn tag(self) -> &'static str {
        match self {
            EdgeKind::Contains => "contains",
            EdgeKind::DependsOn => "depends_on",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
}

/// Nodes of one discovered path, ordered from the query start node.
pub type NodePath = Vec<NodeRecord>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub edge: EdgeKind,
    pub direction: Direction,
}

impl Step {
    pub const fn new(edge: EdgeKind, direction: Direction) -> Self {
        Self { edge, direction }
    }
}

/// `[head] repeat{min..max} [tail]`, ending on a node of kind `terminal`.
///
/// The hop bounds of a query apply to the repeated step only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgePattern {
    pub head: Option<Step>,
    pub repeat: Step,
    pub tail: Option<Step>,
    pub terminal: NodeKind,
}

impl EdgePattern {
    /// `Jar -contains-> Class <-dependsOn*- UserClass`
    pub const ARCHIVE_TO_USER_CLASSES: EdgePattern = EdgePattern {
        head: Some(Step::new(EdgeKind::Contains, Direction::Outgoing)),
        repeat: Step::new(EdgeKind::DependsOn, Direction::Incoming),
        tail: None,
        terminal: NodeKind::UserClass,
    };

    /// `UserClass -dependsOn*-> Class <-contains- Jar`
    pub const USER_CLASS_TO_ARCHIVES: EdgePattern = EdgePattern {
        head: None,
        repeat: Step::new(EdgeKind::DependsOn, Direction::Outgoing),
        tail: Some(Step::new(EdgeKind::Contains, Direction::Incoming)),
        terminal: NodeKind::Jar,
    };

    /// `Class <-dependsOn*- UserClass`
    pub const CLASS_TO_USER_CLASS: EdgePattern = EdgePattern {
        head: None,
        repeat: Step::new(EdgeKind::DependsOn, Direction::Incoming),
        tail: None,
        terminal: NodeKind::UserClass,
    };
}

/// A query either finished within its budget or was cut off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome<T> {
    Complete(T),
    TimedOut,
}

impl<T> QueryOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryOutcome<U> {
        match self {
            QueryOutcome::Complete(value) => QueryOutcome::Complete(f(value)),
            QueryOutcome::TimedOut => QueryOutcome::TimedOut,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub classes: u64,
    pub user_classes: u64,
    pub jars: u64,
    pub contains_edges: u64,
    pub depends_on_edges: u64,
}

pub trait GraphStore: Send + Sync {
    fn create_node(&self, kind: NodeKind, name: &str) -> Result<NodeId, StoreError>;

    /// Fails with [`StoreError::MissingNode`] if either endpoint is absent.
    fn create_edge(&self, kind: EdgeKind, from: NodeId, to: NodeId) -> Result<(), StoreError>;

    fn find_all(&self, kind: NodeKind) -> Result<Vec<NodeRecord>, StoreError>;

    /// Single-hop neighbours of `id` over `edge` in `direction`.
    fn related(
        &self,
        id: NodeId,
        edge: EdgeKind,
        direction: Direction,
    ) -> Result<Vec<NodeRecord>, StoreError>;

    /// All simple paths from `start` matching `pattern`.
    fn find_paths(
        &self,
        start: NodeId,
        pattern: &EdgePattern,
        min_hops: u32,
        max_hops: u32,
        timeout: Duration,
    ) -> Result<QueryOutcome<Vec<NodePath>>, StoreError>;

    /// Whether any node matching `pattern` lies within `max_hops` of `start`.
    fn reachable(
        &self,
        start: NodeId,
        pattern: &EdgePattern,
        max_hops: u32,
        timeout: Duration,
    ) -> Result<QueryOutcome<bool>, StoreError>;

    fn stats(&self) -> Result<StoreStats, StoreError>;
}
