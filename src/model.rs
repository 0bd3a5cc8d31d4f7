//! In-memory entities produced by extraction and consumed by the builder.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::store::{NodeId, NodeKind};

/// Class name → names it references, after filtering.
pub type ReferenceMap = HashMap<String, BTreeSet<String>>;

#[derive(Debug)]
pub struct ClassEntity {
    pub name: String,
    /// Sourced from the analysed codebase rather than a library archive.
    pub custom: bool,
    id: OnceLock<NodeId>,
}

impl ClassEntity {
    pub fn new(name: impl Into<String>, custom: bool) -> Self {
        Self {
            name: name.into(),
            custom,
            id: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        if self.custom {
            NodeKind::UserClass
        } else {
            NodeKind::Class
        }
    }

    pub fn id(&self) -> Option<NodeId> {
        self.id.get().copied()
    }

    /// Stores the persisted id. Returns false if one was already recorded.
    pub fn record_id(&self, id: NodeId) -> bool {
        self.id.set(id).is_ok()
    }
}

#[derive(Debug)]
pub struct ArchiveEntity {
    pub path: PathBuf,
    /// Indices into the owning inventory's class list.
    pub members: Vec<usize>,
    id: OnceLock<NodeId>,
}

impl ArchiveEntity {
    pub fn new(path: PathBuf, members: Vec<usize>) -> Self {
        Self {
            path,
            members,
            id: OnceLock::new(),
        }
    }

    /// Node name; the archive path as it was read from disk.
    pub fn name(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    pub fn id(&self) -> Option<NodeId> {
        self.id.get().copied()
    }

    pub fn record_id(&self, id: NodeId) -> bool {
        self.id.set(id).is_ok()
    }
}

/// File name used to reconcile archives that appear at several paths.
pub fn archive_file_name(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(name)
}
