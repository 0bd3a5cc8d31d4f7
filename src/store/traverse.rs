//! Pattern traversal shared by store implementations.
//!
//! Both walks take a neighbour lookup so the same logic serves any backend
//! that can answer single-hop adjacency. The deadline is checked before every
//! node expansion.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use super::{EdgePattern, NodeId, NodePath, NodeRecord, QueryOutcome, Step};
use crate::error::StoreError;

pub(crate) fn find_paths_with<F>(
    start: NodeRecord,
    pattern: &EdgePattern,
    min_hops: u32,
    max_hops: u32,
    timeout: Duration,
    neighbors: F,
) -> Result<QueryOutcome<Vec<NodePath>>, StoreError>
where
    F: FnMut(NodeId, Step) -> Result<Vec<NodeRecord>, StoreError>,
{
    let mut walk = PathWalk {
        pattern,
        min_hops,
        max_hops,
        deadline: Instant::now().checked_add(timeout),
        neighbors,
        path: Vec::new(),
        on_path: HashSet::new(),
        found: Vec::new(),
    };

    let start_id = start.id;
    walk.enter(start);

    let flow = match pattern.head {
        Some(step) => {
            let mut flow = Flow::Continue;
            let members = (walk.neighbors)(start_id, step)?;
            for next in members {
                if walk.on_path.contains(&next.id) {
                    continue;
                }
                walk.enter(next);
                flow = walk.repeat_from(0)?;
                walk.leave();
                if flow == Flow::Stop {
                    break;
                }
            }
            flow
        }
        None => walk.repeat_from(0)?,
    };

    Ok(match flow {
        Flow::Continue => QueryOutcome::Complete(walk.found),
        Flow::Stop => QueryOutcome::TimedOut,
    })
}

pub(crate) fn reachable_with<F>(
    start: NodeRecord,
    pattern: &EdgePattern,
    max_hops: u32,
    timeout: Duration,
    mut neighbors: F,
) -> Result<QueryOutcome<bool>, StoreError>
where
    F: FnMut(NodeId, Step) -> Result<Vec<NodeRecord>, StoreError>,
{
    let deadline = Instant::now().checked_add(timeout);
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<(NodeRecord, u32)> = VecDeque::new();

    visited.insert(start.id);
    match pattern.head {
        Some(step) => {
            for next in neighbors(start.id, step)? {
                if visited.insert(next.id) {
                    queue.push_back((next, 0));
                }
            }
        }
        None => queue.push_back((start, 0)),
    }

    while let Some((current, hops)) = queue.pop_front() {
        if expired(deadline) {
            return Ok(QueryOutcome::TimedOut);
        }

        if hops >= 1 {
            let hit = match pattern.tail {
                Some(step) => neighbors(current.id, step)?
                    .iter()
                    .any(|n| n.kind == pattern.terminal),
                None => current.kind == pattern.terminal,
            };
            if hit {
                return Ok(QueryOutcome::Complete(true));
            }
        }

        if hops < max_hops {
            for next in neighbors(current.id, pattern.repeat)? {
                if visited.insert(next.id) {
                    queue.push_back((next, hops + 1));
                }
            }
        }
    }

    Ok(QueryOutcome::Complete(false))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct PathWalk<'p, F> {
    pattern: &'p EdgePattern,
    min_hops: u32,
    max_hops: u32,
    deadline: Option<Instant>,
    neighbors: F,
    path: Vec<NodeRecord>,
    on_path: HashSet<NodeId>,
    found: Vec<NodePath>,
}

impl<F> PathWalk<'_, F>
where
    F: FnMut(NodeId, Step) -> Result<Vec<NodeRecord>, StoreError>,
{
    fn enter(&mut self, node: NodeRecord) {
        self.on_path.insert(node.id);
        self.path.push(node);
    }

    fn leave(&mut self) {
        if let Some(node) = self.path.pop() {
            self.on_path.remove(&node.id);
        }
    }

    fn repeat_from(&mut self, hops: u32) -> Result<Flow, StoreError> {
        if expired(self.deadline) {
            return Ok(Flow::Stop);
        }
        let Some(current) = self.path.last().cloned() else {
            return Ok(Flow::Continue);
        };

        if hops >= self.min_hops {
            self.emit(&current)?;
        }

        if hops < self.max_hops {
            let nexts = (self.neighbors)(current.id, self.pattern.repeat)?;
            for next in nexts {
                if self.on_path.contains(&next.id) {
                    continue;
                }
                self.enter(next);
                let flow = self.repeat_from(hops + 1)?;
                self.leave();
                if flow == Flow::Stop {
                    return Ok(Flow::Stop);
                }
            }
        }

        Ok(Flow::Continue)
    }

    fn emit(&mut self, current: &NodeRecord) -> Result<(), StoreError> {
        match self.pattern.tail {
            Some(step) => {
                let candidates = (self.neighbors)(current.id, step)?;
                for last in candidates {
                    if last.kind != self.pattern.terminal || self.on_path.contains(&last.id) {
                        continue;
                    }
                    let mut path = self.path.clone();
                    path.push(last);
                    self.found.push(path);
                }
            }
            None => {
                if current.kind == self.pattern.terminal {
                    self.found.push(self.path.clone());
                }
            }
        }
        Ok(())
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}
