//! Conversation graph reconstruction.
//!
//! Builds a parent/child graph from `parentUuid` references. Nodes live in
//! an arena keyed by uuid; edges are child-key lists. Unresolved parents are
//! held as pending and re-attempted as new nodes arrive.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::Serialize;

use crate::ingest::Message;

/// Why a node is a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootKind {
    /// The message carries no parent reference.
    Origin,
    /// The parent reference does not resolve within the file.
    BrokenChain,
    /// The parent edge would have closed a cycle and was severed.
    CycleBroken,
}

/// Non-fatal diagnostics raised while building a graph.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphWarning {
    #[error("{}:{line_number}: parent {parent_uuid} of {uuid} never resolved", path.display())]
    UnresolvedReference {
        path: PathBuf,
        line_number: u64,
        uuid: String,
        parent_uuid: String,
    },

    #[error("{}:{line_number}: edge {uuid} -> {parent_uuid} would form a cycle", path.display())]
    CycleDetected {
        path: PathBuf,
        line_number: u64,
        uuid: String,
        parent_uuid: String,
    },

    #[error("{}:{line_number}: duplicate uuid {uuid} ignored", path.display())]
    DuplicateUuid {
        path: PathBuf,
        line_number: u64,
        uuid: String,
    },
}

/// A message plus its resolved position in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    message: Message,
    parent: Option<String>,
    children: Vec<String>,
    root_kind: Option<RootKind>,
}

impl Node {
    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Resolved parent uuid. `None` for roots.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Children ordered by `(timestamp, uuid)`.
    #[must_use]
    pub fn children(&self) -> &[String] {
        &self.children
    }

    #[must_use]
    pub fn root_kind(&self) -> Option<RootKind> {
        self.root_kind
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Nodes added or re-parented by one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphDelta {
    /// Newly inserted nodes, in input order.
    pub added: Vec<String>,
    /// Previously existing roots that were attached to a newly arrived parent.
    pub reattached: Vec<String>,
}

impl GraphDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.reattached.is_empty()
    }
}

/// Conversation graph for a single file.
#[derive(Debug, Default)]
pub struct ConversationGraph {
    nodes: HashMap<String, Node>,
    /// Insertion order of nodes.
    order: Vec<String>,
    /// Missing parent uuid -> children waiting for it.
    pending: HashMap<String, Vec<String>>,
    /// Children already reported as unresolved.
    reported: HashSet<String>,
    warnings: Vec<GraphWarning>,
}

impl PartialEq for ConversationGraph {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order && self.nodes == other.nodes
    }
}

impl ConversationGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of messages, in order.
    pub fn merge(&mut self, messages: impl IntoIterator<Item = Message>) -> GraphDelta {
        let mut delta = GraphDelta::default();
        let mut batch: HashSet<String> = HashSet::new();

        for message in messages {
            let uuid = message.uuid.clone();
            if self.nodes.contains_key(&uuid) {
                tracing::debug!(uuid = %uuid, "Duplicate uuid ignored");
                self.warnings.push(GraphWarning::DuplicateUuid {
                    path: message.source_path.clone(),
                    line_number: message.line_number,
                    uuid,
                });
                continue;
            }

            let parent_uuid = message.parent_uuid.clone();
            self.nodes.insert(
                uuid.clone(),
                Node {
                    message,
                    parent: None,
                    children: Vec::new(),
                    root_kind: Some(RootKind::Origin),
                },
            );
            self.order.push(uuid.clone());
            batch.insert(uuid.clone());
            delta.added.push(uuid.clone());

            if let Some(parent_uuid) = parent_uuid {
                if self.nodes.contains_key(&parent_uuid) {
                    self.try_attach(&uuid, &parent_uuid);
                } else {
                    self.set_root_kind(&uuid, RootKind::BrokenChain);
                    self.pending.entry(parent_uuid).or_default().push(uuid.clone());
                }
            }

            if let Some(waiting) = self.pending.remove(&uuid) {
                for child in waiting {
                    self.reported.remove(&child);
                    if self.try_attach(&child, &uuid) && !batch.contains(&child) {
                        delta.reattached.push(child);
                    }
                }
            }
        }

        delta
    }

    /// Report every child still waiting on a missing parent.
    ///
    /// Called at end of the currently available stream. Such children stay
    /// roots flagged [`RootKind::BrokenChain`]; if the parent shows up in a
    /// later merge they are still attached. Each child is reported once.
    pub fn finalize(&mut self) {
        let mut unresolved: Vec<GraphWarning> = Vec::new();
        for (parent_uuid, children) in &self.pending {
            for child in children {
                if self.reported.contains(child) {
                    continue;
                }
                if let Some(node) = self.nodes.get(child) {
                    unresolved.push(GraphWarning::UnresolvedReference {
                        path: node.message.source_path.clone(),
                        line_number: node.message.line_number,
                        uuid: child.clone(),
                        parent_uuid: parent_uuid.clone(),
                    });
                }
            }
        }
        unresolved.sort_by_key(|w| match w {
            GraphWarning::UnresolvedReference { line_number, .. } => *line_number,
            _ => 0,
        });
        for warning in &unresolved {
            if let GraphWarning::UnresolvedReference { uuid, .. } = warning {
                self.reported.insert(uuid.clone());
            }
        }
        self.warnings.extend(unresolved);
    }

    /// Drain diagnostics collected since the last call.
    pub fn take_warnings(&mut self) -> Vec<GraphWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Drop all nodes and state.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.order.clear();
        self.pending.clear();
        self.reported.clear();
        self.warnings.clear();
    }

    #[must_use]
    pub fn get(&self, uuid: &str) -> Option<&Node> {
        self.nodes.get(uuid)
    }

    #[must_use]
    pub fn contains(&self, uuid: &str) -> bool {
        self.nodes.contains_key(uuid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node uuids in insertion order.
    #[must_use]
    pub fn uuids(&self) -> &[String] {
        &self.order
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|uuid| self.nodes.get(uuid))
    }

    /// Root uuids in insertion order.
    #[must_use]
    pub fn roots(&self) -> Vec<&str> {
        self.nodes()
            .filter(|n| n.is_root())
            .map(|n| n.message.uuid.as_str())
            .collect()
    }

    /// Number of children still waiting for a parent.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Latest message timestamp in the graph.
    #[must_use]
    pub fn latest_timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.nodes.values().map(|n| n.message.timestamp).max()
    }

    /// Attach `child` under `parent` unless that would close a cycle.
    fn try_attach(&mut self, child: &str, parent: &str) -> bool {
        if self.is_ancestor_or_self(child, parent) {
            let node = self.nodes.get(child);
            tracing::debug!(uuid = %child, parent = %parent, "Cycle detected, edge severed");
            if let Some(node) = node {
                self.warnings.push(GraphWarning::CycleDetected {
                    path: node.message.source_path.clone(),
                    line_number: node.message.line_number,
                    uuid: child.to_string(),
                    parent_uuid: parent.to_string(),
                });
            }
            self.set_root_kind(child, RootKind::CycleBroken);
            return false;
        }

        let key = match self.nodes.get(child) {
            Some(node) => (node.message.timestamp, node.message.uuid.clone()),
            None => return false,
        };
        let position = match self.nodes.get(parent) {
            Some(p) => p.children.partition_point(|c| {
                self.nodes.get(c).is_some_and(|n| {
                    (n.message.timestamp, n.message.uuid.as_str()) < (key.0, key.1.as_str())
                })
            }),
            None => return false,
        };
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.insert(position, child.to_string());
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = Some(parent.to_string());
            c.root_kind = None;
        }
        true
    }

    /// Whether `candidate` is `start` or one of its ancestors.
    fn is_ancestor_or_self(&self, candidate: &str, start: &str) -> bool {
        let mut current = Some(start);
        while let Some(uuid) = current {
            if uuid == candidate {
                return true;
            }
            current = self.nodes.get(uuid).and_then(|n| n.parent.as_deref());
        }
        false
    }

    fn set_root_kind(&mut self, uuid: &str, kind: RootKind) {
        if let Some(node) = self.nodes.get_mut(uuid) {
            node.root_kind = Some(kind);
        }
    }
}
