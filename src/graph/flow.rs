//! Structural flow analysis over a conversation graph.
//!
//! Annotates every node with depth, branch factor, subtree height and
//! primary-chain membership. Updates after a merge only touch the subtrees
//! that changed and the ancestors whose height changed.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::builder::{ConversationGraph, GraphDelta, Node, RootKind};

/// Per-node structural annotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlowAnnotation {
    /// Distance from the nearest root (root = 0).
    pub depth: usize,
    /// Number of children.
    pub branch_factor: usize,
    /// Node count of the longest downward path (leaf = 1).
    pub height: usize,
    /// Whether the node lies on the primary chain.
    pub on_primary_chain: bool,
}

impl FlowAnnotation {
    #[must_use]
    pub fn is_branch_point(&self) -> bool {
        self.branch_factor > 1
    }
}

/// Graph-level structural summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowSummary {
    pub nodes: usize,
    pub roots: usize,
    pub broken_chains: usize,
    pub cycles_broken: usize,
    pub branch_points: usize,
    pub max_depth: usize,
    pub primary_chain_len: usize,
}

/// Computes and maintains [`FlowAnnotation`]s for one graph.
#[derive(Debug, Default)]
pub struct FlowAnalyzer {
    annotations: HashMap<String, FlowAnnotation>,
    /// Child on the longest downward path, per node with children.
    best_child: HashMap<String, String>,
    primary_chain: Vec<String>,
}

impl FlowAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Annotate the whole graph from scratch.
    pub fn analyze(&mut self, graph: &ConversationGraph) {
        self.reset();
        let delta = GraphDelta {
            added: graph.uuids().to_vec(),
            reattached: Vec::new(),
        };
        self.update(graph, &delta);
    }

    /// Bring annotations up to date after `delta` was merged into `graph`.
    pub fn update(&mut self, graph: &ConversationGraph, delta: &GraphDelta) {
        if delta.is_empty() {
            return;
        }

        let affected: HashSet<&str> = delta
            .added
            .iter()
            .chain(&delta.reattached)
            .map(String::as_str)
            .filter(|u| graph.contains(u))
            .collect();

        self.update_depths(graph, &affected);

        // Branch factors change only on affected nodes and their parents.
        for uuid in &affected {
            self.refresh_branch_factor(graph, uuid);
            if let Some(parent) = graph.get(uuid).and_then(Node::parent) {
                self.refresh_branch_factor(graph, parent);
            }
        }

        self.update_heights(graph, &affected);
        self.update_primary_chain(graph);

        tracing::trace!(
            affected = affected.len(),
            chain = self.primary_chain.len(),
            "Flow annotations updated"
        );
    }

    /// Annotation for a node, if the node has been analysed.
    #[must_use]
    pub fn annotation(&self, uuid: &str) -> Option<&FlowAnnotation> {
        self.annotations.get(uuid)
    }

    /// Uuids on the primary chain, root first.
    #[must_use]
    pub fn primary_chain(&self) -> &[String] {
        &self.primary_chain
    }

    /// Summarise the graph using the current annotations.
    #[must_use]
    pub fn summary(&self, graph: &ConversationGraph) -> FlowSummary {
        let mut summary = FlowSummary {
            nodes: graph.len(),
            primary_chain_len: self.primary_chain.len(),
            ..FlowSummary::default()
        };
        for node in graph.nodes() {
            match node.root_kind() {
                Some(RootKind::BrokenChain) => summary.broken_chains += 1,
                Some(RootKind::CycleBroken) => summary.cycles_broken += 1,
                _ => {}
            }
            if node.is_root() {
                summary.roots += 1;
            }
            if let Some(a) = self.annotations.get(&node.message().uuid) {
                if a.is_branch_point() {
                    summary.branch_points += 1;
                }
                summary.max_depth = summary.max_depth.max(a.depth);
            }
        }
        summary
    }

    /// Drop all annotations.
    pub fn reset(&mut self) {
        self.annotations.clear();
        self.best_child.clear();
        self.primary_chain.clear();
    }

    /// Recompute depths for every subtree hanging off an affected node.
    fn update_depths(&mut self, graph: &ConversationGraph, affected: &HashSet<&str>) {
        let mut tops: Vec<&str> = affected
            .iter()
            .copied()
            .filter(|u| {
                graph
                    .get(u)
                    .and_then(Node::parent)
                    .map_or(true, |p| !affected.contains(p))
            })
            .collect();
        tops.sort_unstable();

        for top in tops {
            let start = graph
                .get(top)
                .and_then(Node::parent)
                .and_then(|p| self.annotations.get(p))
                .map_or(0, |a| a.depth + 1);

            let mut stack = vec![(top, start)];
            while let Some((uuid, depth)) = stack.pop() {
                self.annotations.entry(uuid.to_string()).or_default().depth = depth;
                if let Some(node) = graph.get(uuid) {
                    stack.extend(node.children().iter().map(|c| (c.as_str(), depth + 1)));
                }
            }
        }
    }

    fn refresh_branch_factor(&mut self, graph: &ConversationGraph, uuid: &str) {
        if let Some(node) = graph.get(uuid) {
            self.annotations
                .entry(uuid.to_string())
                .or_default()
                .branch_factor = node.children().len();
        }
    }

    /// Recompute heights bottom-up over affected nodes, then propagate to
    /// ancestors until a height stops changing.
    fn update_heights(&mut self, graph: &ConversationGraph, affected: &HashSet<&str>) {
        let mut ordered: Vec<&str> = affected.iter().copied().collect();
        // Deepest first so children are settled before parents.
        ordered.sort_unstable_by(|a, b| {
            let da = self.annotations.get(*a).map_or(0, |x| x.depth);
            let db = self.annotations.get(*b).map_or(0, |x| x.depth);
            db.cmp(&da).then_with(|| a.cmp(b))
        });

        for uuid in &ordered {
            self.recompute_height(graph, uuid);
        }

        for uuid in &ordered {
            let mut current = graph.get(uuid).and_then(Node::parent);
            while let Some(parent) = current {
                if !self.recompute_height(graph, parent) {
                    break;
                }
                current = graph.get(parent).and_then(Node::parent);
            }
        }
    }

    /// Recompute height and best child of one node from its children.
    ///
    /// Returns whether the height changed.
    fn recompute_height(&mut self, graph: &ConversationGraph, uuid: &str) -> bool {
        let Some(node) = graph.get(uuid) else {
            return false;
        };

        let best = self.best_of(graph, node.children().iter().map(String::as_str));
        let height = best
            .and_then(|b| self.annotations.get(b))
            .map_or(1, |a| a.height + 1);

        match best {
            Some(b) => {
                self.best_child.insert(uuid.to_string(), b.to_string());
            }
            None => {
                self.best_child.remove(uuid);
            }
        }

        let entry = self.annotations.entry(uuid.to_string()).or_default();
        let changed = entry.height != height;
        entry.height = height;
        changed
    }

    /// Pick the candidate with the greatest height; ties go to the earliest
    /// timestamp, then the smallest uuid.
    fn best_of<'g>(
        &self,
        graph: &'g ConversationGraph,
        candidates: impl Iterator<Item = &'g str>,
    ) -> Option<&'g str> {
        candidates
            .filter_map(|c| {
                let height = self.annotations.get(c).map_or(1, |a| a.height);
                graph.get(c).map(|n| (c, height, n.message().timestamp))
            })
            .min_by(|(ua, ha, ta), (ub, hb, tb)| {
                hb.cmp(ha).then_with(|| ta.cmp(tb)).then_with(|| ua.cmp(ub))
            })
            .map(|(c, _, _)| c)
    }

    fn update_primary_chain(&mut self, graph: &ConversationGraph) {
        for uuid in &self.primary_chain {
            if let Some(a) = self.annotations.get_mut(uuid) {
                a.on_primary_chain = false;
            }
        }
        self.primary_chain.clear();

        let roots = graph.roots();
        let mut current = self.best_of(graph, roots.into_iter()).map(str::to_string);
        while let Some(uuid) = current {
            if let Some(a) = self.annotations.get_mut(&uuid) {
                a.on_primary_chain = true;
            }
            current = self.best_child.get(&uuid).cloned();
            self.primary_chain.push(uuid);
        }
    }
}
