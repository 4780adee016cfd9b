//! Per-file analysis state.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::graph::{
    ConversationGraph, FlowAnalyzer, FlowAnnotation, GraphDelta, GraphWarning, Node,
};
use crate::ingest::Message;
use crate::scoring::{ScoredMessage, Scorer};

use super::pipeline::Pipeline;

/// Graph and flow state for one file, fed incrementally.
///
/// Each call to [`FileSession::ingest`] merges a batch, finalizes the graph
/// for the data seen so far and updates flow annotations for the affected
/// nodes only.
#[derive(Debug)]
pub struct FileSession {
    path: PathBuf,
    pipeline: Pipeline,
    graph: ConversationGraph,
    flow: FlowAnalyzer,
}

/// What one ingest call changed.
#[derive(Debug, Default)]
pub struct SessionUpdate {
    pub delta: GraphDelta,
    /// Scores for added and re-attached nodes in merge order, followed by
    /// existing nodes whose branch or chain annotations may have changed.
    pub scored: Vec<ScoredMessage>,
    pub warnings: Vec<GraphWarning>,
}

impl FileSession {
    #[must_use]
    pub fn new(pipeline: Pipeline, path: PathBuf) -> Self {
        Self {
            path,
            pipeline,
            graph: ConversationGraph::new(),
            flow: FlowAnalyzer::new(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn graph(&self) -> &ConversationGraph {
        &self.graph
    }

    #[must_use]
    pub fn flow(&self) -> &FlowAnalyzer {
        &self.flow
    }

    /// Merge messages, update annotations and score what changed.
    pub fn ingest(&mut self, messages: Vec<Message>) -> SessionUpdate {
        let chain_before: HashSet<String> =
            self.flow.primary_chain().iter().cloned().collect();
        let delta = self.merge(messages);
        let warnings = self.graph.take_warnings();
        let changed = self.changed_nodes(&delta, &chain_before);
        let scored = self.score_nodes(&changed);
        SessionUpdate {
            delta,
            scored,
            warnings,
        }
    }

    /// Added and re-attached nodes in merge order, then existing nodes whose
    /// annotations may have moved: parents of those nodes and nodes that
    /// joined or left the primary chain.
    fn changed_nodes<'a>(
        &'a self,
        delta: &'a GraphDelta,
        chain_before: &HashSet<String>,
    ) -> Vec<&'a str> {
        let mut changed: Vec<&str> = delta
            .added
            .iter()
            .chain(&delta.reattached)
            .map(String::as_str)
            .collect();
        let direct: HashSet<&str> = changed.iter().copied().collect();
        let parents: HashSet<&str> = changed
            .iter()
            .filter_map(|uuid| self.graph.get(uuid).and_then(Node::parent))
            .collect();
        let chain_now: HashSet<&str> = self
            .flow
            .primary_chain()
            .iter()
            .map(String::as_str)
            .collect();
        let chain_moved = chain_now.len() != chain_before.len()
            || chain_now.iter().any(|u| !chain_before.contains(*u));
        if parents.is_empty() && !chain_moved {
            return changed;
        }

        let rescore = self.graph.uuids().iter().map(String::as_str).filter(|uuid| {
            !direct.contains(uuid)
                && (parents.contains(uuid)
                    || chain_before.contains(*uuid) != chain_now.contains(uuid))
        });
        changed.extend(rescore);
        changed
    }

    /// Merge messages without scoring. Warnings are discarded.
    ///
    /// Used to rebuild the graph from content that was already reported.
    pub fn hydrate(&mut self, messages: Vec<Message>) -> GraphDelta {
        let delta = self.merge(messages);
        let dropped = self.graph.take_warnings().len();
        tracing::debug!(
            path = %self.path.display(),
            nodes = self.graph.len(),
            dropped_warnings = dropped,
            "Session hydrated"
        );
        delta
    }

    fn merge(&mut self, messages: Vec<Message>) -> GraphDelta {
        let delta = self.graph.merge(messages);
        self.graph.finalize();
        self.flow.update(&self.graph, &delta);
        delta
    }

    /// Score the given nodes with the current annotations. Unknown uuids are
    /// skipped.
    #[must_use]
    pub fn score_nodes(&self, uuids: &[&str]) -> Vec<ScoredMessage> {
        let scorer: &Scorer = self.pipeline.scorer();
        let reference = scorer
            .config()
            .reference_time
            .resolve(self.graph.latest_timestamp());

        uuids
            .iter()
            .filter_map(|uuid| self.graph.get(uuid))
            .map(|node| {
                let message = node.message();
                let annotation = self
                    .flow
                    .annotation(&message.uuid)
                    .copied()
                    .unwrap_or_else(FlowAnnotation::default);
                let matches = self.pipeline.registry().classify(message);
                scorer.score_message(message, annotation, matches, reference)
            })
            .collect()
    }

    /// Score every node in arrival order.
    #[must_use]
    pub fn score_all(&self) -> Vec<ScoredMessage> {
        let uuids: Vec<&str> = self.graph.uuids().iter().map(String::as_str).collect();
        self.score_nodes(&uuids)
    }

    /// Discard graph and annotations.
    pub fn reset(&mut self) {
        self.graph.clear();
        self.flow.reset();
    }

    /// Consume the session, returning the graph.
    #[must_use]
    pub fn into_graph(self) -> ConversationGraph {
        self.graph
    }
}
