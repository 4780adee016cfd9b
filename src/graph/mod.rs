//! Conversation graph reconstruction and structural flow analysis.

mod builder;
mod flow;

pub use builder::{ConversationGraph, GraphDelta, GraphWarning, Node, RootKind};
pub use flow::{FlowAnalyzer, FlowAnnotation, FlowSummary};
