//! session-lens - incremental analysis of AI-assistant conversation logs.
//!
//! Parses append-only JSONL session files, rebuilds the conversation graph
//! from parent references, classifies content and ranks messages by
//! importance, either once per file, across many files, or continuously as
//! files grow.

pub mod analysis;
pub mod batch;
pub mod config;
pub mod display;
pub mod graph;
pub mod ingest;
pub mod monitor;
pub mod pattern;
pub mod scoring;
