//! DeFi threat-intel ingestion pipeline.
//!
//! A run walks each selected source through the same stages:
//!
//! ```text
//! adapter → extractor → classifier → risk → dedup → store
//! ```
//!
//! Sources run concurrently; candidates within a source run in order.
//! Everything downstream of the adapters is source-agnostic and every stage
//! boundary is a trait, so sources, classifier backends, and stores are all
//! swappable.

pub mod adapters;
pub mod classifier;
pub mod dedup;
pub mod extractor;
pub mod fetcher;
pub mod heuristics;
pub mod orchestrator;
pub mod risk;

pub use orchestrator::{Orchestrator, RunStatus, RunSummary, SourceReport};
