//! Forensic evidence analysis pipeline for legal investigations.
//!
//! Ingests mixed evidence files into a content-addressed store with
//! append-only chain of custody, analyzes each artifact through structured
//! LLM calls, correlates entities and timelines case-wide, and packages a
//! client deliverable of generated reports.

pub mod analysis_types;
pub mod cancel;
pub mod config;
pub mod correlate;
pub mod detect;
pub mod dispatch;
pub mod documents;
pub mod emails;
pub mod errors;
pub mod images;
pub mod legal_patterns;
pub mod llm;
pub mod logger;
pub mod package;
pub mod pipeline;
pub mod readers;
pub mod reports;
pub mod store;
pub mod summary;
pub mod types;
