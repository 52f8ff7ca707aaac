use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Validation hook applied to every persisted record, on construction and on
/// reload. Loading a record that fails validation is an integrity error.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// Closed set of evidence kinds handled by the pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceType {
    Document,
    Image,
    Email,
    Other,
}

impl EvidenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::Document => "document",
            EvidenceType::Image => "image",
            EvidenceType::Email => "email",
            EvidenceType::Other => "other",
        }
    }

    /// Kinds that have a typed analyzer. `other` is catalog-only.
    pub fn is_analyzable(&self) -> bool {
        !matches!(self, EvidenceType::Other)
    }
}

impl std::fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions recorded in the chain of custody.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustodyAction {
    #[serde(rename = "ingest")]
    Ingest,
    #[serde(rename = "analyze")]
    Analyze,
    #[serde(rename = "reanalyze")]
    Reanalyze,
    #[serde(rename = "export")]
    Export,
    #[serde(rename = "add-to-case")]
    AddToCase,
}

impl CustodyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustodyAction::Ingest => "ingest",
            CustodyAction::Analyze => "analyze",
            CustodyAction::Reanalyze => "reanalyze",
            CustodyAction::Export => "export",
            CustodyAction::AddToCase => "add-to-case",
        }
    }
}

/// One append-only chain-of-custody entry for a content-addressed artifact.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChainOfCustodyEvent {
    /// ISO 8601 UTC timestamp
    pub ts: String,
    /// Who performed the action (operator or component name)
    pub actor: String,
    pub action: CustodyAction,
    pub note: Option<String>,
    /// Optional structured detail (link mode, case id, backup name, ...)
    pub metadata: Option<serde_json::Value>,
}

impl ChainOfCustodyEvent {
    pub fn new(actor: &str, action: CustodyAction, note: Option<&str>) -> Self {
        ChainOfCustodyEvent {
            ts: chrono::Utc::now().to_rfc3339(),
            actor: actor.to_string(),
            action,
            note: note.map(|n| n.to_string()),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl Validate for ChainOfCustodyEvent {
    fn validate(&self) -> Result<(), String> {
        if self.actor.is_empty() {
            return Err("custody event actor cannot be empty".to_string());
        }
        if chrono::DateTime::parse_from_rfc3339(&self.ts).is_err() {
            return Err(format!("invalid custody timestamp: {}", self.ts));
        }
        Ok(())
    }
}

/// Full custody log for one SHA-256. Serialized as a plain JSON array so the
/// on-disk `chain_of_custody.json` stays a flat, append-only event list.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(transparent)]
pub struct ChainOfCustody {
    pub events: Vec<ChainOfCustodyEvent>,
}

impl ChainOfCustody {
    pub fn first(actor: &str, action: CustodyAction, note: Option<&str>) -> Self {
        ChainOfCustody {
            events: vec![ChainOfCustodyEvent::new(actor, action, note)],
        }
    }

    pub fn append(&mut self, event: ChainOfCustodyEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Count events carrying the given action tag.
    pub fn count_action(&self, action: CustodyAction) -> usize {
        self.events.iter().filter(|e| e.action == action).count()
    }
}

impl Validate for ChainOfCustody {
    fn validate(&self) -> Result<(), String> {
        if self.events.is_empty() {
            return Err("chain of custody cannot be empty".to_string());
        }
        for (i, event) in self.events.iter().enumerate() {
            event
                .validate()
                .map_err(|e| format!("custody event {}: {}", i, e))?;
        }
        Ok(())
    }
}

/// Immutable file metadata captured at ingest.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileMetadata {
    /// Original filename as seen at ingest
    pub filename: String,
    pub size_bytes: u64,
    /// Declared MIME type (from extension mapping)
    pub mime_type: String,
    /// Declared extension, lowercase, without the leading dot
    pub extension: String,
    /// Filesystem creation time, if the source provides one
    pub created_utc: Option<String>,
    /// Filesystem modification time, if the source provides one
    pub modified_utc: Option<String>,
    /// Lowercase-hex SHA-256 of the raw bytes; primary key everywhere
    pub sha256: String,
}

impl Validate for FileMetadata {
    fn validate(&self) -> Result<(), String> {
        if self.filename.is_empty() {
            return Err("filename cannot be empty".to_string());
        }
        if !is_sha256_hex(&self.sha256) {
            return Err(format!("invalid sha256: {}", self.sha256));
        }
        for ts in [&self.created_utc, &self.modified_utc].into_iter().flatten() {
            if chrono::DateTime::parse_from_rfc3339(ts).is_err() {
                return Err(format!("invalid file timestamp: {}", ts));
            }
        }
        Ok(())
    }
}

/// Outcome of an ingest call.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// First time these bytes entered the store
    Ingested,
    /// Bytes already present; at most a case link was added
    Duplicate,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IngestionResult {
    pub sha256: String,
    pub evidence_type: EvidenceType,
    pub metadata: FileMetadata,
    pub status: IngestStatus,
    pub case_id: Option<String>,
}

/// Aggregate store statistics.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StoreStats {
    pub evidence_count: usize,
    pub total_bytes: u64,
    pub by_type: BTreeMap<String, usize>,
    pub case_count: usize,
    pub analyzed_count: usize,
    pub unanalyzed_count: usize,
    /// SHA-256s with no case link at all
    pub orphan_count: usize,
}

/// Collection log entry mirrored into case reports.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LogEntry {
    /// Timestamp when log entry was created (ISO 8601)
    pub timestamp: String,
    /// Log level (INFO, WARN, ERROR)
    pub level: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: &str, message: &str) -> Self {
        LogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: level.to_string(),
            message: message.to_string(),
        }
    }

    pub fn info(message: &str) -> Self {
        Self::new("INFO", message)
    }

    pub fn warn(message: &str) -> Self {
        Self::new("WARN", message)
    }

    pub fn error(message: &str) -> Self {
        Self::new("ERROR", message)
    }
}

/// Log levels for collection logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// True when `s` is a 64-character lowercase hex string.
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// First 8 hex characters of a content address, for human-readable output.
pub fn short_sha(sha256: &str) -> &str {
    &sha256[..sha256.len().min(8)]
}
