use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{is_sha256_hex, EvidenceType, Validate};

/// Typed analysis records produced by the analyzers and consumed by the
/// correlation, summary, and report layers. Every record that reaches disk
/// is validated on construction and again on reload.

/// Ordered legal importance of an artifact's content.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LegalSignificance {
    Low,
    Medium,
    High,
    Critical,
}

impl LegalSignificance {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegalSignificance::Critical => "critical",
            LegalSignificance::High => "high",
            LegalSignificance::Medium => "medium",
            LegalSignificance::Low => "low",
        }
    }

    /// High or critical content marks surrounding timeline context material.
    pub fn is_material(&self) -> bool {
        matches!(self, LegalSignificance::High | LegalSignificance::Critical)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Hostile,
    Neutral,
    Professional,
}

/// Document classification tag.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Email,
    Letter,
    Contract,
    Filing,
    Report,
    Memo,
    Notes,
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Email => "email",
            DocumentType::Letter => "letter",
            DocumentType::Contract => "contract",
            DocumentType::Filing => "filing",
            DocumentType::Report => "report",
            DocumentType::Memo => "memo",
            DocumentType::Notes => "notes",
            DocumentType::Other => "other",
        }
    }
}

/// Communication pattern tag for email threads.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationPattern {
    Professional,
    Neutral,
    Escalating,
    Hostile,
    Retaliatory,
}

impl CommunicationPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommunicationPattern::Professional => "professional",
            CommunicationPattern::Neutral => "neutral",
            CommunicationPattern::Escalating => "escalating",
            CommunicationPattern::Hostile => "hostile",
            CommunicationPattern::Retaliatory => "retaliatory",
        }
    }
}

/// Closed risk-flag vocabulary. Labels are derived one-per-flag, so the set
/// stays closed end to end.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    Retaliation,
    Harassment,
    Discrimination,
    Intimidation,
    Threatening,
    DeadlinePressure,
    DataDestruction,
    PolicyViolation,
    ConfidentialityBreach,
    WitnessTampering,
}

impl RiskFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFlag::Retaliation => "retaliation",
            RiskFlag::Harassment => "harassment",
            RiskFlag::Discrimination => "discrimination",
            RiskFlag::Intimidation => "intimidation",
            RiskFlag::Threatening => "threatening",
            RiskFlag::DeadlinePressure => "deadline_pressure",
            RiskFlag::DataDestruction => "data_destruction",
            RiskFlag::PolicyViolation => "policy_violation",
            RiskFlag::ConfidentialityBreach => "confidentiality_breach",
            RiskFlag::WitnessTampering => "witness_tampering",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Date,
    LegalTerm,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
            EntityType::Date => "date",
            EntityType::LegalTerm => "legal_term",
        }
    }
}

/// An entity extracted from one piece of evidence.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Extraction confidence in [0,1]
    pub confidence: f64,
    /// Surrounding text or reason for the extraction
    pub context: String,
    /// Relationship descriptor, e.g. "line manager of the claimant"
    #[serde(default)]
    pub relationship: Option<String>,
    /// Verbatim quoted statement attributed to this entity
    #[serde(default)]
    pub quoted_text: Option<String>,
    /// Event the entity is associated with, e.g. "suspension meeting"
    #[serde(default)]
    pub associated_event: Option<String>,
}

impl Validate for Entity {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("entity name cannot be empty".to_string());
        }
        check_confidence(self.confidence, "entity confidence")
    }
}

/// Deterministic word statistics computed from extracted text, used by the
/// visualization outputs.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct WordStats {
    pub total_words: usize,
    pub unique_words: usize,
    /// Most frequent words, descending by count, ties alphabetical
    pub top_words: Vec<WordCount>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WordCount {
    pub word: String,
    pub count: usize,
}

/// Structured findings for a text-bearing document.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DocumentAnalysis {
    pub summary: String,
    pub entities: Vec<Entity>,
    pub document_type: DocumentType,
    pub sentiment: Sentiment,
    pub legal_significance: LegalSignificance,
    pub risk_flags: Vec<RiskFlag>,
    /// Overall confidence in [0,1]
    pub confidence: f64,
    /// Filled by the analyzer after the structured call; not part of the
    /// response schema
    #[serde(default)]
    pub word_stats: Option<WordStats>,
}

impl Validate for DocumentAnalysis {
    fn validate(&self) -> Result<(), String> {
        if self.summary.trim().is_empty() {
            return Err("document summary cannot be empty".to_string());
        }
        check_confidence(self.confidence, "document confidence")?;
        for entity in &self.entities {
            entity.validate()?;
        }
        Ok(())
    }
}

/// Structured findings for an image or rasterized page.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ImageAnalysis {
    pub scene_description: String,
    /// Text recovered from the image, empty when none was legible
    #[serde(default)]
    pub ocr_text: String,
    pub detected_objects: Vec<String>,
    pub confidence: f64,
}

impl Validate for ImageAnalysis {
    fn validate(&self) -> Result<(), String> {
        if self.scene_description.trim().is_empty() {
            return Err("scene description cannot be empty".to_string());
        }
        check_confidence(self.confidence, "image confidence")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Sender,
    Recipient,
    Cc,
    Bcc,
}

/// One participant in an email thread, with full interaction metadata
/// preserved for the downstream power-dynamics analysis.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EmailParticipant {
    pub name: String,
    pub address: String,
    pub role: ParticipantRole,
    pub message_count: u32,
    #[serde(default)]
    pub first_interaction: Option<String>,
    #[serde(default)]
    pub last_interaction: Option<String>,
    /// 0 dominant, 0.5 neutral, 1 deferential
    pub deference_score: f64,
}

impl Validate for EmailParticipant {
    fn validate(&self) -> Result<(), String> {
        if self.address.trim().is_empty() {
            return Err("participant address cannot be empty".to_string());
        }
        check_confidence(self.deference_score, "deference score")
    }
}

/// Structured findings for an email thread.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EmailAnalysis {
    pub participants: Vec<EmailParticipant>,
    pub thread_summary: String,
    pub communication_pattern: CommunicationPattern,
    pub escalation_detected: bool,
    pub legal_significance: LegalSignificance,
    pub risk_flags: Vec<RiskFlag>,
    pub confidence: f64,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl Validate for EmailAnalysis {
    fn validate(&self) -> Result<(), String> {
        if self.thread_summary.trim().is_empty() {
            return Err("thread summary cannot be empty".to_string());
        }
        check_confidence(self.confidence, "email confidence")?;
        for participant in &self.participants {
            participant.validate()?;
        }
        for entity in &self.entities {
            entity.validate()?;
        }
        Ok(())
    }
}

/// Exactly one typed payload per artifact; the discriminant must match the
/// artifact's evidence type.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AnalysisPayload {
    Document(DocumentAnalysis),
    Image(ImageAnalysis),
    Email(EmailAnalysis),
}

impl AnalysisPayload {
    pub fn evidence_type(&self) -> EvidenceType {
        match self {
            AnalysisPayload::Document(_) => EvidenceType::Document,
            AnalysisPayload::Image(_) => EvidenceType::Image,
            AnalysisPayload::Email(_) => EvidenceType::Email,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            AnalysisPayload::Document(d) => d.confidence,
            AnalysisPayload::Image(i) => i.confidence,
            AnalysisPayload::Email(e) => e.confidence,
        }
    }

    pub fn legal_significance(&self) -> Option<LegalSignificance> {
        match self {
            AnalysisPayload::Document(d) => Some(d.legal_significance),
            AnalysisPayload::Email(e) => Some(e.legal_significance),
            AnalysisPayload::Image(_) => None,
        }
    }

    pub fn risk_flags(&self) -> &[RiskFlag] {
        match self {
            AnalysisPayload::Document(d) => &d.risk_flags,
            AnalysisPayload::Email(e) => &e.risk_flags,
            AnalysisPayload::Image(_) => &[],
        }
    }

    pub fn entities(&self) -> &[Entity] {
        match self {
            AnalysisPayload::Document(d) => &d.entities,
            AnalysisPayload::Email(e) => &e.entities,
            AnalysisPayload::Image(_) => &[],
        }
    }
}

impl Validate for AnalysisPayload {
    fn validate(&self) -> Result<(), String> {
        match self {
            AnalysisPayload::Document(d) => d.validate(),
            AnalysisPayload::Image(i) => i.validate(),
            AnalysisPayload::Email(e) => e.validate(),
        }
    }
}

/// The per-artifact analysis record persisted as `analysis.v1.json`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnifiedAnalysis {
    pub sha256: String,
    pub evidence_type: EvidenceType,
    /// ISO 8601 UTC timestamp of the analysis
    pub analyzed_utc: String,
    pub model: String,
    /// Opaque revision tag recorded for reproducibility
    pub model_revision: String,
    /// Closed-vocabulary labels generated from the payload
    pub labels: Vec<String>,
    /// Cases this artifact belongs to; an artifact is multi-case
    pub case_ids: BTreeSet<String>,
    pub analysis: AnalysisPayload,
}

impl Validate for UnifiedAnalysis {
    fn validate(&self) -> Result<(), String> {
        if !is_sha256_hex(&self.sha256) {
            return Err(format!("invalid sha256: {}", self.sha256));
        }
        if self.analysis.evidence_type() != self.evidence_type {
            return Err(format!(
                "payload kind {} does not match evidence type {}",
                self.analysis.evidence_type(),
                self.evidence_type
            ));
        }
        if chrono::DateTime::parse_from_rfc3339(&self.analyzed_utc).is_err() {
            return Err(format!("invalid analysis timestamp: {}", self.analyzed_utc));
        }
        if self.labels.is_empty() {
            return Err("analysis must carry at least the evidence-type label".to_string());
        }
        self.analysis.validate()
    }
}

/// One occurrence of a canonical entity in a specific piece of evidence.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EntityOccurrence {
    pub sha256: String,
    /// Name exactly as extracted, before canonicalization
    pub original_name: String,
    pub confidence: f64,
    pub context: String,
}

/// An entity after cross-evidence canonicalization.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CanonicalEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Every per-evidence occurrence, original confidences retained
    pub occurrences: Vec<EntityOccurrence>,
    /// Name variants merged into this entity
    #[serde(default)]
    pub variants: Vec<String>,
}

impl CanonicalEntity {
    pub fn evidence_count(&self) -> usize {
        let mut shas: Vec<&str> = self.occurrences.iter().map(|o| o.sha256.as_str()).collect();
        shas.sort_unstable();
        shas.dedup();
        shas.len()
    }
}

/// Source that contributed a timeline event.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimelineSource {
    Filesystem,
    Email,
    Semantic,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TimelineEvent {
    /// ISO 8601 UTC timestamp
    pub ts: String,
    pub sha256: String,
    /// Stable id used as the final ordering tie-break
    pub event_id: String,
    pub description: String,
    pub source: TimelineSource,
    #[serde(default)]
    pub legal_significance: Option<LegalSignificance>,
    #[serde(default)]
    pub risk_flags: Vec<RiskFlag>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum GapSignificance {
    Low,
    Medium,
    High,
}

/// A suspicious stretch of the timeline with no events between two material
/// moments.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TimelineGap {
    pub start_ts: String,
    pub end_ts: String,
    pub gap_days: i64,
    pub significance: GapSignificance,
    pub rationale: String,
}

/// Named ordered chain detected over the timeline, e.g. a complaint followed
/// by a suspension followed by a termination.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TemporalSequence {
    pub kind: String,
    /// Event ids, in timeline order
    pub events: Vec<String>,
    pub confidence: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContradictionType {
    Factual,
    Temporal,
    Attribution,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Contradiction {
    pub statement_a: String,
    pub statement_b: String,
    /// SHA-256 of the evidence carrying statement A
    pub source_a: String,
    /// SHA-256 of the evidence carrying statement B
    pub source_b: String,
    #[serde(rename = "type")]
    pub contradiction_type: ContradictionType,
    /// Severity in [0,1]
    pub severity: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CorroborationStrength {
    Weak,
    Moderate,
    Strong,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Corroboration {
    pub claim: String,
    /// At least two supporting SHA-256s
    pub evidence_sources: Vec<String>,
    pub strength: CorroborationStrength,
    pub confidence: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum GapPriority {
    Medium,
    High,
    Critical,
}

/// A described hole in the evidence record (missing witness, documentation,
/// or communication).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EvidenceGap {
    pub description: String,
    pub priority: GapPriority,
}

/// Output of the legal-pattern detector for one case.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LegalPatternAnalysis {
    pub contradictions: Vec<Contradiction>,
    pub corroborations: Vec<Corroboration>,
    pub evidence_gaps: Vec<EvidenceGap>,
    /// SHA-256 references that do not belong to the case; reported, never
    /// silently dropped
    #[serde(default)]
    pub reference_warnings: Vec<String>,
}

impl Validate for LegalPatternAnalysis {
    fn validate(&self) -> Result<(), String> {
        for c in &self.contradictions {
            check_confidence(c.severity, "contradiction severity")?;
        }
        for c in &self.corroborations {
            check_confidence(c.confidence, "corroboration confidence")?;
            if c.evidence_sources.len() < 2 {
                return Err(format!(
                    "corroboration of '{}' needs at least two sources",
                    c.claim
                ));
            }
        }
        Ok(())
    }
}

/// Case-scoped aggregation across all unified analyses.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CorrelationAnalysis {
    pub case_id: String,
    pub entities: Vec<CanonicalEntity>,
    pub timeline_events: Vec<TimelineEvent>,
    #[serde(default)]
    pub legal_patterns: Option<LegalPatternAnalysis>,
    pub temporal_sequences: Vec<TemporalSequence>,
    pub timeline_gaps: Vec<TimelineGap>,
}

impl Validate for CorrelationAnalysis {
    fn validate(&self) -> Result<(), String> {
        if self.case_id.is_empty() {
            return Err("correlation case id cannot be empty".to_string());
        }
        for event in &self.timeline_events {
            if !is_sha256_hex(&event.sha256) {
                return Err(format!("timeline event has invalid sha256: {}", event.sha256));
            }
        }
        if let Some(patterns) = &self.legal_patterns {
            patterns.validate()?;
        }
        Ok(())
    }
}

/// One line of the case catalog: what a single artifact contributed.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EvidenceSummary {
    pub sha256: String,
    pub filename: String,
    pub evidence_type: EvidenceType,
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub legal_significance: Option<LegalSignificance>,
    #[serde(default)]
    pub risk_flags: Vec<RiskFlag>,
    pub confidence: f64,
}

/// Loose assessment bag with known keys, always accessed through `get` with
/// a caller-supplied default. The typed `CorrelationAnalysis` is the other
/// access pattern; the two are never mixed.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(transparent)]
pub struct SummaryMap {
    map: std::collections::BTreeMap<String, serde_json::Value>,
}

/// Known `overall_assessment` keys.
pub mod assessment_keys {
    pub const TRIBUNAL_PROBABILITY: &str = "tribunal_probability";
    pub const FINANCIAL_EXPOSURE_SUMMARY: &str = "financial_exposure_summary";
    pub const RISK_FLAG_BREAKDOWN: &str = "risk_flag_breakdown";
    pub const POWER_DYNAMICS: &str = "power_dynamics";
    pub const RELATIONSHIP_NETWORK: &str = "relationship_network";
    pub const QUOTED_STATEMENTS: &str = "quoted_statements";
    pub const FORENSIC_SUMMARY: &str = "_forensic_summary";
    pub const FORENSIC_LEGAL_IMPLICATIONS: &str = "_forensic_legal_implications";
    pub const FORENSIC_RECOMMENDED_ACTIONS: &str = "_forensic_recommended_actions";
    pub const FORENSIC_RISK_ASSESSMENT: &str = "_forensic_risk_assessment";
}

impl SummaryMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: serde_json::Value) {
        self.map.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.map.get(key)
    }

    /// Keyed access with a safe default; generators use this exclusively.
    pub fn get_or<'a>(
        &'a self,
        key: &str,
        default: &'a serde_json::Value,
    ) -> &'a serde_json::Value {
        self.map.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.map.keys()
    }
}

/// Final narrative produced for the client deliverable.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExecutiveSummaryResponse {
    pub narrative: String,
    pub key_findings: Vec<String>,
    pub legal_implications: Vec<String>,
    pub recommended_actions: Vec<String>,
}

impl Validate for ExecutiveSummaryResponse {
    fn validate(&self) -> Result<(), String> {
        if self.narrative.trim().is_empty() {
            return Err("executive narrative cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Intermediate summary for one chunk of a large case.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChunkSummaryResponse {
    pub findings: Vec<String>,
    pub implications: Vec<String>,
    pub actions: Vec<String>,
}

impl Validate for ChunkSummaryResponse {
    fn validate(&self) -> Result<(), String> {
        if self.findings.is_empty() {
            return Err("chunk summary must contain at least one finding".to_string());
        }
        Ok(())
    }
}

/// Complete case-wide summary handed to the report generators.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CaseSummary {
    pub case_id: String,
    pub generated_utc: String,
    pub evidence_summaries: Vec<EvidenceSummary>,
    pub correlation: CorrelationAnalysis,
    pub overall_assessment: SummaryMap,
    pub executive_summary: ExecutiveSummaryResponse,
}

impl CaseSummary {
    pub fn evidence_count(&self) -> usize {
        self.evidence_summaries.len()
    }

    /// SHA-256s of every evidence item in the case.
    pub fn evidence_shas(&self) -> BTreeSet<String> {
        self.evidence_summaries
            .iter()
            .map(|e| e.sha256.clone())
            .collect()
    }
}

impl Validate for CaseSummary {
    fn validate(&self) -> Result<(), String> {
        if self.case_id.is_empty() {
            return Err("case id cannot be empty".to_string());
        }
        self.correlation.validate()?;
        self.executive_summary.validate()
    }
}

/// Verdict of an AI single-to-single entity comparison.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EntityMatchResponse {
    pub decision: MatchDecision,
    pub confidence: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
    Match,
    NoMatch,
}

impl Validate for EntityMatchResponse {
    fn validate(&self) -> Result<(), String> {
        check_confidence(self.confidence, "match confidence")
    }
}

fn check_confidence(value: f64, what: &str) -> Result<(), String> {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        return Err(format!("{} out of range: {}", what, value));
    }
    Ok(())
}
