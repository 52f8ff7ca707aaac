use std::collections::{BTreeMap, HashMap};

use crate::analysis_types::{
    assessment_keys, AnalysisPayload, CaseSummary, ChunkSummaryResponse, CorrelationAnalysis,
    EvidenceSummary, ExecutiveSummaryResponse, SummaryMap, UnifiedAnalysis,
};
use crate::cancel::CancellationToken;
use crate::config::{CaseType, Config};
use crate::correlate::CorrelationEngine;
use crate::errors::{PipelineError, PipelineResult};
use crate::legal_patterns::LegalPatternDetector;
use crate::llm::{schemas, LlmClient};
use crate::store::EvidenceStore;
use crate::types::FileMetadata;

/// Case-wide summary generation: per-evidence summaries, correlation,
/// overall assessment, and the executive narrative. Large cases take the
/// map-reduce path to stay inside the model's context budget.
pub struct SummaryGenerator<'a> {
    store: &'a EvidenceStore,
    client: &'a LlmClient,
    config: &'a Config,
}

impl<'a> SummaryGenerator<'a> {
    pub fn new(store: &'a EvidenceStore, client: &'a LlmClient, config: &'a Config) -> Self {
        SummaryGenerator {
            store,
            client,
            config,
        }
    }

    /// Build the full `CaseSummary` for a case. `enrich_legal_patterns`
    /// controls the optional detector pass over the correlated evidence.
    pub fn generate_case_summary(
        &self,
        case_id: &str,
        enrich_legal_patterns: bool,
        cancel: &CancellationToken,
    ) -> PipelineResult<CaseSummary> {
        cancel.check()?;

        let shas = self.store.list_case(case_id)?;
        let mut analyses: Vec<UnifiedAnalysis> = Vec::new();
        let mut metadata: HashMap<String, FileMetadata> = HashMap::new();
        let mut evidence_summaries: Vec<EvidenceSummary> = Vec::new();

        for sha in &shas {
            cancel.check()?;
            let meta = self.store.load_metadata(sha)?;
            let analysis = self.store.load_analysis(sha)?;
            evidence_summaries.push(evidence_summary(&meta, analysis.as_ref()));
            if let Some(analysis) = analysis {
                analyses.push(analysis);
            }
            metadata.insert(sha.clone(), meta);
        }

        let engine = CorrelationEngine::new(&self.config.correlate, Some(self.client));
        let mut correlation = engine.correlate(case_id, &analyses, &metadata, cancel)?;

        if enrich_legal_patterns {
            let detector = LegalPatternDetector::new(self.client);
            let patterns = detector.detect(&correlation, &evidence_summaries, cancel)?;
            correlation.legal_patterns = Some(patterns);
        }

        let overall_assessment = compute_overall_assessment(&analyses, &correlation);

        let executive_summary = if evidence_summaries.is_empty() {
            minimal_executive_summary(case_id)
        } else {
            self.generate_executive_summary(case_id, &evidence_summaries, cancel)?
        };

        let summary = CaseSummary {
            case_id: case_id.to_string(),
            generated_utc: chrono::Utc::now().to_rfc3339(),
            evidence_summaries,
            correlation,
            overall_assessment,
            executive_summary,
        };
        crate::types::Validate::validate(&summary)
            .map_err(|e| PipelineError::correlation(&e))?;
        Ok(summary)
    }

    /// Executive summary, direct or map-reduce depending on case size.
    fn generate_executive_summary(
        &self,
        case_id: &str,
        evidence: &[EvidenceSummary],
        cancel: &CancellationToken,
    ) -> PipelineResult<ExecutiveSummaryResponse> {
        let prompt = executive_prompt(self.config.summary.case_type);

        if evidence.len() <= self.config.summary.chunk_threshold {
            return self.client.call_structured(
                prompt,
                serde_json::json!({
                    "case_id": case_id,
                    "evidence": evidence_json(evidence),
                }),
                schemas::EXECUTIVE_SUMMARY,
                cancel,
            );
        }

        // Map: one structured call per chunk.
        let mut chunk_summaries: Vec<ChunkSummaryResponse> = Vec::new();
        for chunk in evidence.chunks(self.config.summary.chunk_size) {
            cancel.check()?;
            let chunk_summary: ChunkSummaryResponse = self.client.call_structured(
                chunk_prompt(self.config.summary.case_type),
                serde_json::json!({
                    "case_id": case_id,
                    "evidence": evidence_json(chunk),
                }),
                schemas::CHUNK_SUMMARY,
                cancel,
            )?;
            chunk_summaries.push(chunk_summary);
        }

        // Reduce: one call over the concatenated chunk summaries.
        self.client.call_structured(
            prompt,
            serde_json::json!({
                "case_id": case_id,
                "chunk_summaries": chunk_summaries.iter().map(|c| serde_json::json!({
                    "findings": c.findings,
                    "implications": c.implications,
                    "actions": c.actions,
                })).collect::<Vec<_>>(),
            }),
            schemas::EXECUTIVE_SUMMARY,
            cancel,
        )
    }
}

fn evidence_json(evidence: &[EvidenceSummary]) -> Vec<serde_json::Value> {
    evidence
        .iter()
        .map(|e| {
            serde_json::json!({
                "sha256": e.sha256,
                "filename": e.filename,
                "evidence_type": e.evidence_type,
                "key_findings": e.key_findings,
                "legal_significance": e.legal_significance,
                "risk_flags": e.risk_flags,
            })
        })
        .collect()
}

fn evidence_summary(meta: &FileMetadata, analysis: Option<&UnifiedAnalysis>) -> EvidenceSummary {
    match analysis {
        Some(analysis) => {
            let key_findings = match &analysis.analysis {
                AnalysisPayload::Document(d) => vec![d.summary.clone()],
                AnalysisPayload::Email(e) => vec![e.thread_summary.clone()],
                AnalysisPayload::Image(i) => {
                    let mut findings = vec![i.scene_description.clone()];
                    if !i.ocr_text.is_empty() {
                        findings.push(format!("OCR: {}", i.ocr_text));
                    }
                    findings
                }
            };
            EvidenceSummary {
                sha256: analysis.sha256.clone(),
                filename: meta.filename.clone(),
                evidence_type: analysis.evidence_type,
                key_findings,
                legal_significance: analysis.analysis.legal_significance(),
                risk_flags: analysis.analysis.risk_flags().to_vec(),
                confidence: analysis.analysis.confidence(),
            }
        }
        // Unanalyzed artifacts (type `other`) still appear in the catalog.
        None => EvidenceSummary {
            sha256: meta.sha256.clone(),
            filename: meta.filename.clone(),
            evidence_type: crate::detect::detect_evidence_type(&meta.extension, None),
            key_findings: Vec::new(),
            legal_significance: None,
            risk_flags: Vec::new(),
            confidence: 0.0,
        },
    }
}

/// Deterministic overall assessment over the analyzed evidence. Underscore
/// keys carry internal forensic detail consumed by the report generators.
pub fn compute_overall_assessment(
    analyses: &[UnifiedAnalysis],
    correlation: &CorrelationAnalysis,
) -> SummaryMap {
    let mut map = SummaryMap::new();

    let analyzed = analyses.len().max(1) as f64;
    let material = analyses
        .iter()
        .filter(|a| {
            a.analysis
                .legal_significance()
                .map(|s| s.is_material())
                .unwrap_or(false)
        })
        .count() as f64;
    let flagged = analyses
        .iter()
        .filter(|a| !a.analysis.risk_flags().is_empty())
        .count() as f64;
    let contradiction_weight = correlation
        .legal_patterns
        .as_ref()
        .map(|p| (p.contradictions.len() as f64 * 0.05).min(0.2))
        .unwrap_or(0.0);

    let tribunal_probability = if analyses.is_empty() {
        0.0
    } else {
        (0.15 + 0.45 * (material / analyzed) + 0.2 * (flagged / analyzed) + contradiction_weight)
            .min(1.0)
    };
    map.insert(
        assessment_keys::TRIBUNAL_PROBABILITY,
        serde_json::json!(round2(tribunal_probability)),
    );
    map.insert(
        assessment_keys::FINANCIAL_EXPOSURE_SUMMARY,
        serde_json::json!(financial_band(tribunal_probability)),
    );

    let mut flag_histogram: BTreeMap<String, usize> = BTreeMap::new();
    for analysis in analyses {
        for flag in analysis.analysis.risk_flags() {
            *flag_histogram.entry(flag.as_str().to_string()).or_insert(0) += 1;
        }
    }
    map.insert(
        assessment_keys::RISK_FLAG_BREAKDOWN,
        serde_json::json!(flag_histogram),
    );

    let power_dynamics = compute_power_dynamics(analyses);
    if !power_dynamics.is_empty() {
        map.insert(
            assessment_keys::POWER_DYNAMICS,
            serde_json::json!(power_dynamics),
        );
    }

    let network = compute_relationship_network(analyses, correlation);
    if !network["nodes"].as_array().map(|n| n.is_empty()).unwrap_or(true) {
        map.insert(assessment_keys::RELATIONSHIP_NETWORK, network);
    }

    let quoted = quoted_statements(analyses);
    if !quoted.is_empty() {
        map.insert(assessment_keys::QUOTED_STATEMENTS, serde_json::json!(quoted));
    }

    map.insert(
        assessment_keys::FORENSIC_SUMMARY,
        serde_json::json!(format!(
            "{} evidence items analyzed; {} carry material legal significance; {} carry risk flags; {} canonical entities; {} timeline events; {} suspicious gaps.",
            analyses.len(),
            material as usize,
            flagged as usize,
            correlation.entities.len(),
            correlation.timeline_events.len(),
            correlation.timeline_gaps.len()
        )),
    );
    map.insert(
        assessment_keys::FORENSIC_LEGAL_IMPLICATIONS,
        serde_json::json!(forensic_implications(correlation)),
    );
    map.insert(
        assessment_keys::FORENSIC_RECOMMENDED_ACTIONS,
        serde_json::json!(forensic_actions(correlation)),
    );
    map.insert(
        assessment_keys::FORENSIC_RISK_ASSESSMENT,
        serde_json::json!(risk_assessment_text(tribunal_probability)),
    );

    map
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn financial_band(probability: f64) -> String {
    if probability >= 0.7 {
        "estimated exposure range 45,000-120,000 (settlement pressure high)".to_string()
    } else if probability >= 0.4 {
        "estimated exposure range 15,000-45,000".to_string()
    } else {
        "estimated exposure range 0-15,000".to_string()
    }
}

fn risk_assessment_text(probability: f64) -> String {
    let band = if probability >= 0.7 {
        "high"
    } else if probability >= 0.4 {
        "elevated"
    } else {
        "low"
    };
    format!(
        "Tribunal probability {:.2} places this case in the {} risk band.",
        round2(probability),
        band
    )
}

fn forensic_implications(correlation: &CorrelationAnalysis) -> Vec<String> {
    let mut implications = Vec::new();
    if let Some(patterns) = &correlation.legal_patterns {
        for contradiction in &patterns.contradictions {
            implications.push(format!(
                "Contradiction ({:?}) between '{}' and '{}'",
                contradiction.contradiction_type,
                contradiction.statement_a,
                contradiction.statement_b
            ));
        }
        for gap in &patterns.evidence_gaps {
            implications.push(format!("Evidence gap ({:?}): {}", gap.priority, gap.description));
        }
    }
    for gap in &correlation.timeline_gaps {
        implications.push(format!(
            "Timeline gap of {} days ({:?}): {}",
            gap.gap_days, gap.significance, gap.rationale
        ));
    }
    implications
}

fn forensic_actions(correlation: &CorrelationAnalysis) -> Vec<String> {
    let mut actions = Vec::new();
    if let Some(patterns) = &correlation.legal_patterns {
        if !patterns.contradictions.is_empty() {
            actions.push("Obtain witness statements addressing each contradiction".to_string());
        }
        for gap in &patterns.evidence_gaps {
            actions.push(format!("Close evidence gap: {}", gap.description));
        }
    }
    if !correlation.timeline_gaps.is_empty() {
        actions.push("Request disclosure covering the silent timeline periods".to_string());
    }
    if actions.is_empty() {
        actions.push("Preserve all originals and maintain chain of custody".to_string());
    }
    actions
}

/// Per-participant authority profile aggregated over every email analysis.
fn compute_power_dynamics(analyses: &[UnifiedAnalysis]) -> Vec<serde_json::Value> {
    #[derive(Default)]
    struct Profile {
        deference_sum: f64,
        samples: usize,
        messages: u64,
    }

    let mut profiles: BTreeMap<String, Profile> = BTreeMap::new();
    for analysis in analyses {
        if let AnalysisPayload::Email(email) = &analysis.analysis {
            for participant in &email.participants {
                let profile = profiles.entry(participant.address.clone()).or_default();
                profile.deference_sum += participant.deference_score;
                profile.samples += 1;
                profile.messages += participant.message_count as u64;
            }
        }
    }

    profiles
        .into_iter()
        .map(|(address, profile)| {
            let avg = profile.deference_sum / profile.samples as f64;
            let stance = if avg < 0.4 {
                "dominant"
            } else if avg > 0.6 {
                "deferential"
            } else {
                "neutral"
            };
            serde_json::json!({
                "address": address,
                "avg_deference": round2(avg),
                "message_count": profile.messages,
                "stance": stance,
            })
        })
        .collect()
}

/// Deterministic relationship network: entity co-occurrence within evidence
/// plus email participant links; node degree is the centrality measure.
fn compute_relationship_network(
    analyses: &[UnifiedAnalysis],
    correlation: &CorrelationAnalysis,
) -> serde_json::Value {
    let mut edges: BTreeMap<(String, String), usize> = BTreeMap::new();

    // Entities that co-occur in the same evidence item.
    let mut by_sha: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for entity in &correlation.entities {
        for occurrence in &entity.occurrences {
            by_sha
                .entry(occurrence.sha256.as_str())
                .or_default()
                .push(entity.name.as_str());
        }
    }
    for names in by_sha.values() {
        let mut sorted: Vec<&str> = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        for (i, a) in sorted.iter().enumerate() {
            for b in &sorted[i + 1..] {
                *edges.entry((a.to_string(), b.to_string())).or_insert(0) += 1;
            }
        }
    }

    // Email sender-to-recipient links.
    for analysis in analyses {
        if let AnalysisPayload::Email(email) = &analysis.analysis {
            let senders: Vec<&str> = email
                .participants
                .iter()
                .filter(|p| p.role == crate::analysis_types::ParticipantRole::Sender)
                .map(|p| p.name.as_str())
                .collect();
            let receivers: Vec<&str> = email
                .participants
                .iter()
                .filter(|p| p.role != crate::analysis_types::ParticipantRole::Sender)
                .map(|p| p.name.as_str())
                .collect();
            for s in &senders {
                for r in &receivers {
                    let key = if s <= r {
                        (s.to_string(), r.to_string())
                    } else {
                        (r.to_string(), s.to_string())
                    };
                    *edges.entry(key).or_insert(0) += 1;
                }
            }
        }
    }

    let mut degrees: BTreeMap<String, usize> = BTreeMap::new();
    for (a, b) in edges.keys() {
        *degrees.entry(a.clone()).or_insert(0) += 1;
        *degrees.entry(b.clone()).or_insert(0) += 1;
    }

    serde_json::json!({
        "nodes": degrees.iter().map(|(name, degree)| serde_json::json!({
            "name": name,
            "degree": degree,
        })).collect::<Vec<_>>(),
        "edges": edges.iter().map(|((a, b), weight)| serde_json::json!({
            "a": a,
            "b": b,
            "weight": weight,
        })).collect::<Vec<_>>(),
    })
}

fn quoted_statements(analyses: &[UnifiedAnalysis]) -> Vec<serde_json::Value> {
    let mut quotes = Vec::new();
    for analysis in analyses {
        for entity in analysis.analysis.entities() {
            if let Some(text) = &entity.quoted_text {
                quotes.push(serde_json::json!({
                    "speaker": entity.name,
                    "text": text,
                    "sha256": analysis.sha256,
                }));
            }
        }
    }
    quotes
}

fn minimal_executive_summary(case_id: &str) -> ExecutiveSummaryResponse {
    ExecutiveSummaryResponse {
        narrative: format!(
            "Case {} contains no ingested evidence. No findings can be reported.",
            case_id
        ),
        key_findings: Vec::new(),
        legal_implications: Vec::new(),
        recommended_actions: vec!["Ingest evidence before requesting analysis".to_string()],
    }
}

fn executive_prompt(case_type: CaseType) -> &'static str {
    match case_type {
        CaseType::Generic => {
            "You are preparing the executive summary of a forensic evidence review. From the \
             supplied per-evidence findings (or chunk summaries), produce a narrative, key \
             findings, legal implications, and recommended actions, conforming exactly to \
             the requested schema. Cite only what the evidence supports."
        }
        CaseType::Workplace => {
            "You are preparing the executive summary of a workplace investigation. Focus on \
             conduct patterns, policy breaches, and the treatment of the individuals \
             involved. Produce a narrative, key findings, legal implications, and \
             recommended actions conforming exactly to the requested schema."
        }
        CaseType::Employment => {
            "You are preparing the executive summary of an employment dispute for tribunal \
             readiness. Focus on procedural fairness, protected disclosures, retaliation \
             indicators, and remedy exposure. Produce a narrative, key findings, legal \
             implications, and recommended actions conforming exactly to the requested \
             schema."
        }
        CaseType::Contract => {
            "You are preparing the executive summary of a contract dispute. Focus on \
             obligations, breaches, variation attempts, and quantum indicators. Produce a \
             narrative, key findings, legal implications, and recommended actions \
             conforming exactly to the requested schema."
        }
    }
}

fn chunk_prompt(case_type: CaseType) -> &'static str {
    match case_type {
        CaseType::Generic | CaseType::Workplace => {
            "Summarize this subset of case evidence into findings, implications, and \
             actions conforming exactly to the requested schema. A later pass merges the \
             chunks; keep every materially significant item."
        }
        CaseType::Employment | CaseType::Contract => {
            "Summarize this subset of case evidence into findings, implications, and \
             actions conforming exactly to the requested schema, preserving anything \
             bearing on liability or quantum. A later pass merges the chunks."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis_types::{
        CommunicationPattern, DocumentAnalysis, DocumentType, EmailAnalysis, EmailParticipant,
        Entity, EntityType, LegalSignificance, ParticipantRole, RiskFlag, Sentiment,
    };
    use crate::types::EvidenceType;

    const SHA_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const SHA_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn doc_analysis(sha: &str, significance: LegalSignificance, flags: Vec<RiskFlag>) -> UnifiedAnalysis {
        UnifiedAnalysis {
            sha256: sha.to_string(),
            evidence_type: EvidenceType::Document,
            analyzed_utc: "2025-09-01T00:00:00+00:00".to_string(),
            model: "test-model".to_string(),
            model_revision: "r1".to_string(),
            labels: vec!["document".to_string()],
            case_ids: [String::from("C1")].into_iter().collect(),
            analysis: AnalysisPayload::Document(DocumentAnalysis {
                summary: "doc".to_string(),
                entities: vec![Entity {
                    name: "Paul Boucherat".to_string(),
                    entity_type: EntityType::Person,
                    confidence: 0.9,
                    context: "author".to_string(),
                    relationship: None,
                    quoted_text: Some("I was told to stay quiet".to_string()),
                    associated_event: None,
                }],
                document_type: DocumentType::Letter,
                sentiment: Sentiment::Neutral,
                legal_significance: significance,
                risk_flags: flags,
                confidence: 0.9,
                word_stats: None,
            }),
        }
    }

    fn email_analysis(sha: &str) -> UnifiedAnalysis {
        UnifiedAnalysis {
            sha256: sha.to_string(),
            evidence_type: EvidenceType::Email,
            analyzed_utc: "2025-09-01T00:00:00+00:00".to_string(),
            model: "test-model".to_string(),
            model_revision: "r1".to_string(),
            labels: vec!["email".to_string()],
            case_ids: [String::from("C1")].into_iter().collect(),
            analysis: AnalysisPayload::Email(EmailAnalysis {
                participants: vec![
                    EmailParticipant {
                        name: "Sarah Chen".to_string(),
                        address: "sarah.chen@example.com".to_string(),
                        role: ParticipantRole::Sender,
                        message_count: 5,
                        first_interaction: None,
                        last_interaction: None,
                        deference_score: 0.2,
                    },
                    EmailParticipant {
                        name: "Paul Boucherat".to_string(),
                        address: "paul@example.com".to_string(),
                        role: ParticipantRole::Recipient,
                        message_count: 3,
                        first_interaction: None,
                        last_interaction: None,
                        deference_score: 0.8,
                    },
                ],
                thread_summary: "warning thread".to_string(),
                communication_pattern: CommunicationPattern::Escalating,
                escalation_detected: true,
                legal_significance: LegalSignificance::High,
                risk_flags: vec![RiskFlag::DeadlinePressure],
                confidence: 0.85,
                entities: vec![],
            }),
        }
    }

    fn empty_correlation() -> CorrelationAnalysis {
        CorrelationAnalysis {
            case_id: "C1".to_string(),
            entities: vec![],
            timeline_events: vec![],
            legal_patterns: None,
            temporal_sequences: vec![],
            timeline_gaps: vec![],
        }
    }

    #[test]
    fn test_assessment_contains_known_keys() {
        let analyses = vec![
            doc_analysis(SHA_A, LegalSignificance::Critical, vec![RiskFlag::Retaliation]),
            email_analysis(SHA_B),
        ];
        let map = compute_overall_assessment(&analyses, &empty_correlation());

        let probability = map
            .get(assessment_keys::TRIBUNAL_PROBABILITY)
            .and_then(|v| v.as_f64())
            .unwrap();
        assert!((0.0..=1.0).contains(&probability));
        assert!(map.contains(assessment_keys::FINANCIAL_EXPOSURE_SUMMARY));
        assert!(map.contains(assessment_keys::RISK_FLAG_BREAKDOWN));
        assert!(map.contains(assessment_keys::POWER_DYNAMICS));
        assert!(map.contains(assessment_keys::QUOTED_STATEMENTS));
        assert!(map.contains(assessment_keys::FORENSIC_SUMMARY));
        assert!(map.contains(assessment_keys::FORENSIC_LEGAL_IMPLICATIONS));
        assert!(map.contains(assessment_keys::FORENSIC_RECOMMENDED_ACTIONS));
        assert!(map.contains(assessment_keys::FORENSIC_RISK_ASSESSMENT));
    }

    #[test]
    fn test_risk_flag_histogram() {
        let analyses = vec![
            doc_analysis(SHA_A, LegalSignificance::High, vec![RiskFlag::Retaliation]),
            email_analysis(SHA_B),
        ];
        let map = compute_overall_assessment(&analyses, &empty_correlation());
        let histogram = map.get(assessment_keys::RISK_FLAG_BREAKDOWN).unwrap();
        assert_eq!(histogram["retaliation"], 1);
        assert_eq!(histogram["deadline_pressure"], 1);
    }

    #[test]
    fn test_power_dynamics_stances() {
        let analyses = vec![email_analysis(SHA_B)];
        let map = compute_overall_assessment(&analyses, &empty_correlation());
        let dynamics = map
            .get(assessment_keys::POWER_DYNAMICS)
            .and_then(|v| v.as_array())
            .unwrap();
        assert_eq!(dynamics.len(), 2);
        // Sorted by address: paul first, sarah second.
        assert_eq!(dynamics[0]["stance"], "deferential");
        assert_eq!(dynamics[1]["stance"], "dominant");
    }

    #[test]
    fn test_relationship_network_from_email_links() {
        let analyses = vec![email_analysis(SHA_B)];
        let map = compute_overall_assessment(&analyses, &empty_correlation());
        let network = map.get(assessment_keys::RELATIONSHIP_NETWORK).unwrap();
        let edges = network["edges"].as_array().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0]["a"], "Paul Boucherat");
        assert_eq!(edges[0]["b"], "Sarah Chen");
        let nodes = network["nodes"].as_array().unwrap();
        assert!(nodes.iter().all(|n| n["degree"] == 1));
    }

    #[test]
    fn test_empty_case_assessment() {
        let map = compute_overall_assessment(&[], &empty_correlation());
        assert_eq!(
            map.get(assessment_keys::TRIBUNAL_PROBABILITY).unwrap(),
            &serde_json::json!(0.0)
        );
        assert!(!map.contains(assessment_keys::POWER_DYNAMICS));
        assert!(!map.contains(assessment_keys::QUOTED_STATEMENTS));
    }

    #[test]
    fn test_assessment_is_deterministic() {
        let analyses = vec![
            doc_analysis(SHA_A, LegalSignificance::High, vec![RiskFlag::Retaliation]),
            email_analysis(SHA_B),
        ];
        let first = compute_overall_assessment(&analyses, &empty_correlation());
        let second = compute_overall_assessment(&analyses, &empty_correlation());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_minimal_executive_summary_is_valid() {
        let summary = minimal_executive_summary("C0");
        assert!(crate::types::Validate::validate(&summary).is_ok());
        assert!(summary.narrative.contains("C0"));
    }

    #[test]
    fn test_prompts_differ_by_case_type() {
        assert_ne!(
            executive_prompt(CaseType::Generic),
            executive_prompt(CaseType::Employment)
        );
        assert_ne!(
            executive_prompt(CaseType::Workplace),
            executive_prompt(CaseType::Contract)
        );
    }
}
