use std::collections::BTreeSet;

use crate::analysis_types::{CorrelationAnalysis, EvidenceSummary, LegalPatternAnalysis};
use crate::cancel::CancellationToken;
use crate::errors::PipelineResult;
use crate::llm::{schemas, LlmClient};

const SYSTEM_PROMPT: &str = "You are a legal analyst reviewing the correlated evidence of \
one case. Identify contradictions between statements (factual, temporal, or attribution, \
with severity in [0,1] and both evidence SHA-256 sources), corroboration links (a claim \
supported by at least two SHA-256 sources, with strength and confidence), and evidence \
gaps (missing witness accounts, documentation, or communications, with priority). Cite \
evidence only by the SHA-256 values present in the input. Return empty lists when the \
case contains nothing of the kind; never invent findings.";

/// LLM-driven legal-pattern detection: one structured call per case over the
/// full correlated evidence summary.
pub struct LegalPatternDetector<'a> {
    client: &'a LlmClient,
}

impl<'a> LegalPatternDetector<'a> {
    pub fn new(client: &'a LlmClient) -> Self {
        LegalPatternDetector { client }
    }

    pub fn detect(
        &self,
        correlation: &CorrelationAnalysis,
        evidence: &[EvidenceSummary],
        cancel: &CancellationToken,
    ) -> PipelineResult<LegalPatternAnalysis> {
        cancel.check()?;

        let user_content = serde_json::json!({
            "case_id": correlation.case_id,
            "evidence": evidence.iter().map(|e| serde_json::json!({
                "sha256": e.sha256,
                "filename": e.filename,
                "evidence_type": e.evidence_type,
                "key_findings": e.key_findings,
                "legal_significance": e.legal_significance,
                "risk_flags": e.risk_flags,
            })).collect::<Vec<_>>(),
            "entities": correlation.entities.iter().map(|entity| serde_json::json!({
                "name": entity.name,
                "type": entity.entity_type,
                "occurrences": entity.occurrences.iter().map(|o| serde_json::json!({
                    "sha256": o.sha256,
                    "context": o.context,
                })).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
            "timeline": correlation.timeline_events.iter().map(|event| serde_json::json!({
                "ts": event.ts,
                "sha256": event.sha256,
                "description": event.description,
            })).collect::<Vec<_>>(),
        });

        let mut patterns: LegalPatternAnalysis = self.client.call_structured(
            SYSTEM_PROMPT,
            user_content,
            schemas::LEGAL_PATTERN_ANALYSIS,
            cancel,
        )?;

        let case_shas: BTreeSet<&str> = evidence.iter().map(|e| e.sha256.as_str()).collect();
        validate_references(&mut patterns, &case_shas);
        Ok(patterns)
    }
}

/// Post-validation of every SHA-256 reference against the case membership.
/// Out-of-case references are recorded as warnings; the findings themselves
/// are kept for review rather than silently dropped.
fn validate_references(patterns: &mut LegalPatternAnalysis, case_shas: &BTreeSet<&str>) {
    let mut warnings = Vec::new();

    for (i, contradiction) in patterns.contradictions.iter().enumerate() {
        for source in [&contradiction.source_a, &contradiction.source_b] {
            if !case_shas.contains(source.as_str()) {
                warnings.push(format!(
                    "contradiction {} references sha256 {} outside the case",
                    i, source
                ));
            }
        }
    }
    for (i, corroboration) in patterns.corroborations.iter().enumerate() {
        for source in &corroboration.evidence_sources {
            if !case_shas.contains(source.as_str()) {
                warnings.push(format!(
                    "corroboration {} references sha256 {} outside the case",
                    i, source
                ));
            }
        }
    }

    patterns.reference_warnings = warnings;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis_types::{ContradictionType, EvidenceSummary};
    use crate::config::LlmConfig;
    use crate::llm::ScriptedProvider;
    use crate::types::EvidenceType;
    use std::sync::Arc;

    const SHA_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const SHA_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const SHA_X: &str = "cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc";

    fn test_client(provider: Arc<ScriptedProvider>) -> LlmClient {
        LlmClient::new(
            provider,
            &LlmConfig {
                model: "test-model".to_string(),
                model_revision: "r1".to_string(),
                api_key: None,
                timeout_secs: 5,
                max_attempts: 1,
            },
        )
    }

    fn summaries() -> Vec<EvidenceSummary> {
        [SHA_A, SHA_B]
            .iter()
            .map(|sha| EvidenceSummary {
                sha256: sha.to_string(),
                filename: format!("{}.eml", &sha[..4]),
                evidence_type: EvidenceType::Email,
                key_findings: vec!["statement about suspension date".to_string()],
                legal_significance: None,
                risk_flags: vec![],
                confidence: 0.8,
            })
            .collect()
    }

    fn empty_correlation() -> CorrelationAnalysis {
        CorrelationAnalysis {
            case_id: "C3".to_string(),
            entities: vec![],
            timeline_events: vec![],
            legal_patterns: None,
            temporal_sequences: vec![],
            timeline_gaps: vec![],
        }
    }

    #[test]
    fn test_contradiction_detection() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completed(serde_json::json!({
            "contradictions": [{
                "statement_a": "suspension occurred on 24/08/2025",
                "statement_b": "discussion prior to suspension on 08/02/2025",
                "source_a": SHA_A,
                "source_b": SHA_B,
                "type": "temporal",
                "severity": 0.8
            }],
            "corroborations": [],
            "evidence_gaps": []
        }));
        let client = test_client(provider);
        let detector = LegalPatternDetector::new(&client);

        let patterns = detector
            .detect(&empty_correlation(), &summaries(), &CancellationToken::new())
            .unwrap();
        assert_eq!(patterns.contradictions.len(), 1);
        assert_eq!(
            patterns.contradictions[0].contradiction_type,
            ContradictionType::Temporal
        );
        assert!(patterns.contradictions[0].severity >= 0.5);
        assert!(patterns.reference_warnings.is_empty());
    }

    #[test]
    fn test_out_of_case_reference_reported_not_dropped() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completed(serde_json::json!({
            "contradictions": [],
            "corroborations": [{
                "claim": "the meeting took place",
                "evidence_sources": [SHA_A, SHA_X],
                "strength": "moderate",
                "confidence": 0.7
            }],
            "evidence_gaps": []
        }));
        let client = test_client(provider);
        let detector = LegalPatternDetector::new(&client);

        let patterns = detector
            .detect(&empty_correlation(), &summaries(), &CancellationToken::new())
            .unwrap();
        assert_eq!(patterns.corroborations.len(), 1, "finding kept");
        assert_eq!(patterns.reference_warnings.len(), 1);
        assert!(patterns.reference_warnings[0].contains(SHA_X));
    }

    #[test]
    fn test_single_evidence_case_returns_empty_result() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completed(serde_json::json!({
            "contradictions": [],
            "corroborations": [],
            "evidence_gaps": []
        }));
        let client = test_client(provider);
        let detector = LegalPatternDetector::new(&client);

        let single = vec![summaries().remove(0)];
        let patterns = detector
            .detect(&empty_correlation(), &single, &CancellationToken::new())
            .unwrap();
        assert!(patterns.contradictions.is_empty());
        assert!(patterns.corroborations.is_empty());
        assert!(patterns.evidence_gaps.is_empty());
    }

    #[test]
    fn test_incomplete_response_propagates() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_incomplete("cut short");
        let client = test_client(provider);
        let detector = LegalPatternDetector::new(&client);

        let err = detector
            .detect(&empty_correlation(), &summaries(), &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::LlmIncomplete);
    }
}
