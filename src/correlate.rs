use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, TimeZone, Utc};
use regex::Regex;

use crate::analysis_types::{
    AnalysisPayload, CanonicalEntity, CorrelationAnalysis, EntityOccurrence, EntityType,
    GapSignificance, MatchDecision, TemporalSequence, TimelineEvent, TimelineGap, TimelineSource,
    UnifiedAnalysis,
};
use crate::cancel::CancellationToken;
use crate::config::CorrelateConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::llm::{schemas, LlmClient};
use crate::types::FileMetadata;

const ENTITY_MATCH_PROMPT: &str = "You compare two person names extracted from different \
evidence files in the same legal case and decide whether they refer to the same person. \
Answer match or no_match with a confidence in [0,1]. When uncertain, answer no_match: a \
missed merge is recoverable, a wrong merge corrupts the correlation.";

/// Minimum AI confidence required to merge two single-occurrence entities.
const AI_MERGE_THRESHOLD: f64 = 0.7;

/// Cross-evidence correlation: entity canonicalization, timeline
/// reconstruction with gap detection, and temporal sequences. Deterministic
/// for a fixed input set; the optional AI resolution pass is gated by
/// configuration.
pub struct CorrelationEngine<'a> {
    config: &'a CorrelateConfig,
    client: Option<&'a LlmClient>,
}

impl<'a> CorrelationEngine<'a> {
    pub fn new(config: &'a CorrelateConfig, client: Option<&'a LlmClient>) -> Self {
        CorrelationEngine { config, client }
    }

    pub fn correlate(
        &self,
        case_id: &str,
        analyses: &[UnifiedAnalysis],
        metadata: &HashMap<String, FileMetadata>,
        cancel: &CancellationToken,
    ) -> PipelineResult<CorrelationAnalysis> {
        cancel.check()?;

        let mut entities = canonicalize_entities(analyses);
        if self.config.ai_resolve {
            if let Some(client) = self.client {
                entities = self.ai_resolve_singles(entities, client, cancel)?;
            }
        }

        let timeline_events = build_timeline(analyses, metadata);
        let timeline_gaps = detect_gaps(&timeline_events, self.config.gap_threshold_days);
        let temporal_sequences = detect_sequences(&timeline_events);

        Ok(CorrelationAnalysis {
            case_id: case_id.to_string(),
            entities,
            timeline_events,
            legal_patterns: None,
            temporal_sequences,
            timeline_gaps,
        })
    }

    /// AI single-to-single resolution over person entities that string
    /// merging left with one occurrence each. Pairs are filtered to a shared
    /// initial letter and the total comparison count is capped, keeping the
    /// O(n^2) pair space tractable.
    fn ai_resolve_singles(
        &self,
        mut entities: Vec<CanonicalEntity>,
        client: &LlmClient,
        cancel: &CancellationToken,
    ) -> PipelineResult<Vec<CanonicalEntity>> {
        let singles: Vec<usize> = entities
            .iter()
            .enumerate()
            .filter(|(_, e)| e.entity_type == EntityType::Person && e.occurrences.len() == 1)
            .map(|(i, _)| i)
            .collect();

        let mut calls = 0usize;
        let mut merged_into: BTreeMap<usize, usize> = BTreeMap::new();

        'outer: for (a_pos, &a) in singles.iter().enumerate() {
            for &b in &singles[a_pos + 1..] {
                if calls >= self.config.ai_resolve_max_calls {
                    break 'outer;
                }
                if merged_into.contains_key(&a) || merged_into.contains_key(&b) {
                    continue;
                }
                if entities[a].name.chars().next() != entities[b].name.chars().next() {
                    continue;
                }

                cancel.check()?;
                calls += 1;
                let response: crate::analysis_types::EntityMatchResponse = client
                    .call_structured(
                        ENTITY_MATCH_PROMPT,
                        serde_json::json!({
                            "name_a": entities[a].name,
                            "context_a": entities[a].occurrences[0].context,
                            "name_b": entities[b].name,
                            "context_b": entities[b].occurrences[0].context,
                        }),
                        schemas::ENTITY_MATCH,
                        cancel,
                    )
                    .map_err(|e| {
                        PipelineError::with_context(
                            crate::errors::ErrorKind::Correlation,
                            &e.message,
                            "entity resolution",
                        )
                    })?;

                if response.decision == MatchDecision::Match
                    && response.confidence >= AI_MERGE_THRESHOLD
                {
                    // Deterministic merge direction: smaller name wins.
                    let (keep, drop) = if entities[a].name <= entities[b].name {
                        (a, b)
                    } else {
                        (b, a)
                    };
                    let dropped = entities[drop].clone();
                    entities[keep].occurrences.extend(dropped.occurrences);
                    entities[keep].variants.push(dropped.name);
                    entities[keep].variants.sort();
                    entities[keep].variants.dedup();
                    merged_into.insert(drop, keep);
                }
            }
        }

        let mut result: Vec<CanonicalEntity> = entities
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !merged_into.contains_key(i))
            .map(|(_, e)| e)
            .collect();
        sort_entities(&mut result);
        Ok(result)
    }
}

/// Group extracted entities by normalized `(name, type)`, merging email
/// addresses with the person names hidden in their local parts.
pub fn canonicalize_entities(analyses: &[UnifiedAnalysis]) -> Vec<CanonicalEntity> {
    let mut groups: BTreeMap<(EntityType, String), CanonicalEntity> = BTreeMap::new();

    for analysis in analyses {
        for entity in analysis.analysis.entities() {
            let (canonical, variant) = canonical_name(&entity.name);
            let key = (entity.entity_type, canonical.clone());

            let group = groups.entry(key).or_insert_with(|| CanonicalEntity {
                name: canonical.clone(),
                entity_type: entity.entity_type,
                occurrences: Vec::new(),
                variants: Vec::new(),
            });
            group.occurrences.push(EntityOccurrence {
                sha256: analysis.sha256.clone(),
                original_name: entity.name.clone(),
                confidence: entity.confidence,
                context: entity.context.clone(),
            });
            if let Some(v) = variant {
                if !group.variants.contains(&v) {
                    group.variants.push(v);
                }
            }
        }
    }

    let mut entities: Vec<CanonicalEntity> = groups.into_values().collect();
    for entity in &mut entities {
        entity
            .occurrences
            .sort_by(|a, b| a.sha256.cmp(&b.sha256).then_with(|| a.original_name.cmp(&b.original_name)));
        entity.variants.sort();
    }
    sort_entities(&mut entities);
    entities
}

fn sort_entities(entities: &mut [CanonicalEntity]) {
    entities.sort_by(|a, b| {
        a.entity_type
            .cmp(&b.entity_type)
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Canonical form of an extracted name, plus the original as a variant when
/// it differs. Email addresses canonicalize through their local part:
/// `Paul.Boucherat.9241@x` becomes `paul boucherat`.
fn canonical_name(raw: &str) -> (String, Option<String>) {
    if raw.contains('@') {
        if let Some(name) = name_from_local_part(raw) {
            return (normalize_name(&name), Some(raw.to_string()));
        }
    }
    let normalized = normalize_name(raw);
    let variant = if normalized != raw {
        Some(raw.to_string())
    } else {
        None
    };
    (normalized, variant)
}

/// Deterministic string normalization: lowercase, trim, strip punctuation,
/// collapse whitespace.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '.' || c == '_' || c == '-' {
            out.push(' ');
        }
        // other punctuation dropped
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Recover a display name from an email local part. Numeric segments are
/// dropped; `paul.boucherat.9241@x` yields `Paul Boucherat`.
pub fn name_from_local_part(address: &str) -> Option<String> {
    let local = address.split('@').next()?;
    let parts: Vec<String> = local
        .split(&['.', '_', '-'][..])
        .filter(|p| !p.is_empty() && !p.chars().all(|c| c.is_ascii_digit()))
        .map(capitalize)
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join(" "))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Merge filesystem, email, and semantic dates into one ordered timeline.
/// Ordering is total: timestamp, then SHA-256, then event id.
pub fn build_timeline(
    analyses: &[UnifiedAnalysis],
    metadata: &HashMap<String, FileMetadata>,
) -> Vec<TimelineEvent> {
    let mut events = Vec::new();

    for analysis in analyses {
        let sha = &analysis.sha256;
        let significance = analysis.analysis.legal_significance();
        let risk_flags = analysis.analysis.risk_flags().to_vec();
        let mut seq = 0usize;
        let mut push = |ts: String, description: String, source: TimelineSource, seq: &mut usize| {
            events.push(TimelineEvent {
                event_id: format!("{}-{}-{:03}", crate::types::short_sha(sha), source_tag(source), seq),
                ts,
                sha256: sha.clone(),
                description,
                source,
                legal_significance: significance,
                risk_flags: risk_flags.clone(),
            });
            *seq += 1;
        };

        if let Some(meta) = metadata.get(sha) {
            if let Some(created) = &meta.created_utc {
                push(
                    created.clone(),
                    format!("file created: {}", meta.filename),
                    TimelineSource::Filesystem,
                    &mut seq,
                );
            }
            if let Some(modified) = &meta.modified_utc {
                if meta.created_utc.as_deref() != Some(modified.as_str()) {
                    push(
                        modified.clone(),
                        format!("file modified: {}", meta.filename),
                        TimelineSource::Filesystem,
                        &mut seq,
                    );
                }
            }
        }

        if let AnalysisPayload::Email(email) = &analysis.analysis {
            let mut seen = std::collections::BTreeSet::new();
            for participant in &email.participants {
                for ts in [&participant.first_interaction, &participant.last_interaction]
                    .into_iter()
                    .flatten()
                {
                    if let Some(normalized) = normalize_timestamp(ts) {
                        if seen.insert(normalized.clone()) {
                            push(
                                normalized,
                                format!("email interaction involving {}", participant.name),
                                TimelineSource::Email,
                                &mut seq,
                            );
                        }
                    }
                }
            }
        }

        let mut seen_dates = std::collections::BTreeSet::new();
        for entity in analysis.analysis.entities() {
            if entity.entity_type != EntityType::Date {
                continue;
            }
            if let Some(date) = parse_semantic_date(&entity.name) {
                let ts = Utc
                    .from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight"))
                    .to_rfc3339();
                if seen_dates.insert(ts.clone()) {
                    let description = entity
                        .associated_event
                        .clone()
                        .unwrap_or_else(|| entity.context.clone());
                    push(ts, description, TimelineSource::Semantic, &mut seq);
                }
            }
        }
    }

    events.sort_by(|a, b| {
        a.ts.cmp(&b.ts)
            .then_with(|| a.sha256.cmp(&b.sha256))
            .then_with(|| a.event_id.cmp(&b.event_id))
    });
    events
}

fn source_tag(source: TimelineSource) -> &'static str {
    match source {
        TimelineSource::Filesystem => "fs",
        TimelineSource::Email => "em",
        TimelineSource::Semantic => "se",
    }
}

fn normalize_timestamp(raw: &str) -> Option<String> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).to_rfc3339());
    }
    parse_semantic_date(raw).map(|date| {
        Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight"))
            .to_rfc3339()
    })
}

/// Parse a date in ISO, UK, US, or written-month form. Ambiguous slash
/// dates where both components could be a month are read day-first.
pub fn parse_semantic_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }

    let slash_re = Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("slash date regex");
    if let Some(caps) = slash_re.captures(raw) {
        let first: u32 = caps[1].parse().ok()?;
        let second: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        // First component above 12 can only be a day; second above 12
        // forces month-first. Otherwise day-first.
        let (day, month) = if first > 12 {
            (first, second)
        } else if second > 12 {
            (second, first)
        } else {
            (first, second)
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    for format in ["%d %B %Y", "%B %d, %Y", "%d %b %Y", "%b %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    None
}

/// Flag silent stretches of at least `threshold_days` between two material
/// events (material: high/critical significance or any risk flag).
pub fn detect_gaps(events: &[TimelineEvent], threshold_days: i64) -> Vec<TimelineGap> {
    let mut gaps = Vec::new();

    for pair in events.windows(2) {
        let (before, after) = (&pair[0], &pair[1]);
        let (Ok(start), Ok(end)) = (
            chrono::DateTime::parse_from_rfc3339(&before.ts),
            chrono::DateTime::parse_from_rfc3339(&after.ts),
        ) else {
            continue;
        };
        let gap_days = (end - start).num_days();
        if gap_days < threshold_days {
            continue;
        }
        if !is_material(before) || !is_material(after) {
            continue;
        }

        let significance = if gap_days >= threshold_days * 3 {
            GapSignificance::High
        } else if gap_days >= threshold_days * 2 {
            GapSignificance::Medium
        } else {
            GapSignificance::Low
        };
        gaps.push(TimelineGap {
            start_ts: before.ts.clone(),
            end_ts: after.ts.clone(),
            gap_days,
            significance,
            rationale: format!(
                "{} days with no recorded events between '{}' and '{}', both material",
                gap_days, before.description, after.description
            ),
        });
    }
    gaps
}

fn is_material(event: &TimelineEvent) -> bool {
    event
        .legal_significance
        .map(|s| s.is_material())
        .unwrap_or(false)
        || !event.risk_flags.is_empty()
}

/// Pattern rules over event descriptions and risk flags. Two chains are
/// recognized: the disciplinary progression complaint -> suspension ->
/// termination, and a retaliation pattern where a complaint is followed by
/// retaliation-flagged events.
pub fn detect_sequences(events: &[TimelineEvent]) -> Vec<TemporalSequence> {
    let mut sequences = Vec::new();

    let complaint = find_stage(events, &["complaint", "grievance"], 0);
    if let Some(complaint_idx) = complaint {
        if let Some(suspension_idx) = find_stage(events, &["suspension", "suspended"], complaint_idx + 1)
        {
            if let Some(termination_idx) =
                find_stage(events, &["termination", "dismissal", "dismissed"], suspension_idx + 1)
            {
                sequences.push(TemporalSequence {
                    kind: "disciplinary-progression".to_string(),
                    events: vec![
                        events[complaint_idx].event_id.clone(),
                        events[suspension_idx].event_id.clone(),
                        events[termination_idx].event_id.clone(),
                    ],
                    confidence: 0.85,
                });
            }
        }

        let retaliation_events: Vec<String> = events[complaint_idx + 1..]
            .iter()
            .filter(|e| {
                e.risk_flags
                    .contains(&crate::analysis_types::RiskFlag::Retaliation)
            })
            .map(|e| e.event_id.clone())
            .collect();
        if !retaliation_events.is_empty() {
            let mut chain = vec![events[complaint_idx].event_id.clone()];
            chain.extend(retaliation_events);
            sequences.push(TemporalSequence {
                kind: "retaliation-pattern".to_string(),
                events: chain,
                confidence: 0.75,
            });
        }
    }

    sequences
}

fn find_stage(events: &[TimelineEvent], keywords: &[&str], from: usize) -> Option<usize> {
    events
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, e)| {
            let description = e.description.to_lowercase();
            keywords.iter().any(|k| description.contains(k))
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis_types::{
        DocumentAnalysis, DocumentType, Entity, LegalSignificance, RiskFlag,
        Sentiment,
    };
    use crate::config::LlmConfig;
    use crate::llm::ScriptedProvider;
    use crate::types::EvidenceType;
    use std::sync::Arc;

    const SHA_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const SHA_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn entity(name: &str, entity_type: EntityType, confidence: f64) -> Entity {
        Entity {
            name: name.to_string(),
            entity_type,
            confidence,
            context: format!("mentioned: {}", name),
            relationship: None,
            quoted_text: None,
            associated_event: None,
        }
    }

    fn doc_analysis(
        sha: &str,
        entities: Vec<Entity>,
        significance: LegalSignificance,
        risk_flags: Vec<RiskFlag>,
    ) -> UnifiedAnalysis {
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
                entities,
                document_type: DocumentType::Letter,
                sentiment: Sentiment::Neutral,
                legal_significance: significance,
                risk_flags,
                confidence: 0.9,
                word_stats: None,
            }),
        }
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Paul  BOUCHERAT. "), "paul boucherat");
        assert_eq!(normalize_name("O'Brien, Sarah"), "obrien sarah");
        assert_eq!(normalize_name("ACME-Corp Ltd."), "acme corp ltd");
    }

    #[test]
    fn test_name_from_local_part() {
        assert_eq!(
            name_from_local_part("Paul.Boucherat.9241@example.com"),
            Some("Paul Boucherat".to_string())
        );
        assert_eq!(
            name_from_local_part("sarah_chen@example.com"),
            Some("Sarah Chen".to_string())
        );
        assert_eq!(name_from_local_part("12345@example.com"), None);
    }

    #[test]
    fn test_entities_merge_across_evidence() {
        let analyses = vec![
            doc_analysis(
                SHA_A,
                vec![entity("Paul Boucherat", EntityType::Person, 0.9)],
                LegalSignificance::Low,
                vec![],
            ),
            doc_analysis(
                SHA_B,
                vec![entity("paul  boucherat", EntityType::Person, 0.7)],
                LegalSignificance::Low,
                vec![],
            ),
        ];

        let entities = canonicalize_entities(&analyses);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "paul boucherat");
        assert_eq!(entities[0].occurrences.len(), 2);
        // Original confidences retained.
        let confidences: Vec<f64> = entities[0].occurrences.iter().map(|o| o.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
    }

    #[test]
    fn test_email_address_merges_with_name() {
        let analyses = vec![
            doc_analysis(
                SHA_A,
                vec![entity("Paul Boucherat", EntityType::Person, 0.9)],
                LegalSignificance::Low,
                vec![],
            ),
            doc_analysis(
                SHA_B,
                vec![entity(
                    "Paul.Boucherat.9241@example.com",
                    EntityType::Person,
                    0.8,
                )],
                LegalSignificance::Low,
                vec![],
            ),
        ];

        let entities = canonicalize_entities(&analyses);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "paul boucherat");
        assert!(entities[0]
            .variants
            .contains(&"Paul.Boucherat.9241@example.com".to_string()));
    }

    #[test]
    fn test_same_name_different_type_not_merged() {
        let analyses = vec![doc_analysis(
            SHA_A,
            vec![
                entity("Mercia", EntityType::Person, 0.9),
                entity("Mercia", EntityType::Organization, 0.9),
            ],
            LegalSignificance::Low,
            vec![],
        )];
        let entities = canonicalize_entities(&analyses);
        assert_eq!(entities.len(), 2);
    }

    #[test]
    fn test_correlation_is_deterministic() {
        let analyses = vec![
            doc_analysis(
                SHA_B,
                vec![
                    entity("Sarah Chen", EntityType::Person, 0.9),
                    entity("24/08/2025", EntityType::Date, 0.8),
                ],
                LegalSignificance::High,
                vec![RiskFlag::Retaliation],
            ),
            doc_analysis(
                SHA_A,
                vec![entity("Sarah Chen", EntityType::Person, 0.85)],
                LegalSignificance::Low,
                vec![],
            ),
        ];
        let metadata = HashMap::new();
        let config = CorrelateConfig {
            ai_resolve: false,
            ai_resolve_max_calls: 50,
            gap_threshold_days: 14,
        };
        let engine = CorrelationEngine::new(&config, None);

        let first = engine
            .correlate("C1", &analyses, &metadata, &CancellationToken::new())
            .unwrap();
        let second = engine
            .correlate("C1", &analyses, &metadata, &CancellationToken::new())
            .unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_parse_semantic_dates() {
        let expected = NaiveDate::from_ymd_opt(2025, 8, 24).unwrap();
        assert_eq!(parse_semantic_date("2025-08-24"), Some(expected));
        assert_eq!(parse_semantic_date("24/08/2025"), Some(expected));
        assert_eq!(parse_semantic_date("08/24/2025"), Some(expected)); // second > 12 forces month-first
        assert_eq!(parse_semantic_date("24 August 2025"), Some(expected));
        assert_eq!(parse_semantic_date("August 24, 2025"), Some(expected));
        // Ambiguous reads day-first.
        assert_eq!(
            parse_semantic_date("08/02/2025"),
            Some(NaiveDate::from_ymd_opt(2025, 2, 8).unwrap())
        );
        assert_eq!(parse_semantic_date("not a date"), None);
    }

    #[test]
    fn test_timeline_ordering_ties_break_on_sha_then_id() {
        let analyses = vec![
            doc_analysis(
                SHA_B,
                vec![entity("2025-08-24", EntityType::Date, 0.9)],
                LegalSignificance::Low,
                vec![],
            ),
            doc_analysis(
                SHA_A,
                vec![entity("2025-08-24", EntityType::Date, 0.9)],
                LegalSignificance::Low,
                vec![],
            ),
        ];
        let events = build_timeline(&analyses, &HashMap::new());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sha256, SHA_A);
        assert_eq!(events[1].sha256, SHA_B);
    }

    #[test]
    fn test_timeline_includes_filesystem_times() {
        let analyses = vec![doc_analysis(SHA_A, vec![], LegalSignificance::Low, vec![])];
        let mut metadata = HashMap::new();
        metadata.insert(
            SHA_A.to_string(),
            FileMetadata {
                filename: "doc.txt".to_string(),
                size_bytes: 6,
                mime_type: "text/plain".to_string(),
                extension: "txt".to_string(),
                created_utc: Some("2025-08-01T10:00:00+00:00".to_string()),
                modified_utc: Some("2025-08-02T10:00:00+00:00".to_string()),
                sha256: SHA_A.to_string(),
            },
        );
        let events = build_timeline(&analyses, &metadata);
        assert_eq!(events.len(), 2);
        assert!(events[0].description.contains("file created"));
        assert!(events[1].description.contains("file modified"));
        assert_eq!(events[0].source, TimelineSource::Filesystem);
    }

    #[test]
    fn test_gap_detection_between_material_events() {
        fn material_event(ts: &str, id: &str) -> TimelineEvent {
            TimelineEvent {
                ts: ts.to_string(),
                sha256: SHA_A.to_string(),
                event_id: id.to_string(),
                description: format!("event {}", id),
                source: TimelineSource::Semantic,
                legal_significance: Some(LegalSignificance::High),
                risk_flags: vec![],
            }
        }

        let events = vec![
            material_event("2025-01-01T00:00:00+00:00", "e1"),
            material_event("2025-03-01T00:00:00+00:00", "e2"),
        ];
        let gaps = detect_gaps(&events, 14);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].gap_days, 59);
        assert_eq!(gaps[0].significance, GapSignificance::High);
        assert!(gaps[0].rationale.contains("59 days"));

        // Below threshold: no gap.
        let close = vec![
            material_event("2025-01-01T00:00:00+00:00", "e1"),
            material_event("2025-01-05T00:00:00+00:00", "e2"),
        ];
        assert!(detect_gaps(&close, 14).is_empty());

        // Non-material endpoints: no gap.
        let mut immaterial = vec![
            material_event("2025-01-01T00:00:00+00:00", "e1"),
            material_event("2025-03-01T00:00:00+00:00", "e2"),
        ];
        immaterial[1].legal_significance = Some(LegalSignificance::Low);
        assert!(detect_gaps(&immaterial, 14).is_empty());
    }

    #[test]
    fn test_disciplinary_sequence_detected() {
        fn event(ts: &str, id: &str, description: &str) -> TimelineEvent {
            TimelineEvent {
                ts: ts.to_string(),
                sha256: SHA_A.to_string(),
                event_id: id.to_string(),
                description: description.to_string(),
                source: TimelineSource::Semantic,
                legal_significance: None,
                risk_flags: vec![],
            }
        }

        let events = vec![
            event("2025-01-01T00:00:00+00:00", "e1", "formal complaint filed"),
            event("2025-02-01T00:00:00+00:00", "e2", "suspension meeting held"),
            event("2025-03-01T00:00:00+00:00", "e3", "termination letter issued"),
        ];
        let sequences = detect_sequences(&events);
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].kind, "disciplinary-progression");
        assert_eq!(sequences[0].events, vec!["e1", "e2", "e3"]);

        // Out of order: no sequence.
        let shuffled = vec![
            event("2025-01-01T00:00:00+00:00", "e1", "termination letter issued"),
            event("2025-02-01T00:00:00+00:00", "e2", "suspension meeting held"),
            event("2025-03-01T00:00:00+00:00", "e3", "formal complaint filed"),
        ];
        assert!(detect_sequences(&shuffled).is_empty());
    }

    #[test]
    fn test_retaliation_pattern_detected() {
        let analyses = vec![
            doc_analysis(
                SHA_A,
                vec![{
                    let mut e = entity("2025-01-10", EntityType::Date, 0.9);
                    e.associated_event = Some("grievance submitted".to_string());
                    e
                }],
                LegalSignificance::Medium,
                vec![],
            ),
            doc_analysis(
                SHA_B,
                vec![{
                    let mut e = entity("2025-01-20", EntityType::Date, 0.9);
                    e.associated_event = Some("duties removed".to_string());
                    e
                }],
                LegalSignificance::High,
                vec![RiskFlag::Retaliation],
            ),
        ];
        let events = build_timeline(&analyses, &HashMap::new());
        let sequences = detect_sequences(&events);
        assert!(sequences.iter().any(|s| s.kind == "retaliation-pattern"));
    }

    #[test]
    fn test_ai_resolution_merges_confident_match() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completed(serde_json::json!({
            "decision": "match",
            "confidence": 0.9
        }));
        let client = LlmClient::new(
            provider.clone(),
            &LlmConfig {
                model: "test-model".to_string(),
                model_revision: "r1".to_string(),
                api_key: None,
                timeout_secs: 5,
                max_attempts: 1,
            },
        );

        let analyses = vec![
            doc_analysis(
                SHA_A,
                vec![entity("Paul B", EntityType::Person, 0.9)],
                LegalSignificance::Low,
                vec![],
            ),
            doc_analysis(
                SHA_B,
                vec![entity("Paul Boucherat", EntityType::Person, 0.9)],
                LegalSignificance::Low,
                vec![],
            ),
        ];
        let config = CorrelateConfig {
            ai_resolve: true,
            ai_resolve_max_calls: 50,
            gap_threshold_days: 14,
        };
        let engine = CorrelationEngine::new(&config, Some(&client));
        let result = engine
            .correlate("C1", &analyses, &HashMap::new(), &CancellationToken::new())
            .unwrap();

        let people: Vec<_> = result
            .entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Person)
            .collect();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].occurrences.len(), 2);
        assert!(people[0].variants.contains(&"paul boucherat".to_string()));
    }

    #[test]
    fn test_ai_resolution_conservative_below_threshold() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completed(serde_json::json!({
            "decision": "match",
            "confidence": 0.6
        }));
        let client = LlmClient::new(
            provider,
            &LlmConfig {
                model: "test-model".to_string(),
                model_revision: "r1".to_string(),
                api_key: None,
                timeout_secs: 5,
                max_attempts: 1,
            },
        );

        let analyses = vec![
            doc_analysis(
                SHA_A,
                vec![entity("Paul B", EntityType::Person, 0.9)],
                LegalSignificance::Low,
                vec![],
            ),
            doc_analysis(
                SHA_B,
                vec![entity("Paul Boucherat", EntityType::Person, 0.9)],
                LegalSignificance::Low,
                vec![],
            ),
        ];
        let config = CorrelateConfig {
            ai_resolve: true,
            ai_resolve_max_calls: 50,
            gap_threshold_days: 14,
        };
        let engine = CorrelationEngine::new(&config, Some(&client));
        let result = engine
            .correlate("C1", &analyses, &HashMap::new(), &CancellationToken::new())
            .unwrap();
        assert_eq!(result.entities.len(), 2, "0.6 confidence must not merge");
    }

    #[test]
    fn test_ai_resolution_filters_and_caps() {
        // Different initials: no call at all.
        let provider = Arc::new(ScriptedProvider::always(serde_json::json!({
            "decision": "match",
            "confidence": 0.95
        })));
        let client = LlmClient::new(
            provider.clone(),
            &LlmConfig {
                model: "test-model".to_string(),
                model_revision: "r1".to_string(),
                api_key: None,
                timeout_secs: 5,
                max_attempts: 1,
            },
        );

        let analyses = vec![
            doc_analysis(
                SHA_A,
                vec![entity("Alice Smith", EntityType::Person, 0.9)],
                LegalSignificance::Low,
                vec![],
            ),
            doc_analysis(
                SHA_B,
                vec![entity("Zoe Brown", EntityType::Person, 0.9)],
                LegalSignificance::Low,
                vec![],
            ),
        ];
        let config = CorrelateConfig {
            ai_resolve: true,
            ai_resolve_max_calls: 50,
            gap_threshold_days: 14,
        };
        let engine = CorrelationEngine::new(&config, Some(&client));
        engine
            .correlate("C1", &analyses, &HashMap::new(), &CancellationToken::new())
            .unwrap();
        assert_eq!(provider.request_count(), 0, "same-initial filter skips the pair");

        // Cap of zero: no calls even for same-initial pairs.
        let same_initial = vec![
            doc_analysis(
                SHA_A,
                vec![entity("Paul B", EntityType::Person, 0.9)],
                LegalSignificance::Low,
                vec![],
            ),
            doc_analysis(
                SHA_B,
                vec![entity("Paul Boucherat", EntityType::Person, 0.9)],
                LegalSignificance::Low,
                vec![],
            ),
        ];
        let capped = CorrelateConfig {
            ai_resolve: true,
            ai_resolve_max_calls: 0,
            gap_threshold_days: 14,
        };
        let engine = CorrelationEngine::new(&capped, Some(&client));
        engine
            .correlate("C1", &same_initial, &HashMap::new(), &CancellationToken::new())
            .unwrap();
        assert_eq!(provider.request_count(), 0);
    }
}
