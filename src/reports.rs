use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis_types::{assessment_keys, CaseSummary};
use crate::errors::{ErrorKind, PipelineError, PipelineResult};
use crate::logger::Logger;
use crate::types::short_sha;

/// Report generator contract. The driver invokes each generator
/// independently; one failing never aborts the others.
///
/// Generators read the loose `overall_assessment` bag exclusively through
/// keyed access with a default, and the `correlation` record exclusively
/// through typed fields.
pub trait ReportGenerator: Send + Sync {
    /// Pre-flight check over the case summary.
    fn has_data(&self, summary: &CaseSummary) -> bool;
    fn report_filename(&self) -> &'static str;
    fn report_title(&self) -> &'static str;
    fn generate(&self, summary: &CaseSummary, out_dir: &Path) -> PipelineResult<PathBuf>;
}

/// One produced report, recorded in the package metadata.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub filename: String,
    pub title: String,
}

/// Run every generator, isolating failures. Returns the reports actually
/// produced.
pub fn run_generators(
    generators: &[Box<dyn ReportGenerator>],
    summary: &CaseSummary,
    out_dir: &Path,
    logger: &Logger,
) -> Vec<GeneratedReport> {
    let mut produced = Vec::new();
    for generator in generators {
        if !generator.has_data(summary) {
            logger.info(&format!(
                "Skipping report '{}': required data not present",
                generator.report_title()
            ));
            continue;
        }
        match generator.generate(summary, out_dir) {
            Ok(_) => {
                produced.push(GeneratedReport {
                    filename: generator.report_filename().to_string(),
                    title: generator.report_title().to_string(),
                });
            }
            Err(e) => {
                logger.error(&format!(
                    "Report '{}' failed: {}",
                    generator.report_title(),
                    e
                ));
            }
        }
    }
    produced
}

/// The full registered generator set.
pub fn default_generators() -> Vec<Box<dyn ReportGenerator>> {
    vec![
        Box::new(ForensicLegalOpinion),
        Box::new(FinancialRiskAssessment),
        Box::new(LegalPatternsReport),
        Box::new(TimelineReconstruction),
        Box::new(QuotedStatementsReport),
        Box::new(RelationshipNetworkReport),
        Box::new(PowerDynamicsReport),
        Box::new(ImageOcrReport),
        Box::new(ExecutiveSummaryReport),
    ]
}

fn report_header(title: &str, summary: &CaseSummary) -> String {
    format!(
        "# {}\n\nCase: {}\nGenerated: {}\nEvidence items: {}\n\n---\n\n",
        title,
        summary.case_id,
        summary.generated_utc,
        summary.evidence_count()
    )
}

/// Defensive list formatting over loosely-typed assessment values: arrays
/// become bullet lists, scalars a single bullet, everything else is rendered
/// through its JSON form.
fn fmt_list(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                serde_json::Value::String(s) => format!("- {}\n", s),
                other => format!("- {}\n", other),
            })
            .collect(),
        serde_json::Value::String(s) => format!("- {}\n", s),
        serde_json::Value::Null => String::new(),
        other => format!("- {}\n", other),
    }
}

fn write_report(out_dir: &Path, filename: &str, content: &str) -> PipelineResult<PathBuf> {
    fs::create_dir_all(out_dir).map_err(|e| PipelineError::io(ErrorKind::Package, &e, out_dir))?;
    let path = out_dir.join(filename);
    fs::write(&path, content).map_err(|e| PipelineError::io(ErrorKind::Package, &e, &path))?;
    Ok(path)
}

/// Professional legal opinion from the internal forensic detail.
pub struct ForensicLegalOpinion;

impl ReportGenerator for ForensicLegalOpinion {
    fn has_data(&self, summary: &CaseSummary) -> bool {
        summary
            .overall_assessment
            .contains(assessment_keys::FORENSIC_SUMMARY)
    }

    fn report_filename(&self) -> &'static str {
        "forensic_legal_opinion.md"
    }

    fn report_title(&self) -> &'static str {
        "Forensic Legal Opinion"
    }

    fn generate(&self, summary: &CaseSummary, out_dir: &Path) -> PipelineResult<PathBuf> {
        let null = serde_json::Value::Null;
        let assessment = &summary.overall_assessment;
        let forensic_summary = assessment
            .get_or(assessment_keys::FORENSIC_SUMMARY, &null)
            .as_str()
            .unwrap_or("");
        let risk = assessment
            .get_or(assessment_keys::FORENSIC_RISK_ASSESSMENT, &null)
            .as_str()
            .unwrap_or("");

        let mut content = report_header(self.report_title(), summary);
        content.push_str("## Forensic Overview\n\n");
        content.push_str(forensic_summary);
        content.push_str("\n\n## Risk Assessment\n\n");
        content.push_str(risk);
        content.push_str("\n\n## Legal Implications\n\n");
        content.push_str(&fmt_list(
            assessment.get_or(assessment_keys::FORENSIC_LEGAL_IMPLICATIONS, &null),
        ));
        content.push_str("\n## Recommended Actions\n\n");
        content.push_str(&fmt_list(
            assessment.get_or(assessment_keys::FORENSIC_RECOMMENDED_ACTIONS, &null),
        ));
        write_report(out_dir, self.report_filename(), &content)
    }
}

/// Tribunal and settlement exposure analysis.
pub struct FinancialRiskAssessment;

impl ReportGenerator for FinancialRiskAssessment {
    fn has_data(&self, summary: &CaseSummary) -> bool {
        summary
            .overall_assessment
            .contains(assessment_keys::TRIBUNAL_PROBABILITY)
    }

    fn report_filename(&self) -> &'static str {
        "financial_risk_assessment.md"
    }

    fn report_title(&self) -> &'static str {
        "Financial Risk Assessment"
    }

    fn generate(&self, summary: &CaseSummary, out_dir: &Path) -> PipelineResult<PathBuf> {
        let null = serde_json::Value::Null;
        let assessment = &summary.overall_assessment;
        let probability = assessment
            .get_or(assessment_keys::TRIBUNAL_PROBABILITY, &null)
            .as_f64()
            .unwrap_or(0.0);
        let exposure = assessment
            .get_or(assessment_keys::FINANCIAL_EXPOSURE_SUMMARY, &null)
            .as_str()
            .unwrap_or("no exposure estimate available");

        let mut content = report_header(self.report_title(), summary);
        content.push_str(&format!("## Tribunal Probability\n\n{:.2}\n\n", probability));
        content.push_str(&format!("## Financial Exposure\n\n{}\n\n", exposure));
        content.push_str("## Risk Flag Breakdown\n\n");
        if let Some(histogram) = assessment
            .get_or(assessment_keys::RISK_FLAG_BREAKDOWN, &null)
            .as_object()
        {
            for (flag, count) in histogram {
                content.push_str(&format!("- {}: {}\n", flag, count));
            }
        }
        write_report(out_dir, self.report_filename(), &content)
    }
}

/// Contradictions, corroboration links, and evidence gaps.
pub struct LegalPatternsReport;

impl ReportGenerator for LegalPatternsReport {
    fn has_data(&self, summary: &CaseSummary) -> bool {
        summary.correlation.legal_patterns.is_some()
    }

    fn report_filename(&self) -> &'static str {
        "legal_patterns_analysis.md"
    }

    fn report_title(&self) -> &'static str {
        "Legal Patterns Analysis"
    }

    fn generate(&self, summary: &CaseSummary, out_dir: &Path) -> PipelineResult<PathBuf> {
        let patterns = summary
            .correlation
            .legal_patterns
            .as_ref()
            .ok_or_else(|| PipelineError::package("legal patterns absent"))?;

        let mut content = report_header(self.report_title(), summary);
        content.push_str("## Contradictions\n\n");
        if patterns.contradictions.is_empty() {
            content.push_str("None detected.\n");
        }
        for c in &patterns.contradictions {
            content.push_str(&format!(
                "- [{:?}, severity {:.2}] \"{}\" ({}) vs \"{}\" ({})\n",
                c.contradiction_type,
                c.severity,
                c.statement_a,
                short_sha(&c.source_a),
                c.statement_b,
                short_sha(&c.source_b),
            ));
        }

        content.push_str("\n## Corroboration\n\n");
        if patterns.corroborations.is_empty() {
            content.push_str("None detected.\n");
        }
        for c in &patterns.corroborations {
            let sources: Vec<&str> = c.evidence_sources.iter().map(|s| short_sha(s)).collect();
            content.push_str(&format!(
                "- [{:?}, confidence {:.2}] \"{}\" supported by {}\n",
                c.strength,
                c.confidence,
                c.claim,
                sources.join(", ")
            ));
        }

        content.push_str("\n## Evidence Gaps\n\n");
        if patterns.evidence_gaps.is_empty() {
            content.push_str("None detected.\n");
        }
        for gap in &patterns.evidence_gaps {
            content.push_str(&format!("- [{:?}] {}\n", gap.priority, gap.description));
        }

        if !patterns.reference_warnings.is_empty() {
            content.push_str("\n## Reference Warnings\n\n");
            for warning in &patterns.reference_warnings {
                content.push_str(&format!("- {}\n", warning));
            }
        }
        write_report(out_dir, self.report_filename(), &content)
    }
}

/// Chronological narrative with suspicious gaps.
pub struct TimelineReconstruction;

impl ReportGenerator for TimelineReconstruction {
    fn has_data(&self, summary: &CaseSummary) -> bool {
        !summary.correlation.timeline_events.is_empty()
    }

    fn report_filename(&self) -> &'static str {
        "timeline_reconstruction.md"
    }

    fn report_title(&self) -> &'static str {
        "Timeline Reconstruction"
    }

    fn generate(&self, summary: &CaseSummary, out_dir: &Path) -> PipelineResult<PathBuf> {
        let mut content = report_header(self.report_title(), summary);
        content.push_str("## Chronology\n\n");
        for event in &summary.correlation.timeline_events {
            content.push_str(&format!(
                "- {} [{}] {}\n",
                event.ts,
                short_sha(&event.sha256),
                event.description
            ));
        }

        if !summary.correlation.timeline_gaps.is_empty() {
            content.push_str("\n## Suspicious Gaps\n\n");
            for gap in &summary.correlation.timeline_gaps {
                content.push_str(&format!(
                    "- {} to {} ({} days, {:?}): {}\n",
                    gap.start_ts, gap.end_ts, gap.gap_days, gap.significance, gap.rationale
                ));
            }
        }

        if !summary.correlation.temporal_sequences.is_empty() {
            content.push_str("\n## Detected Sequences\n\n");
            for sequence in &summary.correlation.temporal_sequences {
                content.push_str(&format!(
                    "- {} (confidence {:.2}): {}\n",
                    sequence.kind,
                    sequence.confidence,
                    sequence.events.join(" -> ")
                ));
            }
        }
        write_report(out_dir, self.report_filename(), &content)
    }
}

/// Per-speaker statement analysis.
pub struct QuotedStatementsReport;

impl ReportGenerator for QuotedStatementsReport {
    fn has_data(&self, summary: &CaseSummary) -> bool {
        summary
            .overall_assessment
            .get(assessment_keys::QUOTED_STATEMENTS)
            .and_then(|v| v.as_array())
            .map(|a| !a.is_empty())
            .unwrap_or(false)
    }

    fn report_filename(&self) -> &'static str {
        "quoted_statements_analysis.md"
    }

    fn report_title(&self) -> &'static str {
        "Quoted Statements Analysis"
    }

    fn generate(&self, summary: &CaseSummary, out_dir: &Path) -> PipelineResult<PathBuf> {
        let null = serde_json::Value::Null;
        let quotes = summary
            .overall_assessment
            .get_or(assessment_keys::QUOTED_STATEMENTS, &null);

        let mut content = report_header(self.report_title(), summary);
        if let Some(items) = quotes.as_array() {
            for quote in items {
                let speaker = quote["speaker"].as_str().unwrap_or("unknown");
                let text = quote["text"].as_str().unwrap_or("");
                let sha = quote["sha256"].as_str().unwrap_or("");
                content.push_str(&format!(
                    "## {}\n\n> {}\n\nSource: {}\n\n",
                    speaker,
                    text,
                    short_sha(sha)
                ));
            }
        }
        write_report(out_dir, self.report_filename(), &content)
    }
}

/// Entity graph description.
pub struct RelationshipNetworkReport;

impl ReportGenerator for RelationshipNetworkReport {
    fn has_data(&self, summary: &CaseSummary) -> bool {
        summary
            .overall_assessment
            .contains(assessment_keys::RELATIONSHIP_NETWORK)
    }

    fn report_filename(&self) -> &'static str {
        "relationship_network.md"
    }

    fn report_title(&self) -> &'static str {
        "Relationship Network"
    }

    fn generate(&self, summary: &CaseSummary, out_dir: &Path) -> PipelineResult<PathBuf> {
        let null = serde_json::Value::Null;
        let network = summary
            .overall_assessment
            .get_or(assessment_keys::RELATIONSHIP_NETWORK, &null);

        let mut content = report_header(self.report_title(), summary);
        content.push_str("## Nodes\n\n");
        if let Some(nodes) = network["nodes"].as_array() {
            for node in nodes {
                content.push_str(&format!(
                    "- {} (degree {})\n",
                    node["name"].as_str().unwrap_or("?"),
                    node["degree"]
                ));
            }
        }
        content.push_str("\n## Connections\n\n");
        if let Some(edges) = network["edges"].as_array() {
            for edge in edges {
                content.push_str(&format!(
                    "- {} <-> {} (weight {})\n",
                    edge["a"].as_str().unwrap_or("?"),
                    edge["b"].as_str().unwrap_or("?"),
                    edge["weight"]
                ));
            }
        }
        write_report(out_dir, self.report_filename(), &content)
    }
}

/// Email authority and deference report.
pub struct PowerDynamicsReport;

impl ReportGenerator for PowerDynamicsReport {
    fn has_data(&self, summary: &CaseSummary) -> bool {
        summary
            .overall_assessment
            .contains(assessment_keys::POWER_DYNAMICS)
    }

    fn report_filename(&self) -> &'static str {
        "power_dynamics_analysis.md"
    }

    fn report_title(&self) -> &'static str {
        "Power Dynamics Analysis"
    }

    fn generate(&self, summary: &CaseSummary, out_dir: &Path) -> PipelineResult<PathBuf> {
        let null = serde_json::Value::Null;
        let dynamics = summary
            .overall_assessment
            .get_or(assessment_keys::POWER_DYNAMICS, &null);

        let mut content = report_header(self.report_title(), summary);
        content.push_str(
            "Deference scores range from 0 (dominant) through 0.5 (neutral) to 1 (deferential).\n\n",
        );
        if let Some(participants) = dynamics.as_array() {
            for p in participants {
                content.push_str(&format!(
                    "- {}: stance {}, average deference {}, {} messages\n",
                    p["address"].as_str().unwrap_or("?"),
                    p["stance"].as_str().unwrap_or("?"),
                    p["avg_deference"],
                    p["message_count"]
                ));
            }
        }
        write_report(out_dir, self.report_filename(), &content)
    }
}

/// Aggregated OCR text ranked by evidence value.
pub struct ImageOcrReport;

impl ImageOcrReport {
    fn ocr_findings(summary: &CaseSummary) -> Vec<(&str, &str, &str)> {
        let mut findings = Vec::new();
        for evidence in &summary.evidence_summaries {
            for finding in &evidence.key_findings {
                if let Some(text) = finding.strip_prefix("OCR: ") {
                    findings.push((evidence.sha256.as_str(), evidence.filename.as_str(), text));
                }
            }
        }
        findings
    }
}

impl ReportGenerator for ImageOcrReport {
    fn has_data(&self, summary: &CaseSummary) -> bool {
        !Self::ocr_findings(summary).is_empty()
    }

    fn report_filename(&self) -> &'static str {
        "image_ocr_analysis.md"
    }

    fn report_title(&self) -> &'static str {
        "Image OCR Analysis"
    }

    fn generate(&self, summary: &CaseSummary, out_dir: &Path) -> PipelineResult<PathBuf> {
        let mut content = report_header(self.report_title(), summary);
        for (sha, filename, text) in Self::ocr_findings(summary) {
            content.push_str(&format!(
                "## {} ({})\n\n```\n{}\n```\n\n",
                filename,
                short_sha(sha),
                text
            ));
        }
        write_report(out_dir, self.report_filename(), &content)
    }
}

/// Narrative, findings, and actions. Always produced.
pub struct ExecutiveSummaryReport;

impl ReportGenerator for ExecutiveSummaryReport {
    fn has_data(&self, _summary: &CaseSummary) -> bool {
        true
    }

    fn report_filename(&self) -> &'static str {
        "executive_summary.md"
    }

    fn report_title(&self) -> &'static str {
        "Executive Summary"
    }

    fn generate(&self, summary: &CaseSummary, out_dir: &Path) -> PipelineResult<PathBuf> {
        let executive = &summary.executive_summary;
        let mut content = report_header(self.report_title(), summary);
        content.push_str("## Narrative\n\n");
        content.push_str(&executive.narrative);
        content.push_str("\n\n## Key Findings\n\n");
        for finding in &executive.key_findings {
            content.push_str(&format!("- {}\n", finding));
        }
        content.push_str("\n## Legal Implications\n\n");
        for implication in &executive.legal_implications {
            content.push_str(&format!("- {}\n", implication));
        }
        content.push_str("\n## Recommended Actions\n\n");
        for action in &executive.recommended_actions {
            content.push_str(&format!("- {}\n", action));
        }
        write_report(out_dir, self.report_filename(), &content)
    }
}
