use std::collections::BTreeSet;
use std::io::Read;

use crate::analysis_types::{AnalysisPayload, UnifiedAnalysis};
use crate::cancel::CancellationToken;
use crate::detect::detect_evidence_type;
use crate::documents::DocumentAnalyzer;
use crate::emails::EmailAnalyzer;
use crate::errors::{PipelineError, PipelineResult};
use crate::images::ImageAnalyzer;
use crate::llm::LlmClient;
use crate::readers::ContentReader;
use crate::store::EvidenceStore;
use crate::types::EvidenceType;

/// Routes an artifact to its typed analyzer and persists the validated
/// record through the store.
pub struct AnalyzerDispatch<'a> {
    store: &'a EvidenceStore,
    client: &'a LlmClient,
    reader: &'a dyn ContentReader,
    actor: String,
}

impl<'a> AnalyzerDispatch<'a> {
    pub fn new(
        store: &'a EvidenceStore,
        client: &'a LlmClient,
        reader: &'a dyn ContentReader,
        actor: &str,
    ) -> Self {
        AnalyzerDispatch {
            store,
            client,
            reader,
            actor: actor.to_string(),
        }
    }

    /// Analyze one artifact. Without `force`, an existing analysis is
    /// returned as-is: no LLM call, no custody event. `type_override` skips
    /// detection when the caller already classified the artifact.
    pub fn analyze(
        &self,
        sha256: &str,
        force: bool,
        case_id: Option<&str>,
        type_override: Option<EvidenceType>,
        cancel: &CancellationToken,
    ) -> PipelineResult<UnifiedAnalysis> {
        cancel.check()?;

        if !force {
            if let Some(existing) = self.store.load_analysis(sha256)? {
                return Ok(existing);
            }
        }

        let metadata = self.store.load_metadata(sha256)?;
        let raw_path = self.store.raw_path(sha256)?;

        let evidence_type = match type_override {
            Some(t) => t,
            None => {
                let probe = probe_bytes(&raw_path)?;
                detect_evidence_type(&metadata.extension, Some(&probe))
            }
        };

        let payload = match evidence_type {
            EvidenceType::Document => AnalysisPayload::Document(
                DocumentAnalyzer::new(self.client, self.reader)
                    .analyze(&raw_path, &metadata, cancel)?,
            ),
            EvidenceType::Email => AnalysisPayload::Email(
                EmailAnalyzer::new(self.client, self.reader)
                    .analyze(&raw_path, &metadata, cancel)?,
            ),
            EvidenceType::Image => AnalysisPayload::Image(
                ImageAnalyzer::new(self.client, self.reader)
                    .analyze(&raw_path, &metadata, cancel)?,
            ),
            EvidenceType::Other => {
                return Err(PipelineError::analyzer(&format!(
                    "no analyzer for evidence type 'other' (sha256={})",
                    crate::types::short_sha(sha256)
                )));
            }
        };

        let mut case_ids: BTreeSet<String> = self.store.cases_of(sha256)?.into_iter().collect();
        if let Some(case) = case_id {
            case_ids.insert(case.to_string());
        }

        let analysis = UnifiedAnalysis {
            sha256: sha256.to_string(),
            evidence_type,
            analyzed_utc: chrono::Utc::now().to_rfc3339(),
            model: self.client.model().to_string(),
            model_revision: self.client.model_revision().to_string(),
            labels: generate_labels(&payload),
            case_ids,
            analysis: payload,
        };

        cancel.check()?;
        self.store.save_analysis(&analysis, &self.actor, force)?;
        Ok(analysis)
    }
}

/// Closed label scheme over a typed payload. Every emitted label is in the
/// vocabulary accepted by [`is_known_label`].
pub fn generate_labels(payload: &AnalysisPayload) -> Vec<String> {
    let mut labels = vec![payload.evidence_type().as_str().to_string()];

    match payload {
        AnalysisPayload::Document(doc) => {
            labels.push(format!("{}-significance", doc.legal_significance.as_str()));
            for flag in &doc.risk_flags {
                labels.push(flag.as_str().to_string());
            }
            labels.push(format!("doctype-{}", doc.document_type.as_str()));
        }
        AnalysisPayload::Email(email) => {
            labels.push(format!("{}-significance", email.legal_significance.as_str()));
            for flag in &email.risk_flags {
                labels.push(flag.as_str().to_string());
            }
            labels.push(format!("pattern-{}", email.communication_pattern.as_str()));
        }
        AnalysisPayload::Image(_) => {
            labels.push("visual-evidence".to_string());
        }
    }

    labels.sort();
    labels.dedup();
    labels
}

/// Membership test for the closed label vocabulary.
pub fn is_known_label(label: &str) -> bool {
    use crate::analysis_types::{CommunicationPattern, DocumentType, LegalSignificance, RiskFlag};

    const TYPES: &[&str] = &["document", "image", "email", "other", "visual-evidence"];
    if TYPES.contains(&label) {
        return true;
    }
    if let Some(sig) = label.strip_suffix("-significance") {
        return serde_json::from_value::<LegalSignificance>(serde_json::Value::String(
            sig.to_string(),
        ))
        .is_ok();
    }
    if let Some(doctype) = label.strip_prefix("doctype-") {
        return serde_json::from_value::<DocumentType>(serde_json::Value::String(
            doctype.to_string(),
        ))
        .is_ok();
    }
    if let Some(pattern) = label.strip_prefix("pattern-") {
        return serde_json::from_value::<CommunicationPattern>(serde_json::Value::String(
            pattern.to_string(),
        ))
        .is_ok();
    }
    serde_json::from_value::<RiskFlag>(serde_json::Value::String(label.to_string())).is_ok()
}

fn probe_bytes(path: &std::path::Path) -> PipelineResult<Vec<u8>> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| PipelineError::io(crate::errors::ErrorKind::Analyzer, &e, path))?;
    let mut buffer = vec![0u8; 4096];
    let n = file
        .read(&mut buffer)
        .map_err(|e| PipelineError::io(crate::errors::ErrorKind::Analyzer, &e, path))?;
    buffer.truncate(n);
    Ok(buffer)
}
