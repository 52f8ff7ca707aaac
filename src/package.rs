use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::analysis_types::{AnalysisPayload, CaseSummary};
use crate::cancel::CancellationToken;
use crate::config::{Config, PackageFormat};
use crate::errors::{ErrorKind, PipelineError, PipelineResult};
use crate::logger::Logger;
use crate::reports::{default_generators, run_generators, GeneratedReport};
use crate::store::EvidenceStore;
use crate::types::{is_sha256_hex, short_sha};

/// Assembles the client deliverable: reports, analysis copies, catalog,
/// correlation JSON, documentation, optional originals, and metadata, as a
/// directory or a deflated zip archive.
pub struct PackageBuilder<'a> {
    store: &'a EvidenceStore,
    config: &'a Config,
    logger: &'a Logger,
}

#[derive(Debug, Clone)]
pub struct PackageResult {
    pub path: PathBuf,
    pub reports: Vec<GeneratedReport>,
}

impl<'a> PackageBuilder<'a> {
    pub fn new(store: &'a EvidenceStore, config: &'a Config, logger: &'a Logger) -> Self {
        PackageBuilder {
            store,
            config,
            logger,
        }
    }

    pub fn build(
        &self,
        summary: &CaseSummary,
        cancel: &CancellationToken,
    ) -> PipelineResult<PackageResult> {
        cancel.check()?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let package_name = format!("{}_analysis_package_{}", summary.case_id, timestamp);
        let package_dir = self.store.packages_dir().join(&package_name);

        let result = self.assemble(summary, &package_dir, cancel);
        match result {
            Ok(reports) => {
                if self.config.package.format == PackageFormat::Zip {
                    let archive_path = self.store.packages_dir().join(format!("{}.zip", package_name));
                    if let Err(e) = zip_directory(&package_dir, &archive_path) {
                        let _ = fs::remove_dir_all(&package_dir);
                        let _ = fs::remove_file(&archive_path);
                        return Err(e);
                    }
                    fs::remove_dir_all(&package_dir)
                        .map_err(|e| PipelineError::io(ErrorKind::Package, &e, &package_dir))?;
                    Ok(PackageResult {
                        path: archive_path,
                        reports,
                    })
                } else {
                    Ok(PackageResult {
                        path: package_dir,
                        reports,
                    })
                }
            }
            Err(e) => {
                // Partial assembly is never left behind.
                let _ = fs::remove_dir_all(&package_dir);
                Err(e)
            }
        }
    }

    fn assemble(
        &self,
        summary: &CaseSummary,
        package_dir: &Path,
        cancel: &CancellationToken,
    ) -> PipelineResult<Vec<GeneratedReport>> {
        for sub in [
            "reports",
            "analysis",
            "visualizations",
            "evidence_catalog",
            "correlations",
            "documentation",
        ] {
            let dir = package_dir.join(sub);
            fs::create_dir_all(&dir)
                .map_err(|e| PipelineError::io(ErrorKind::Package, &e, &dir))?;
        }

        cancel.check()?;
        let reports = run_generators(
            &default_generators(),
            summary,
            &package_dir.join("reports"),
            self.logger,
        );

        // Full case summary travels with the package.
        crate::store::write_json_atomic(&package_dir.join("analysis/case_analysis.json"), summary)?;

        self.copy_analyses(summary, package_dir, cancel)?;
        self.write_catalog(summary, package_dir)?;
        self.write_correlation(summary, package_dir)?;
        self.write_documentation(summary, package_dir, &reports)?;

        if self.config.package.include_raw {
            let raw_dir = package_dir.join("raw_evidence");
            for evidence in &summary.evidence_summaries {
                cancel.check()?;
                self.store
                    .export_original(&evidence.sha256, &raw_dir, "package-builder")?;
            }
        }

        self.write_metadata(summary, package_dir, &reports)?;
        Ok(reports)
    }

    /// Copy each evidence's analysis record under a descriptive name, and
    /// emit word-frequency visualizations for documents that carry them.
    fn copy_analyses(
        &self,
        summary: &CaseSummary,
        package_dir: &Path,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        for evidence in &summary.evidence_summaries {
            cancel.check()?;
            let Some(analysis) = self.store.load_analysis(&evidence.sha256)? else {
                continue; // catalog-only artifacts have no analysis
            };

            let name = format!(
                "{}_{}_{}.json",
                evidence.evidence_type.as_str(),
                sanitize_filename(&evidence.filename),
                short_sha(&evidence.sha256)
            );
            crate::store::write_json_atomic(&package_dir.join("analysis").join(name), &analysis)?;

            if let AnalysisPayload::Document(doc) = &analysis.analysis {
                if let Some(stats) = &doc.word_stats {
                    let viz_name =
                        format!("word_frequency_{}.json", short_sha(&evidence.sha256));
                    crate::store::write_json_atomic(
                        &package_dir.join("visualizations").join(viz_name),
                        stats,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn write_catalog(&self, summary: &CaseSummary, package_dir: &Path) -> PipelineResult<()> {
        let entries: Vec<serde_json::Value> = summary
            .evidence_summaries
            .iter()
            .map(|evidence| {
                let size = self
                    .store
                    .load_metadata(&evidence.sha256)
                    .map(|m| m.size_bytes)
                    .unwrap_or(0);
                serde_json::json!({
                    "filename": evidence.filename,
                    "evidence_type": evidence.evidence_type,
                    "sha256": evidence.sha256,
                    "size_bytes": size,
                    "confidence": evidence.confidence,
                    "legal_significance": evidence.legal_significance,
                    "risk_flags": evidence.risk_flags,
                    "top_findings": evidence.key_findings,
                    "chain_of_custody": format!("derived/sha256={}/chain_of_custody.json", evidence.sha256),
                })
            })
            .collect();

        let catalog = serde_json::json!({
            "case_id": summary.case_id,
            "entry_count": entries.len(),
            "entries": entries,
        });
        crate::store::write_json_atomic(
            &package_dir.join("evidence_catalog/evidence_catalog.json"),
            &catalog,
        )
    }

    /// Correlation JSON with every SHA-256 truncated to 8 hex characters for
    /// readability.
    fn write_correlation(&self, summary: &CaseSummary, package_dir: &Path) -> PipelineResult<()> {
        let mut value = serde_json::to_value(&summary.correlation)
            .map_err(|e| PipelineError::package(&format!("serialize correlation: {}", e)))?;
        truncate_shas(&mut value);
        crate::store::write_json_atomic(
            &package_dir.join("correlations/correlation_analysis.json"),
            &value,
        )
    }

    fn write_documentation(
        &self,
        summary: &CaseSummary,
        package_dir: &Path,
        reports: &[GeneratedReport],
    ) -> PipelineResult<()> {
        let readme = readme_template(summary, reports);
        let doc_dir = package_dir.join("documentation");
        fs::write(doc_dir.join("README.md"), readme)
            .map_err(|e| PipelineError::io(ErrorKind::Package, &e, &doc_dir))?;
        fs::write(doc_dir.join("methodology.md"), methodology_template(summary))
            .map_err(|e| PipelineError::io(ErrorKind::Package, &e, &doc_dir))?;
        Ok(())
    }

    fn write_metadata(
        &self,
        summary: &CaseSummary,
        package_dir: &Path,
        reports: &[GeneratedReport],
    ) -> PipelineResult<()> {
        let mut counts: std::collections::BTreeMap<String, usize> = Default::default();
        for evidence in &summary.evidence_summaries {
            *counts
                .entry(evidence.evidence_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        let files = list_files_relative(package_dir)?;
        let metadata = serde_json::json!({
            "created_utc": chrono::Utc::now().to_rfc3339(),
            "case_id": summary.case_id,
            "evidence_counts": counts,
            "reports": reports.iter().map(|r| serde_json::json!({
                "filename": r.filename,
                "title": r.title,
            })).collect::<Vec<_>>(),
            "files": files,
        });
        crate::store::write_json_atomic(&package_dir.join("package_metadata.json"), &metadata)
    }
}

/// Replace every 64-hex string in the tree with its 8-hex prefix.
fn truncate_shas(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => {
            if is_sha256_hex(s) {
                *s = s[..8].to_string();
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                truncate_shas(item);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                truncate_shas(item);
            }
        }
        _ => {}
    }
}

fn sanitize_filename(name: &str) -> String {
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
    stem.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Relative paths of every file under the package tree, excluding the
/// metadata file that enumerates them.
fn list_files_relative(package_dir: &Path) -> PipelineResult<Vec<String>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(package_dir)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(package_dir)
            .map_err(|_| PipelineError::package("path outside package root"))?
            .to_string_lossy()
            .replace('\\', "/");
        if relative == "package_metadata.json" {
            continue;
        }
        files.push(relative);
    }
    files.sort();
    Ok(files)
}

/// Mirror a directory tree into a deflated zip archive.
fn zip_directory(source_dir: &Path, archive_path: &Path) -> PipelineResult<()> {
    let file = File::create(archive_path)
        .map_err(|e| PipelineError::io(ErrorKind::Package, &e, archive_path))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in walkdir::WalkDir::new(source_dir)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|_| PipelineError::package("path outside package root"))?
            .to_string_lossy()
            .replace('\\', "/");

        zip.start_file(&relative, options)
            .map_err(|e| PipelineError::package(&format!("zip entry {}: {}", relative, e)))?;
        let mut content = Vec::new();
        File::open(entry.path())
            .and_then(|mut f| f.read_to_end(&mut content))
            .map_err(|e| PipelineError::io(ErrorKind::Package, &e, entry.path()))?;
        zip.write_all(&content)
            .map_err(|e| PipelineError::io(ErrorKind::Package, &e, archive_path))?;
    }

    zip.finish()
        .map_err(|e| PipelineError::package(&format!("finalize archive: {}", e)))?;
    Ok(())
}

fn readme_template(summary: &CaseSummary, reports: &[GeneratedReport]) -> String {
    let report_lines: String = reports
        .iter()
        .map(|r| format!("- reports/{}: {}\n", r.filename, r.title))
        .collect();
    format!(
        "# Evidence Analysis Package\n\n\
        Case: {case}\n\
        Generated: {generated}\n\
        Evidence items: {count}\n\n\
        ## Contents\n\n\
        - analysis/: per-evidence analysis records and the full case analysis\n\
        - correlations/: cross-evidence correlation (SHA-256s shortened to 8 hex characters)\n\
        - evidence_catalog/: one entry per evidence item with custody pointers\n\
        - visualizations/: word-frequency data for text evidence\n\
        - documentation/: this file and the methodology description\n\n\
        ## Reports\n\n\
        {reports}\n\
        ## Integrity\n\n\
        Every artifact is content-addressed by the SHA-256 of its raw bytes. Shortened\n\
        identifiers in this package are prefixes of those addresses; full values appear\n\
        in the evidence catalog. Chain-of-custody logs are append-only and live with\n\
        the store, referenced from the catalog.\n",
        case = summary.case_id,
        generated = summary.generated_utc,
        count = summary.evidence_count(),
        reports = report_lines,
    )
}

fn methodology_template(summary: &CaseSummary) -> String {
    format!(
        "# Methodology\n\n\
        Case {case} was processed with a four-stage pipeline:\n\n\
        1. Ingest: every file is hashed (SHA-256, streamed), deduplicated, and linked\n\
           into the case; chain of custody starts at first sight of the bytes.\n\
        2. Analyze: each artifact is classified (document, email, image) and examined\n\
           by a typed analyzer backed by a structured-output language model at\n\
           temperature 0. Responses failing schema validation are rejected, never\n\
           repaired.\n\
        3. Correlate: entities are canonicalized across evidence, a timeline is\n\
           reconstructed from filesystem, header, and in-text dates, and suspicious\n\
           gaps and legal patterns are identified.\n\
        4. Package: the reports in this deliverable are generated independently from\n\
           the case summary; a generator failing never suppresses the others.\n\n\
        Determinism: correlation and assessment computations are deterministic over\n\
        the persisted analysis records; model calls are pinned to temperature 0 and\n\
        record the model identifier and revision.\n",
        case = summary.case_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis_types::{
        CorrelationAnalysis, EvidenceSummary, ExecutiveSummaryResponse, SummaryMap,
    };
    use crate::cancel::CancellationToken;
    use crate::types::EvidenceType;
    use tempfile::tempdir;

    const HELLO_SHA: &str = "66a045b452102c59d840ec097d59d9467e13a3f34f6494e539ffd32c1bb35f18";

    fn summary_for(case_id: &str, shas: &[&str]) -> CaseSummary {
        CaseSummary {
            case_id: case_id.to_string(),
            generated_utc: chrono::Utc::now().to_rfc3339(),
            evidence_summaries: shas
                .iter()
                .map(|sha| EvidenceSummary {
                    sha256: sha.to_string(),
                    filename: "doc.txt".to_string(),
                    evidence_type: EvidenceType::Document,
                    key_findings: vec!["greeting".to_string()],
                    legal_significance: None,
                    risk_flags: vec![],
                    confidence: 0.9,
                })
                .collect(),
            correlation: CorrelationAnalysis {
                case_id: case_id.to_string(),
                entities: vec![],
                timeline_events: vec![],
                legal_patterns: None,
                temporal_sequences: vec![],
                timeline_gaps: vec![],
            },
            overall_assessment: SummaryMap::new(),
            executive_summary: ExecutiveSummaryResponse {
                narrative: "narrative".to_string(),
                key_findings: vec![],
                legal_implications: vec![],
                recommended_actions: vec![],
            },
        }
    }

    fn setup_store(dir: &Path) -> EvidenceStore {
        let store = EvidenceStore::open(&dir.join("store")).unwrap();
        let doc = dir.join("doc.txt");
        fs::write(&doc, b"Hello\n").unwrap();
        store
            .ingest(&doc, Some("C1"), "tester", &CancellationToken::new())
            .unwrap();
        store
    }

    #[test]
    fn test_directory_package_layout() {
        let dir = tempdir().unwrap();
        let store = setup_store(dir.path());
        let mut config = crate::config::Config::from_env(dir.path().join("store"));
        config.package.format = PackageFormat::Directory;
        let logger = Logger::new(false);
        let builder = PackageBuilder::new(&store, &config, &logger);

        let summary = summary_for("C1", &[HELLO_SHA]);
        let result = builder.build(&summary, &CancellationToken::new()).unwrap();

        assert!(result.path.is_dir());
        assert!(result.path.join("analysis/case_analysis.json").exists());
        assert!(result
            .path
            .join("evidence_catalog/evidence_catalog.json")
            .exists());
        assert!(result
            .path
            .join("correlations/correlation_analysis.json")
            .exists());
        assert!(result.path.join("documentation/README.md").exists());
        assert!(result.path.join("documentation/methodology.md").exists());
        assert!(result.path.join("package_metadata.json").exists());
        assert!(result.path.join("reports/executive_summary.md").exists());
    }

    #[test]
    fn test_metadata_enumerates_exactly_the_files_present() {
        let dir = tempdir().unwrap();
        let store = setup_store(dir.path());
        let mut config = crate::config::Config::from_env(dir.path().join("store"));
        config.package.format = PackageFormat::Directory;
        let logger = Logger::new(false);
        let builder = PackageBuilder::new(&store, &config, &logger);

        let summary = summary_for("C1", &[HELLO_SHA]);
        let result = builder.build(&summary, &CancellationToken::new()).unwrap();

        let metadata: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(result.path.join("package_metadata.json")).unwrap(),
        )
        .unwrap();
        let listed: Vec<String> = metadata["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        let actual = list_files_relative(&result.path).unwrap();
        assert_eq!(listed, actual);
        assert!(!listed.is_empty());
    }

    #[test]
    fn test_zip_package_round_trip() {
        let dir = tempdir().unwrap();
        let store = setup_store(dir.path());
        let config = crate::config::Config::from_env(dir.path().join("store"));
        let logger = Logger::new(false);
        let builder = PackageBuilder::new(&store, &config, &logger);

        let summary = summary_for("C1", &[HELLO_SHA]);
        let result = builder.build(&summary, &CancellationToken::new()).unwrap();

        assert!(result.path.extension().map(|e| e == "zip").unwrap_or(false));
        let file = File::open(&result.path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"package_metadata.json".to_string()));
        assert!(names.contains(&"reports/executive_summary.md".to_string()));
        assert!(names.contains(&"analysis/case_analysis.json".to_string()));

        // The staging directory is removed after a successful zip.
        let staging: Vec<_> = fs::read_dir(store.packages_dir())
            .unwrap()
            .flatten()
            .filter(|e| e.path().is_dir())
            .collect();
        assert!(staging.is_empty());
    }

    #[test]
    fn test_correlation_shas_truncated() {
        let mut value = serde_json::json!({
            "timeline_events": [{"sha256": HELLO_SHA, "description": "x"}],
            "nested": {"sources": [HELLO_SHA]},
            "not_a_sha": "66a0",
        });
        truncate_shas(&mut value);
        assert_eq!(value["timeline_events"][0]["sha256"], "66a045b4");
        assert_eq!(value["nested"]["sources"][0], "66a045b4");
        assert_eq!(value["not_a_sha"], "66a0");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Pay Slip (final).pdf"), "pay_slip__final_");
        assert_eq!(sanitize_filename("doc.txt"), "doc");
        assert_eq!(sanitize_filename("noext"), "noext");
    }

    #[test]
    fn test_include_raw_exports_originals() {
        let dir = tempdir().unwrap();
        let store = setup_store(dir.path());
        let mut config = crate::config::Config::from_env(dir.path().join("store"));
        config.package.format = PackageFormat::Directory;
        config.package.include_raw = true;
        let logger = Logger::new(false);
        let builder = PackageBuilder::new(&store, &config, &logger);

        let summary = summary_for("C1", &[HELLO_SHA]);
        let result = builder.build(&summary, &CancellationToken::new()).unwrap();
        assert!(result.path.join("raw_evidence/doc.txt").exists());

        let custody = store.load_custody(HELLO_SHA).unwrap();
        assert_eq!(custody.count_action(crate::types::CustodyAction::Export), 1);
    }
}
