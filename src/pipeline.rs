use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rayon::prelude::*;

use crate::analysis_types::CaseSummary;
use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::dispatch::AnalyzerDispatch;
use crate::errors::{ErrorKind, ExitStatus, PipelineError, PipelineResult};
use crate::llm::LlmClient;
use crate::logger::Logger;
use crate::package::{PackageBuilder, PackageResult};
use crate::readers::ContentReader;
use crate::store::EvidenceStore;
use crate::summary::SummaryGenerator;
use crate::types::{EvidenceType, IngestStatus};

/// Pipeline stage tags used in progress events and console output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    Analyze,
    Correlate,
    Package,
}

impl Stage {
    pub fn emoji(&self) -> &'static str {
        match self {
            Stage::Ingest => "📥",
            Stage::Analyze => "🔍",
            Stage::Correlate => "🔗",
            Stage::Package => "📦",
        }
    }
}

/// Per-artifact state transition emitted to the progress sink.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub sha256: Option<String>,
    pub message: String,
}

/// Injectable progress receiver.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Console sink speaking the pipeline's emoji vocabulary.
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn on_event(&self, event: &ProgressEvent) {
        println!("{} {}", event.stage.emoji(), event.message);
    }
}

/// Collecting sink for tests.
#[derive(Default)]
pub struct CollectingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for CollectingProgress {
    fn on_event(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Final state of one artifact after a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemState {
    Ingested,
    Duplicate,
    Analyzed,
    /// Catalog-only: no analyzer for this evidence type
    Skipped,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ItemStatus {
    pub sha256: String,
    pub filename: String,
    pub evidence_type: EvidenceType,
    pub state: ItemState,
}

/// Outcome of a full `process-case` run.
#[derive(Debug)]
pub struct CaseReport {
    pub case_id: String,
    pub items: Vec<ItemStatus>,
    pub summary: Option<CaseSummary>,
    pub package_path: Option<PathBuf>,
    pub exit: ExitStatus,
}

/// Drives ingest -> analyze-all -> summarize -> package for one case, with
/// bounded analyze concurrency and cooperative cancellation.
pub struct Pipeline<'a> {
    store: &'a EvidenceStore,
    config: &'a Config,
    client: &'a LlmClient,
    reader: &'a dyn ContentReader,
    logger: &'a Logger,
    progress: &'a dyn ProgressSink,
    cancel: CancellationToken,
}

impl<'a> Pipeline<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: &'a EvidenceStore,
        config: &'a Config,
        client: &'a LlmClient,
        reader: &'a dyn ContentReader,
        logger: &'a Logger,
        progress: &'a dyn ProgressSink,
        cancel: CancellationToken,
    ) -> Self {
        Pipeline {
            store,
            config,
            client,
            reader,
            logger,
            progress,
            cancel,
        }
    }

    /// Recursively enumerate regular, non-hidden files under a directory.
    pub fn enumerate_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_entry(|e| {
                !e.file_name()
                    .to_str()
                    .map(|n| n.starts_with('.') && n.len() > 1)
                    .unwrap_or(false)
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    }

    /// Ingest every file under `dir` into the case. Per-item failures are
    /// recorded, not raised.
    pub fn ingest_directory(&self, dir: &Path, case_id: &str) -> PipelineResult<Vec<ItemStatus>> {
        let files = Self::enumerate_files(dir);
        let mut items = Vec::new();

        for path in files {
            if self.cancel.is_cancelled() {
                items.push(ItemStatus {
                    sha256: String::new(),
                    filename: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    evidence_type: EvidenceType::Other,
                    state: ItemState::Cancelled,
                });
                continue;
            }
            match self
                .store
                .ingest(&path, Some(case_id), "ingest-worker", &self.cancel)
            {
                Ok(result) => {
                    let state = match result.status {
                        IngestStatus::Ingested => ItemState::Ingested,
                        IngestStatus::Duplicate => ItemState::Duplicate,
                    };
                    self.progress.on_event(&ProgressEvent {
                        stage: Stage::Ingest,
                        sha256: Some(result.sha256.clone()),
                        message: format!(
                            "Ingested {} ({})",
                            result.metadata.filename,
                            crate::types::short_sha(&result.sha256)
                        ),
                    });
                    self.logger.info(&format!(
                        "Ingested {} as sha256={}",
                        path.display(),
                        result.sha256
                    ));
                    items.push(ItemStatus {
                        sha256: result.sha256,
                        filename: result.metadata.filename,
                        evidence_type: result.evidence_type,
                        state,
                    });
                }
                Err(e) if e.is_cancelled() => {
                    items.push(ItemStatus {
                        sha256: String::new(),
                        filename: path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        evidence_type: EvidenceType::Other,
                        state: ItemState::Cancelled,
                    });
                }
                Err(e) => {
                    self.logger
                        .error(&format!("Ingest failed for {}: {}", path.display(), e));
                    items.push(ItemStatus {
                        sha256: String::new(),
                        filename: path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        evidence_type: EvidenceType::Other,
                        state: ItemState::Failed(e.to_string()),
                    });
                }
            }
        }
        Ok(items)
    }

    /// Analyze every analyzable artifact in the case with a bounded worker
    /// pool. Per-item failures never abort the batch; cancellation stops new
    /// work while in-flight items settle.
    pub fn analyze_case(&self, case_id: &str) -> PipelineResult<Vec<ItemStatus>> {
        let shas = self.store.list_case(case_id)?;

        let mut work: Vec<(String, String, EvidenceType)> = Vec::new();
        let mut items: Vec<ItemStatus> = Vec::new();
        for sha in shas {
            let metadata = self.store.load_metadata(&sha)?;
            let evidence_type = crate::detect::detect_evidence_type(&metadata.extension, None);
            if evidence_type.is_analyzable() {
                work.push((sha, metadata.filename, evidence_type));
            } else {
                self.logger.info(&format!(
                    "Skipping analysis for sha256={} (type other)",
                    crate::types::short_sha(&sha)
                ));
                items.push(ItemStatus {
                    sha256: sha,
                    filename: metadata.filename,
                    evidence_type,
                    state: ItemState::Skipped,
                });
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.analyze.max_concurrency)
            .build()
            .map_err(|e| PipelineError::config(&format!("worker pool: {}", e)))?;

        let force = self.config.analyze.force;
        let analyzed: Vec<ItemStatus> = pool.install(|| {
            work.par_iter()
                .map(|(sha, filename, _)| {
                    if self.cancel.is_cancelled() {
                        return ItemStatus {
                            sha256: sha.clone(),
                            filename: filename.clone(),
                            evidence_type: EvidenceType::Other,
                            state: ItemState::Cancelled,
                        };
                    }
                    let dispatch =
                        AnalyzerDispatch::new(self.store, self.client, self.reader, "analyst");
                    match dispatch.analyze(sha, force, Some(case_id), None, &self.cancel) {
                        Ok(analysis) => {
                            self.progress.on_event(&ProgressEvent {
                                stage: Stage::Analyze,
                                sha256: Some(sha.clone()),
                                message: format!(
                                    "Analyzed {} ({})",
                                    filename,
                                    crate::types::short_sha(sha)
                                ),
                            });
                            ItemStatus {
                                sha256: sha.clone(),
                                filename: filename.clone(),
                                evidence_type: analysis.evidence_type,
                                state: ItemState::Analyzed,
                            }
                        }
                        Err(e) if e.is_cancelled() => ItemStatus {
                            sha256: sha.clone(),
                            filename: filename.clone(),
                            evidence_type: EvidenceType::Other,
                            state: ItemState::Cancelled,
                        },
                        Err(e) => {
                            self.logger.error(&format!(
                                "Analysis failed for sha256={}: {}",
                                crate::types::short_sha(sha),
                                e
                            ));
                            ItemStatus {
                                sha256: sha.clone(),
                                filename: filename.clone(),
                                evidence_type: EvidenceType::Other,
                                state: ItemState::Failed(e.to_string()),
                            }
                        }
                    }
                })
                .collect()
        });

        items.extend(analyzed);
        items.sort_by(|a, b| a.sha256.cmp(&b.sha256));
        Ok(items)
    }

    /// Full case run: ingest, analyze, summarize, package.
    pub fn process_case(&self, dir: &Path, case_id: &str) -> PipelineResult<CaseReport> {
        self.config.validate()?;

        let ingest_items = self.ingest_directory(dir, case_id)?;
        self.cancel.check()?;

        let analyze_items = self.analyze_case(case_id)?;
        self.cancel.check()?;

        self.progress.on_event(&ProgressEvent {
            stage: Stage::Correlate,
            sha256: None,
            message: format!("Correlating case {}", case_id),
        });
        let generator = SummaryGenerator::new(self.store, self.client, self.config);
        let summary = generator.generate_case_summary(case_id, true, &self.cancel)?;

        self.progress.on_event(&ProgressEvent {
            stage: Stage::Package,
            sha256: None,
            message: format!("Packaging case {}", case_id),
        });
        let builder = PackageBuilder::new(self.store, self.config, self.logger);
        let PackageResult { path, .. } = builder.build(&summary, &self.cancel)?;

        let items = merge_statuses(ingest_items, analyze_items);
        let exit = compute_exit(&items, self.cancel.is_cancelled());
        Ok(CaseReport {
            case_id: case_id.to_string(),
            items,
            summary: Some(summary),
            package_path: Some(path),
            exit,
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Prefer the analyze-stage state for artifacts that reached it.
fn merge_statuses(ingest: Vec<ItemStatus>, analyze: Vec<ItemStatus>) -> Vec<ItemStatus> {
    let mut merged: Vec<ItemStatus> = Vec::new();
    for item in ingest {
        if item.sha256.is_empty() || !analyze.iter().any(|a| a.sha256 == item.sha256) {
            merged.push(item);
        }
    }
    merged.extend(analyze);
    merged.sort_by(|a, b| a.sha256.cmp(&b.sha256).then_with(|| a.filename.cmp(&b.filename)));
    merged.dedup_by(|a, b| !a.sha256.is_empty() && a.sha256 == b.sha256);
    merged
}

fn compute_exit(items: &[ItemStatus], cancelled: bool) -> ExitStatus {
    if cancelled || items.iter().any(|i| i.state == ItemState::Cancelled) {
        return ExitStatus::Cancelled;
    }
    let attempted: Vec<&ItemStatus> = items
        .iter()
        .filter(|i| {
            matches!(
                i.state,
                ItemState::Analyzed | ItemState::Failed(_)
            )
        })
        .collect();
    let failed = attempted
        .iter()
        .filter(|i| matches!(i.state, ItemState::Failed(_)))
        .count();

    if !attempted.is_empty() && failed == attempted.len() {
        ExitStatus::AllAnalysesFailed
    } else if failed > 0 {
        ExitStatus::PartialFailure
    } else {
        ExitStatus::Success
    }
}

/// Map a pipeline error to the orchestrator's stable exit code set.
pub fn exit_for_error(error: &PipelineError) -> ExitStatus {
    match error.kind {
        ErrorKind::Config => ExitStatus::BadConfig,
        ErrorKind::StoreIntegrity => ExitStatus::StoreIntegrityFailure,
        ErrorKind::Cancelled => ExitStatus::Cancelled,
        _ => ExitStatus::PartialFailure,
    }
}
