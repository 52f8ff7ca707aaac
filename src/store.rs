use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use crate::cancel::CancellationToken;
use crate::detect::{detect_evidence_type, extension_of, mime_type_of};
use crate::errors::{ErrorKind, PipelineError, PipelineResult};
use crate::types::{
    ChainOfCustody, ChainOfCustodyEvent, CustodyAction, FileMetadata, IngestStatus,
    IngestionResult, StoreStats, Validate,
};

/// Content-addressed evidence store. Single writer over `raw/`, `derived/`,
/// and `cases/` under its root; every other component reads through this API.
pub struct EvidenceStore {
    root: PathBuf,
    /// Per-SHA-256 advisory locks serializing custody and analysis writes
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// How a case link was materialized on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    Hard,
    Symlink,
    Copy,
}

impl LinkMode {
    fn as_str(&self) -> &'static str {
        match self {
            LinkMode::Hard => "hard",
            LinkMode::Symlink => "symlink",
            LinkMode::Copy => "copy",
        }
    }
}

/// Outcome of `save_analysis`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    AlreadyAnalyzed,
    /// Previous analysis moved to the returned backup filename
    Reanalyzed(String),
}

#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub broken_links_removed: Vec<PathBuf>,
    pub empty_dirs_removed: Vec<PathBuf>,
    /// SHA-256s with no case link at all
    pub orphans: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    /// SHA-256s whose raw and derived trees were removed
    pub removed: Vec<String>,
    /// SHA-256s that stayed because another case still links them
    pub unlinked_only: Vec<String>,
}

impl EvidenceStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: &Path) -> PipelineResult<Self> {
        for sub in ["raw", "derived", "cases", "packages"] {
            let dir = root.join(sub);
            fs::create_dir_all(&dir).map_err(|e| PipelineError::io(ErrorKind::Config, &e, &dir))?;
        }
        Ok(EvidenceStore {
            root: root.to_path_buf(),
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    fn raw_dir(&self, sha256: &str) -> PathBuf {
        self.root.join("raw").join(format!("sha256={}", sha256))
    }

    fn derived_dir(&self, sha256: &str) -> PathBuf {
        self.root.join("derived").join(format!("sha256={}", sha256))
    }

    fn case_dir(&self, case_id: &str) -> PathBuf {
        self.root.join("cases").join(case_id)
    }

    fn metadata_path(&self, sha256: &str) -> PathBuf {
        self.derived_dir(sha256).join("metadata.json")
    }

    fn custody_path(&self, sha256: &str) -> PathBuf {
        self.derived_dir(sha256).join("chain_of_custody.json")
    }

    fn analysis_path(&self, sha256: &str) -> PathBuf {
        self.derived_dir(sha256).join("analysis.v1.json")
    }

    fn lock_for(&self, sha256: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        locks
            .entry(sha256.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Path of the stored original bytes for a SHA-256.
    pub fn raw_path(&self, sha256: &str) -> PipelineResult<PathBuf> {
        let dir = self.raw_dir(sha256);
        let entries =
            fs::read_dir(&dir).map_err(|e| PipelineError::io(ErrorKind::StoreIntegrity, &e, &dir))?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with("original") {
                return Ok(entry.path());
            }
        }
        Err(PipelineError::store_integrity(&format!(
            "no original blob for sha256={}",
            sha256
        )))
    }

    pub fn contains(&self, sha256: &str) -> bool {
        self.raw_dir(sha256).exists()
    }

    /// Hash, deduplicate, persist, and link one file into the store.
    pub fn ingest(
        &self,
        path: &Path,
        case_id: Option<&str>,
        actor: &str,
        cancel: &CancellationToken,
    ) -> PipelineResult<IngestionResult> {
        cancel.check()?;

        let file_meta =
            fs::metadata(path).map_err(|e| PipelineError::io(ErrorKind::Ingest, &e, path))?;
        if !file_meta.is_file() {
            return Err(PipelineError::ingest(&format!(
                "not a regular file: {}",
                path.display()
            )));
        }

        let extension = extension_of(path);
        let probe = read_probe(path)?;
        let evidence_type = detect_evidence_type(&extension, Some(&probe));

        let (sha256, size_bytes) = hash_file_streamed(path, cancel)?;
        cancel.check()?;

        let lock = self.lock_for(&sha256);
        let _guard = lock.lock().expect("sha lock poisoned");

        if self.contains(&sha256) {
            // Duplicate bytes: never rewrite raw, at most add a case link
            // with an add-to-case custody event.
            let metadata = self.load_metadata(&sha256)?;
            if let Some(case) = case_id {
                self.link_into_case_locked(&sha256, &metadata.extension, case, actor, true)?;
            }
            return Ok(IngestionResult {
                sha256: sha256.clone(),
                evidence_type,
                metadata,
                status: IngestStatus::Duplicate,
                case_id: case_id.map(|c| c.to_string()),
            });
        }

        let metadata = FileMetadata {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| sha256.clone()),
            size_bytes,
            mime_type: mime_type_of(&extension).to_string(),
            extension: extension.clone(),
            created_utc: fs_time_utc(file_meta.created().ok()),
            modified_utc: fs_time_utc(file_meta.modified().ok()),
            sha256: sha256.clone(),
        };
        metadata
            .validate()
            .map_err(|e| PipelineError::store_integrity(&e))?;

        let raw_dir = self.raw_dir(&sha256);
        let derived_dir = self.derived_dir(&sha256);
        let result = self.write_new_artifact(path, &raw_dir, &derived_dir, &metadata, actor, case_id);
        if let Err(err) = result {
            // Partial writes are cleaned up; the failure is per-item.
            let _ = fs::remove_dir_all(&raw_dir);
            let _ = fs::remove_dir_all(&derived_dir);
            return Err(err);
        }

        if let Some(case) = case_id {
            // The initial link is part of the ingest event; add-to-case is
            // reserved for linking existing artifacts into further cases.
            self.link_into_case_locked(&sha256, &extension, case, actor, false)?;
        }

        Ok(IngestionResult {
            sha256,
            evidence_type,
            metadata,
            status: IngestStatus::Ingested,
            case_id: case_id.map(|c| c.to_string()),
        })
    }

    fn write_new_artifact(
        &self,
        source: &Path,
        raw_dir: &Path,
        derived_dir: &Path,
        metadata: &FileMetadata,
        actor: &str,
        case_id: Option<&str>,
    ) -> PipelineResult<()> {
        fs::create_dir_all(raw_dir)
            .map_err(|e| PipelineError::io(ErrorKind::Ingest, &e, raw_dir))?;
        fs::create_dir_all(derived_dir)
            .map_err(|e| PipelineError::io(ErrorKind::Ingest, &e, derived_dir))?;

        let original_name = if metadata.extension.is_empty() {
            "original".to_string()
        } else {
            format!("original.{}", metadata.extension)
        };
        let blob_path = raw_dir.join(original_name);
        fs::copy(source, &blob_path)
            .map_err(|e| PipelineError::io(ErrorKind::Ingest, &e, &blob_path))?;

        write_json_atomic(&self.metadata_path(&metadata.sha256), metadata)?;

        let mut event = ChainOfCustodyEvent::new(
            actor,
            CustodyAction::Ingest,
            Some(&format!("ingested {}", metadata.filename)),
        );
        if let Some(case) = case_id {
            event = event.with_metadata(serde_json::json!({ "case_id": case }));
        }
        let custody = ChainOfCustody {
            events: vec![event],
        };
        write_json_atomic(&self.custody_path(&metadata.sha256), &custody)?;
        Ok(())
    }

    /// Link an already-stored artifact into a case. No-op when the link
    /// already exists. Public entry acquires the per-SHA lock.
    pub fn add_to_case(&self, sha256: &str, case_id: &str, actor: &str) -> PipelineResult<bool> {
        if !self.contains(sha256) {
            return Err(PipelineError::store_integrity(&format!(
                "unknown artifact sha256={}",
                sha256
            )));
        }
        let metadata = self.load_metadata(sha256)?;
        let lock = self.lock_for(sha256);
        let _guard = lock.lock().expect("sha lock poisoned");
        self.link_into_case_locked(sha256, &metadata.extension, case_id, actor, true)
    }

    /// Returns true when a new link was created. `record_event` appends an
    /// add-to-case custody event; the initial ingest link passes false since
    /// the ingest event already covers it.
    fn link_into_case_locked(
        &self,
        sha256: &str,
        extension: &str,
        case_id: &str,
        actor: &str,
        record_event: bool,
    ) -> PipelineResult<bool> {
        let case_dir = self.case_dir(case_id);
        fs::create_dir_all(&case_dir)
            .map_err(|e| PipelineError::io(ErrorKind::Ingest, &e, &case_dir))?;

        let link_name = if extension.is_empty() {
            sha256.to_string()
        } else {
            format!("{}.{}", sha256, extension)
        };
        let link_path = case_dir.join(link_name);
        if link_path.exists() {
            return Ok(false);
        }

        let raw = self.raw_path(sha256)?;
        let mode = create_link(&raw, &link_path)?;

        if record_event {
            let event = ChainOfCustodyEvent::new(
                actor,
                CustodyAction::AddToCase,
                Some(&format!("linked into case {}", case_id)),
            )
            .with_metadata(serde_json::json!({
                "case_id": case_id,
                "link_mode": mode.as_str(),
            }));
            self.append_custody_locked(sha256, event)?;
        }
        Ok(true)
    }

    /// Append one custody event under the per-SHA lock.
    pub fn append_custody(&self, sha256: &str, event: ChainOfCustodyEvent) -> PipelineResult<()> {
        let lock = self.lock_for(sha256);
        let _guard = lock.lock().expect("sha lock poisoned");
        self.append_custody_locked(sha256, event)
    }

    fn append_custody_locked(
        &self,
        sha256: &str,
        event: ChainOfCustodyEvent,
    ) -> PipelineResult<()> {
        let path = self.custody_path(sha256);
        let mut custody: ChainOfCustody = read_json_validated(&path)?;
        custody.append(event);
        write_json_atomic(&path, &custody)
    }

    /// Persist an analysis record. Without `force`, an existing analysis is
    /// left untouched. With `force`, the previous file is renamed to
    /// `analysis.v1.json.backup.<epoch_ms>` before the overwrite.
    pub fn save_analysis(
        &self,
        analysis: &crate::analysis_types::UnifiedAnalysis,
        actor: &str,
        force: bool,
    ) -> PipelineResult<SaveOutcome> {
        analysis
            .validate()
            .map_err(|e| PipelineError::store_integrity(&e))?;
        if !self.contains(&analysis.sha256) {
            return Err(PipelineError::store_integrity(&format!(
                "analysis references unknown artifact sha256={}",
                analysis.sha256
            )));
        }

        let lock = self.lock_for(&analysis.sha256);
        let _guard = lock.lock().expect("sha lock poisoned");

        let path = self.analysis_path(&analysis.sha256);
        let existed = path.exists();
        let mut backup_name = None;

        if existed {
            if !force {
                return Ok(SaveOutcome::AlreadyAnalyzed);
            }
            let epoch_ms = chrono::Utc::now().timestamp_millis();
            let name = format!("analysis.v1.json.backup.{}", epoch_ms);
            let backup_path = path.with_file_name(&name);
            fs::rename(&path, &backup_path)
                .map_err(|e| PipelineError::io(ErrorKind::StoreIntegrity, &e, &backup_path))?;
            backup_name = Some(name);
        }

        if let Err(err) = write_json_atomic(&path, analysis) {
            // Never leave the primary analysis missing after a failed
            // forced overwrite.
            if let Some(name) = &backup_name {
                let _ = fs::rename(path.with_file_name(name), &path);
            }
            return Err(err);
        }

        let action = if existed {
            CustodyAction::Reanalyze
        } else {
            CustodyAction::Analyze
        };
        let mut event = ChainOfCustodyEvent::new(
            actor,
            action,
            Some(&format!("model {}", analysis.model)),
        );
        if let Some(name) = &backup_name {
            event = event.with_metadata(serde_json::json!({ "backup": name }));
        }
        self.append_custody_locked(&analysis.sha256, event)?;

        Ok(match backup_name {
            Some(name) => SaveOutcome::Reanalyzed(name),
            None => SaveOutcome::Saved,
        })
    }

    pub fn load_metadata(&self, sha256: &str) -> PipelineResult<FileMetadata> {
        read_json_validated(&self.metadata_path(sha256))
    }

    pub fn load_custody(&self, sha256: &str) -> PipelineResult<ChainOfCustody> {
        read_json_validated(&self.custody_path(sha256))
    }

    /// `Ok(None)` when the artifact has not been analyzed yet; schema
    /// failures on an existing file are integrity errors.
    pub fn load_analysis(
        &self,
        sha256: &str,
    ) -> PipelineResult<Option<crate::analysis_types::UnifiedAnalysis>> {
        let path = self.analysis_path(sha256);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(read_json_validated(&path)?))
    }

    /// SHA-256s linked into a case, sorted.
    pub fn list_case(&self, case_id: &str) -> PipelineResult<Vec<String>> {
        let dir = self.case_dir(case_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut shas = BTreeSet::new();
        let entries =
            fs::read_dir(&dir).map_err(|e| PipelineError::io(ErrorKind::StoreIntegrity, &e, &dir))?;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let sha = name.split('.').next().unwrap_or(&name).to_string();
            if crate::types::is_sha256_hex(&sha) {
                shas.insert(sha);
            }
        }
        Ok(shas.into_iter().collect())
    }

    /// Every SHA-256 in the store, sorted.
    pub fn list_all(&self) -> PipelineResult<Vec<String>> {
        let dir = self.root.join("raw");
        let mut shas = BTreeSet::new();
        let entries =
            fs::read_dir(&dir).map_err(|e| PipelineError::io(ErrorKind::StoreIntegrity, &e, &dir))?;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(sha) = name.strip_prefix("sha256=") {
                if crate::types::is_sha256_hex(sha) {
                    shas.insert(sha.to_string());
                }
            }
        }
        Ok(shas.into_iter().collect())
    }

    /// Case IDs this artifact is linked into.
    pub fn cases_of(&self, sha256: &str) -> PipelineResult<Vec<String>> {
        let cases_root = self.root.join("cases");
        let mut cases = Vec::new();
        let entries = fs::read_dir(&cases_root)
            .map_err(|e| PipelineError::io(ErrorKind::StoreIntegrity, &e, &cases_root))?;
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let case_id = entry.file_name().to_string_lossy().into_owned();
            if self.list_case(&case_id)?.iter().any(|s| s == sha256) {
                cases.push(case_id);
            }
        }
        cases.sort();
        Ok(cases)
    }

    pub fn case_ids(&self) -> PipelineResult<Vec<String>> {
        let cases_root = self.root.join("cases");
        let mut cases = Vec::new();
        let entries = fs::read_dir(&cases_root)
            .map_err(|e| PipelineError::io(ErrorKind::StoreIntegrity, &e, &cases_root))?;
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                cases.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        cases.sort();
        Ok(cases)
    }

    pub fn stats(&self) -> PipelineResult<StoreStats> {
        let shas = self.list_all()?;
        let mut stats = StoreStats {
            case_count: self.case_ids()?.len(),
            ..Default::default()
        };
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();

        for sha in &shas {
            let metadata = self.load_metadata(sha)?;
            stats.evidence_count += 1;
            stats.total_bytes += metadata.size_bytes;
            let kind =
                detect_evidence_type(&metadata.extension, None).as_str().to_string();
            *by_type.entry(kind).or_insert(0) += 1;

            if self.analysis_path(sha).exists() {
                stats.analyzed_count += 1;
            } else {
                stats.unanalyzed_count += 1;
            }
            if self.cases_of(sha)?.is_empty() {
                stats.orphan_count += 1;
            }
        }
        stats.by_type = by_type;
        Ok(stats)
    }

    /// Remove broken case links and empty case directories; report orphans.
    pub fn cleanup(&self, dry_run: bool) -> PipelineResult<CleanupReport> {
        let mut report = CleanupReport::default();
        let cases_root = self.root.join("cases");

        let entries = fs::read_dir(&cases_root)
            .map_err(|e| PipelineError::io(ErrorKind::StoreIntegrity, &e, &cases_root))?;
        for case_entry in entries.flatten() {
            let case_dir = case_entry.path();
            if !case_dir.is_dir() {
                continue;
            }
            let links = fs::read_dir(&case_dir)
                .map_err(|e| PipelineError::io(ErrorKind::StoreIntegrity, &e, &case_dir))?;
            for link in links.flatten() {
                let link_path = link.path();
                let name = link.file_name().to_string_lossy().into_owned();
                let sha = name.split('.').next().unwrap_or(&name).to_string();
                let broken = !crate::types::is_sha256_hex(&sha)
                    || !self.contains(&sha)
                    || fs::metadata(&link_path).is_err();
                if broken {
                    if !dry_run {
                        let _ = fs::remove_file(&link_path);
                    }
                    report.broken_links_removed.push(link_path);
                }
            }
            let now_empty = fs::read_dir(&case_dir)
                .map(|mut d| d.next().is_none())
                .unwrap_or(false);
            if now_empty {
                if !dry_run {
                    let _ = fs::remove_dir(&case_dir);
                }
                report.empty_dirs_removed.push(case_dir);
            }
        }

        for sha in self.list_all()? {
            if self.cases_of(&sha)?.is_empty() {
                report.orphans.push(sha);
            }
        }
        Ok(report)
    }

    /// Remove a case. Artifacts belonging to no other case lose their raw
    /// and derived trees; shared artifacts only lose this case's link.
    /// Destructive only when `dry_run` is false.
    pub fn prune_case(&self, case_id: &str, dry_run: bool) -> PipelineResult<PruneReport> {
        let mut report = PruneReport::default();
        let shas = self.list_case(case_id)?;

        for sha in &shas {
            let other_cases: Vec<String> = self
                .cases_of(sha)?
                .into_iter()
                .filter(|c| c != case_id)
                .collect();
            if other_cases.is_empty() {
                report.removed.push(sha.clone());
                if !dry_run {
                    let _ = fs::remove_dir_all(self.raw_dir(sha));
                    let _ = fs::remove_dir_all(self.derived_dir(sha));
                }
            } else {
                report.unlinked_only.push(sha.clone());
            }
        }

        if !dry_run {
            let _ = fs::remove_dir_all(self.case_dir(case_id));
        }
        Ok(report)
    }

    /// Copy an original into `dest_dir`, appending an `export` custody event.
    pub fn export_original(
        &self,
        sha256: &str,
        dest_dir: &Path,
        actor: &str,
    ) -> PipelineResult<PathBuf> {
        let raw = self.raw_path(sha256)?;
        let metadata = self.load_metadata(sha256)?;
        fs::create_dir_all(dest_dir)
            .map_err(|e| PipelineError::io(ErrorKind::Package, &e, dest_dir))?;
        let dest = dest_dir.join(&metadata.filename);
        fs::copy(&raw, &dest).map_err(|e| PipelineError::io(ErrorKind::Package, &e, &dest))?;

        self.append_custody(
            sha256,
            ChainOfCustodyEvent::new(
                actor,
                CustodyAction::Export,
                Some(&format!("exported to {}", dest.display())),
            ),
        )?;
        Ok(dest)
    }
}

/// Stream-hash a file in one pass with constant memory.
pub fn hash_file_streamed(
    path: &Path,
    cancel: &CancellationToken,
) -> PipelineResult<(String, u64)> {
    let mut file = File::open(path).map_err(|e| PipelineError::io(ErrorKind::Ingest, &e, path))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    let mut total: u64 = 0;

    loop {
        cancel.check()?;
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| PipelineError::io(ErrorKind::Ingest, &e, path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }

    Ok((hex::encode(hasher.finalize()), total))
}

fn read_probe(path: &Path) -> PipelineResult<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| PipelineError::io(ErrorKind::Ingest, &e, path))?;
    let mut buffer = vec![0u8; 4096];
    let n = file
        .read(&mut buffer)
        .map_err(|e| PipelineError::io(ErrorKind::Ingest, &e, path))?;
    buffer.truncate(n);
    Ok(buffer)
}

fn fs_time_utc(time: Option<std::time::SystemTime>) -> Option<String> {
    time.map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339())
}

fn create_link(raw: &Path, link: &Path) -> PipelineResult<LinkMode> {
    if fs::hard_link(raw, link).is_ok() {
        return Ok(LinkMode::Hard);
    }
    #[cfg(unix)]
    {
        if std::os::unix::fs::symlink(raw, link).is_ok() {
            return Ok(LinkMode::Symlink);
        }
    }
    fs::copy(raw, link).map_err(|e| PipelineError::io(ErrorKind::Ingest, &e, link))?;
    Ok(LinkMode::Copy)
}

/// Write JSON with create-or-replace semantics: temp file in the target
/// directory, then an atomic rename.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> PipelineResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| PipelineError::store_integrity("write target has no parent directory"))?;
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| PipelineError::store_integrity(&format!("serialize failed: {}", e)))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| PipelineError::io(ErrorKind::StoreIntegrity, &e, parent))?;
    temp.write_all(&json)
        .map_err(|e| PipelineError::io(ErrorKind::StoreIntegrity, &e, path))?;
    temp.persist(path)
        .map_err(|e| PipelineError::io(ErrorKind::StoreIntegrity, &e.error, path))?;
    Ok(())
}

/// Schema-validated JSON read. Callers get a typed record or an error,
/// never a raw map.
pub fn read_json_validated<T: DeserializeOwned + Validate>(path: &Path) -> PipelineResult<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PipelineError::with_context(
                ErrorKind::StoreIntegrity,
                "not found",
                &path.display().to_string(),
            )
        } else {
            PipelineError::io(ErrorKind::StoreIntegrity, &e, path)
        }
    })?;
    let value: T = serde_json::from_str(&content).map_err(|e| {
        PipelineError::with_context(
            ErrorKind::StoreIntegrity,
            &format!("schema-invalid record: {}", e),
            &path.display().to_string(),
        )
    })?;
    value.validate().map_err(|e| {
        PipelineError::with_context(ErrorKind::StoreIntegrity, &e, &path.display().to_string())
    })?;
    Ok(value)
}
