/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Custom error type for pipeline operations
#[derive(Debug, Clone)]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: Option<String>,
}

/// Error taxonomy. Per-artifact kinds are caught at the orchestrator
/// boundary; case-level kinds fail the case but not other cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or missing configuration; fails fast before any I/O
    Config,
    /// SHA-256 mismatch, schema-invalid derived file, broken store invariant
    StoreIntegrity,
    /// Transient I/O during ingest; per-item
    Ingest,
    /// Artifact could not be classified
    TypeDetect,
    /// Analyzer failure wrapping an LLM or parsing error; per-item
    Analyzer,
    /// Input analyses missing or malformed; case-level
    Correlation,
    /// Output filesystem failure or partial assembly
    Package,
    /// Provider returned an incomplete structured response
    LlmIncomplete,
    /// Provider refused the request
    LlmRefused,
    /// Provider failed outright
    LlmFailed,
    /// Per-call timeout elapsed
    LlmTimeout,
    /// Cooperative cancellation
    Cancelled,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        PipelineError {
            kind,
            message: message.to_string(),
            context: None,
        }
    }

    pub fn with_context(kind: ErrorKind, message: &str, context: &str) -> Self {
        PipelineError {
            kind,
            message: message.to_string(),
            context: Some(context.to_string()),
        }
    }

    pub fn config(message: &str) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn store_integrity(message: &str) -> Self {
        Self::new(ErrorKind::StoreIntegrity, message)
    }

    pub fn ingest(message: &str) -> Self {
        Self::new(ErrorKind::Ingest, message)
    }

    pub fn type_detect(message: &str) -> Self {
        Self::new(ErrorKind::TypeDetect, message)
    }

    pub fn analyzer(message: &str) -> Self {
        Self::new(ErrorKind::Analyzer, message)
    }

    pub fn correlation(message: &str) -> Self {
        Self::new(ErrorKind::Correlation, message)
    }

    pub fn package(message: &str) -> Self {
        Self::new(ErrorKind::Package, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }

    /// Wrap an I/O error that hit a specific path.
    pub fn io(kind: ErrorKind, err: &std::io::Error, path: &std::path::Path) -> Self {
        Self::with_context(kind, &err.to_string(), &path.display().to_string())
    }

    /// Fatal for the affected artifact: the pipeline must stop for that item
    /// rather than produce degraded output.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Config | ErrorKind::StoreIntegrity | ErrorKind::Correlation
        )
    }

    /// Transient errors the caller may retry; completion-state errors are
    /// never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Ingest | ErrorKind::LlmTimeout)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Wrap any analyzer-stage failure, preserving the original kind tag in
    /// the context.
    pub fn into_analyzer_error(self) -> Self {
        match self.kind {
            ErrorKind::Analyzer | ErrorKind::Cancelled | ErrorKind::StoreIntegrity => self,
            _ => PipelineError::with_context(
                ErrorKind::Analyzer,
                &self.message,
                self.kind.as_str(),
            ),
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{} ({}): {}", self.kind.as_str(), context, self.message)
        } else {
            write!(f, "{}: {}", self.kind.as_str(), self.message)
        }
    }
}

impl std::error::Error for PipelineError {}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "CONFIG",
            ErrorKind::StoreIntegrity => "STORE_INTEGRITY",
            ErrorKind::Ingest => "INGEST",
            ErrorKind::TypeDetect => "TYPE_DETECT",
            ErrorKind::Analyzer => "ANALYZER",
            ErrorKind::Correlation => "CORRELATION",
            ErrorKind::Package => "PACKAGE",
            ErrorKind::LlmIncomplete => "LLM_INCOMPLETE",
            ErrorKind::LlmRefused => "LLM_REFUSED",
            ErrorKind::LlmFailed => "LLM_FAILED",
            ErrorKind::LlmTimeout => "LLM_TIMEOUT",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }
}

/// Stable process exit codes for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    BadConfig,
    StoreIntegrityFailure,
    AllAnalysesFailed,
    PartialFailure,
    Cancelled,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::BadConfig => 1,
            ExitStatus::StoreIntegrityFailure => 2,
            ExitStatus::AllAnalysesFailed => 3,
            ExitStatus::PartialFailure => 4,
            ExitStatus::Cancelled => 5,
        }
    }
}
