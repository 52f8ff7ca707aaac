use std::env;
use std::path::PathBuf;

use crate::errors::{PipelineError, PipelineResult};

/// Process-wide configuration, established once at orchestrator startup and
/// read-only afterwards. Invalid configuration fails before any I/O.
#[derive(Debug, Clone)]
pub struct Config {
    /// Filesystem root for the content-addressed store
    pub storage_root: PathBuf,
    pub llm: LlmConfig,
    pub analyze: AnalyzeConfig,
    pub correlate: CorrelateConfig,
    pub summary: SummaryConfig,
    pub package: PackageConfig,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Structured-response model identifier
    pub model: String,
    /// Opaque revision tag recorded in analyses for reproducibility
    pub model_revision: String,
    /// Provider credential, taken from the process environment
    pub api_key: Option<String>,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
    /// Bounded attempts for transient failures
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct AnalyzeConfig {
    /// Worker count for the analyze stage
    pub max_concurrency: usize,
    /// Overwrite existing analyses
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct CorrelateConfig {
    /// Enable AI single-to-single entity matching
    pub ai_resolve: bool,
    /// Bound on pairwise AI comparisons
    pub ai_resolve_max_calls: usize,
    /// Minimum silent stretch between material events to flag as a gap
    pub gap_threshold_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseType {
    Generic,
    Workplace,
    Employment,
    Contract,
}

impl CaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseType::Generic => "generic",
            CaseType::Workplace => "workplace",
            CaseType::Employment => "employment",
            CaseType::Contract => "contract",
        }
    }

    pub fn parse(s: &str) -> PipelineResult<Self> {
        match s {
            "generic" => Ok(CaseType::Generic),
            "workplace" => Ok(CaseType::Workplace),
            "employment" => Ok(CaseType::Employment),
            "contract" => Ok(CaseType::Contract),
            other => Err(PipelineError::config(&format!(
                "unknown case type '{}' (expected generic, workplace, employment, or contract)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SummaryConfig {
    pub case_type: CaseType,
    /// Switch to map-reduce when evidence count exceeds this
    pub chunk_threshold: usize,
    /// Items per map chunk
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    Zip,
    Directory,
}

impl PackageFormat {
    pub fn parse(s: &str) -> PipelineResult<Self> {
        match s {
            "zip" => Ok(PackageFormat::Zip),
            "directory" => Ok(PackageFormat::Directory),
            other => Err(PipelineError::config(&format!(
                "unknown package format '{}' (expected zip or directory)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PackageConfig {
    /// Include originals in the deliverable
    pub include_raw: bool,
    pub format: PackageFormat,
}

impl Config {
    /// Build a configuration from defaults plus `CASECORPUS_*` environment
    /// overrides. CLI flags are applied on top by the caller.
    pub fn from_env(storage_root: PathBuf) -> Self {
        Config {
            storage_root,
            llm: LlmConfig {
                model: env_or("CASECORPUS_LLM_MODEL", "structured-forensic-1"),
                model_revision: env_or("CASECORPUS_LLM_REVISION", "unpinned"),
                api_key: env::var("CASECORPUS_LLM_API_KEY").ok(),
                timeout_secs: env_parse("CASECORPUS_LLM_TIMEOUT_SECS", 120),
                max_attempts: env_parse("CASECORPUS_LLM_MAX_ATTEMPTS", 3),
            },
            analyze: AnalyzeConfig {
                max_concurrency: env_parse("CASECORPUS_MAX_CONCURRENCY", 5),
                force: false,
            },
            correlate: CorrelateConfig {
                ai_resolve: false,
                ai_resolve_max_calls: env_parse("CASECORPUS_AI_RESOLVE_MAX_CALLS", 50),
                gap_threshold_days: env_parse("CASECORPUS_GAP_THRESHOLD_DAYS", 14),
            },
            summary: SummaryConfig {
                case_type: CaseType::Generic,
                chunk_threshold: env_parse("CASECORPUS_CHUNK_THRESHOLD", 50),
                chunk_size: env_parse("CASECORPUS_CHUNK_SIZE", 30),
            },
            package: PackageConfig {
                include_raw: false,
                format: PackageFormat::Zip,
            },
        }
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.storage_root.as_os_str().is_empty() {
            return Err(PipelineError::config("storage root cannot be empty"));
        }
        if self.llm.model.is_empty() {
            return Err(PipelineError::config("llm.model cannot be empty"));
        }
        if self.analyze.max_concurrency == 0 {
            return Err(PipelineError::config(
                "analyze.max_concurrency must be at least 1",
            ));
        }
        if self.llm.max_attempts == 0 {
            return Err(PipelineError::config("llm.max_attempts must be at least 1"));
        }
        if self.summary.chunk_size == 0 {
            return Err(PipelineError::config("summary.chunk_size must be at least 1"));
        }
        if self.summary.chunk_size > self.summary.chunk_threshold {
            return Err(PipelineError::config(
                "summary.chunk_size cannot exceed summary.chunk_threshold",
            ));
        }
        if self.correlate.gap_threshold_days < 1 {
            return Err(PipelineError::config(
                "correlate.gap_threshold_days must be at least 1",
            ));
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config::from_env(PathBuf::from("/tmp/store"))
    }

    #[test]
    fn test_defaults() {
        let config = base_config();
        assert_eq!(config.analyze.max_concurrency, 5);
        assert!(!config.analyze.force);
        assert!(!config.correlate.ai_resolve);
        assert_eq!(config.correlate.ai_resolve_max_calls, 50);
        assert_eq!(config.correlate.gap_threshold_days, 14);
        assert_eq!(config.summary.chunk_threshold, 50);
        assert_eq!(config.summary.chunk_size, 30);
        assert_eq!(config.package.format, PackageFormat::Zip);
        assert!(!config.package.include_raw);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let mut config = base_config();
        config.analyze.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_chunk_size_above_threshold() {
        let mut config = base_config();
        config.summary.chunk_size = 80;
        config.summary.chunk_threshold = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_case_type_parsing() {
        assert_eq!(CaseType::parse("workplace").unwrap(), CaseType::Workplace);
        assert_eq!(CaseType::parse("contract").unwrap(), CaseType::Contract);
        assert!(CaseType::parse("criminal").is_err());
    }

    #[test]
    fn test_package_format_parsing() {
        assert_eq!(PackageFormat::parse("zip").unwrap(), PackageFormat::Zip);
        assert_eq!(
            PackageFormat::parse("directory").unwrap(),
            PackageFormat::Directory
        );
        assert!(PackageFormat::parse("tarball").is_err());
    }
}
