use crate::types::{LogEntry, LogLevel};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Collection logger shared across pipeline stages. Entries accumulate in
/// memory for inclusion in case reports; verbose mode echoes to stderr.
pub struct Logger {
    entries: Mutex<VecDeque<LogEntry>>,
    verbose: bool,
    max_entries: usize,
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Logger {
            entries: Mutex::new(VecDeque::new()),
            verbose,
            max_entries: 10000, // Limit memory usage
        }
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        let entry = LogEntry::new(level.as_str(), message);

        if self.verbose {
            eprintln!("[{}] {}: {}", entry.timestamp, entry.level, entry.message);
        }

        if let Ok(mut entries) = self.entries.lock() {
            // Maintain maximum number of entries to prevent memory issues
            if entries.len() >= self.max_entries {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }

    /// Get all collected log entries
    pub fn get_entries(&self) -> Vec<LogEntry> {
        if let Ok(entries) = self.entries.lock() {
            entries.iter().cloned().collect()
        } else {
            Vec::new()
        }
    }

    /// Get entries by level
    pub fn get_entries_by_level(&self, level: LogLevel) -> Vec<LogEntry> {
        if let Ok(entries) = self.entries.lock() {
            entries
                .iter()
                .filter(|entry| entry.level == level.as_str())
                .cloned()
                .collect()
        } else {
            Vec::new()
        }
    }

    pub fn get_count_by_level(&self, level: LogLevel) -> usize {
        if let Ok(entries) = self.entries.lock() {
            entries
                .iter()
                .filter(|entry| entry.level == level.as_str())
                .count()
        } else {
            0
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Get summary of log levels
    pub fn get_summary(&self) -> LogSummary {
        if let Ok(entries) = self.entries.lock() {
            let mut summary = LogSummary::default();

            for entry in entries.iter() {
                match entry.level.as_str() {
                    "INFO" => summary.info_count += 1,
                    "WARN" => summary.warn_count += 1,
                    "ERROR" => summary.error_count += 1,
                    _ => summary.other_count += 1,
                }
            }

            summary.total_count = entries.len();
            summary
        } else {
            LogSummary::default()
        }
    }
}

/// Summary of log entries by level
#[derive(Debug, Default, Clone)]
pub struct LogSummary {
    pub total_count: usize,
    pub info_count: usize,
    pub warn_count: usize,
    pub error_count: usize,
    pub other_count: usize,
}

impl LogSummary {
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warn_count > 0
    }

    /// Get success rate (percentage of non-error entries)
    pub fn success_rate(&self) -> f64 {
        if self.total_count == 0 {
            100.0
        } else {
            ((self.total_count - self.error_count) as f64 / self.total_count as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_basic_functionality() {
        let logger = Logger::new(false);

        logger.info("Ingested doc.txt");
        logger.warn("Duplicate bytes for doc.txt");
        logger.error("Analyzer failed for image.png");

        let entries = logger.get_entries();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].level, "INFO");
        assert_eq!(entries[0].message, "Ingested doc.txt");

        assert_eq!(entries[1].level, "WARN");
        assert_eq!(entries[2].level, "ERROR");
    }

    #[test]
    fn test_logger_summary() {
        let logger = Logger::new(false);

        logger.info("Info 1");
        logger.info("Info 2");
        logger.warn("Warning 1");
        logger.error("Error 1");

        let summary = logger.get_summary();
        assert_eq!(summary.total_count, 4);
        assert_eq!(summary.info_count, 2);
        assert_eq!(summary.warn_count, 1);
        assert_eq!(summary.error_count, 1);

        assert!(summary.has_errors());
        assert!(summary.has_warnings());
        assert_eq!(summary.success_rate(), 75.0); // 3 out of 4 non-error
    }

    #[test]
    fn test_logger_filtering() {
        let logger = Logger::new(false);

        logger.info("Info message");
        logger.warn("Warning message");
        logger.error("Error message");

        let info_entries = logger.get_entries_by_level(LogLevel::Info);
        assert_eq!(info_entries.len(), 1);
        assert_eq!(info_entries[0].message, "Info message");

        let error_count = logger.get_count_by_level(LogLevel::Error);
        assert_eq!(error_count, 1);
    }

    #[test]
    fn test_empty_logger_summary() {
        let logger = Logger::new(false);
        let summary = logger.get_summary();
        assert_eq!(summary.total_count, 0);
        assert_eq!(summary.success_rate(), 100.0);
        assert!(!summary.has_errors());
    }
}
