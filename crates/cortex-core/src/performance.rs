//! Performance logging.
//!
//! Every expert execution and every escalation produces a [`PerformanceLog`].
//! The [`PerformanceTracker`] buffers them in memory and appends them to one
//! JSON Lines file per UTC day (`performance_YYYY-MM-DD.jsonl`). Readers also
//! accept the older `.json` files holding a single JSON array.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CortexError, Result};

/// A single execution or escalation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceLog {
    /// When the attempt started (UTC).
    pub timestamp: DateTime<Utc>,
    /// Expert name.
    pub expert: String,
    /// Backing model id.
    pub model: String,
    /// First characters of the user text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    /// Wall-clock duration, serialized as nanoseconds.
    #[serde(with = "duration_nanos")]
    pub duration: Duration,
    /// Input tokens reported by the model.
    #[serde(default)]
    pub tokens_input: u64,
    /// Output tokens reported by the model.
    #[serde(default)]
    pub tokens_output: u64,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Error text for failed attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Whether this record is an escalation hop.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub escalated: bool,
    /// Escalation target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_to: Option<String>,
}

impl PerformanceLog {
    /// Record of a hand-off from `expert` to `target`.
    #[must_use]
    pub fn escalation(expert: &str, model: &str, target: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            expert: expert.to_string(),
            model: model.to_string(),
            task_description: None,
            duration: Duration::ZERO,
            tokens_input: 0,
            tokens_output: 0,
            success: true,
            error_message: None,
            escalated: true,
            escalated_to: Some(target.to_string()),
        }
    }

    /// Total tokens of this record.
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.tokens_input + self.tokens_output
    }
}

mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = i64::deserialize(d)?;
        Ok(Duration::from_nanos(nanos.max(0) as u64))
    }
}

/// File name of the daily log for `date`.
#[must_use]
pub fn log_file_name(date: NaiveDate) -> String {
    format!("performance_{}.jsonl", date.format("%Y-%m-%d"))
}

fn legacy_file_name(date: NaiveDate) -> String {
    format!("performance_{}.json", date.format("%Y-%m-%d"))
}

/// Reads one log file. `.json` files hold an array; anything else is read as
/// JSON Lines. A missing file is empty; bad records are skipped.
///
/// # Errors
///
/// Returns `CortexError::Persistence` if the file exists but cannot be read.
pub fn read_log_file(path: &Path) -> Result<Vec<PerformanceLog>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(CortexError::Persistence(format!(
                "failed to read {}: {e}",
                path.display()
            )));
        }
    };

    if path.extension().is_some_and(|ext| ext == "json") {
        return match serde_json::from_str::<Vec<PerformanceLog>>(&content) {
            Ok(logs) => Ok(logs),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unparseable log file");
                Ok(Vec::new())
            }
        };
    }

    let mut logs = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(log) => logs.push(log),
            Err(e) => warn!(
                path = %path.display(),
                line = line_no + 1,
                error = %e,
                "Skipping unparseable log line"
            ),
        }
    }
    Ok(logs)
}

/// Buffers performance logs and appends them to the daily file.
#[derive(Debug)]
pub struct PerformanceTracker {
    logs_dir: PathBuf,
    logs: Mutex<Vec<PerformanceLog>>,
}

impl PerformanceTracker {
    /// Creates a tracker writing under `logs_dir`.
    #[must_use]
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self { logs_dir: logs_dir.into(), logs: Mutex::new(Vec::new()) }
    }

    /// Logs directory.
    #[must_use]
    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Buffers a record and returns the number of records now pending.
    pub fn log(&self, entry: PerformanceLog) -> usize {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.push(entry);
        logs.len()
    }

    /// Snapshot of the last `n` buffered records, or all when `n` is `None`.
    #[must_use]
    pub fn recent_logs(&self, n: Option<usize>) -> Vec<PerformanceLog> {
        let logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        let start = n.map_or(0, |n| logs.len().saturating_sub(n));
        logs[start..].to_vec()
    }

    /// Number of buffered records.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Path of today's log file.
    #[must_use]
    pub fn today_path(&self) -> PathBuf {
        self.logs_dir.join(log_file_name(Utc::now().date_naive()))
    }

    /// Appends the buffer to today's file and clears it. The buffer is kept
    /// when the write fails. Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns `CortexError::Persistence` if the directory or file cannot be
    /// written.
    pub fn save(&self) -> Result<usize> {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        if logs.is_empty() {
            return Ok(0);
        }

        fs::create_dir_all(&self.logs_dir).map_err(|e| {
            CortexError::Persistence(format!(
                "failed to create logs directory {}: {e}",
                self.logs_dir.display()
            ))
        })?;

        let mut buf = String::new();
        for entry in logs.iter() {
            buf.push_str(&serde_json::to_string(entry)?);
            buf.push('\n');
        }

        let path = self.today_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CortexError::Persistence(format!("failed to open {}: {e}", path.display())))?;
        file.write_all(buf.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| CortexError::Persistence(format!("failed to write {}: {e}", path.display())))?;

        let written = logs.len();
        logs.clear();
        debug!(path = %path.display(), records = written, "Saved performance logs");
        Ok(written)
    }

    /// Loads the persisted records for `date`, legacy file first.
    ///
    /// # Errors
    ///
    /// Returns `CortexError::Persistence` if a file exists but is unreadable.
    pub fn load_day(&self, date: NaiveDate) -> Result<Vec<PerformanceLog>> {
        let mut logs = read_log_file(&self.logs_dir.join(legacy_file_name(date)))?;
        logs.extend(read_log_file(&self.logs_dir.join(log_file_name(date)))?);
        Ok(logs)
    }

    /// Loads today's persisted records.
    ///
    /// # Errors
    ///
    /// Returns `CortexError::Persistence` if a file exists but is unreadable.
    pub fn load_today(&self) -> Result<Vec<PerformanceLog>> {
        self.load_day(Utc::now().date_naive())
    }
}

/// Aggregates over a set of performance logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    /// All records, executions and escalations.
    pub total_records: usize,
    /// Execution records.
    pub executions: usize,
    /// Escalation records.
    pub escalations: usize,
    /// Successful executions over executions.
    pub success_rate: f64,
    /// Escalations over all records.
    pub escalation_rate: f64,
    /// Mean execution duration in milliseconds.
    pub avg_duration_ms: f64,
    /// Input plus output tokens.
    pub total_tokens: u64,
    /// Executions per expert.
    pub expert_usage: BTreeMap<String, usize>,
}

impl Statistics {
    /// Computes statistics. An empty set yields all zeros.
    #[must_use]
    pub fn compute(logs: &[PerformanceLog]) -> Self {
        let mut stats = Self { total_records: logs.len(), ..Self::default() };
        if logs.is_empty() {
            return stats;
        }

        let mut successes = 0usize;
        let mut total_duration = Duration::ZERO;
        for log in logs {
            stats.total_tokens += log.total_tokens();
            if log.escalated {
                stats.escalations += 1;
                continue;
            }
            stats.executions += 1;
            if log.success {
                successes += 1;
            }
            total_duration += log.duration;
            *stats.expert_usage.entry(log.expert.clone()).or_default() += 1;
        }

        stats.escalation_rate = stats.escalations as f64 / logs.len() as f64;
        if stats.executions > 0 {
            stats.success_rate = successes as f64 / stats.executions as f64;
            stats.avg_duration_ms =
                total_duration.as_secs_f64() * 1000.0 / stats.executions as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn execution(expert: &str, success: bool, millis: u64) -> PerformanceLog {
        PerformanceLog {
            timestamp: Utc::now(),
            expert: expert.to_string(),
            model: "mock".to_string(),
            task_description: Some("task".to_string()),
            duration: Duration::from_millis(millis),
            tokens_input: 10,
            tokens_output: 5,
            success,
            error_message: (!success).then(|| "boom".to_string()),
            escalated: false,
            escalated_to: None,
        }
    }

    #[test]
    fn test_log_and_recent() {
        let tracker = PerformanceTracker::new("unused");
        for i in 0..5 {
            tracker.log(execution(&format!("E{i}"), true, 1));
        }
        assert_eq!(tracker.pending(), 5);
        let recent = tracker.recent_logs(Some(2));
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].expert, "E3");
        assert_eq!(recent[1].expert, "E4");
        assert_eq!(tracker.recent_logs(Some(50)).len(), 5);
        assert_eq!(tracker.recent_logs(None).len(), 5);
    }

    #[test]
    fn test_save_appends_and_clears() {
        let dir = TempDir::new().unwrap();
        let tracker = PerformanceTracker::new(dir.path().join("logs"));

        tracker.log(execution("A", true, 1));
        assert_eq!(tracker.save().unwrap(), 1);

        for _ in 0..3 {
            tracker.log(execution("B", true, 1));
        }
        assert_eq!(tracker.save().unwrap(), 3);
        assert!(tracker.recent_logs(None).is_empty());

        let loaded = tracker.load_today().unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded[0].expert, "A");
        assert!(loaded[1..].iter().all(|l| l.expert == "B"));
    }

    #[test]
    fn test_save_empty_is_noop() {
        let dir = TempDir::new().unwrap();
        let tracker = PerformanceTracker::new(dir.path().join("logs"));
        assert_eq!(tracker.save().unwrap(), 0);
        assert!(!dir.path().join("logs").exists());
    }

    #[test]
    fn test_failed_save_keeps_buffer() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();
        let tracker = PerformanceTracker::new(&blocker);

        tracker.log(execution("A", true, 1));
        assert!(matches!(tracker.save(), Err(CortexError::Persistence(_))));
        assert_eq!(tracker.pending(), 1);
    }

    #[test]
    fn test_round_trip_equality() {
        let dir = TempDir::new().unwrap();
        let tracker = PerformanceTracker::new(dir.path());
        let original = execution("Elite", false, 1234);
        tracker.log(original.clone());
        tracker.log(PerformanceLog::escalation("Entry", "mock", "Elite"));
        tracker.save().unwrap();

        let loaded = tracker.load_today().unwrap();
        assert_eq!(loaded[0], original);
        assert!(loaded[1].escalated);
        assert_eq!(loaded[1].escalated_to.as_deref(), Some("Elite"));
    }

    #[test]
    fn test_wire_format() {
        let mut log = execution("A", true, 0);
        log.duration = Duration::from_nanos(1_500);
        let value = serde_json::to_value(&log).unwrap();
        assert_eq!(value["duration"], 1_500);
        assert_eq!(value["tokens_input"], 10);
        assert!(value.get("escalated").is_none());
        assert!(value.get("error_message").is_none());
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let tracker = PerformanceTracker::new(dir.path());
        tracker.log(execution("A", true, 1));
        tracker.save().unwrap();

        let mut file = OpenOptions::new().append(true).open(tracker.today_path()).unwrap();
        writeln!(file, "{{not json").unwrap();
        drop(file);
        tracker.log(execution("B", true, 1));
        tracker.save().unwrap();

        let loaded = tracker.load_today().unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_legacy_array_file_is_read() {
        let dir = TempDir::new().unwrap();
        let today = Utc::now().date_naive();
        let legacy = vec![execution("Old", true, 1)];
        fs::write(
            dir.path().join(legacy_file_name(today)),
            serde_json::to_string_pretty(&legacy).unwrap(),
        )
        .unwrap();

        let tracker = PerformanceTracker::new(dir.path());
        tracker.log(execution("New", true, 1));
        tracker.save().unwrap();

        let loaded = tracker.load_today().unwrap();
        let experts: Vec<&str> = loaded.iter().map(|l| l.expert.as_str()).collect();
        assert_eq!(experts, vec!["Old", "New"]);
    }

    #[test]
    fn test_missing_day_is_empty() {
        let dir = TempDir::new().unwrap();
        let tracker = PerformanceTracker::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert!(tracker.load_day(date).unwrap().is_empty());
    }

    #[test]
    fn test_statistics() {
        let logs = vec![
            PerformanceLog::escalation("Entry", "m", "Mid"),
            execution("Mid", true, 100),
            execution("Mid", false, 300),
            execution("Entry", true, 200),
        ];
        let stats = Statistics::compute(&logs);
        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.executions, 3);
        assert_eq!(stats.escalations, 1);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((stats.escalation_rate - 0.25).abs() < 1e-9);
        assert!((stats.avg_duration_ms - 200.0).abs() < 1e-9);
        assert_eq!(stats.total_tokens, 45);
        assert_eq!(stats.expert_usage["Mid"], 2);
        assert_eq!(stats.expert_usage["Entry"], 1);
    }

    #[test]
    fn test_statistics_empty() {
        assert_eq!(Statistics::compute(&[]), Statistics::default());
    }
}
