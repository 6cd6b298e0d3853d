use serde::{Deserialize, Serialize};

/// One declared recurring query, as stored in a descriptor file.
///
/// Field names on disk are camelCase. Keys this type does not know about are
/// kept in `extra` and written back untouched, after the known fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    /// Identifier used in logs. Expected to be unique within a file.
    pub query_name: String,
    /// Query handed verbatim to the backend on every drain iteration.
    #[serde(rename = "cypherQuery")]
    pub query_text: String,
    /// Minutes that must elapse between two runs.
    #[serde(rename = "runSchedule")]
    pub interval_minutes: u64,
    /// `yyyy/MM/dd hh:mm a` in the configured zone. Absent until the first run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution_time: Option<String>,
    /// Rows processed by the run that set `last_execution_time`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_processed: Option<i64>,
    /// Wall-clock duration in milliseconds of that same run.
    #[serde(
        rename = "processingTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub processing_time_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobDescriptor {
    pub fn new(query_name: &str, query_text: &str, interval_minutes: u64) -> Self {
        Self {
            query_name: query_name.to_string(),
            query_text: query_text.to_string(),
            interval_minutes,
            last_execution_time: None,
            records_processed: None,
            processing_time_ms: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Store the outcome of a completed run. The three result fields are
    /// always replaced together.
    pub fn record_run(&mut self, executed_at: String, report: &ExecutionReport) {
        self.last_execution_time = Some(executed_at);
        self.records_processed = Some(report.total_rows);
        self.processing_time_ms = Some(report.elapsed_ms);
    }
}

/// Why a drain loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStop {
    /// The query reported zero (or fewer) rows.
    Exhausted,
    /// A result could not be read as a single integer count.
    MalformedResult,
    /// The configured iteration cap was reached before the query drained.
    IterationCap,
}

impl std::fmt::Display for DrainStop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DrainStop::Exhausted => "exhausted",
            DrainStop::MalformedResult => "malformed_result",
            DrainStop::IterationCap => "iteration_cap",
        };
        write!(f, "{s}")
    }
}

/// Aggregate result of one drain loop. Every variant of [`DrainStop`] counts
/// as a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub total_rows: i64,
    pub elapsed_ms: u64,
    /// Number of backend calls made.
    pub iterations: u64,
    pub stop: DrainStop,
}

/// Counters for one pass over the descriptor directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub files_seen: usize,
    pub files_written: usize,
    pub files_skipped: usize,
    pub executed: usize,
    pub failed: usize,
    pub not_due: usize,
    pub bad_timestamps: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_fields() {
        let json = r#"{
            "queryName": "link-sprints",
            "cypherQuery": "MATCH (n) RETURN count(n)",
            "runSchedule": 30,
            "lastExecutionTime": "2017/09/01 10:15 AM",
            "recordsProcessed": 12,
            "processingTime": 340
        }"#;
        let d: JobDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.query_name, "link-sprints");
        assert_eq!(d.query_text, "MATCH (n) RETURN count(n)");
        assert_eq!(d.interval_minutes, 30);
        assert_eq!(d.last_execution_time.as_deref(), Some("2017/09/01 10:15 AM"));
        assert_eq!(d.records_processed, Some(12));
        assert_eq!(d.processing_time_ms, Some(340));
        assert!(d.extra.is_empty());
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let json = r#"{"queryName":"q","cypherQuery":"RETURN 0","runSchedule":5,"owner":"ops","tags":["a","b"]}"#;
        let d: JobDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.extra["owner"], "ops");

        let out = serde_json::to_value(&d).unwrap();
        assert_eq!(out["owner"], "ops");
        assert_eq!(out["tags"], serde_json::json!(["a", "b"]));
        // absent result fields stay absent
        assert!(out.get("lastExecutionTime").is_none());
        assert!(out.get("processingTime").is_none());
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let json = r#"{"queryName":"q","runSchedule":5}"#;
        assert!(serde_json::from_str::<JobDescriptor>(json).is_err());
    }

    #[test]
    fn negative_interval_is_rejected() {
        let json = r#"{"queryName":"q","cypherQuery":"RETURN 0","runSchedule":-1}"#;
        assert!(serde_json::from_str::<JobDescriptor>(json).is_err());
    }

    #[test]
    fn record_run_replaces_all_result_fields() {
        let mut d = JobDescriptor::new("q", "RETURN 0", 10);
        d.records_processed = Some(99);
        d.record_run(
            "2024/01/02 03:04 PM".to_string(),
            &ExecutionReport {
                total_rows: 8,
                elapsed_ms: 42,
                iterations: 3,
                stop: DrainStop::Exhausted,
            },
        );
        assert_eq!(d.last_execution_time.as_deref(), Some("2024/01/02 03:04 PM"));
        assert_eq!(d.records_processed, Some(8));
        assert_eq!(d.processing_time_ms, Some(42));
    }
}
