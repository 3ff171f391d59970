//! Signature engine invocation and log ingestion
//!
//! The four logs are parsed independently: a missing or unreadable one
//! leaves its section empty without affecting the others.

pub mod alerts;
pub mod engine;
pub mod engine_log;
pub mod eve;
pub mod stats;

use serde::{Deserialize, Serialize};

use crate::ids::alerts::{parse_fast_log, AlertsByPriority};
use crate::ids::engine::{EngineError, EngineLogs};
use crate::ids::engine_log::{parse_engine_log, EngineLogLine};
use crate::ids::eve::{parse_eve_log, EveEvents};
use crate::ids::stats::{parse_stats_log, ParsedStat};

/// The `suricata` section of an analysis result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuricataReport {
    /// Raw log text, `null` when the log was not produced
    pub eve: Option<String>,
    pub fast: Option<String>,
    pub stats: Option<String>,
    pub suricata: Option<String>,

    pub alerts: AlertsByPriority,
    pub stats_counters: Vec<ParsedStat>,
    pub events: EveEvents,
    pub engine_log: Vec<EngineLogLine>,

    /// Why the engine produced nothing
    pub error: Option<String>,
}

impl SuricataReport {
    /// Normalize whatever logs the engine wrote
    pub fn from_logs(logs: EngineLogs, keep_unclassified: bool) -> Self {
        Self {
            alerts: logs.fast.as_deref().map(parse_fast_log).unwrap_or_default(),
            stats_counters: logs.stats.as_deref().map(parse_stats_log).unwrap_or_default(),
            events: logs
                .eve
                .as_deref()
                .map(|eve| parse_eve_log(eve, keep_unclassified))
                .unwrap_or_default(),
            engine_log: logs.suricata.as_deref().map(parse_engine_log).unwrap_or_default(),
            eve: logs.eve,
            fast: logs.fast,
            stats: logs.stats,
            suricata: logs.suricata,
            error: None,
        }
    }

    /// Empty section carrying the engine failure
    pub fn failed(error: &EngineError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    /// Number of alerts across all priorities
    pub fn alert_count(&self) -> usize {
        self.alerts.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_are_independent() {
        let logs = EngineLogs {
            eve: None,
            fast: Some("[**] a [**] [Priority: 2] {TCP} x -> y\n".into()),
            stats: None,
            suricata: Some("garbage line\n".into()),
        };
        let report = SuricataReport::from_logs(logs, false);
        assert_eq!(report.alert_count(), 1);
        assert!(report.eve.is_none());
        assert_eq!(report.events, EveEvents::default());
        assert_eq!(report.engine_log.len(), 1);
        assert!(report.error.is_none());
    }

    #[test]
    fn test_failed_report_serializes_nulls() {
        let report = SuricataReport::failed(&EngineError::Timeout(90));
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["eve"].is_null());
        assert!(json["fast"].is_null());
        assert!(json["stats"].is_null());
        assert!(json["suricata"].is_null());
        assert!(json["error"].as_str().unwrap().starts_with("SecurityEngineFailed"));
        assert_eq!(json["events"]["malformed_lines"], 0);
    }
}
