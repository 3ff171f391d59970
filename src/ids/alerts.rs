use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

lazy_static! {
    /// `<ts>  [**] [gid:sid:rev] msg [**] [Classification: c] [Priority: n] {PROTO} src -> dst`
    static ref FAST_LINE: Regex = Regex::new(
        r"^(?P<ts>.*?)\s*\[\*\*\]\s+(?:\[(?P<gid>\d+):(?P<sid>\d+):(?P<rev>\d+)\]\s+)?(?P<msg>.*?)\s+\[\*\*\]"
    )
    .unwrap();
    static ref CLASSIFICATION: Regex = Regex::new(r"\[Classification:\s*(?P<class>[^\]]*)\]").unwrap();
    static ref PRIORITY: Regex =
        Regex::new(r"\[Priority:\s*(?P<prio>\d+)\]\s+\{(?P<proto>.*?)\}\s+(?P<details>.*)$").unwrap();
}

/// One alert of the engine's fast log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAlert {
    pub message: String,

    /// Smaller is more severe
    pub priority: u32,

    pub gid: Option<u32>,
    pub signature_id: Option<u64>,
    pub revision: Option<u32>,
    pub classification: Option<String>,
    pub protocol: String,
    pub source: Option<String>,
    pub destination: Option<String>,

    /// Timestamp text as written by the engine
    pub timestamp: Option<String>,

    pub raw_line: String,
}

/// Alerts keyed by priority, log order kept within a priority
pub type AlertsByPriority = BTreeMap<u32, Vec<ParsedAlert>>;

/// Parse a single fast.log line; banners and anything else yield `None`
pub fn parse_alert_line(line: &str) -> Option<ParsedAlert> {
    let line = line.trim_end_matches(['\r', '\n']);
    let head = FAST_LINE.captures(line)?;
    let tail = PRIORITY.captures(line)?;

    let priority = tail.name("prio")?.as_str().parse().ok()?;
    let details = tail.name("details").map_or("", |m| m.as_str()).trim();
    let (source, destination) = match details.split_once(" -> ") {
        Some((src, dst)) => (Some(src.trim().to_string()), Some(dst.trim().to_string())),
        None if details.is_empty() => (None, None),
        None => (Some(details.to_string()), None),
    };

    let timestamp = head
        .name("ts")
        .map(|m| m.as_str().trim())
        .filter(|ts| !ts.is_empty())
        .map(str::to_string);

    Some(ParsedAlert {
        message: head.name("msg")?.as_str().trim().to_string(),
        priority,
        gid: head.name("gid").and_then(|m| m.as_str().parse().ok()),
        signature_id: head.name("sid").and_then(|m| m.as_str().parse().ok()),
        revision: head.name("rev").and_then(|m| m.as_str().parse().ok()),
        classification: CLASSIFICATION
            .captures(line)
            .and_then(|c| c.name("class"))
            .map(|m| m.as_str().trim().to_string()),
        protocol: tail.name("proto").map_or("", |m| m.as_str()).to_string(),
        source,
        destination,
        timestamp,
        raw_line: line.to_string(),
    })
}

/// Parse a whole fast.log and group the alerts by priority
pub fn parse_fast_log(content: &str) -> AlertsByPriority {
    let mut grouped = AlertsByPriority::new();
    for alert in content.lines().filter_map(parse_alert_line) {
        grouped.entry(alert.priority).or_default().push(alert);
    }
    grouped
}
