use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// `5/10/2023 -- 14:02:11 - <Notice> - This is Suricata version 7.0.2 RELEASE`
    static ref ENGINE_LINE: Regex =
        Regex::new(r"^(?P<ts>[\d/:\s-]+?)\s+-\s+<(?P<level>\w+)>\s+-\s+(?P<msg>.*)$").unwrap();
}

/// Severity of a structured engine log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineLogLevel {
    Notice,
    Info,
    Warning,
}

impl EngineLogLevel {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "Notice" => Some(EngineLogLevel::Notice),
            "Info" => Some(EngineLogLevel::Info),
            "Warning" => Some(EngineLogLevel::Warning),
            _ => None,
        }
    }
}

/// One line of suricata.log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EngineLogLine {
    Structured {
        timestamp: String,
        level: EngineLogLevel,
        message: String,
    },
    Raw {
        text: String,
    },
}

pub fn parse_engine_line(line: &str) -> EngineLogLine {
    let structured = ENGINE_LINE.captures(line).and_then(|caps| {
        let level = EngineLogLevel::from_name(caps.name("level")?.as_str())?;
        Some(EngineLogLine::Structured {
            timestamp: caps.name("ts")?.as_str().trim().to_string(),
            level,
            message: caps.name("msg")?.as_str().to_string(),
        })
    });

    structured.unwrap_or_else(|| EngineLogLine::Raw { text: line.to_string() })
}

/// Parse suricata.log, one entry per non-empty line
pub fn parse_engine_log(content: &str) -> Vec<EngineLogLine> {
    content
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(parse_engine_line)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_levels() {
        let line = "5/10/2023 -- 14:02:11 - <Notice> - This is Suricata version 7.0.2 RELEASE";
        assert_eq!(
            parse_engine_line(line),
            EngineLogLine::Structured {
                timestamp: "5/10/2023 -- 14:02:11".into(),
                level: EngineLogLevel::Notice,
                message: "This is Suricata version 7.0.2 RELEASE".into(),
            }
        );

        match parse_engine_line("5/10/2023 -- 14:02:12 - <Warning> - [ERRCODE: SC_ERR_NO_RULES(42)] - no rules") {
            EngineLogLine::Structured { level, message, .. } => {
                assert_eq!(level, EngineLogLevel::Warning);
                assert!(message.contains("no rules"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_other_levels_and_text_are_raw() {
        let error = "5/10/2023 -- 14:02:12 - <Error> - failed";
        assert_eq!(parse_engine_line(error), EngineLogLine::Raw { text: error.into() });
        assert_eq!(
            parse_engine_line("plain text"),
            EngineLogLine::Raw { text: "plain text".into() }
        );
    }

    #[test]
    fn test_blank_lines_are_dropped() {
        let lines = parse_engine_log("\n5/10/2023 -- 14:02:11 - <Info> - ready\n\n   \nfree text\n");
        assert_eq!(lines.len(), 2);
    }
}
