use serde::{Deserialize, Serialize};

/// A counter from stats.log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedStat {
    pub name: String,
    pub value: String,
}

/// Extract counters from the `name | Total | value` table rows
///
/// Header and separator rows lack either the `|` or the `Total` marker and are
/// ignored.
pub fn parse_stats_log(content: &str) -> Vec<ParsedStat> {
    content
        .lines()
        .filter(|line| line.contains('|') && line.contains("Total"))
        .filter_map(|line| {
            let columns: Vec<&str> = line.split('|').map(str::trim).collect();
            let name = columns.first()?;
            let value = columns.get(2).or_else(|| columns.last())?;
            if name.is_empty() {
                return None;
            }
            Some(ParsedStat {
                name: name.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}
