//! EVE JSON event log ingestion
//!
//! Every line is an independent JSON document. A line that does not parse is
//! counted and skipped, the rest of the log is still read.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A DNS query paired with its response(s)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsTransaction {
    pub flow_id: Option<u64>,
    pub id: Option<u64>,

    /// Timestamp of the first event of the transaction
    pub timestamp: Option<String>,

    pub src_ip: Option<String>,
    pub src_port: Option<u16>,
    pub dest_ip: Option<String>,
    pub dest_port: Option<u16>,

    pub queries: Vec<DnsQueryRecord>,
    pub answers: Vec<DnsAnswerRecord>,
    pub rcode: Option<String>,

    /// A response event was seen
    pub answered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsQueryRecord {
    pub rrname: String,
    pub rrtype: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsAnswerRecord {
    pub rrname: Option<String>,
    pub rrtype: Option<String>,
    pub ttl: Option<u64>,
    pub rdata: Option<String>,
}

/// Typed rendition of an EVE log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EveEvents {
    pub dns: Vec<DnsTransaction>,
    pub alert: Vec<Value>,
    pub http: Vec<Value>,
    pub tls: Vec<Value>,
    pub flow: Vec<Value>,
    pub fileinfo: Vec<Value>,
    pub smtp: Vec<Value>,
    pub ssh: Vec<Value>,
    pub ftp: Vec<Value>,
    pub anomaly: Vec<Value>,

    /// Events of other types, kept only when passthrough is enabled
    pub unclassified: Vec<Value>,

    pub malformed_lines: usize,
}

/// The `dns` object of an event, covering the v1/v2 (`type`) and v3 (`queries`) layouts
#[derive(Debug, Default, Deserialize)]
struct RawDns {
    #[serde(rename = "type")]
    kind: Option<String>,
    id: Option<u64>,
    rrname: Option<String>,
    rrtype: Option<String>,
    rcode: Option<String>,
    ttl: Option<u64>,
    rdata: Option<Value>,
    #[serde(default)]
    queries: Vec<RawRecord>,
    #[serde(default)]
    answers: Vec<RawRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRecord {
    rrname: Option<String>,
    rrtype: Option<String>,
    ttl: Option<u64>,
    rdata: Option<Value>,
}

impl RawDns {
    fn is_response(&self) -> bool {
        matches!(self.kind.as_deref(), Some("answer") | Some("response"))
    }

    fn query_records(&self) -> Vec<DnsQueryRecord> {
        if !self.queries.is_empty() {
            return self
                .queries
                .iter()
                .filter_map(|q| {
                    Some(DnsQueryRecord {
                        rrname: q.rrname.clone()?,
                        rrtype: q.rrtype.clone(),
                    })
                })
                .collect();
        }
        match (&self.rrname, self.is_response()) {
            (Some(rrname), false) => vec![DnsQueryRecord {
                rrname: rrname.clone(),
                rrtype: self.rrtype.clone(),
            }],
            _ => Vec::new(),
        }
    }

    fn answer_records(&self) -> Vec<DnsAnswerRecord> {
        if !self.answers.is_empty() {
            return self
                .answers
                .iter()
                .map(|a| DnsAnswerRecord {
                    rrname: a.rrname.clone(),
                    rrtype: a.rrtype.clone(),
                    ttl: a.ttl,
                    rdata: a.rdata.as_ref().map(render_rdata),
                })
                .collect();
        }
        // v1 logs one answer per event with the record inline
        if self.is_response() && (self.rdata.is_some() || self.rrname.is_some()) {
            return vec![DnsAnswerRecord {
                rrname: self.rrname.clone(),
                rrtype: self.rrtype.clone(),
                ttl: self.ttl,
                rdata: self.rdata.as_ref().map(render_rdata),
            }];
        }
        Vec::new()
    }
}

fn render_rdata(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse an EVE log
///
/// `keep_unclassified` controls whether events of unrecognized types are
/// retained.
pub fn parse_eve_log(content: &str, keep_unclassified: bool) -> EveEvents {
    let mut events = EveEvents::default();
    let mut dns_index: HashMap<(u64, u64), usize> = HashMap::new();

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => Value::Object(map),
            Ok(_) => {
                debug!("EVE line {} is not a JSON object", lineno + 1);
                events.malformed_lines += 1;
                continue;
            }
            Err(e) => {
                debug!("EVE line {} skipped: {}", lineno + 1, e);
                events.malformed_lines += 1;
                continue;
            }
        };

        let event_type = event
            .get("event_type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match event_type.as_str() {
            "dns" => ingest_dns(&mut events.dns, &mut dns_index, &event),
            "alert" => events.alert.push(event),
            "http" => events.http.push(event),
            "tls" => events.tls.push(event),
            "flow" => events.flow.push(event),
            "fileinfo" => events.fileinfo.push(event),
            "smtp" => events.smtp.push(event),
            "ssh" => events.ssh.push(event),
            "ftp" => events.ftp.push(event),
            "anomaly" => events.anomaly.push(event),
            _ if keep_unclassified => events.unclassified.push(event),
            _ => {}
        }
    }

    events
}

fn ingest_dns(transactions: &mut Vec<DnsTransaction>, index: &mut HashMap<(u64, u64), usize>, event: &Value) {
    let raw: RawDns = event
        .get("dns")
        .and_then(|dns| serde_json::from_value(dns.clone()).ok())
        .unwrap_or_default();
    let flow_id = event.get("flow_id").and_then(Value::as_u64);

    let key = flow_id.zip(raw.id);
    let existing = key.and_then(|k| index.get(&k).copied());

    let idx = match existing {
        Some(idx) => idx,
        None => {
            let is_response = raw.is_response();
            // Responses travel server to client, so the endpoints are swapped
            let (src, dest) = if is_response { ("dest", "src") } else { ("src", "dest") };
            transactions.push(DnsTransaction {
                flow_id,
                id: raw.id,
                timestamp: event.get("timestamp").and_then(Value::as_str).map(str::to_string),
                src_ip: string_field(event, &format!("{}_ip", src)),
                src_port: port_field(event, &format!("{}_port", src)),
                dest_ip: string_field(event, &format!("{}_ip", dest)),
                dest_port: port_field(event, &format!("{}_port", dest)),
                ..DnsTransaction::default()
            });
            let idx = transactions.len() - 1;
            if let Some(k) = key {
                index.insert(k, idx);
            }
            idx
        }
    };

    let tx = &mut transactions[idx];
    for query in raw.query_records() {
        if !tx.queries.contains(&query) {
            tx.queries.push(query);
        }
    }
    if raw.is_response() {
        tx.answered = true;
        if raw.rcode.is_some() {
            tx.rcode = raw.rcode.clone();
        }
        tx.answers.extend(raw.answer_records());
    }
}

fn string_field(event: &Value, name: &str) -> Option<String> {
    event.get(name).and_then(Value::as_str).map(str::to_string)
}

fn port_field(event: &Value, name: &str) -> Option<u16> {
    event
        .get(name)
        .and_then(Value::as_u64)
        .and_then(|port| u16::try_from(port).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY_V2: &str = r#"{"timestamp":"2023-10-05T14:02:11.100000+0000","flow_id":42,"event_type":"dns","src_ip":"10.0.0.5","src_port":53000,"dest_ip":"8.8.8.8","dest_port":53,"proto":"UDP","dns":{"type":"query","id":4660,"rrname":"example.com","rrtype":"A","tx_id":0}}"#;
    const ANSWER_V2: &str = r#"{"timestamp":"2023-10-05T14:02:11.130000+0000","flow_id":42,"event_type":"dns","src_ip":"8.8.8.8","src_port":53,"dest_ip":"10.0.0.5","dest_port":53000,"proto":"UDP","dns":{"version":2,"type":"answer","id":4660,"rcode":"NOERROR","answers":[{"rrname":"example.com","rrtype":"A","ttl":300,"rdata":"93.184.216.34"}]}}"#;

    #[test]
    fn test_query_and_answer_are_paired() {
        let log = format!("{}\n{}\n", QUERY_V2, ANSWER_V2);
        let events = parse_eve_log(&log, false);

        assert_eq!(events.dns.len(), 1);
        let tx = &events.dns[0];
        assert_eq!(tx.flow_id, Some(42));
        assert_eq!(tx.src_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(tx.dest_port, Some(53));
        assert_eq!(tx.queries, vec![DnsQueryRecord { rrname: "example.com".into(), rrtype: Some("A".into()) }]);
        assert!(tx.answered);
        assert_eq!(tx.rcode.as_deref(), Some("NOERROR"));
        assert_eq!(tx.answers[0].rdata.as_deref(), Some("93.184.216.34"));
        assert_eq!(events.malformed_lines, 0);
    }

    #[test]
    fn test_v3_layout() {
        let request = r#"{"flow_id":7,"event_type":"dns","src_ip":"10.0.0.5","dest_ip":"1.1.1.1","dns":{"version":3,"type":"request","id":1,"queries":[{"rrname":"a.test","rrtype":"AAAA"}]}}"#;
        let response = r#"{"flow_id":7,"event_type":"dns","src_ip":"1.1.1.1","dest_ip":"10.0.0.5","dns":{"version":3,"type":"response","id":1,"rcode":"NXDOMAIN","queries":[{"rrname":"a.test","rrtype":"AAAA"}]}}"#;
        let events = parse_eve_log(&format!("{}\n{}", request, response), false);

        assert_eq!(events.dns.len(), 1);
        assert_eq!(events.dns[0].queries.len(), 1);
        assert_eq!(events.dns[0].rcode.as_deref(), Some("NXDOMAIN"));
        assert!(events.dns[0].answers.is_empty());
    }

    #[test]
    fn test_unpaired_response_uses_client_side() {
        let events = parse_eve_log(ANSWER_V2, false);
        assert_eq!(events.dns.len(), 1);
        assert_eq!(events.dns[0].src_ip.as_deref(), Some("10.0.0.5"));
        assert!(events.dns[0].queries.is_empty());
    }

    #[test]
    fn test_truncated_trailing_line_keeps_previous_events() {
        let log = format!(
            "{}\n{{\"event_type\":\"alert\",\"alert\":{{\"signature_id\":1}}}}\n{{\"event_type\":\"flow\",\"fl",
            QUERY_V2
        );
        let events = parse_eve_log(&log, false);
        assert_eq!(events.dns.len(), 1);
        assert_eq!(events.alert.len(), 1);
        assert!(events.flow.is_empty());
        assert_eq!(events.malformed_lines, 1);
    }

    #[test]
    fn test_garbage_in_the_middle_does_not_stop_parsing() {
        let log = "{\"event_type\":\"http\"}\nnot json\n[1,2]\n\n{\"event_type\":\"tls\"}\n";
        let events = parse_eve_log(log, false);
        assert_eq!(events.http.len(), 1);
        assert_eq!(events.tls.len(), 1);
        assert_eq!(events.malformed_lines, 2);
    }

    #[test]
    fn test_unclassified_passthrough() {
        let log = "{\"event_type\":\"stats\",\"stats\":{}}\n{\"event_type\":\"quic\"}\n";
        assert!(parse_eve_log(log, false).unclassified.is_empty());
        assert_eq!(parse_eve_log(log, true).unclassified.len(), 2);
    }
}
