//! Minimal DNS message reader
//!
//! Only what the endpoint extractor needs: query names, and the answers that
//! map names to addresses. Anything beyond the answer section is ignored.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const HEADER_LEN: usize = 12;

/// Compression pointers followed before a name is declared corrupt
const MAX_POINTER_JUMPS: usize = 16;

pub const TYPE_A: u16 = 1;
pub const TYPE_NS: u16 = 2;
pub const TYPE_CNAME: u16 = 5;
pub const TYPE_PTR: u16 = 12;
pub const TYPE_AAAA: u16 = 28;

/// A decoded DNS query or response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsMessage {
    pub id: u16,
    pub is_response: bool,
    pub rcode: u8,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsAnswer {
    pub name: String,
    pub rtype: u16,
    pub ttl: u32,
    /// Rendered RDATA for A, AAAA, CNAME, NS and PTR records
    pub data: Option<String>,
}

impl DnsAnswer {
    /// Address carried by an A or AAAA record
    pub fn address(&self) -> Option<IpAddr> {
        match self.rtype {
            TYPE_A | TYPE_AAAA => self.data.as_deref()?.parse().ok(),
            _ => None,
        }
    }
}

/// Parse a DNS message from a UDP payload
pub fn parse_message(data: &[u8]) -> Option<DnsMessage> {
    if data.len() < HEADER_LEN {
        return None;
    }

    let id = read_u16(data, 0)?;
    let flags = read_u16(data, 2)?;
    let qdcount = read_u16(data, 4)? as usize;
    let ancount = read_u16(data, 6)? as usize;

    // Opcode other than QUERY/IQUERY/STATUS is almost certainly not DNS
    if (flags >> 11) & 0x0f > 2 {
        return None;
    }

    let mut pos = HEADER_LEN;
    let mut questions = Vec::with_capacity(qdcount.min(16));
    for _ in 0..qdcount {
        let (name, next) = read_name(data, pos)?;
        let qtype = read_u16(data, next)?;
        // qclass is not interesting
        read_u16(data, next + 2)?;
        questions.push(DnsQuestion { name, qtype });
        pos = next + 4;
    }

    let mut answers = Vec::with_capacity(ancount.min(32));
    for _ in 0..ancount {
        let (name, next) = read_name(data, pos)?;
        let rtype = read_u16(data, next)?;
        let ttl = read_u32(data, next + 4)?;
        let rdlength = read_u16(data, next + 8)? as usize;
        let rdata_start = next + 10;
        let rdata = data.get(rdata_start..rdata_start + rdlength)?;

        let rendered = match rtype {
            TYPE_A if rdlength == 4 => Some(Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]).to_string()),
            TYPE_AAAA if rdlength == 16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(rdata);
                Some(Ipv6Addr::from(octets).to_string())
            }
            TYPE_CNAME | TYPE_NS | TYPE_PTR => read_name(data, rdata_start).map(|(name, _)| name),
            _ => None,
        };

        answers.push(DnsAnswer { name, rtype, ttl, data: rendered });
        pos = rdata_start + rdlength;
    }

    Some(DnsMessage {
        id,
        is_response: flags & 0x8000 != 0,
        rcode: (flags & 0x000f) as u8,
        questions,
        answers,
    })
}

/// Parse a DNS message from a TCP payload (two-byte length prefix)
pub fn parse_tcp_message(data: &[u8]) -> Option<DnsMessage> {
    let length = read_u16(data, 0)? as usize;
    parse_message(data.get(2..2 + length)?)
}

/// Read a possibly compressed name at `start`, returning it and the offset just past it
fn read_name(data: &[u8], start: usize) -> Option<(String, usize)> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = start;
    let mut resume_at = None;
    let mut jumps = 0;

    loop {
        let len = *data.get(pos)? as usize;

        if len == 0 {
            let end = resume_at.unwrap_or(pos + 1);
            return Some((labels.join("."), end));
        }

        if len & 0xc0 == 0xc0 {
            let low = *data.get(pos + 1)? as usize;
            if resume_at.is_none() {
                resume_at = Some(pos + 2);
            }
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return None;
            }
            pos = ((len & 0x3f) << 8) | low;
            continue;
        }

        if len & 0xc0 != 0 {
            // Extended label types are not used in practice
            return None;
        }

        let label = data.get(pos + 1..pos + 1 + len)?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        pos += 1 + len;
    }
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::dns_response;

    #[test]
    fn test_parse_query() {
        let query = crate::testing::dns_query(0x1234, "example.com");
        let msg = parse_message(&query).unwrap();
        assert_eq!(msg.id, 0x1234);
        assert!(!msg.is_response);
        assert_eq!(msg.questions, vec![DnsQuestion { name: "example.com".into(), qtype: TYPE_A }]);
        assert!(msg.answers.is_empty());
    }

    #[test]
    fn test_parse_response_with_compressed_answer() {
        let response = dns_response(7, "www.example.org", [93, 184, 216, 34]);
        let msg = parse_message(&response).unwrap();
        assert!(msg.is_response);
        assert_eq!(msg.rcode, 0);
        assert_eq!(msg.answers.len(), 1);
        assert_eq!(msg.answers[0].name, "www.example.org");
        assert_eq!(msg.answers[0].address(), Some("93.184.216.34".parse().unwrap()));
    }

    #[test]
    fn test_tcp_length_prefix() {
        let query = crate::testing::dns_query(1, "a.b");
        let mut framed = (query.len() as u16).to_be_bytes().to_vec();
        framed.extend_from_slice(&query);
        assert_eq!(parse_tcp_message(&framed).unwrap().questions[0].name, "a.b");
    }

    #[test]
    fn test_pointer_loop_is_rejected() {
        let mut data = vec![0u8; 12];
        data[5] = 1; // one question
        data.extend_from_slice(&[0xc0, 12, 0, 1, 0, 1]);
        assert!(parse_message(&data).is_none());
    }

    #[test]
    fn test_truncated_is_rejected() {
        let response = dns_response(7, "www.example.org", [1, 2, 3, 4]);
        assert!(parse_message(&response[..response.len() - 2]).is_none());
        assert!(parse_message(&[0u8; 5]).is_none());
    }
}
