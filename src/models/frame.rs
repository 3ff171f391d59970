use chrono::{DateTime, Utc};
use std::fmt;
use std::net::IpAddr;

use crate::capture::dns::DnsMessage;

/// One decoded link-layer frame of a capture file
///
/// Frames are produced once by the decoder and only borrowed afterwards.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Ordinal position in the capture, starting at 1
    pub index: u64,

    /// Capture timestamp (absent for pcap-ng simple packet blocks)
    pub timestamp: Option<DateTime<Utc>>,

    /// Length of the frame on the wire
    pub length: usize,

    /// Protocol names from the link layer upwards
    pub layers: Vec<String>,

    /// Layer 2 source (MAC address)
    pub source_mac: Option<String>,

    /// Layer 2 destination (MAC address)
    pub destination_mac: Option<String>,

    /// Source IP address
    pub source_ip: Option<IpAddr>,

    /// Destination IP address
    pub destination_ip: Option<IpAddr>,

    /// TCP/UDP header summary
    pub transport: Option<TransportHeader>,

    /// Transport payload (application data)
    pub payload: Vec<u8>,

    /// DNS message carried by the payload, if any
    pub dns: Option<DnsMessage>,
}

/// Transport protocols the reassembler understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportKind {
    Tcp,
    Udp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "TCP"),
            TransportKind::Udp => write!(f, "UDP"),
        }
    }
}

/// Fields of a TCP or UDP header that downstream components need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHeader {
    pub kind: TransportKind,
    pub source_port: u16,
    pub destination_port: u16,
}

impl Frame {
    /// Create an undissected frame
    pub fn new(index: u64, timestamp: Option<DateTime<Utc>>, length: usize) -> Self {
        Self {
            index,
            timestamp,
            length,
            layers: Vec::new(),
            source_mac: None,
            destination_mac: None,
            source_ip: None,
            destination_ip: None,
            transport: None,
            payload: Vec::new(),
            dns: None,
        }
    }

    /// Source and destination IP:port, when the frame carries TCP or UDP over IP
    pub fn endpoints(&self) -> Option<((IpAddr, u16), (IpAddr, u16))> {
        let transport = self.transport.as_ref()?;
        Some((
            (self.source_ip?, transport.source_port),
            (self.destination_ip?, transport.destination_port),
        ))
    }
}
