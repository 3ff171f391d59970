use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::SuricataReport;
use crate::models::capture::CaptureInfo;

/// How stream payloads are ordered in `text`
pub const STREAM_ORDERING: &str = "capture";

/// One node of the protocol hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolNode {
    pub protocol: String,
    pub frames: u64,
    pub bytes: u64,
    pub children: Vec<ProtocolNode>,
}

/// Role of a MAC address when it was first seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacRole {
    Src,
    Dst,
}

/// A distinct MAC address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacEndpoint {
    pub mac: String,

    /// Vendor from the OUI table
    pub resolved: Option<String>,

    #[serde(rename = "type")]
    pub role: MacRole,
}

/// A distinct IP address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpEndpoint {
    pub ip: String,

    /// Hostname learned from DNS answers in the capture
    pub resolved: Option<String>,

    pub is_private: bool,
    pub is_ipv6: bool,
}

/// Names and public addresses the capture reached out to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalResources {
    pub domains: Vec<String>,
    pub external_ips: Vec<String>,
}

/// Serialized form of a reassembled conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub stream_id: u64,
    pub ip_src: String,
    pub sport: u16,
    pub ip_dst: String,
    pub dport: u16,

    /// Payload of both directions, interleaved in capture order
    pub text: String,

    pub packets: u64,
    pub bytes_src_to_dst: u64,
    pub bytes_dst_to_src: u64,
}

/// Everything returned for one uploaded capture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis_id: Uuid,
    pub file: String,
    pub capture_info: CaptureInfo,
    pub protocol_hierarchy: Vec<ProtocolNode>,
    pub mac_addresses: Vec<MacEndpoint>,
    pub ip_addresses: Vec<IpEndpoint>,
    pub external_resources: ExternalResources,
    pub tcp_streams: Vec<StreamRecord>,
    pub udp_streams: Vec<StreamRecord>,
    pub stream_ordering: String,
    pub suricata: SuricataReport,
}
