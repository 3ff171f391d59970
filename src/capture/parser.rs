use anyhow::{anyhow, Result};
use log::{log_enabled, trace, Level};
use pnet::packet::{
    arp::ArpPacket,
    ethernet::{EtherType, EtherTypes, EthernetPacket},
    icmp::IcmpPacket,
    icmpv6::Icmpv6Packet,
    ip::{IpNextHeaderProtocol, IpNextHeaderProtocols},
    ipv4::Ipv4Packet,
    ipv6::Ipv6Packet,
    sll::SLLPacket,
    tcp::TcpPacket,
    udp::UdpPacket,
    vlan::VlanPacket,
    Packet as PnetPacket,
};
use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::capture::dns;
use crate::models::frame::{Frame, TransportHeader, TransportKind};

/// Link-layer header types the dissector can start from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkType {
    /// BSD loopback encapsulation (DLT_NULL)
    Null,
    Ethernet,
    /// Raw IP, version taken from the first nibble
    RawIp,
    RawIpv4,
    RawIpv6,
    /// Linux cooked capture v1
    LinuxSll,
}

impl LinkType {
    /// Map a LINKTYPE_* value to a supported link type
    pub fn from_linktype(value: i32) -> Option<Self> {
        match value {
            0 => Some(LinkType::Null),
            1 => Some(LinkType::Ethernet),
            101 => Some(LinkType::RawIp),
            113 => Some(LinkType::LinuxSll),
            228 => Some(LinkType::RawIpv4),
            229 => Some(LinkType::RawIpv6),
            _ => None,
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkType::Null => "NULL",
            LinkType::Ethernet => "ETHERNET",
            LinkType::RawIp => "RAW",
            LinkType::RawIpv4 => "IPV4",
            LinkType::RawIpv6 => "IPV6",
            LinkType::LinuxSll => "LINUX_SLL",
        };
        write!(f, "{}", name)
    }
}

const ARPHRD_ETHER: u16 = 1;
const NULL_HEADER_LEN: usize = 4;

/// Layer name of a frame whose link-layer header could not be read
pub const MALFORMED_LAYER: &str = "Malformed";

/// Fills in the layer stack and header fields of decoded frames
pub struct FrameDissector {
    link_type: LinkType,
}

impl FrameDissector {
    /// Create a dissector for frames of one link type
    pub fn new(link_type: LinkType) -> Self {
        Self { link_type }
    }

    /// Dissect the raw bytes of one frame into `frame`
    ///
    /// Never fails: a header that cannot be decoded ends the layer stack and
    /// whatever was decoded up to that point is kept.
    pub fn dissect(&self, data: &[u8], frame: &mut Frame) {
        let result = match self.link_type {
            LinkType::Ethernet => self.parse_ethernet(data, frame),
            LinkType::LinuxSll => self.parse_sll(data, frame),
            LinkType::Null => self.parse_null(data, frame),
            LinkType::RawIp => match data.first().map(|b| b >> 4) {
                Some(4) => self.parse_ipv4(data, frame),
                Some(6) => self.parse_ipv6(data, frame),
                _ => Err(anyhow!("Raw IP frame with unknown version")),
            },
            LinkType::RawIpv4 => self.parse_ipv4(data, frame),
            LinkType::RawIpv6 => self.parse_ipv6(data, frame),
        };

        if let Err(e) = result {
            if log_enabled!(Level::Trace) {
                trace!("Frame {}: dissection stopped after {:?}: {}", frame.index, frame.layers, e);
            }
        }

        // Every frame needs a top-level layer for the hierarchy
        if frame.layers.is_empty() {
            frame.layers.push(MALFORMED_LAYER.to_string());
        }
    }

    /// Parse Ethernet frame
    fn parse_ethernet(&self, data: &[u8], frame: &mut Frame) -> Result<()> {
        let eth_packet = match EthernetPacket::new(data) {
            Some(packet) => packet,
            None => return Err(anyhow!("Failed to parse Ethernet frame")),
        };

        frame.layers.push("Ethernet".to_string());
        frame.source_mac = Some(self.format_mac(eth_packet.get_source()));
        frame.destination_mac = Some(self.format_mac(eth_packet.get_destination()));

        self.parse_ethertype(eth_packet.get_ethertype(), eth_packet.payload(), frame)
    }

    /// Parse Linux cooked capture header
    fn parse_sll(&self, data: &[u8], frame: &mut Frame) -> Result<()> {
        let sll_packet = match SLLPacket::new(data) {
            Some(packet) => packet,
            None => return Err(anyhow!("Failed to parse Linux cooked header")),
        };

        frame.layers.push("SLL".to_string());

        // ARPHRD_ETHER with a 6-byte address carries the sender MAC
        if sll_packet.get_link_layer_address_type() == ARPHRD_ETHER && sll_packet.get_link_layer_address_len() == 6 {
            let a = sll_packet.get_link_layer_address();
            frame.source_mac = Some(self.format_mac(MacAddr::new(a[0], a[1], a[2], a[3], a[4], a[5])));
        }

        self.parse_ethertype(sll_packet.get_protocol(), sll_packet.payload(), frame)
    }

    /// Parse BSD loopback header (address family in host byte order)
    fn parse_null(&self, data: &[u8], frame: &mut Frame) -> Result<()> {
        if data.len() < NULL_HEADER_LEN {
            return Err(anyhow!("Failed to parse loopback header"));
        }

        frame.layers.push("Loopback".to_string());

        let le = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let be = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let payload = &data[NULL_HEADER_LEN..];
        match (le, be) {
            (2, _) | (_, 2) => self.parse_ipv4(payload, frame),
            (24, _) | (28, _) | (30, _) | (_, 24) | (_, 28) | (_, 30) => self.parse_ipv6(payload, frame),
            _ => Err(anyhow!("Unknown loopback address family {}", le)),
        }
    }

    /// Dispatch on the EtherType of an Ethernet, VLAN or SLL header
    fn parse_ethertype(&self, ethertype: EtherType, payload: &[u8], frame: &mut Frame) -> Result<()> {
        match ethertype {
            EtherTypes::Ipv4 => self.parse_ipv4(payload, frame),
            EtherTypes::Ipv6 => self.parse_ipv6(payload, frame),
            EtherTypes::Arp => self.parse_arp(payload, frame),
            EtherTypes::Vlan | EtherTypes::QinQ => {
                let vlan_packet = match VlanPacket::new(payload) {
                    Some(packet) => packet,
                    None => return Err(anyhow!("Failed to parse VLAN tag")),
                };
                frame.layers.push("VLAN".to_string());
                self.parse_ethertype(vlan_packet.get_ethertype(), vlan_packet.payload(), frame)
            }
            other => {
                frame.layers.push(format!("EtherType(0x{:04x})", other.0));
                Ok(())
            }
        }
    }

    /// Parse IPv4 packet
    fn parse_ipv4(&self, data: &[u8], frame: &mut Frame) -> Result<()> {
        let ipv4_packet = match Ipv4Packet::new(data) {
            Some(packet) => packet,
            None => return Err(anyhow!("Failed to parse IPv4 packet")),
        };

        let header_len = ipv4_packet.get_header_length() as usize * 4;
        if ipv4_packet.get_version() != 4 || header_len < 20 || header_len > data.len() {
            return Err(anyhow!("Invalid IPv4 header length {}", header_len));
        }

        frame.layers.push("IPv4".to_string());
        frame.source_ip = Some(IpAddr::V4(ipv4_packet.get_source()));
        frame.destination_ip = Some(IpAddr::V4(ipv4_packet.get_destination()));

        // Bound the payload by the total length so Ethernet padding is not taken as data.
        // Segmentation offload leaves the field at 0 on the sending host: use the frame.
        let total_len = match ipv4_packet.get_total_length() as usize {
            len if len < header_len => data.len(),
            len => len.min(data.len()),
        };
        let payload = &data[header_len..total_len];

        // Only the first fragment carries the transport header
        if ipv4_packet.get_fragment_offset() != 0 {
            frame.layers.push("Fragment".to_string());
            return Ok(());
        }

        self.parse_transport_protocol(ipv4_packet.get_next_level_protocol(), payload, frame)
    }

    /// Parse IPv6 packet, skipping extension headers
    fn parse_ipv6(&self, data: &[u8], frame: &mut Frame) -> Result<()> {
        let ipv6_packet = match Ipv6Packet::new(data) {
            Some(packet) => packet,
            None => return Err(anyhow!("Failed to parse IPv6 packet")),
        };

        frame.layers.push("IPv6".to_string());
        frame.source_ip = Some(IpAddr::V6(ipv6_packet.get_source()));
        frame.destination_ip = Some(IpAddr::V6(ipv6_packet.get_destination()));

        let mut next_header = ipv6_packet.get_next_header();
        let mut payload = ipv6_packet.payload();

        loop {
            match next_header {
                IpNextHeaderProtocols::Hopopt
                | IpNextHeaderProtocols::Ipv6Route
                | IpNextHeaderProtocols::Ipv6Opts => {
                    if payload.len() < 8 {
                        return Err(anyhow!("Truncated IPv6 extension header"));
                    }
                    let ext_len = (payload[1] as usize + 1) * 8;
                    if ext_len > payload.len() {
                        return Err(anyhow!("Truncated IPv6 extension header"));
                    }
                    next_header = IpNextHeaderProtocol(payload[0]);
                    payload = &payload[ext_len..];
                }
                IpNextHeaderProtocols::Ipv6Frag => {
                    if payload.len() < 8 {
                        return Err(anyhow!("Truncated IPv6 fragment header"));
                    }
                    let offset = u16::from_be_bytes([payload[2], payload[3]]) >> 3;
                    if offset != 0 {
                        frame.layers.push("Fragment".to_string());
                        return Ok(());
                    }
                    next_header = IpNextHeaderProtocol(payload[0]);
                    payload = &payload[8..];
                }
                _ => break,
            }
        }

        self.parse_transport_protocol(next_header, payload, frame)
    }

    /// Parse ARP packet
    fn parse_arp(&self, data: &[u8], frame: &mut Frame) -> Result<()> {
        if ArpPacket::new(data).is_none() {
            return Err(anyhow!("Failed to parse ARP packet"));
        }

        frame.layers.push("ARP".to_string());

        // No further parsing required for ARP
        Ok(())
    }

    /// Parse transport layer protocols
    fn parse_transport_protocol(&self, proto: IpNextHeaderProtocol, data: &[u8], frame: &mut Frame) -> Result<()> {
        if log_enabled!(Level::Trace) {
            trace!("Frame {}: transport protocol {:?}, {} bytes", frame.index, proto, data.len());
        }

        match proto {
            IpNextHeaderProtocols::Tcp => self.parse_tcp(data, frame),
            IpNextHeaderProtocols::Udp => self.parse_udp(data, frame),
            IpNextHeaderProtocols::Icmp => {
                if IcmpPacket::new(data).is_none() {
                    return Err(anyhow!("Failed to parse ICMP packet"));
                }
                frame.layers.push("ICMP".to_string());
                Ok(())
            }
            IpNextHeaderProtocols::Icmpv6 => {
                if Icmpv6Packet::new(data).is_none() {
                    return Err(anyhow!("Failed to parse ICMPv6 packet"));
                }
                frame.layers.push("ICMPv6".to_string());
                Ok(())
            }
            other => {
                frame.layers.push(format!("IP({})", other.0));
                Ok(())
            }
        }
    }

    /// Parse TCP segment
    fn parse_tcp(&self, data: &[u8], frame: &mut Frame) -> Result<()> {
        let tcp_packet = match TcpPacket::new(data) {
            Some(packet) => packet,
            None => return Err(anyhow!("Failed to parse TCP segment")),
        };

        let header_len = tcp_packet.get_data_offset() as usize * 4;
        if header_len < 20 || header_len > data.len() {
            return Err(anyhow!("Invalid TCP data offset {}", header_len));
        }

        frame.layers.push("TCP".to_string());
        frame.transport = Some(TransportHeader {
            kind: TransportKind::Tcp,
            source_port: tcp_packet.get_source(),
            destination_port: tcp_packet.get_destination(),
        });
        frame.payload = data[header_len..].to_vec();

        self.parse_application(TransportKind::Tcp, tcp_packet.get_source(), tcp_packet.get_destination(), frame);
        Ok(())
    }

    /// Parse UDP datagram
    fn parse_udp(&self, data: &[u8], frame: &mut Frame) -> Result<()> {
        let udp_packet = match UdpPacket::new(data) {
            Some(packet) => packet,
            None => return Err(anyhow!("Failed to parse UDP datagram")),
        };

        frame.layers.push("UDP".to_string());
        frame.transport = Some(TransportHeader {
            kind: TransportKind::Udp,
            source_port: udp_packet.get_source(),
            destination_port: udp_packet.get_destination(),
        });
        frame.payload = udp_packet.payload().to_vec();

        self.parse_application(TransportKind::Udp, udp_packet.get_source(), udp_packet.get_destination(), frame);
        Ok(())
    }

    /// Label the application layer and decode DNS
    fn parse_application(&self, kind: TransportKind, sport: u16, dport: u16, frame: &mut Frame) {
        let is_port = |port: u16| sport == port || dport == port;

        if is_port(53) || is_port(5353) {
            let message = match kind {
                TransportKind::Udp => dns::parse_message(&frame.payload),
                TransportKind::Tcp => dns::parse_tcp_message(&frame.payload),
            };
            if let Some(message) = message {
                frame.layers.push(if is_port(5353) { "MDNS" } else { "DNS" }.to_string());
                frame.dns = Some(message);
                return;
            }
        }

        if let Some(name) = application_label(kind, sport, dport, &frame.payload) {
            frame.layers.push(name.to_string());
        }
    }

    /// Format MAC address to a readable string
    fn format_mac(&self, mac: MacAddr) -> String {
        format!("{}", mac)
    }
}

const HTTP_METHODS: &[&[u8]] = &[
    b"GET ", b"POST ", b"PUT ", b"HEAD ", b"DELETE ", b"OPTIONS ", b"PATCH ", b"CONNECT ", b"TRACE ",
];

/// Name of the application protocol carried by a payload, from ports and content
pub fn application_label(kind: TransportKind, sport: u16, dport: u16, payload: &[u8]) -> Option<&'static str> {
    if payload.is_empty() {
        return None;
    }

    let is_port = |port: u16| sport == port || dport == port;

    match kind {
        TransportKind::Tcp => {
            if payload.starts_with(b"HTTP/1.") || HTTP_METHODS.iter().any(|m| payload.starts_with(m)) {
                return Some("HTTP");
            }
            if payload.len() >= 5 && (0x14..=0x17).contains(&payload[0]) && payload[1] == 0x03 {
                return Some("TLS");
            }
            if payload.starts_with(b"SSH-") {
                return Some("SSH");
            }
        }
        TransportKind::Udp => {
            if is_port(67) || is_port(68) {
                return Some("DHCP");
            }
            if is_port(123) {
                return Some("NTP");
            }
        }
    }

    Some("Data")
}
