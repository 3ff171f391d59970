//! Builders for synthetic frames and capture files
//!
//! Used by the unit tests and by the integration tests under `tests/`.
//! Checksums are left at zero; nothing in the crate verifies them.

pub const MAC_A: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
pub const MAC_B: [u8; 6] = [0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb];

pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

pub const TCP_SYN: u8 = 0x02;
pub const TCP_ACK: u8 = 0x10;
pub const TCP_PSH_ACK: u8 = 0x18;

/// Ethernet II frame around an IPv4 packet
pub fn ethernet_ipv4(src_mac: [u8; 6], dst_mac: [u8; 6], src: [u8; 4], dst: [u8; 4], proto: u8, transport: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14 + 20 + transport.len());
    frame.extend_from_slice(&dst_mac);
    frame.extend_from_slice(&src_mac);
    frame.extend_from_slice(&[0x08, 0x00]);
    frame.extend_from_slice(&ipv4_packet(src, dst, proto, transport));
    frame
}

/// IPv4 packet with a 20-byte header
pub fn ipv4_packet(src: [u8; 4], dst: [u8; 4], proto: u8, payload: &[u8]) -> Vec<u8> {
    let total = (20 + payload.len()) as u16;
    let mut packet = Vec::with_capacity(total as usize);
    packet.extend_from_slice(&[0x45, 0x00]);
    packet.extend_from_slice(&total.to_be_bytes());
    // id, flags (DF), fragment offset 0
    packet.extend_from_slice(&[0x00, 0x01, 0x40, 0x00]);
    packet.extend_from_slice(&[64, proto, 0x00, 0x00]);
    packet.extend_from_slice(&src);
    packet.extend_from_slice(&dst);
    packet.extend_from_slice(payload);
    packet
}

/// IPv4 packet carrying a UDP datagram
pub fn ipv4_udp(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    ipv4_packet(src, dst, PROTO_UDP, &udp_datagram(sport, dport, payload))
}

/// TCP segment with a 20-byte header
pub fn tcp_segment(sport: u16, dport: u16, seq: u32, flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut segment = Vec::with_capacity(20 + payload.len());
    segment.extend_from_slice(&sport.to_be_bytes());
    segment.extend_from_slice(&dport.to_be_bytes());
    segment.extend_from_slice(&seq.to_be_bytes());
    segment.extend_from_slice(&0u32.to_be_bytes());
    segment.extend_from_slice(&[0x50, flags]);
    segment.extend_from_slice(&0xffffu16.to_be_bytes());
    segment.extend_from_slice(&[0, 0, 0, 0]);
    segment.extend_from_slice(payload);
    segment
}

/// UDP datagram
pub fn udp_datagram(sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(8 + payload.len());
    datagram.extend_from_slice(&sport.to_be_bytes());
    datagram.extend_from_slice(&dport.to_be_bytes());
    datagram.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    datagram.extend_from_slice(&[0, 0]);
    datagram.extend_from_slice(payload);
    datagram
}

fn encode_name(name: &str, out: &mut Vec<u8>) {
    for label in name.split('.').filter(|l| !l.is_empty()) {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
}

/// Standard recursive query for an A record
pub fn dns_query(id: u16, name: &str) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.extend_from_slice(&id.to_be_bytes());
    msg.extend_from_slice(&[0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    encode_name(name, &mut msg);
    msg.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
    msg
}

/// Response to `dns_query` with one A record; the answer name points at the question
pub fn dns_response(id: u16, name: &str, address: [u8; 4]) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.extend_from_slice(&id.to_be_bytes());
    msg.extend_from_slice(&[0x81, 0x80, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
    encode_name(name, &mut msg);
    msg.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
    msg.extend_from_slice(&[0xc0, 0x0c, 0x00, 0x01, 0x00, 0x01]);
    msg.extend_from_slice(&300u32.to_be_bytes());
    msg.extend_from_slice(&4u16.to_be_bytes());
    msg.extend_from_slice(&address);
    msg
}

/// Writes a legacy pcap file
pub struct PcapBuilder {
    linktype: u32,
    nanosecond: bool,
    big_endian: bool,
    records: Vec<(u32, u32, Vec<u8>)>,
}

impl PcapBuilder {
    /// Microsecond-resolution file
    pub fn new(linktype: u32) -> Self {
        Self {
            linktype,
            nanosecond: false,
            big_endian: false,
            records: Vec::new(),
        }
    }

    /// Nanosecond-resolution file
    pub fn nanosecond(linktype: u32) -> Self {
        Self {
            nanosecond: true,
            ..Self::new(linktype)
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    /// Append a frame; `fraction` is in the file's resolution
    pub fn push(&mut self, secs: u32, fraction: u32, data: &[u8]) -> &mut Self {
        self.records.push((secs, fraction, data.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let u32_bytes = |v: u32| if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        let u16_bytes = |v: u16| if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() };

        let magic = if self.nanosecond { 0xa1b2_3c4d } else { 0xa1b2_c3d4 };
        let mut out = Vec::new();
        out.extend_from_slice(&u32_bytes(magic));
        out.extend_from_slice(&u16_bytes(2));
        out.extend_from_slice(&u16_bytes(4));
        out.extend_from_slice(&u32_bytes(0));
        out.extend_from_slice(&u32_bytes(0));
        out.extend_from_slice(&u32_bytes(65535));
        out.extend_from_slice(&u32_bytes(self.linktype));

        for (secs, fraction, data) in &self.records {
            out.extend_from_slice(&u32_bytes(*secs));
            out.extend_from_slice(&u32_bytes(*fraction));
            out.extend_from_slice(&u32_bytes(data.len() as u32));
            out.extend_from_slice(&u32_bytes(data.len() as u32));
            out.extend_from_slice(data);
        }
        out
    }
}

/// Writes a little-endian pcap-ng file with a single section
pub struct PcapNgBuilder {
    blocks: Vec<u8>,
}

impl Default for PcapNgBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PcapNgBuilder {
    pub fn new() -> Self {
        let mut blocks = Vec::new();
        let body = {
            let mut body = Vec::new();
            body.extend_from_slice(&0x1a2b_3c4du32.to_le_bytes());
            body.extend_from_slice(&1u16.to_le_bytes());
            body.extend_from_slice(&0u16.to_le_bytes());
            body.extend_from_slice(&(-1i64).to_le_bytes());
            body
        };
        push_block(&mut blocks, 0x0a0d_0d0a, &body);
        Self { blocks }
    }

    /// Add an interface description; `tsresol` is written as an if_tsresol option
    pub fn interface(&mut self, linktype: u16, tsresol: Option<u8>) -> &mut Self {
        let mut body = Vec::new();
        body.extend_from_slice(&linktype.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&65535u32.to_le_bytes());
        if let Some(resol) = tsresol {
            body.extend_from_slice(&9u16.to_le_bytes());
            body.extend_from_slice(&1u16.to_le_bytes());
            body.extend_from_slice(&[resol, 0, 0, 0]);
            body.extend_from_slice(&[0, 0, 0, 0]);
        }
        push_block(&mut self.blocks, 1, &body);
        self
    }

    /// Add an enhanced packet block with a raw tick count
    pub fn packet(&mut self, if_id: u32, ticks: u64, data: &[u8]) -> &mut Self {
        let mut body = Vec::new();
        body.extend_from_slice(&if_id.to_le_bytes());
        body.extend_from_slice(&((ticks >> 32) as u32).to_le_bytes());
        body.extend_from_slice(&(ticks as u32).to_le_bytes());
        body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        body.extend_from_slice(data);
        while body.len() % 4 != 0 {
            body.push(0);
        }
        push_block(&mut self.blocks, 6, &body);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.blocks.clone()
    }
}

fn push_block(out: &mut Vec<u8>, block_type: u32, body: &[u8]) {
    let total = (12 + body.len()) as u32;
    out.extend_from_slice(&block_type.to_le_bytes());
    out.extend_from_slice(&total.to_le_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(&total.to_le_bytes());
}
