//! Capture-order reconstruction of TCP and UDP conversations
//!
//! Payload chunks are appended in the order frames appear in the file.
//! Retransmitted and out-of-order TCP segments are kept as observed: this
//! is not sequence-number-correct reassembly.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::models::frame::{Frame, TransportKind};
use crate::models::result::StreamRecord;

/// Direction of a chunk relative to the stream initiator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Initiator to responder
    Forward,
    /// Responder to initiator
    Reverse,
}

/// Payload of one frame within a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub frame: u64,
    pub data: Vec<u8>,
}

/// A bidirectional conversation
#[derive(Debug, Clone)]
pub struct Stream {
    pub id: u64,
    pub kind: TransportKind,

    /// Sender of the first packet of the flow
    pub initiator: (IpAddr, u16),
    pub responder: (IpAddr, u16),

    pub forward: Vec<Chunk>,
    pub reverse: Vec<Chunk>,
    pub packets: u64,
}

impl Stream {
    fn new(kind: TransportKind, initiator: (IpAddr, u16), responder: (IpAddr, u16)) -> Self {
        Self {
            id: 0,
            kind,
            initiator,
            responder,
            forward: Vec::new(),
            reverse: Vec::new(),
            packets: 0,
        }
    }

    fn push(&mut self, direction: Direction, frame: &Frame) {
        self.packets += 1;
        if frame.payload.is_empty() {
            return;
        }
        let chunk = Chunk {
            frame: frame.index,
            data: frame.payload.clone(),
        };
        match direction {
            Direction::Forward => self.forward.push(chunk),
            Direction::Reverse => self.reverse.push(chunk),
        }
    }

    pub fn has_payload(&self) -> bool {
        !self.forward.is_empty() || !self.reverse.is_empty()
    }

    pub fn bytes(&self, direction: Direction) -> u64 {
        let chunks = match direction {
            Direction::Forward => &self.forward,
            Direction::Reverse => &self.reverse,
        };
        chunks.iter().map(|c| c.data.len() as u64).sum()
    }

    /// Chunks of both directions merged by frame index
    pub fn interleaved(&self) -> Vec<(Direction, &Chunk)> {
        let mut merged = Vec::with_capacity(self.forward.len() + self.reverse.len());
        let (mut f, mut r) = (0, 0);
        while f < self.forward.len() || r < self.reverse.len() {
            let take_forward = match (self.forward.get(f), self.reverse.get(r)) {
                (Some(a), Some(b)) => a.frame <= b.frame,
                (Some(_), None) => true,
                _ => false,
            };
            if take_forward {
                merged.push((Direction::Forward, &self.forward[f]));
                f += 1;
            } else {
                merged.push((Direction::Reverse, &self.reverse[r]));
                r += 1;
            }
        }
        merged
    }

    /// Concatenated payload, decoded as UTF-8 or else Latin-1
    pub fn text(&self) -> String {
        let bytes: Vec<u8> = self
            .interleaved()
            .into_iter()
            .flat_map(|(_, chunk)| chunk.data.iter().copied())
            .collect();
        match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
        }
    }

    pub fn to_record(&self) -> StreamRecord {
        StreamRecord {
            stream_id: self.id,
            ip_src: self.initiator.0.to_string(),
            sport: self.initiator.1,
            ip_dst: self.responder.0.to_string(),
            dport: self.responder.1,
            text: self.text(),
            packets: self.packets,
            bytes_src_to_dst: self.bytes(Direction::Forward),
            bytes_dst_to_src: self.bytes(Direction::Reverse),
        }
    }
}

/// Order-independent flow key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FlowKey {
    kind: TransportKind,
    low: (IpAddr, u16),
    high: (IpAddr, u16),
}

impl FlowKey {
    fn new(kind: TransportKind, a: (IpAddr, u16), b: (IpAddr, u16)) -> Self {
        if a <= b {
            Self { kind, low: a, high: b }
        } else {
            Self { kind, low: b, high: a }
        }
    }
}

/// Reassembled streams of one capture
#[derive(Debug, Clone, Default)]
pub struct StreamSet {
    pub tcp: Vec<Stream>,
    pub udp: Vec<Stream>,
}

impl StreamSet {
    pub fn tcp_records(&self) -> Vec<StreamRecord> {
        self.tcp.iter().map(Stream::to_record).collect()
    }

    pub fn udp_records(&self) -> Vec<StreamRecord> {
        self.udp.iter().map(Stream::to_record).collect()
    }
}

/// Groups frames into streams
#[derive(Debug, Default)]
pub struct StreamReassembler {
    index: HashMap<FlowKey, usize>,
    streams: Vec<Stream>,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one frame's payload to its stream, creating the stream on first sight
    pub fn add(&mut self, frame: &Frame) {
        let (Some(transport), Some((src, dst))) = (frame.transport.as_ref(), frame.endpoints()) else {
            return;
        };

        let key = FlowKey::new(transport.kind, src, dst);
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.streams.push(Stream::new(transport.kind, src, dst));
                self.index.insert(key, self.streams.len() - 1);
                self.streams.len() - 1
            }
        };

        let stream = &mut self.streams[idx];
        let direction = if stream.initiator == src && stream.responder == dst {
            Direction::Forward
        } else {
            Direction::Reverse
        };
        stream.push(direction, frame);
    }

    /// Drop payload-less streams and number the rest
    ///
    /// TCP streams are numbered from 0 in first-seen order and UDP streams
    /// continue the same counter, so ids are unique within the run.
    pub fn finish(self) -> StreamSet {
        let (mut tcp, mut udp): (Vec<Stream>, Vec<Stream>) = self
            .streams
            .into_iter()
            .filter(Stream::has_payload)
            .partition(|s| s.kind == TransportKind::Tcp);

        let mut next_id = 0;
        for stream in tcp.iter_mut().chain(udp.iter_mut()) {
            stream.id = next_id;
            next_id += 1;
        }

        StreamSet { tcp, udp }
    }
}

/// Reassemble every TCP and UDP stream in one pass over the frames
pub fn reassemble<'a, I>(frames: I) -> StreamSet
where
    I: IntoIterator<Item = &'a Frame>,
{
    let mut reassembler = StreamReassembler::new();
    for frame in frames {
        reassembler.add(frame);
    }
    reassembler.finish()
}
