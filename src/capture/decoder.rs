use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::*;

use crate::capture::parser::{FrameDissector, LinkType};
use crate::models::capture::{resolution_name, CaptureFormat, CaptureInfo};
use crate::models::frame::Frame;
use crate::utils::error::{AppError, AppResult};

const PCAP_MAGIC_MICROS: u32 = 0xa1b2_c3d4;
const PCAP_MAGIC_NANOS: u32 = 0xa1b2_3c4d;
const PCAPNG_MAGIC: u32 = 0x0a0d_0d0a;
const PCAP_GLOBAL_HEADER_LEN: usize = 24;

/// Read buffer floor for the streaming readers
const MIN_READER_CAPACITY: usize = 64 * 1024;

/// Frames and summary of one capture file
#[derive(Debug, Clone)]
pub struct DecodedCapture {
    pub frames: Vec<Frame>,
    pub info: CaptureInfo,
}

/// Legacy pcap variant announced by the magic number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detected {
    Pcap { nanosecond: bool },
    PcapNg,
}

/// Identify the container format from the leading bytes
pub fn detect_format(data: &[u8]) -> AppResult<Detected> {
    if data.len() < 4 {
        return Err(AppError::MalformedCapture(format!(
            "capture is only {} bytes long, too short for a file header",
            data.len()
        )));
    }

    let le = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let be = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);

    let detected = if le == PCAP_MAGIC_MICROS || be == PCAP_MAGIC_MICROS {
        Detected::Pcap { nanosecond: false }
    } else if le == PCAP_MAGIC_NANOS || be == PCAP_MAGIC_NANOS {
        Detected::Pcap { nanosecond: true }
    } else if le == PCAPNG_MAGIC {
        Detected::PcapNg
    } else {
        return Err(AppError::UnsupportedFormat(format!("0x{:08x}", be)));
    };

    if matches!(detected, Detected::Pcap { .. }) && data.len() < PCAP_GLOBAL_HEADER_LEN {
        return Err(AppError::MalformedCapture(format!(
            "pcap global header truncated: {} of {} bytes",
            data.len(),
            PCAP_GLOBAL_HEADER_LEN
        )));
    }

    Ok(detected)
}

/// Decodes pcap and pcap-ng files held in memory
pub struct CaptureDecoder {
    max_capture_bytes: usize,
}

impl CaptureDecoder {
    /// Create a decoder enforcing a size ceiling
    pub fn new(max_capture_bytes: usize) -> Self {
        Self { max_capture_bytes }
    }

    /// Decode a whole capture into frames and a summary
    pub fn decode(&self, data: &[u8]) -> AppResult<DecodedCapture> {
        // Checked before any framing work so memory stays bounded
        if data.len() > self.max_capture_bytes {
            return Err(AppError::CaptureTooLarge {
                size: data.len(),
                limit: self.max_capture_bytes,
            });
        }

        let decoded = match detect_format(data)? {
            Detected::Pcap { nanosecond } => self.decode_pcap(data, nanosecond)?,
            Detected::PcapNg => self.decode_pcapng(data)?,
        };

        info!(
            "Decoded {:?} capture: {} frames, {} bytes on the wire, link type {}",
            decoded.info.format, decoded.info.total_packets, decoded.info.total_bytes, decoded.info.link_type
        );

        Ok(decoded)
    }

    /// Decode legacy pcap framing
    fn decode_pcap(&self, data: &[u8], nanosecond: bool) -> AppResult<DecodedCapture> {
        let mut reader = LegacyPcapReader::new(reader_capacity(data), data)
            .map_err(|e| AppError::MalformedCapture(format!("invalid pcap global header: {:?}", e)))?;

        let mut info = CaptureInfo::empty(CaptureFormat::Pcap, data.len());
        info.timestamp_resolution = resolution_name(if nanosecond { 1_000_000_000 } else { 1_000_000 });
        let mut frames = Vec::new();
        let mut dissector: Option<FrameDissector> = None;
        let mut refilled = false;

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    refilled = false;
                    match block {
                        PcapBlockOwned::LegacyHeader(ref hdr) => {
                            let link_type = supported_link_type(hdr.network.0)?;
                            info.link_type = link_type.to_string();
                            dissector = Some(FrameDissector::new(link_type));
                        }
                        PcapBlockOwned::Legacy(ref pkt) => {
                            let dissector = dissector.as_ref().ok_or_else(|| {
                                AppError::MalformedCapture("frame before the global header".to_string())
                            })?;
                            let nanos = if nanosecond { pkt.ts_usec } else { pkt.ts_usec.saturating_mul(1000) };
                            let timestamp = to_datetime(pkt.ts_sec as i64, nanos);
                            let frame = self.build_frame(
                                dissector,
                                frames.len() as u64 + 1,
                                timestamp,
                                pkt.origlen as usize,
                                pkt.data,
                            );
                            info.record_frame(frame.timestamp, frame.length);
                            frames.push(frame);
                        }
                        PcapBlockOwned::NG(_) => {
                            return Err(AppError::MalformedCapture(
                                "pcap-ng block inside a legacy pcap file".to_string(),
                            ));
                        }
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete) => {
                    if refilled {
                        return Err(truncated(frames.len()));
                    }
                    reader
                        .refill()
                        .map_err(|e| AppError::MalformedCapture(format!("read error: {:?}", e)))?;
                    refilled = true;
                }
                Err(e) => {
                    return Err(AppError::MalformedCapture(format!(
                        "frame {} header: {:?}",
                        frames.len() + 1,
                        e
                    )))
                }
            }
        }

        info.finish();
        Ok(DecodedCapture { frames, info })
    }

    /// Decode pcap-ng framing
    fn decode_pcapng(&self, data: &[u8]) -> AppResult<DecodedCapture> {
        let mut reader = PcapNGReader::new(reader_capacity(data), data)
            .map_err(|e| AppError::MalformedCapture(format!("invalid pcap-ng section header: {:?}", e)))?;

        let mut info = CaptureInfo::empty(CaptureFormat::PcapNg, data.len());
        let mut frames = Vec::new();
        let mut interfaces: Vec<Interface> = Vec::new();
        let mut refilled = false;

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    refilled = false;
                    match block {
                        PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                            // Interface ids restart with every section
                            interfaces.clear();
                        }
                        PcapBlockOwned::NG(Block::InterfaceDescription(ref idb)) => {
                            let interface = Interface::new(idb.linktype.0, idb.if_tsresol, idb.if_tsoffset as i64)?;
                            if info.link_type.is_empty() {
                                info.link_type = interface.link_type.to_string();
                                info.timestamp_resolution = resolution_name(interface.ticks_per_second);
                            }
                            interfaces.push(interface);
                        }
                        PcapBlockOwned::NG(Block::EnhancedPacket(ref epb)) => {
                            let interface = interfaces.get(epb.if_id as usize).ok_or_else(|| {
                                AppError::MalformedCapture(format!("packet refers to unknown interface {}", epb.if_id))
                            })?;
                            let timestamp = interface.timestamp(epb.ts_high, epb.ts_low);
                            let frame = self.build_frame(
                                &interface.dissector,
                                frames.len() as u64 + 1,
                                timestamp,
                                epb.origlen as usize,
                                epb.data,
                            );
                            info.record_frame(frame.timestamp, frame.length);
                            frames.push(frame);
                        }
                        PcapBlockOwned::NG(Block::SimplePacket(ref spb)) => {
                            let interface = interfaces.first().ok_or_else(|| {
                                AppError::MalformedCapture("simple packet block without interface".to_string())
                            })?;
                            let frame = self.build_frame(
                                &interface.dissector,
                                frames.len() as u64 + 1,
                                None,
                                spb.origlen as usize,
                                spb.data,
                            );
                            info.record_frame(None, frame.length);
                            frames.push(frame);
                        }
                        PcapBlockOwned::NG(_) => {
                            // Name resolution, statistics, custom blocks
                        }
                        PcapBlockOwned::Legacy(_) | PcapBlockOwned::LegacyHeader(_) => {
                            return Err(AppError::MalformedCapture(
                                "legacy pcap block inside a pcap-ng file".to_string(),
                            ));
                        }
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete) => {
                    if refilled {
                        return Err(truncated(frames.len()));
                    }
                    reader
                        .refill()
                        .map_err(|e| AppError::MalformedCapture(format!("read error: {:?}", e)))?;
                    refilled = true;
                }
                Err(e) => {
                    return Err(AppError::MalformedCapture(format!(
                        "block after frame {}: {:?}",
                        frames.len(),
                        e
                    )))
                }
            }
        }

        info.finish();
        Ok(DecodedCapture { frames, info })
    }

    /// Create a frame and dissect its bytes
    fn build_frame(
        &self,
        dissector: &FrameDissector,
        index: u64,
        timestamp: Option<DateTime<Utc>>,
        original_length: usize,
        data: &[u8],
    ) -> Frame {
        // Some writers leave origlen at zero
        let length = original_length.max(data.len());
        let mut frame = Frame::new(index, timestamp, length);
        dissector.dissect(data, &mut frame);
        frame
    }
}

/// Per-interface decoding context of a pcap-ng section
struct Interface {
    link_type: LinkType,
    dissector: FrameDissector,
    ticks_per_second: u64,
    offset_secs: i64,
}

impl Interface {
    fn new(linktype: i32, tsresol: u8, offset_secs: i64) -> AppResult<Self> {
        let link_type = supported_link_type(linktype)?;

        // High bit set: negative power of two, otherwise negative power of ten
        let ticks_per_second = if tsresol & 0x80 == 0 {
            10u64.checked_pow(tsresol as u32)
        } else {
            2u64.checked_pow((tsresol & 0x7f) as u32)
        }
        .filter(|ticks| *ticks > 0)
        .ok_or_else(|| AppError::MalformedCapture(format!("unsupported timestamp resolution {}", tsresol)))?;

        Ok(Self {
            link_type,
            dissector: FrameDissector::new(link_type),
            ticks_per_second,
            offset_secs,
        })
    }

    fn timestamp(&self, ts_high: u32, ts_low: u32) -> Option<DateTime<Utc>> {
        let ticks = ((ts_high as u64) << 32) | ts_low as u64;
        // Ticks and if_tsoffset come straight from the file
        let secs = i64::try_from(ticks / self.ticks_per_second)
            .ok()
            .and_then(|secs| secs.checked_add(self.offset_secs));
        let Some(secs) = secs else {
            debug!("Frame timestamp overflows with offset {}s", self.offset_secs);
            return None;
        };
        let fraction = (ticks % self.ticks_per_second) as u128;
        let nanos = (fraction * 1_000_000_000 / self.ticks_per_second as u128) as u32;
        to_datetime(secs, nanos)
    }
}

fn supported_link_type(linktype: i32) -> AppResult<LinkType> {
    LinkType::from_linktype(linktype)
        .ok_or_else(|| AppError::MalformedCapture(format!("unsupported link-layer type {}", linktype)))
}

fn to_datetime(secs: i64, nanos: u32) -> Option<DateTime<Utc>> {
    let timestamp = Utc.timestamp_opt(secs, nanos).single();
    if timestamp.is_none() {
        debug!("Frame timestamp out of range: {}s {}ns", secs, nanos);
    }
    timestamp
}

fn truncated(frames_read: usize) -> AppError {
    AppError::MalformedCapture(format!("capture truncated inside frame {}", frames_read + 1))
}

/// Size the reader so the whole in-memory file fits in one buffer
fn reader_capacity(data: &[u8]) -> usize {
    data.len().saturating_add(1).max(MIN_READER_CAPACITY)
}
