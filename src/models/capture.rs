use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Container format of an uploaded capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    /// Legacy libpcap framing
    Pcap,
    /// pcap-ng block framing
    PcapNg,
}

/// Summary of a decoded capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureInfo {
    /// Earliest frame timestamp (null for a capture without timestamped frames)
    pub start_time: Option<DateTime<Utc>>,

    /// Latest frame timestamp
    pub end_time: Option<DateTime<Utc>>,

    /// end_time - start_time, in seconds
    pub duration: f64,

    /// Number of frames decoded
    pub total_packets: usize,

    /// Container format
    pub format: CaptureFormat,

    /// Link-layer type of the first interface
    pub link_type: String,

    /// Native resolution of the stored timestamps
    pub timestamp_resolution: String,

    /// Sum of the frames' wire lengths
    pub total_bytes: usize,

    /// Size of the uploaded file
    pub file_size: usize,
}

impl CaptureInfo {
    /// Summary of a capture with no frames yet
    pub fn empty(format: CaptureFormat, file_size: usize) -> Self {
        Self {
            start_time: None,
            end_time: None,
            duration: 0.0,
            total_packets: 0,
            format,
            link_type: String::new(),
            timestamp_resolution: String::new(),
            total_bytes: 0,
            file_size,
        }
    }

    /// Account for one frame
    pub fn record_frame(&mut self, timestamp: Option<DateTime<Utc>>, length: usize) {
        self.total_packets += 1;
        self.total_bytes += length;

        if let Some(ts) = timestamp {
            if self.start_time.map_or(true, |start| ts < start) {
                self.start_time = Some(ts);
            }
            if self.end_time.map_or(true, |end| ts > end) {
                self.end_time = Some(ts);
            }
        }
    }

    /// Compute the duration from the recorded bounds
    pub fn finish(&mut self) {
        self.duration = match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => {
                let elapsed = end.signed_duration_since(start);
                match elapsed.num_nanoseconds() {
                    Some(nanos) => nanos as f64 / 1_000_000_000.0,
                    None => elapsed.num_milliseconds() as f64 / 1000.0,
                }
            }
            _ => 0.0,
        };
    }
}

/// Name of a timestamp unit given in ticks per second
pub fn resolution_name(ticks_per_second: u64) -> String {
    match ticks_per_second {
        1 => "seconds".to_string(),
        1_000 => "milliseconds".to_string(),
        1_000_000 => "microseconds".to_string(),
        1_000_000_000 => "nanoseconds".to_string(),
        other => format!("1/{} seconds", other),
    }
}
