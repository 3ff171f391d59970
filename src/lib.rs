//! capscope: analysis of pcap and pcap-ng capture files
//!
//! A capture is decoded once into frames, then protocol hierarchy, endpoint
//! inventory and stream reconstruction are built from the same frames while
//! the Suricata signature engine runs against the file.

pub mod analysis;
pub mod api;
pub mod capture;
pub mod ids;
pub mod models;
pub mod utils;

/// Synthetic frames and capture files for tests
#[doc(hidden)]
pub mod testing;
