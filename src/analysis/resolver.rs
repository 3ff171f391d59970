//! Best-effort labels for endpoints
//!
//! Nothing here performs network lookups: vendor names come from an OUI
//! table and hostnames from DNS answers already present in the capture.

use log::{debug, warn};
use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

use crate::capture::dns::{TYPE_A, TYPE_AAAA};
use crate::models::frame::Frame;

/// Source of optional endpoint labels
pub trait Resolver: Send + Sync {
    /// Vendor name for a MAC address in `aa:bb:cc:dd:ee:ff` form
    fn vendor(&self, _mac: &str) -> Option<String> {
        None
    }

    /// Hostname for an IP address
    fn hostname(&self, _ip: &IpAddr) -> Option<String> {
        None
    }
}

/// Resolver that never produces a label
pub struct NoResolver;

impl Resolver for NoResolver {}

/// Prefixes always known, extended by a `manuf` file when configured
const BUILTIN_OUIS: &[(&str, &str)] = &[
    ("00:00:0C", "Cisco"),
    ("00:05:69", "VMware"),
    ("00:0C:29", "VMware"),
    ("00:1C:42", "Parallels"),
    ("00:50:56", "VMware"),
    ("08:00:27", "PcsCompu"),
    ("00:15:5D", "Microsoft"),
    ("00:16:3E", "Xensource"),
    ("52:54:00", "QEMU"),
    ("3C:22:FB", "Apple"),
    ("A4:83:E7", "Apple"),
    ("F0:18:98", "Apple"),
    ("B8:27:EB", "Raspberry"),
    ("DC:A6:32", "Raspberry"),
    ("00:1B:21", "Intel"),
    ("3C:97:0E", "Intel"),
    ("00:1A:11", "Google"),
    ("F4:F5:D8", "Google"),
    ("00:E0:4C", "Realtek"),
    ("00:90:27", "Intel"),
];

/// MAC vendor table keyed by the 24-bit OUI
#[derive(Debug, Clone, Default)]
pub struct OuiTable {
    vendors: HashMap<[u8; 3], String>,
}

impl OuiTable {
    /// Table with the built-in prefixes only
    pub fn builtin() -> Self {
        let mut table = Self::default();
        for (prefix, vendor) in BUILTIN_OUIS {
            if let Some(oui) = parse_oui(prefix) {
                table.vendors.insert(oui, vendor.to_string());
            }
        }
        table
    }

    /// Built-in table extended with a Wireshark `manuf` file
    ///
    /// A file that cannot be read is logged and ignored.
    pub fn with_manuf_file(path: &Path) -> Self {
        let mut table = Self::builtin();
        match fs::read_to_string(path) {
            Ok(content) => {
                let added = table.load_manuf(&content);
                debug!("Loaded {} OUI entries from {}", added, path.display());
            }
            Err(e) => warn!("Failed to read OUI file {}: {}", path.display(), e),
        }
        table
    }

    /// Merge `manuf` lines (`00:00:0C<TAB>Cisco<TAB>Cisco Systems, Inc`), returning how many were added
    ///
    /// Entries with a mask (`/28`, `/36`) are skipped, only whole OUIs are used.
    pub fn load_manuf(&mut self, content: &str) -> usize {
        let mut added = 0;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t').filter(|f| !f.is_empty());
            let (Some(prefix), Some(short)) = (fields.next(), fields.next()) else {
                continue;
            };
            if prefix.contains('/') {
                continue;
            }
            let vendor = fields.next().unwrap_or(short).trim();
            if let Some(oui) = parse_oui(prefix) {
                self.vendors.insert(oui, vendor.to_string());
                added += 1;
            }
        }
        added
    }

    pub fn lookup(&self, mac: &str) -> Option<&str> {
        let oui = parse_oui(mac)?;
        self.vendors.get(&oui).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vendors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty()
    }
}

/// First three octets of a colon-, dash- or dot-less MAC string
fn parse_oui(text: &str) -> Option<[u8; 3]> {
    let hex: String = text
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .take(6)
        .collect();
    if hex.len() < 6 {
        return None;
    }
    let mut oui = [0u8; 3];
    for (i, byte) in oui.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(oui)
}

/// Hostnames learned from A/AAAA answers seen in the capture
#[derive(Debug, Clone, Default)]
pub struct PassiveDns {
    names: HashMap<IpAddr, String>,
}

impl PassiveDns {
    /// Collect address records from every DNS response in the frames
    ///
    /// The first name seen for an address wins.
    pub fn from_frames<'a, I>(frames: I) -> Self
    where
        I: IntoIterator<Item = &'a Frame>,
    {
        let mut names = HashMap::new();
        for message in frames.into_iter().filter_map(|f| f.dns.as_ref()) {
            if !message.is_response {
                continue;
            }
            for answer in &message.answers {
                if answer.rtype != TYPE_A && answer.rtype != TYPE_AAAA {
                    continue;
                }
                if let Some(addr) = answer.address() {
                    names.entry(addr).or_insert_with(|| answer.name.clone());
                }
            }
        }
        Self { names }
    }
}

/// OUI vendors plus passive DNS, used for every analysis
pub struct CaptureResolver<'a> {
    ouis: &'a OuiTable,
    dns: PassiveDns,
}

impl<'a> CaptureResolver<'a> {
    pub fn new(ouis: &'a OuiTable, dns: PassiveDns) -> Self {
        Self { ouis, dns }
    }
}

impl Resolver for CaptureResolver<'_> {
    fn vendor(&self, mac: &str) -> Option<String> {
        self.ouis.lookup(mac).map(str::to_string)
    }

    fn hostname(&self, ip: &IpAddr) -> Option<String> {
        self.dns.names.get(ip).cloned()
    }
}
