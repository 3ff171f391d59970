use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use crate::analysis::resolver::Resolver;
use crate::models::frame::Frame;
use crate::models::result::{ExternalResources, IpEndpoint, MacEndpoint, MacRole};

/// Address inventory of one capture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointReport {
    pub mac_addresses: Vec<MacEndpoint>,
    pub ip_addresses: Vec<IpEndpoint>,
    pub external_resources: ExternalResources,
}

/// Check if an IP address is in a private range
///
/// RFC 1918 for IPv4, unique-local (fc00::/7) and link-local (fe80::/10) for
/// IPv6. Loopback, multicast and everything else count as public.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => ipv4.is_private(),
        IpAddr::V6(ipv6) => {
            let first = ipv6.segments()[0];
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Collect distinct MAC and IP addresses, sorted by address value
pub fn extract_endpoints<'a, I>(frames: I, resolver: &dyn Resolver) -> EndpointReport
where
    I: IntoIterator<Item = &'a Frame>,
{
    let mut macs: BTreeMap<String, MacRole> = BTreeMap::new();
    let mut ips: BTreeSet<IpAddr> = BTreeSet::new();
    let mut domains: BTreeSet<String> = BTreeSet::new();

    for frame in frames {
        if let Some(mac) = &frame.source_mac {
            macs.entry(mac.clone()).or_insert(MacRole::Src);
        }
        if let Some(mac) = &frame.destination_mac {
            macs.entry(mac.clone()).or_insert(MacRole::Dst);
        }

        ips.extend(frame.source_ip);
        ips.extend(frame.destination_ip);

        if let Some(dns) = &frame.dns {
            domains.extend(
                dns.questions
                    .iter()
                    .map(|q| q.name.trim_end_matches('.').to_lowercase())
                    .filter(|name| !name.is_empty()),
            );
        }
    }

    let mac_addresses = macs
        .into_iter()
        .map(|(mac, role)| MacEndpoint {
            resolved: resolver.vendor(&mac),
            mac,
            role,
        })
        .collect();

    let ip_addresses = ips
        .iter()
        .map(|ip| IpEndpoint {
            ip: ip.to_string(),
            resolved: resolver.hostname(ip),
            is_private: is_private_ip(ip),
            is_ipv6: ip.is_ipv6(),
        })
        .collect();

    let external_ips = ips
        .iter()
        .filter(|ip| !is_private_ip(ip))
        .map(|ip| ip.to_string())
        .collect();

    EndpointReport {
        mac_addresses,
        ip_addresses,
        external_resources: ExternalResources {
            domains: domains.into_iter().collect(),
            external_ips,
        },
    }
}
