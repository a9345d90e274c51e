//! Admission policy: block and allow lists matched against peer IPs and
//! recipient addresses.

use std::net::IpAddr;

use ipnet::IpNet;

/// A policy entry, classified once when the list is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyEntry {
    Ip { addr: IpAddr, raw: String },
    Network { net: IpNet, raw: String },
    Pattern(String),
}

impl PolicyEntry {
    pub fn parse(raw: &str) -> Self {
        if let Ok(addr) = raw.parse::<IpAddr>() {
            Self::Ip {
                addr: addr.to_canonical(),
                raw: raw.to_string(),
            }
        } else if let Ok(net) = raw.parse::<IpNet>() {
            Self::Network {
                net,
                raw: raw.to_string(),
            }
        } else {
            Self::Pattern(raw.to_string())
        }
    }

    fn raw(&self) -> &str {
        match self {
            Self::Ip { raw, .. } | Self::Network { raw, .. } | Self::Pattern(raw) => raw,
        }
    }

    /// IP targets are compared by equality against IP entries and by
    /// containment against networks. Everything else falls back to a
    /// case-sensitive substring test on the entry text.
    fn matches(&self, target: &str, ip: Option<IpAddr>) -> bool {
        match (ip, self) {
            (Some(ip), Self::Ip { addr, .. }) => ip == *addr,
            (Some(ip), Self::Network { net, .. }) => net.contains(&ip),
            _ => target.contains(self.raw()),
        }
    }
}

/// Block list with an optional allow list that takes precedence.
#[derive(Debug, Clone, Default)]
pub struct PolicyFilter {
    allow: Vec<PolicyEntry>,
    block: Vec<PolicyEntry>,
}

impl PolicyFilter {
    pub fn new<S: AsRef<str>>(block_list: &[S], allow_list: &[S]) -> Self {
        Self {
            allow: allow_list
                .iter()
                .map(|entry| PolicyEntry::parse(entry.as_ref()))
                .collect(),
            block: block_list
                .iter()
                .map(|entry| PolicyEntry::parse(entry.as_ref()))
                .collect(),
        }
    }

    fn any_match(entries: &[PolicyEntry], target: &str) -> bool {
        let ip = target
            .parse::<IpAddr>()
            .ok()
            .map(|ip| ip.to_canonical());

        entries.iter().any(|entry| entry.matches(target, ip))
    }

    /// Whether `target` (a peer IP or a recipient address) is blocked.
    pub fn is_blocked(&self, target: &str) -> bool {
        !Self::any_match(&self.allow, target) && Self::any_match(&self.block, target)
    }

    /// Shorthand for checking a peer address.
    pub fn is_ip_blocked(&self, ip: IpAddr) -> bool {
        self.is_blocked(&ip.to_canonical().to_string())
    }

    pub fn block_entries(&self) -> &[PolicyEntry] {
        &self.block
    }
}
