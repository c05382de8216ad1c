//! Network configuration announced by DHCP servers.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use tracing::warn;

pub const OPTION_SUBNET_MASK: u8 = 1;
pub const OPTION_ROUTER: u8 = 3;
pub const OPTION_DNS: u8 = 6;
pub const OPTION_BROADCAST: u8 = 28;
pub const OPTION_NTP_SERVERS: u8 = 42;
pub const OPTION_LEASE_TIME: u8 = 51;
pub const OPTION_RENEWAL_TIME: u8 = 58;

const WATCHED: [u8; 7] = [
    OPTION_SUBNET_MASK,
    OPTION_ROUTER,
    OPTION_DNS,
    OPTION_BROADCAST,
    OPTION_NTP_SERVERS,
    OPTION_LEASE_TIME,
    OPTION_RENEWAL_TIME,
];

const NOT_FOUND: &str = "(not found)";

pub fn is_watched(code: u8) -> bool {
    WATCHED.contains(&code)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionUpdate {
    Stored,
    Unchanged,
    /// A different value was on file and got overwritten.
    Replaced,
}

#[derive(Debug, Default)]
pub struct NetworkOptions {
    values: BTreeMap<u8, Vec<u8>>,
}

impl NetworkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, code: u8) -> Option<&[u8]> {
        self.values.get(&code).map(Vec::as_slice)
    }

    pub fn store(&mut self, code: u8, data: &[u8]) -> OptionUpdate {
        let update = match self.values.get(&code) {
            Some(old) if old.as_slice() == data => return OptionUpdate::Unchanged,
            Some(old) => {
                warn!(
                    "Received different values for DHCP option {}. (Old: {:?}, New: {:?})",
                    code, old, data
                );
                OptionUpdate::Replaced
            }
            None => OptionUpdate::Stored,
        };
        self.values.insert(code, data.to_vec());
        update
    }

    /// The overview block content, empty when none of the watched options
    /// was seen.
    pub fn summary(&self) -> String {
        if self.values.is_empty() {
            return String::new();
        }

        let addr = |code| self.get(code).map_or_else(|| NOT_FOUND.to_string(), format_addresses);
        let time = |code| self.get(code).map_or_else(|| NOT_FOUND.to_string(), format_duration);

        format!(
            "Subnet Mask: {}\nBroadcast: {}\nRouter: {}\nDNS Server: {}\nNTP Server: {}\nLease Time: {}\nRenewal Time: {}\n",
            addr(OPTION_SUBNET_MASK),
            addr(OPTION_BROADCAST),
            addr(OPTION_ROUTER),
            addr(OPTION_DNS),
            addr(OPTION_NTP_SERVERS),
            time(OPTION_LEASE_TIME),
            time(OPTION_RENEWAL_TIME),
        )
    }
}

fn format_addresses(raw: &[u8]) -> String {
    if raw.is_empty() || raw.len() % 4 != 0 {
        return "(malformed)".to_string();
    }
    raw.chunks_exact(4)
        .map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3]).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders a little-endian seconds counter. Hours wrap at 60.
pub fn format_duration(raw: &[u8]) -> String {
    let Some(bytes) = raw.get(..4).and_then(|b| <[u8; 4]>::try_from(b).ok()) else {
        return "(malformed)".to_string();
    };
    let total = u32::from_le_bytes(bytes);

    let hours = total / 60 / 60 % 60;
    let minutes = total / 60 % 60;
    let seconds = total % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{} hours", hours));
    }
    if minutes > 0 {
        parts.push(format!("{} minutes", minutes));
    }
    if seconds > 0 {
        parts.push(format!("{} seconds", seconds));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_replace() {
        let mut opts = NetworkOptions::new();
        assert_eq!(opts.store(OPTION_ROUTER, &[10, 0, 0, 1]), OptionUpdate::Stored);
        assert_eq!(opts.store(OPTION_ROUTER, &[10, 0, 0, 1]), OptionUpdate::Unchanged);
        assert_eq!(opts.store(OPTION_ROUTER, &[10, 0, 0, 254]), OptionUpdate::Replaced);
        assert_eq!(opts.get(OPTION_ROUTER), Some(&[10, 0, 0, 254][..]));
    }

    #[test]
    fn test_summary_placeholders() {
        let mut opts = NetworkOptions::new();
        assert_eq!(opts.summary(), "");

        opts.store(OPTION_SUBNET_MASK, &[255, 255, 255, 0]);
        opts.store(OPTION_DNS, &[1, 1, 1, 1, 8, 8, 8, 8]);
        opts.store(OPTION_LEASE_TIME, &3600u32.to_le_bytes());

        assert_eq!(
            opts.summary(),
            "Subnet Mask: 255.255.255.0\n\
             Broadcast: (not found)\n\
             Router: (not found)\n\
             DNS Server: 1.1.1.1, 8.8.8.8\n\
             NTP Server: (not found)\n\
             Lease Time: 1 hours\n\
             Renewal Time: (not found)\n"
        );
    }

    #[test]
    fn test_duration() {
        assert_eq!(format_duration(&3725u32.to_le_bytes()), "1 hours, 2 minutes, 5 seconds");
        assert_eq!(format_duration(&120u32.to_le_bytes()), "2 minutes");
        assert_eq!(format_duration(&0u32.to_le_bytes()), "");
        // 61 hours wrap to 1.
        assert_eq!(format_duration(&(61 * 3600u32).to_le_bytes()), "1 hours");
        assert_eq!(format_duration(&[1, 2]), "(malformed)");
    }

    #[test]
    fn test_watch_list() {
        assert!(is_watched(OPTION_LEASE_TIME));
        assert!(!is_watched(12));
        assert!(!is_watched(53));
    }
}
