//! Lease offers handed out by DHCP servers.

use std::net::Ipv4Addr;

use multimap::MultiMap;
use tracing::warn;

/// One server response: which client got which address from whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseResponse {
    pub client: String,
    pub address: Ipv4Addr,
    pub server: String,
    /// The client asked for exactly this address.
    pub explicit: bool,
}

impl LeaseResponse {
    /// Builds the record from the `ciaddr`/`yiaddr` pair of a response.
    /// An unset `ciaddr` means the offer is in `yiaddr` and answers an
    /// explicit request.
    pub fn new(client: String, ciaddr: Ipv4Addr, yiaddr: Ipv4Addr, server: String) -> Self {
        let (address, explicit) = if ciaddr.is_unspecified() {
            (yiaddr, true)
        } else {
            (ciaddr, false)
        };
        LeaseResponse {
            client,
            address,
            server,
            explicit,
        }
    }

    fn describe(&self) -> String {
        let note = if self.explicit {
            " which the client explicitly asked for."
        } else {
            ""
        };
        format!(
            "{} offered {} IP address {}{}",
            self.server, self.client, self.address, note
        )
    }
}

/// How a new response relates to an earlier one for the same client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseConflict {
    SameAddressSameServer,
    SameAddressDifferentServers,
    DifferentAddressSameServer,
    /// Two servers competing for one client; possible interception attempt.
    DifferentAddressDifferentServers,
}

#[derive(Debug, Default)]
pub struct LeaseBook {
    responses: Vec<LeaseResponse>,
    by_client: MultiMap<String, usize>,
}

impl LeaseBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responses(&self) -> &[LeaseResponse] {
        &self.responses
    }

    /// Appends the response and reports how it compares to every earlier
    /// response sent to the same client.
    pub fn record(&mut self, response: LeaseResponse) -> Vec<LeaseConflict> {
        let mut conflicts = Vec::new();

        if let Some(earlier) = self.by_client.get_vec(&response.client) {
            for &idx in earlier {
                let old = &self.responses[idx];
                let conflict = classify(old, &response);
                match conflict {
                    LeaseConflict::SameAddressSameServer => warn!(
                        "MAC address {} received the same IP address multiple times via DHCP by the same server.",
                        response.client
                    ),
                    LeaseConflict::SameAddressDifferentServers => warn!(
                        "MAC address {} received the same IP address multiple times via DHCP by different servers.",
                        response.client
                    ),
                    LeaseConflict::DifferentAddressSameServer => warn!(
                        "MAC address {} received different IP addresses ({}, {}) multiple times via DHCP by the same server.",
                        response.client, old.address, response.address
                    ),
                    LeaseConflict::DifferentAddressDifferentServers => warn!(
                        "MAC address {} received different IP addresses ({}, {}) multiple times via DHCP by different servers ({}, {}).",
                        response.client, old.address, response.address, old.server, response.server
                    ),
                }
                conflicts.push(conflict);
            }
        }

        self.by_client.insert(response.client.clone(), self.responses.len());
        self.responses.push(response);
        conflicts
    }

    pub fn summary(&self) -> Vec<String> {
        self.responses.iter().map(LeaseResponse::describe).collect()
    }
}

fn classify(old: &LeaseResponse, new: &LeaseResponse) -> LeaseConflict {
    match (old.address == new.address, old.server == new.server) {
        (true, true) => LeaseConflict::SameAddressSameServer,
        (true, false) => LeaseConflict::SameAddressDifferentServers,
        (false, true) => LeaseConflict::DifferentAddressSameServer,
        (false, false) => LeaseConflict::DifferentAddressDifferentServers,
    }
}
