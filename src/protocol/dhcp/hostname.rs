//! Hostnames requested by clients and handed out by servers.

use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostnameRecord {
    pub hostname: String,
    /// Hardware address that asked for the name; empty if only the grant was seen.
    pub requester: String,
    /// Client hardware address named in the packet.
    pub client: String,
    pub granted: bool,
    /// Name the client asked for before the server substituted another one.
    pub denied: Option<String>,
}

impl HostnameRecord {
    pub fn requested(hostname: &str, requester: &str) -> Self {
        HostnameRecord {
            hostname: hostname.to_string(),
            requester: requester.to_string(),
            client: requester.to_string(),
            granted: false,
            denied: None,
        }
    }

    pub fn granted(hostname: &str, client: &str) -> Self {
        HostnameRecord {
            hostname: hostname.to_string(),
            requester: String::new(),
            client: client.to_string(),
            granted: true,
            denied: None,
        }
    }

    fn is_grant(&self) -> bool {
        self.requester.is_empty()
    }

    fn owner(&self) -> &str {
        if !self.requester.is_empty() {
            &self.requester
        } else if !self.client.is_empty() {
            &self.client
        } else {
            "(unknown client)"
        }
    }

    fn describe(&self) -> String {
        let mac = self.owner();
        match &self.denied {
            None if self.granted => format!(
                "{} has hostname {}, granted by the DHCP server",
                mac, self.hostname
            ),
            None => format!(
                "{} has hostname {}, without a response from DHCP server",
                mac, self.hostname
            ),
            Some(_) if self.requester.is_empty() => format!(
                "{} was forced to have hostname {} by DHCP server",
                mac, self.hostname
            ),
            Some(denied) => format!(
                "{} asked for hostname {}, but got hostname {} from DHCP server.",
                mac, denied, self.hostname
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostnameUpdate {
    Added,
    /// Same client asked again for the same name.
    Unchanged,
    /// A different client already asked for this name.
    Conflict { holder: String },
    Granted,
    /// The server granted a different name than the one on file.
    Overridden { denied: String },
}

#[derive(Debug, Default)]
pub struct Hostnames {
    records: Vec<HostnameRecord>,
}

impl Hostnames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[HostnameRecord] {
        &self.records
    }

    pub fn record(&mut self, candidate: HostnameRecord) -> HostnameUpdate {
        if let Some(existing) = self
            .records
            .iter_mut()
            .find(|r| r.hostname == candidate.hostname)
        {
            if candidate.is_grant() {
                existing.granted = true;
                return HostnameUpdate::Granted;
            }
            if existing.requester == candidate.requester {
                return HostnameUpdate::Unchanged;
            }
            warn!(
                "Multiple clients ({}, {}) asked for the same hostname ({})",
                existing.owner(),
                candidate.requester,
                candidate.hostname
            );
            return HostnameUpdate::Conflict {
                holder: existing.owner().to_string(),
            };
        }

        if candidate.is_grant() && !candidate.client.is_empty() {
            let client = candidate.client.as_str();
            if let Some(existing) = self
                .records
                .iter_mut()
                .find(|r| r.requester == client || r.client == client)
            {
                warn!(
                    "Client {} asked for hostname '{}' but was given '{}' by DHCP server",
                    client, existing.hostname, candidate.hostname
                );
                let denied = std::mem::replace(&mut existing.hostname, candidate.hostname);
                existing.denied = Some(denied.clone());
                existing.granted = false;
                return HostnameUpdate::Overridden { denied };
            }
        }

        self.records.push(candidate);
        HostnameUpdate::Added
    }

    pub fn summary(&self) -> Vec<String> {
        self.records.iter().map(HostnameRecord::describe).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_then_grant() {
        let mut names = Hostnames::new();
        assert_eq!(names.record(HostnameRecord::requested("laptop", "aa")), HostnameUpdate::Added);
        assert_eq!(names.record(HostnameRecord::granted("laptop", "aa")), HostnameUpdate::Granted);
        assert_eq!(
            names.summary(),
            vec!["aa has hostname laptop, granted by the DHCP server"]
        );
    }

    #[test]
    fn test_request_without_response() {
        let mut names = Hostnames::new();
        names.record(HostnameRecord::requested("laptop", "aa"));
        assert_eq!(
            names.record(HostnameRecord::requested("laptop", "aa")),
            HostnameUpdate::Unchanged
        );
        assert_eq!(
            names.summary(),
            vec!["aa has hostname laptop, without a response from DHCP server"]
        );
    }

    #[test]
    fn test_conflicting_requests_keep_first() {
        let mut names = Hostnames::new();
        names.record(HostnameRecord::requested("printer", "aa"));
        assert_eq!(
            names.record(HostnameRecord::requested("printer", "bb")),
            HostnameUpdate::Conflict { holder: "aa".into() }
        );
        assert_eq!(names.records().len(), 1);
        assert_eq!(names.records()[0].requester, "aa");
    }

    #[test]
    fn test_second_grant_overrides() {
        let mut names = Hostnames::new();
        names.record(HostnameRecord::granted("old-name", "aa"));
        assert_eq!(
            names.record(HostnameRecord::granted("new-name", "aa")),
            HostnameUpdate::Overridden { denied: "old-name".into() }
        );

        let record = &names.records()[0];
        assert_eq!(record.hostname, "new-name");
        assert_eq!(record.denied.as_deref(), Some("old-name"));
        assert!(!record.granted);
        assert_eq!(
            names.summary(),
            vec!["aa was forced to have hostname new-name by DHCP server"]
        );
    }

    #[test]
    fn test_requested_name_denied() {
        let mut names = Hostnames::new();
        names.record(HostnameRecord::requested("wish", "aa"));
        names.record(HostnameRecord::granted("assigned", "aa"));
        assert_eq!(
            names.summary(),
            vec!["aa asked for hostname wish, but got hostname assigned from DHCP server."]
        );
    }

    #[test]
    fn test_grant_for_unknown_client_is_added() {
        let mut names = Hostnames::new();
        names.record(HostnameRecord::requested("one", "aa"));
        assert_eq!(names.record(HostnameRecord::granted("two", "bb")), HostnameUpdate::Added);
        assert_eq!(names.records().len(), 2);
    }
}
