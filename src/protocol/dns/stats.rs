//! Per-direction DNS statistics.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use tracing::debug;

use crate::format::{generate_tree, push_unique};

/// Which section of the messages a [`DomainStats`] aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Questions,
    Answers,
}

#[derive(Debug)]
pub struct DomainStats {
    direction: Direction,
    total: usize,
    names: Vec<String>,
    base_domains: Vec<String>,
    private_domains: Vec<String>,
    types: BTreeMap<u16, usize>,
    public_ips: Vec<String>,
    private_ips: Vec<String>,
}

impl DomainStats {
    pub fn new(direction: Direction) -> Self {
        DomainStats {
            direction,
            total: 0,
            names: Vec::new(),
            base_domains: Vec::new(),
            private_domains: Vec::new(),
            types: BTreeMap::new(),
            public_ips: Vec::new(),
            private_ips: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn base_domains(&self) -> &[String] {
        &self.base_domains
    }

    pub fn private_domains(&self) -> &[String] {
        &self.private_domains
    }

    pub fn public_ips(&self) -> &[String] {
        &self.public_ips
    }

    pub fn private_ips(&self) -> &[String] {
        &self.private_ips
    }

    /// Counts one record. Returns false if the name has no registrable
    /// domain; the record is then counted but otherwise ignored.
    pub fn add(&mut self, name: &str, rtype: u16) -> bool {
        self.total += 1;

        let Some(base) = psl::domain_str(name) else {
            debug!("Encountered error while checking '{}' domain for its basename", name);
            return false;
        };
        let icann = matches!(
            psl::suffix(name.as_bytes()).and_then(|s| s.typ()),
            Some(psl::Type::Icann)
        );

        push_unique(&mut self.names, name);
        if icann {
            push_unique(&mut self.base_domains, base);
        } else {
            push_unique(&mut self.private_domains, name);
        }
        *self.types.entry(rtype).or_insert(0) += 1;
        true
    }

    pub fn add_address(&mut self, addr: Ipv4Addr) {
        if is_private(addr) {
            push_unique(&mut self.private_ips, &addr.to_string());
        } else {
            push_unique(&mut self.public_ips, &addr.to_string());
        }
    }

    /// Empty if no record was seen in this direction.
    pub fn summary(&self) -> String {
        if self.total == 0 {
            return String::new();
        }

        let (noun, verb) = match self.direction {
            Direction::Questions => ("questions", "Asked for"),
            Direction::Answers => ("answers", "Answered with"),
        };

        let mut summary = format!("{} DNS {} in total\n", self.total, noun);
        summary.push_str(&format!("{} records\n", type_summary(&self.types)));
        summary.push_str(&format!(
            "{} unique domains of {} base domains, of which are {} private (non-ICANN) TLDs.\n",
            self.names.len(),
            self.base_domains.len(),
            self.private_domains.len()
        ));

        if !self.base_domains.is_empty() {
            summary.push_str(&format!("{} these base domains:\n", verb));
            summary.push_str(&generate_tree(&self.base_domains));
        }
        if !self.private_domains.is_empty() {
            summary.push_str(&format!("{} these private (non-ICANN managed) domains:\n", verb));
            summary.push_str(&generate_tree(&self.private_domains));
        }

        if self.direction == Direction::Answers {
            summary.push_str(&format!(
                "Answered with {} public IP addresses and {} private IP addresses\n",
                self.public_ips.len(),
                self.private_ips.len()
            ));
            if !self.private_ips.is_empty() {
                summary.push_str("Private IP addresses in answer:\n");
                summary.push_str(&generate_tree(&self.private_ips));
            }
        }

        summary
    }
}

/// RFC 1918, carrier-grade NAT and link-local ranges.
fn is_private(addr: Ipv4Addr) -> bool {
    let [a, b, _, _] = addr.octets();
    a == 10
        || (a == 172 && (16..32).contains(&b))
        || (a == 192 && b == 168)
        || (a == 100 && (64..128).contains(&b))
        || (a == 169 && b == 254)
}

fn type_summary(types: &BTreeMap<u16, usize>) -> String {
    let items: Vec<String> = types
        .iter()
        .map(|(&rtype, count)| format!("{} {}", count, type_name(rtype)))
        .collect();

    match items.as_slice() {
        [] => "(no types encountered)".to_string(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

pub fn type_name(rtype: u16) -> String {
    let name = match rtype {
        1 => "A",
        2 => "NS",
        5 => "CNAME",
        6 => "SOA",
        12 => "PTR",
        15 => "MX",
        16 => "TXT",
        28 => "AAAA",
        33 => "SRV",
        41 => "OPT",
        64 => "SVCB",
        65 => "HTTPS",
        255 => "ANY",
        other => return format!("TYPE{}", other),
    };
    name.to_string()
}
