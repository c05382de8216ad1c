//! DHCPv4 analyzer.
//!
//! Tracks which clients asked for a lease, which server offered what,
//! which hostnames were requested or forced, and the network setup the
//! servers announce.

mod hostname;
mod lease;
mod network;

use std::net::Ipv4Addr;

pub use hostname::{HostnameRecord, HostnameUpdate, Hostnames};
pub use lease::{LeaseBook, LeaseConflict, LeaseResponse};
pub use network::{format_duration, NetworkOptions, OptionUpdate};

use super::Protocol;
use crate::error::DecodeError;
use crate::format::{format_hw_addr, generate_tree, push_unique};
use crate::packet::{ApplicationKind, Packet};
use crate::report::Block;

const BOOTP_HEADER_LEN: usize = 236;
const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
const OPTIONS_START: usize = BOOTP_HEADER_LEN + MAGIC_COOKIE.len();
const MAX_HW_ADDR_LEN: usize = 16;

const OP_REQUEST: u8 = 1;

const OPTION_PAD: u8 = 0;
const OPTION_HOSTNAME: u8 = 12;
const OPTION_END: u8 = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpOption {
    pub code: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpMessage {
    pub op: u8,
    /// Address the client already has (`ciaddr`).
    pub client_ip: Ipv4Addr,
    /// Address the server assigns (`yiaddr`).
    pub your_ip: Ipv4Addr,
    pub client_hw: String,
    pub options: Vec<DhcpOption>,
}

impl DhcpMessage {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < OPTIONS_START {
            return Err(DecodeError::truncated("DHCP", OPTIONS_START, data.len()));
        }
        if data[BOOTP_HEADER_LEN..OPTIONS_START] != MAGIC_COOKIE {
            return Err(DecodeError::invalid(
                "DHCP",
                "magic cookie",
                format!("{:02x?}", &data[BOOTP_HEADER_LEN..OPTIONS_START]),
            ));
        }

        let hw_len = (data[2] as usize).min(MAX_HW_ADDR_LEN);
        Ok(DhcpMessage {
            op: data[0],
            client_ip: ipv4_at(data, 12),
            your_ip: ipv4_at(data, 16),
            client_hw: format_hw_addr(&data[28..28 + hw_len]),
            options: decode_options(&data[OPTIONS_START..])?,
        })
    }

    pub fn is_request(&self) -> bool {
        self.op == OP_REQUEST
    }

    /// First occurrence of an option.
    pub fn option(&self, code: u8) -> Option<&[u8]> {
        self.options
            .iter()
            .find(|o| o.code == code)
            .map(|o| o.data.as_slice())
    }

    pub fn hostname(&self) -> Option<String> {
        self.option(OPTION_HOSTNAME)
            .map(|raw| String::from_utf8_lossy(raw).trim_end_matches('\0').to_string())
    }
}

fn ipv4_at(data: &[u8], at: usize) -> Ipv4Addr {
    Ipv4Addr::new(data[at], data[at + 1], data[at + 2], data[at + 3])
}

fn decode_options(mut data: &[u8]) -> Result<Vec<DhcpOption>, DecodeError> {
    let mut options = Vec::new();
    while let Some((&code, rest)) = data.split_first() {
        match code {
            OPTION_PAD => data = rest,
            OPTION_END => break,
            _ => {
                let Some((&len, rest)) = rest.split_first() else {
                    return Err(DecodeError::truncated("DHCP", 1, 0));
                };
                let len = len as usize;
                if rest.len() < len {
                    return Err(DecodeError::truncated("DHCP", len, rest.len()));
                }
                options.push(DhcpOption {
                    code,
                    data: rest[..len].to_vec(),
                });
                data = &rest[len..];
            }
        }
    }
    Ok(options)
}

#[derive(Debug, Default)]
pub struct DhcpProtocol {
    requests: Vec<String>,
    leases: LeaseBook,
    hostnames: Hostnames,
    network: NetworkOptions,
}

impl DhcpProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> &[String] {
        &self.requests
    }

    pub fn leases(&self) -> &LeaseBook {
        &self.leases
    }

    pub fn hostnames(&self) -> &Hostnames {
        &self.hostnames
    }

    pub fn network(&self) -> &NetworkOptions {
        &self.network
    }

    fn request_summary(&self) -> String {
        if self.requests.is_empty() {
            return String::new();
        }
        format!(
            "{} unique DHCP requests\n{}",
            self.requests.len(),
            generate_tree(&self.requests)
        )
    }
}

impl Protocol for DhcpProtocol {
    fn name(&self) -> &'static str {
        "DHCP"
    }

    fn can_analyze(&self, packet: &Packet) -> bool {
        packet.application_kind() == Some(ApplicationKind::Dhcp)
            && packet.link.is_some()
            && !packet.payload().is_empty()
    }

    fn analyze(&mut self, packet: &Packet) -> Result<(), DecodeError> {
        let link = packet.link.as_ref().ok_or(DecodeError::MissingLayer {
            protocol: "DHCP",
            layer: "Ethernet",
        })?;
        let msg = DhcpMessage::decode(packet.payload())?;

        if msg.is_request() {
            push_unique(&mut self.requests, &msg.client_hw);
        } else {
            self.leases.record(LeaseResponse::new(
                msg.client_hw.clone(),
                msg.client_ip,
                msg.your_ip,
                link.source_mac(),
            ));
        }

        if let Some(name) = msg.hostname() {
            let candidate = if msg.is_request() {
                HostnameRecord::requested(&name, &msg.client_hw)
            } else {
                HostnameRecord::granted(&name, &msg.client_hw)
            };
            self.hostnames.record(candidate);
        }

        // Requests carry no authoritative network setup.
        if !msg.is_request() {
            for opt in msg.options.iter().filter(|o| network::is_watched(o.code)) {
                self.network.store(opt.code, &opt.data);
            }
        }

        Ok(())
    }

    fn summary(&self) -> Vec<Block> {
        vec![
            Block::new("DHCP Network Overview", self.network.summary()),
            Block::new("DHCP Requests", self.request_summary()),
            Block::new("DHCP Responses/Offers", generate_tree(&self.leases.summary())),
            Block::new("DHCP Hostnames", generate_tree(&self.hostnames.summary())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{ApplicationLayer, LinkLayer};
    use chrono::Utc;

    const CLIENT: [u8; 6] = [0x02, 0, 0, 0, 0, 0x01];
    const SERVER: [u8; 6] = [0x02, 0, 0, 0, 0, 0xfe];

    fn message(op: u8, ciaddr: [u8; 4], yiaddr: [u8; 4], options: &[(u8, &[u8])]) -> Vec<u8> {
        let mut d = vec![0u8; BOOTP_HEADER_LEN];
        d[0] = op;
        d[1] = 1;
        d[2] = 6;
        d[12..16].copy_from_slice(&ciaddr);
        d[16..20].copy_from_slice(&yiaddr);
        d[28..34].copy_from_slice(&CLIENT);
        d.extend_from_slice(&MAGIC_COOKIE);
        for (code, data) in options {
            d.push(*code);
            d.push(data.len() as u8);
            d.extend_from_slice(data);
        }
        d.push(OPTION_END);
        d
    }

    fn packet(source: [u8; 6], payload: Vec<u8>) -> Packet {
        let mut p = Packet::new(Utc::now());
        p.link = Some(LinkLayer {
            source,
            destination: [0xff; 6],
            ether_type: 0x0800,
        });
        p.application = Some(ApplicationLayer {
            kind: ApplicationKind::Dhcp,
            contents: payload,
        });
        p
    }

    #[test]
    fn test_decode_options() {
        let raw = message(2, [0; 4], [10, 0, 0, 5], &[(53, &[2]), (OPTION_HOSTNAME, b"host\0")]);
        let msg = DhcpMessage::decode(&raw).unwrap();
        assert!(!msg.is_request());
        assert_eq!(msg.client_hw, "02:00:00:00:00:01");
        assert_eq!(msg.your_ip, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(msg.option(53), Some(&[2][..]));
        assert_eq!(msg.hostname().as_deref(), Some("host"));
    }

    #[test]
    fn test_decode_failures() {
        assert!(DhcpMessage::decode(&[1u8; 100]).is_err());

        let mut bad_cookie = message(1, [0; 4], [0; 4], &[]);
        bad_cookie[236] = 0;
        assert!(matches!(
            DhcpMessage::decode(&bad_cookie),
            Err(DecodeError::Invalid { field: "magic cookie", .. })
        ));

        let mut truncated = message(1, [0; 4], [0; 4], &[]);
        truncated.pop();
        truncated.extend_from_slice(&[OPTION_HOSTNAME, 10, b'a']);
        assert!(matches!(
            DhcpMessage::decode(&truncated),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_applicability() {
        let dhcp = DhcpProtocol::new();
        assert!(dhcp.can_analyze(&packet(CLIENT, message(1, [0; 4], [0; 4], &[]))));
        assert!(!dhcp.can_analyze(&packet(CLIENT, Vec::new())));

        let mut no_link = packet(CLIENT, message(1, [0; 4], [0; 4], &[]));
        no_link.link = None;
        assert!(!dhcp.can_analyze(&no_link));
    }

    #[test]
    fn test_request_and_offer() {
        let mut dhcp = DhcpProtocol::new();
        let request = message(1, [0; 4], [0; 4], &[(OPTION_HOSTNAME, b"laptop")]);
        dhcp.analyze(&packet(CLIENT, request.clone())).unwrap();
        dhcp.analyze(&packet(CLIENT, request)).unwrap();

        let offer = message(
            2,
            [0; 4],
            [192, 168, 1, 20],
            &[
                (network::OPTION_ROUTER, &[192, 168, 1, 1]),
                (network::OPTION_LEASE_TIME, &86400u32.to_le_bytes()),
                (OPTION_HOSTNAME, b"laptop"),
            ],
        );
        dhcp.analyze(&packet(SERVER, offer)).unwrap();

        assert_eq!(dhcp.requests(), &["02:00:00:00:00:01".to_string()]);
        assert_eq!(dhcp.leases().responses().len(), 1);
        assert!(dhcp.hostnames().records()[0].granted);

        let blocks = dhcp.summary();
        assert_eq!(blocks.len(), 4);
        assert!(blocks[0].content.contains("Router: 192.168.1.1\n"));
        assert_eq!(blocks[1].content, "1 unique DHCP requests\n'- 02:00:00:00:00:01\n");
        assert_eq!(
            blocks[2].content,
            "'- 02:00:00:00:00:fe offered 02:00:00:00:00:01 IP address 192.168.1.20 which the client explicitly asked for.\n"
        );
        assert_eq!(
            blocks[3].content,
            "'- 02:00:00:00:00:01 has hostname laptop, granted by the DHCP server\n"
        );
    }

    #[test]
    fn test_request_options_are_not_network_setup() {
        let mut dhcp = DhcpProtocol::new();
        let request = message(1, [0; 4], [0; 4], &[(network::OPTION_ROUTER, &[10, 0, 0, 1])]);
        dhcp.analyze(&packet(CLIENT, request)).unwrap();
        assert!(dhcp.network().get(network::OPTION_ROUTER).is_none());
        assert_eq!(dhcp.summary()[0].content, "");
    }

    #[test]
    fn test_malformed_leaves_state() {
        let mut dhcp = DhcpProtocol::new();
        assert!(dhcp.analyze(&packet(CLIENT, vec![1u8; 50])).is_err());
        assert!(dhcp.requests().is_empty());
        assert!(dhcp.summary().iter().all(|b| b.content.is_empty()));
    }
}
