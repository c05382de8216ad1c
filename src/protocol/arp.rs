//! ARP analyzer: who asked for which address, who answered, and which
//! hardware address currently claims which protocol address.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tracing::warn;

use super::Protocol;
use crate::error::DecodeError;
use crate::format::{format_hw_addr, generate_tree, push_unique};
use crate::packet::Packet;
use crate::report::Block;

const ARP_HEADER_LEN: usize = 8;
const ARP_OPERATION_REQUEST: u16 = 1;

/// One decoded ARP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpMessage {
    pub operation: u16,
    pub sender_hw: String,
    pub sender_proto: IpAddr,
    pub target_proto: IpAddr,
}

impl ArpMessage {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < ARP_HEADER_LEN {
            return Err(DecodeError::truncated("ARP", ARP_HEADER_LEN, data.len()));
        }

        let hw_len = data[4] as usize;
        let proto_len = data[5] as usize;
        let operation = u16::from_be_bytes([data[6], data[7]]);

        let needed = ARP_HEADER_LEN + 2 * (hw_len + proto_len);
        if data.len() < needed {
            return Err(DecodeError::truncated("ARP", needed, data.len()));
        }

        let sender_hw_at = ARP_HEADER_LEN;
        let sender_proto_at = sender_hw_at + hw_len;
        let target_hw_at = sender_proto_at + proto_len;
        let target_proto_at = target_hw_at + hw_len;

        let sender_hw = format_hw_addr(&data[sender_hw_at..sender_proto_at]);
        let sender_proto = proto_addr(&data[sender_proto_at..target_hw_at])?;
        let target_proto = proto_addr(&data[target_proto_at..needed])?;

        Ok(ArpMessage {
            operation,
            sender_hw,
            sender_proto,
            target_proto,
        })
    }

    pub fn is_request(&self) -> bool {
        self.operation == ARP_OPERATION_REQUEST
    }
}

fn proto_addr(bytes: &[u8]) -> Result<IpAddr, DecodeError> {
    if let Ok(v4) = <[u8; 4]>::try_from(bytes) {
        return Ok(IpAddr::V4(Ipv4Addr::from(v4)));
    }
    if let Ok(v6) = <[u8; 16]>::try_from(bytes) {
        return Ok(IpAddr::V6(Ipv6Addr::from(v6)));
    }
    Err(DecodeError::invalid(
        "ARP",
        "protocol address length",
        format!("{} bytes", bytes.len()),
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub mac: String,
    pub asked: usize,
    pub answered: usize,
    pub asked_for: Vec<String>,
    pub answered_with: Vec<String>,
}

impl Participant {
    fn new(mac: &str) -> Self {
        Participant {
            mac: mac.to_string(),
            asked: 0,
            answered: 0,
            asked_for: Vec::new(),
            answered_with: Vec::new(),
        }
    }

    fn describe(&self) -> String {
        let asked = format!(
            "asked for {} addresses ({} distinct)",
            self.asked,
            self.asked_for.len()
        );
        let answered = format!(
            "answered {} requests with {} distinct addresses",
            self.answered,
            self.answered_with.len()
        );
        match (self.asked > 0, self.answered > 0) {
            (true, true) => format!("{} {} and {}", self.mac, asked, answered),
            (true, false) => format!("{} {}", self.mac, asked),
            _ => format!("{} {}", self.mac, answered),
        }
    }
}

/// A hardware address claiming a protocol address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub mac: String,
    pub ip: IpAddr,
}

/// What happened to the binding table for one claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingUpdate {
    /// Unassigned sender address (0.0.0.0), nothing recorded.
    Ignored,
    Unchanged,
    Added,
    /// An existing binding matched on exactly one side and was overwritten.
    Replaced { spoofing_suspected: bool },
}

#[derive(Debug, Default)]
pub struct ArpProtocol {
    participants: Vec<Participant>,
    bindings: Vec<Binding>,
}

impl ArpProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    fn participant_mut(&mut self, mac: &str) -> &mut Participant {
        let idx = match self.participants.iter().position(|p| p.mac == mac) {
            Some(idx) => idx,
            None => {
                self.participants.push(Participant::new(mac));
                self.participants.len() - 1
            }
        };
        &mut self.participants[idx]
    }

    /// Records that `mac` claims `ip`, flagging conflicting claims.
    pub fn record_binding(&mut self, mac: &str, ip: IpAddr) -> BindingUpdate {
        if ip.is_unspecified() {
            // Sender has no address yet.
            return BindingUpdate::Ignored;
        }

        for binding in self.bindings.iter_mut() {
            let same_mac = binding.mac == mac;
            let same_ip = binding.ip == ip;

            if same_mac && same_ip {
                return BindingUpdate::Unchanged;
            }

            if same_mac != same_ip {
                let spoofing_suspected = !is_link_local(&binding.ip) && !is_link_local(&ip);
                if spoofing_suspected {
                    warn!(
                        "Found possible ARP spoofing! Old: (MAC={}, IP={}), New: (MAC={}, IP={}). Overriding...",
                        binding.mac, binding.ip, mac, ip
                    );
                }
                binding.mac = mac.to_string();
                binding.ip = ip;
                return BindingUpdate::Replaced { spoofing_suspected };
            }
        }

        self.bindings.push(Binding {
            mac: mac.to_string(),
            ip,
        });
        BindingUpdate::Added
    }

    fn traffic_summary(&self) -> String {
        let lines: Vec<String> = self.participants.iter().map(Participant::describe).collect();
        generate_tree(&lines)
    }

    fn lan_overview(&self) -> String {
        let lines: Vec<String> = self
            .bindings
            .iter()
            .map(|b| format!("{} has address {}", b.mac, b.ip))
            .collect();
        generate_tree(&lines)
    }
}

/// 169.254.0.0/16 self-assigned addresses.
fn is_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(_) => false,
    }
}

impl Protocol for ArpProtocol {
    fn name(&self) -> &'static str {
        "ARP"
    }

    fn can_analyze(&self, packet: &Packet) -> bool {
        packet.arp.is_some()
    }

    fn analyze(&mut self, packet: &Packet) -> Result<(), DecodeError> {
        let raw = packet.arp.as_deref().ok_or(DecodeError::MissingLayer {
            protocol: "ARP",
            layer: "ARP",
        })?;
        let arp = ArpMessage::decode(raw)?;

        let participant = self.participant_mut(&arp.sender_hw);
        if arp.is_request() {
            participant.asked += 1;
            push_unique(&mut participant.asked_for, &arp.target_proto.to_string());
        } else {
            participant.answered += 1;
            push_unique(&mut participant.answered_with, &arp.sender_proto.to_string());
        }

        self.record_binding(&arp.sender_hw, arp.sender_proto);
        Ok(())
    }

    fn summary(&self) -> Vec<Block> {
        vec![
            Block::new("ARP traffic summary", self.traffic_summary()),
            Block::new("ARP LAN overview", self.lan_overview()),
        ]
    }
}
