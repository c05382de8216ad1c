//! Decoded view of one captured frame.
//!
//! Layer 2/3/4 headers are sliced with etherparse; everything above the
//! transport layer is kept as raw bytes for the analyzers to decode.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use etherparse::{Ethernet2HeaderSlice, Ipv4HeaderSlice, Ipv6HeaderSlice, TcpHeaderSlice, UdpHeaderSlice};
use tracing::trace;

use crate::error::DecodeError;
use crate::format::format_hw_addr;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_ARP: u16 = 0x0806;
const ETHERTYPE_IPV6: u16 = 0x86DD;

const IP_PROTO_ICMP: u8 = 1;
const IP_PROTO_TCP: u8 = 6;
const IP_PROTO_UDP: u8 = 17;
const IP_PROTO_ICMPV6: u8 = 58;

const IPV6_HEADER_LEN: usize = 40;
const UDP_HEADER_LEN: usize = 8;

const DNS_PORT: u16 = 53;
const DHCP_SERVER_PORT: u16 = 67;
const DHCP_CLIENT_PORT: u16 = 68;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLayer {
    pub source: [u8; 6],
    pub destination: [u8; 6],
    pub ether_type: u16,
}

impl LinkLayer {
    pub fn source_mac(&self) -> String {
        format_hw_addr(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkLayer {
    pub source: IpAddr,
    pub destination: IpAddr,
    /// IP protocol number (IPv4) or next header (IPv6).
    pub protocol: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence: u32,
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    pub source_port: u16,
    pub destination_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportLayer {
    Tcp(TcpSegment),
    Udp(UdpDatagram),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationKind {
    /// Lease assignment (DHCPv4).
    Dhcp,
    /// Name resolution (DNS over UDP).
    Dns,
    /// Encrypted tunnel (TLS records).
    Tls,
    /// Anything else carried by TCP or UDP.
    Payload,
}

impl fmt::Display for ApplicationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApplicationKind::Dhcp => "DHCP",
            ApplicationKind::Dns => "DNS",
            ApplicationKind::Tls => "TLS",
            ApplicationKind::Payload => "Payload",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationLayer {
    pub kind: ApplicationKind,
    pub contents: Vec<u8>,
}

/// One captured frame, decoded as far as the lower layers go.
#[derive(Debug, Clone)]
pub struct Packet {
    pub timestamp: DateTime<Utc>,
    pub link: Option<LinkLayer>,
    /// Raw ARP layer, decoded by the ARP analyzer.
    pub arp: Option<Vec<u8>>,
    pub network: Option<NetworkLayer>,
    pub transport: Option<TransportLayer>,
    pub application: Option<ApplicationLayer>,
}

impl Packet {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Packet {
            timestamp,
            link: None,
            arp: None,
            network: None,
            transport: None,
            application: None,
        }
    }

    /// Decodes an Ethernet II frame. Only a missing Ethernet header is an
    /// error; malformed upper layers are left out of the result.
    pub fn from_ethernet(frame: &[u8], timestamp: DateTime<Utc>) -> Result<Self, DecodeError> {
        let eth = Ethernet2HeaderSlice::from_slice(frame)
            .map_err(|_| DecodeError::truncated("Ethernet", 14, frame.len()))?;

        let mut packet = Packet::new(timestamp);
        let ether_type = eth.ether_type().0;
        packet.link = Some(LinkLayer {
            source: eth.source(),
            destination: eth.destination(),
            ether_type,
        });

        let payload = &frame[eth.slice().len()..];
        match ether_type {
            ETHERTYPE_ARP => packet.arp = Some(payload.to_vec()),
            ETHERTYPE_IPV4 => handle_ipv4(payload, &mut packet),
            ETHERTYPE_IPV6 => handle_ipv6(payload, &mut packet),
            other => trace!("ignoring ethertype {:#06x}", other),
        }

        Ok(packet)
    }

    pub fn tcp(&self) -> Option<&TcpSegment> {
        match &self.transport {
            Some(TransportLayer::Tcp(tcp)) => Some(tcp),
            _ => None,
        }
    }

    pub fn application_kind(&self) -> Option<ApplicationKind> {
        self.application.as_ref().map(|app| app.kind)
    }

    /// Transport payload; empty when the packet carries none.
    pub fn payload(&self) -> &[u8] {
        self.application
            .as_ref()
            .map(|app| app.contents.as_slice())
            .unwrap_or(&[])
    }

    /// The most specific protocol name known for this packet.
    pub fn protocol_label(&self) -> String {
        match self.application_kind() {
            Some(ApplicationKind::Payload) | None => {}
            Some(kind) => return kind.to_string(),
        }

        match &self.transport {
            Some(TransportLayer::Tcp(_)) => return "TCP".to_string(),
            Some(TransportLayer::Udp(_)) => return "UDP".to_string(),
            None => {}
        }

        match &self.network {
            Some(net) => match net.protocol {
                IP_PROTO_ICMP => "ICMP".to_string(),
                IP_PROTO_ICMPV6 => "ICMPv6".to_string(),
                other => format!("IP-{}", other),
            },
            None if self.arp.is_some() => "ARP".to_string(),
            None => "Ethernet".to_string(),
        }
    }
}

fn handle_ipv4(payload: &[u8], packet: &mut Packet) {
    let ip = match Ipv4HeaderSlice::from_slice(payload) {
        Ok(ip) => ip,
        Err(e) => {
            trace!("malformed IPv4 header: {}", e);
            return;
        }
    };

    let header_len = ip.slice().len();
    // Ethernet pads short frames; the IP length field is authoritative.
    let end = (ip.total_len() as usize).clamp(header_len, payload.len());

    packet.network = Some(NetworkLayer {
        source: IpAddr::V4(ip.source_addr()),
        destination: IpAddr::V4(ip.destination_addr()),
        protocol: ip.protocol().0,
    });
    handle_transport(ip.protocol().0, &payload[header_len..end], packet);
}

fn handle_ipv6(payload: &[u8], packet: &mut Packet) {
    let ip = match Ipv6HeaderSlice::from_slice(payload) {
        Ok(ip) => ip,
        Err(e) => {
            trace!("malformed IPv6 header: {}", e);
            return;
        }
    };

    let end = (IPV6_HEADER_LEN + ip.payload_length() as usize).min(payload.len());

    packet.network = Some(NetworkLayer {
        source: IpAddr::V6(ip.source_addr()),
        destination: IpAddr::V6(ip.destination_addr()),
        protocol: ip.next_header().0,
    });
    handle_transport(ip.next_header().0, &payload[IPV6_HEADER_LEN..end], packet);
}

fn handle_transport(protocol: u8, data: &[u8], packet: &mut Packet) {
    match protocol {
        IP_PROTO_TCP => {
            let Ok(tcp) = TcpHeaderSlice::from_slice(data) else {
                trace!("malformed TCP header");
                return;
            };
            let body = &data[tcp.slice().len()..];
            if !body.is_empty() {
                let kind = if looks_like_tls(body) {
                    ApplicationKind::Tls
                } else {
                    ApplicationKind::Payload
                };
                packet.application = Some(ApplicationLayer {
                    kind,
                    contents: body.to_vec(),
                });
            }
            packet.transport = Some(TransportLayer::Tcp(TcpSegment {
                source_port: tcp.source_port(),
                destination_port: tcp.destination_port(),
                sequence: tcp.sequence_number(),
                syn: tcp.syn(),
                fin: tcp.fin(),
                rst: tcp.rst(),
            }));
        }
        IP_PROTO_UDP => {
            let Ok(udp) = UdpHeaderSlice::from_slice(data) else {
                trace!("malformed UDP header");
                return;
            };
            let (src_port, dst_port) = (udp.source_port(), udp.destination_port());
            let body = &data[UDP_HEADER_LEN..];
            let kind = classify_udp(src_port, dst_port);
            if kind != ApplicationKind::Payload || !body.is_empty() {
                packet.application = Some(ApplicationLayer {
                    kind,
                    contents: body.to_vec(),
                });
            }
            packet.transport = Some(TransportLayer::Udp(UdpDatagram {
                source_port: src_port,
                destination_port: dst_port,
            }));
        }
        _ => {}
    }
}

fn classify_udp(src_port: u16, dst_port: u16) -> ApplicationKind {
    let either = |port: u16| src_port == port || dst_port == port;
    if either(DHCP_SERVER_PORT) || either(DHCP_CLIENT_PORT) {
        ApplicationKind::Dhcp
    } else if either(DNS_PORT) {
        ApplicationKind::Dns
    } else {
        ApplicationKind::Payload
    }
}

/// TLS record header: content type 20..=23, protocol version 3.x.
fn looks_like_tls(data: &[u8]) -> bool {
    data.len() >= 5 && (20..=23).contains(&data[0]) && data[1] == 3 && data[2] <= 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn frame(ether_type: u16, payload: &[u8]) -> Vec<u8> {
        let mut f = vec![0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        f.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        f.extend_from_slice(&ether_type.to_be_bytes());
        f.extend_from_slice(payload);
        f
    }

    fn ipv4(protocol: u8, payload: &[u8]) -> Vec<u8> {
        let total = (20 + payload.len()) as u16;
        let mut p = vec![0x45, 0x00];
        p.extend_from_slice(&total.to_be_bytes());
        p.extend_from_slice(&[0x00, 0x01, 0x40, 0x00, 0x40, protocol, 0x00, 0x00]);
        p.extend_from_slice(&[10, 0, 0, 1]);
        p.extend_from_slice(&[10, 0, 0, 2]);
        p.extend_from_slice(payload);
        p
    }

    fn udp(src: u16, dst: u16, payload: &[u8]) -> Vec<u8> {
        let mut u = Vec::new();
        u.extend_from_slice(&src.to_be_bytes());
        u.extend_from_slice(&dst.to_be_bytes());
        u.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
        u.extend_from_slice(&[0x00, 0x00]);
        u.extend_from_slice(payload);
        u
    }

    fn tcp(payload: &[u8]) -> Vec<u8> {
        let mut t = Vec::new();
        t.extend_from_slice(&40000u16.to_be_bytes());
        t.extend_from_slice(&443u16.to_be_bytes());
        t.extend_from_slice(&7u32.to_be_bytes());
        t.extend_from_slice(&0u32.to_be_bytes());
        t.extend_from_slice(&[0x50, 0x18, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00]);
        t.extend_from_slice(payload);
        t
    }

    #[test]
    fn test_udp_dns_classification() {
        let data = frame(ETHERTYPE_IPV4, &ipv4(IP_PROTO_UDP, &udp(5353, 53, b"\x12\x34")));
        let packet = Packet::from_ethernet(&data, Utc::now()).unwrap();

        let net = packet.network.as_ref().unwrap();
        assert_eq!(net.source, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(packet.application_kind(), Some(ApplicationKind::Dns));
        assert_eq!(packet.payload(), b"\x12\x34");
        assert_eq!(packet.protocol_label(), "DNS");
    }

    #[test]
    fn test_ethernet_padding_is_ignored() {
        let mut payload = ipv4(IP_PROTO_UDP, &udp(68, 67, b"abc"));
        payload.extend_from_slice(&[0u8; 12]);
        let packet = Packet::from_ethernet(&frame(ETHERTYPE_IPV4, &payload), Utc::now()).unwrap();

        assert_eq!(packet.application_kind(), Some(ApplicationKind::Dhcp));
        assert_eq!(packet.payload(), b"abc");
    }

    #[test]
    fn test_tls_record_detected() {
        let record = [0x16, 0x03, 0x01, 0x00, 0x05, 1, 2, 3, 4, 5];
        let data = frame(ETHERTYPE_IPV4, &ipv4(IP_PROTO_TCP, &tcp(&record)));
        let packet = Packet::from_ethernet(&data, Utc::now()).unwrap();

        assert_eq!(packet.application_kind(), Some(ApplicationKind::Tls));
        assert_eq!(packet.tcp().unwrap().sequence, 7);
    }

    #[test]
    fn test_arp_kept_raw() {
        let data = frame(ETHERTYPE_ARP, &[0x00, 0x01, 0x08, 0x00]);
        let packet = Packet::from_ethernet(&data, Utc::now()).unwrap();

        assert_eq!(packet.arp.as_deref(), Some(&[0x00, 0x01, 0x08, 0x00][..]));
        assert!(packet.network.is_none());
        assert_eq!(packet.protocol_label(), "ARP");
    }

    #[test]
    fn test_short_frame_is_error() {
        assert!(Packet::from_ethernet(&[0u8; 6], Utc::now()).is_err());
    }
}
