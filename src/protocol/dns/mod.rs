//! DNS analyzer: which names were asked for, which were answered, and
//! whether the answers point into private address space.

mod stats;

use std::net::Ipv4Addr;

use tracing::trace;

pub use stats::{type_name, Direction, DomainStats};

use super::Protocol;
use crate::error::DecodeError;
use crate::packet::{ApplicationKind, Packet};
use crate::report::Block;

const HEADER_LEN: usize = 12;
const MAX_POINTER_JUMPS: usize = 16;
const TYPE_A: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub rtype: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub name: String,
    pub rtype: u16,
    /// Set for A records.
    pub address: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsMessage {
    pub id: u16,
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
}

impl DnsMessage {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::truncated("DNS", HEADER_LEN, data.len()));
        }
        let read_u16 = |at: usize| u16::from_be_bytes([data[at], data[at + 1]]);
        let id = read_u16(0);
        let qdcount = read_u16(4);
        let ancount = read_u16(6);

        let mut pos = HEADER_LEN;

        let mut questions = Vec::with_capacity(qdcount as usize);
        for _ in 0..qdcount {
            let name = read_name(data, &mut pos)?;
            let fixed = take(data, pos, 4)?;
            pos += 4;
            questions.push(Question {
                name,
                rtype: u16::from_be_bytes([fixed[0], fixed[1]]),
            });
        }

        let mut answers = Vec::with_capacity(ancount as usize);
        for _ in 0..ancount {
            let name = read_name(data, &mut pos)?;
            let fixed = take(data, pos, 10)?;
            pos += 10;
            let rtype = u16::from_be_bytes([fixed[0], fixed[1]]);
            let rdlength = u16::from_be_bytes([fixed[8], fixed[9]]) as usize;
            let rdata = take(data, pos, rdlength)?;
            pos += rdlength;

            let address = match (rtype, rdata) {
                (TYPE_A, &[a, b, c, d]) => Some(Ipv4Addr::new(a, b, c, d)),
                (TYPE_A, _) => {
                    return Err(DecodeError::invalid(
                        "DNS",
                        "A record",
                        format!("rdata of {} bytes", rdata.len()),
                    ))
                }
                _ => None,
            };
            answers.push(Answer {
                name,
                rtype,
                address,
            });
        }

        Ok(DnsMessage {
            id,
            questions,
            answers,
        })
    }
}

fn take(data: &[u8], at: usize, len: usize) -> Result<&[u8], DecodeError> {
    data.get(at..at + len)
        .ok_or_else(|| DecodeError::truncated("DNS", at + len, data.len()))
}

/// Reads a possibly compressed name starting at `*pos` and advances `*pos`
/// past it. Names are lowercased, without the trailing dot.
fn read_name(data: &[u8], pos: &mut usize) -> Result<String, DecodeError> {
    let mut labels: Vec<String> = Vec::new();
    let mut cursor = *pos;
    let mut jumps = 0;
    let mut end_of_name = None;

    loop {
        let len = *data
            .get(cursor)
            .ok_or_else(|| DecodeError::truncated("DNS", cursor + 1, data.len()))?;

        match len {
            0 => {
                end_of_name.get_or_insert(cursor + 1);
                break;
            }
            l if l & 0xC0 == 0xC0 => {
                let low = *data
                    .get(cursor + 1)
                    .ok_or_else(|| DecodeError::truncated("DNS", cursor + 2, data.len()))?;
                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return Err(DecodeError::invalid("DNS", "name", "too many compression pointers"));
                }
                end_of_name.get_or_insert(cursor + 2);
                cursor = (((l & 0x3F) as usize) << 8) | low as usize;
            }
            l if l & 0xC0 != 0 => {
                return Err(DecodeError::invalid("DNS", "name", format!("label type {:#04x}", l)));
            }
            l => {
                let label = take(data, cursor + 1, l as usize)?;
                labels.push(String::from_utf8_lossy(label).to_lowercase());
                cursor += 1 + l as usize;
            }
        }
    }

    *pos = end_of_name.unwrap_or(cursor + 1);
    Ok(labels.join("."))
}

#[derive(Debug)]
pub struct DnsProtocol {
    questions: DomainStats,
    answers: DomainStats,
}

impl Default for DnsProtocol {
    fn default() -> Self {
        DnsProtocol {
            questions: DomainStats::new(Direction::Questions),
            answers: DomainStats::new(Direction::Answers),
        }
    }
}

impl DnsProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn questions(&self) -> &DomainStats {
        &self.questions
    }

    pub fn answers(&self) -> &DomainStats {
        &self.answers
    }
}

impl Protocol for DnsProtocol {
    fn name(&self) -> &'static str {
        "DNS"
    }

    fn can_analyze(&self, packet: &Packet) -> bool {
        packet.application_kind() == Some(ApplicationKind::Dns)
    }

    fn analyze(&mut self, packet: &Packet) -> Result<(), DecodeError> {
        let msg = DnsMessage::decode(packet.payload())?;
        trace!(
            "DNS message {:#06x}: {} questions, {} answers",
            msg.id,
            msg.questions.len(),
            msg.answers.len()
        );

        for q in &msg.questions {
            self.questions.add(&q.name, q.rtype);
        }

        for a in &msg.answers {
            if !self.answers.add(&a.name, a.rtype) {
                continue;
            }
            if let Some(addr) = a.address {
                self.answers.add_address(addr);
            }
        }

        Ok(())
    }

    fn summary(&self) -> Vec<Block> {
        vec![
            Block::new("DNS Request Summary", self.questions.summary()),
            Block::new("DNS Response Summary", self.answers.summary()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::ApplicationLayer;
    use chrono::Utc;

    fn encode_name(name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for label in name.split('.') {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
        out.push(0);
        out
    }

    /// Query for `name` plus an A answer pointing back at the question name.
    fn response(name: &str, addr: [u8; 4]) -> Vec<u8> {
        let mut d = vec![0x12, 0x34, 0x81, 0x80, 0, 1, 0, 1, 0, 0, 0, 0];
        d.extend_from_slice(&encode_name(name));
        d.extend_from_slice(&[0, 1, 0, 1]);
        d.extend_from_slice(&[0xC0, 0x0C, 0, 1, 0, 1, 0, 0, 0x0e, 0x10, 0, 4]);
        d.extend_from_slice(&addr);
        d
    }

    fn packet(payload: Vec<u8>) -> Packet {
        let mut p = Packet::new(Utc::now());
        p.application = Some(ApplicationLayer {
            kind: ApplicationKind::Dns,
            contents: payload,
        });
        p
    }

    #[test]
    fn test_decode_with_compression() {
        let msg = DnsMessage::decode(&response("WWW.Example.com", [1, 2, 3, 4])).unwrap();
        assert_eq!(msg.id, 0x1234);
        assert_eq!(msg.questions, vec![Question { name: "www.example.com".into(), rtype: 1 }]);
        assert_eq!(msg.answers[0].name, "www.example.com");
        assert_eq!(msg.answers[0].address, Some(Ipv4Addr::new(1, 2, 3, 4)));
    }

    #[test]
    fn test_pointer_loop_rejected() {
        let mut d = vec![0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];
        d.extend_from_slice(&[0xC0, 0x0C, 0, 1, 0, 1]);
        assert!(matches!(
            DnsMessage::decode(&d),
            Err(DecodeError::Invalid { field: "name", .. })
        ));
    }

    #[test]
    fn test_truncated() {
        let d = response("example.com", [1, 2, 3, 4]);
        assert!(DnsMessage::decode(&d[..d.len() - 2]).is_err());
        assert!(DnsMessage::decode(&d[..5]).is_err());
    }

    #[test]
    fn test_question_and_answer_stats() {
        let mut dns = DnsProtocol::new();
        dns.analyze(&packet(response("www.example.co.uk", [10, 0, 0, 8]))).unwrap();
        dns.analyze(&packet(response("fileserver.lan", [192, 168, 0, 2]))).unwrap();

        assert_eq!(dns.questions().total(), 2);
        assert_eq!(dns.questions().base_domains(), &["example.co.uk".to_string()]);
        assert_eq!(dns.questions().private_domains(), &["fileserver.lan".to_string()]);
        assert_eq!(
            dns.answers().private_ips(),
            &["10.0.0.8".to_string(), "192.168.0.2".to_string()]
        );

        let blocks = dns.summary();
        assert_eq!(blocks[0].title, "DNS Request Summary");
        assert!(blocks[0].content.starts_with("2 DNS questions in total\n2 A records\n"));
        assert!(blocks[1].content.contains("Answered with 0 public IP addresses and 2 private IP addresses"));
    }

    #[test]
    fn test_malformed_payload_is_error() {
        let mut dns = DnsProtocol::new();
        assert!(dns.analyze(&packet(vec![0x12, 0x34])).is_err());
        assert_eq!(dns.questions().total(), 0);
    }
}
