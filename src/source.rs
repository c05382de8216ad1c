//! Offline capture file reader.

use std::path::Path;

use chrono::{DateTime, Utc};
use pcap::{Capture, Linktype, Offline};
use tracing::{error, info};

use crate::error::{Error, SourceError};
use crate::packet::Packet;

/// Consecutive read failures after which the file is considered broken.
const MAX_CONSECUTIVE_ERRORS: usize = 64;

pub struct CaptureSource {
    cap: Capture<Offline>,
    consecutive_errors: usize,
    done: bool,
}

impl CaptureSource {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let cap = Capture::from_file(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let link = cap.get_datalink();
        let name = link_name(link);
        info!("Capture link type is {} (ID {})", name, link.0);
        if link != Linktype::ETHERNET {
            return Err(Error::UnsupportedLinkType { name, id: link.0 });
        }

        Ok(CaptureSource {
            cap,
            consecutive_errors: 0,
            done: false,
        })
    }
}

fn link_name(link: Linktype) -> String {
    link.get_name().unwrap_or_else(|_| "unknown".to_string())
}

fn timestamp(header: &pcap::PacketHeader) -> DateTime<Utc> {
    let secs = header.ts.tv_sec as i64;
    let nanos = (header.ts.tv_usec as u32).saturating_mul(1000);
    DateTime::from_timestamp(secs, nanos).unwrap_or_default()
}

impl Iterator for CaptureSource {
    type Item = Result<Packet, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let item = match self.cap.next_packet() {
            Ok(raw) => Packet::from_ethernet(raw.data, timestamp(raw.header)).map_err(SourceError::from),
            Err(pcap::Error::NoMorePackets) => {
                self.done = true;
                return None;
            }
            Err(e) => Err(SourceError::from(e)),
        };

        match &item {
            Ok(_) => self.consecutive_errors = 0,
            Err(SourceError::Read(_)) => {
                self.consecutive_errors += 1;
                if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    error!(
                        "Giving up after {} consecutive read errors",
                        self.consecutive_errors
                    );
                    self.done = true;
                }
            }
            Err(SourceError::Frame(_)) => {}
        }

        Some(item)
    }
}
