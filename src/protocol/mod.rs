//! Protocol analyzers.
//!
//! Each analyzer decides per packet whether it applies, folds applicable
//! packets into its own state and produces report blocks at the end.

pub mod arp;
pub mod dhcp;
pub mod dns;
pub mod http;

use crate::error::DecodeError;
use crate::files::FileStore;
use crate::packet::Packet;
use crate::report::Block;

pub use arp::ArpProtocol;
pub use dhcp::DhcpProtocol;
pub use dns::DnsProtocol;
pub use http::HttpProtocol;

/// A stateful analyzer for one protocol across the whole capture.
pub trait Protocol: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether [`Protocol::analyze`] should see this packet.
    fn can_analyze(&self, packet: &Packet) -> bool;

    /// Folds one packet into the analyzer state. On error the state is
    /// left as it was before the call.
    fn analyze(&mut self, packet: &Packet) -> Result<(), DecodeError>;

    /// Called once after the last packet, before [`Protocol::summary`].
    /// Analyzers with background work wait for it here and may hand
    /// extracted payloads to the file store.
    fn finish(&mut self, _files: &mut FileStore) {}

    /// Report blocks, in display order.
    fn summary(&self) -> Vec<Block>;
}

/// All analyzers in their fixed registration order.
pub fn default_protocols() -> Vec<Box<dyn Protocol>> {
    vec![
        Box::new(ArpProtocol::new()),
        Box::new(DhcpProtocol::new()),
        Box::new(DnsProtocol::new()),
        Box::new(HttpProtocol::new()),
    ]
}
