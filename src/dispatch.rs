//! Routes every packet to the analyzers that want it.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::files::FileStore;
use crate::graph::CommGraph;
use crate::packet::Packet;
use crate::protocol::{default_protocols, Protocol};
use crate::report::Block;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub total: usize,
    /// Packets at least one analyzer accepted.
    pub processed: usize,
    pub read_errors: usize,
    pub decode_errors: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

impl DispatchStats {
    fn observe(&mut self, timestamp: DateTime<Utc>) {
        self.total += 1;
        if self.first.map_or(true, |first| timestamp < first) {
            self.first = Some(timestamp);
        }
        if self.last.map_or(true, |last| timestamp > last) {
            self.last = Some(timestamp);
        }
    }

    pub fn summary(&self) -> String {
        let percent = if self.total == 0 {
            0
        } else {
            self.processed * 100 / self.total
        };
        let mut summary = format!(
            "Processed {} out of {} packets ({}%)\n",
            self.processed, self.total, percent
        );

        if let (Some(first), Some(last)) = (self.first, self.last) {
            summary.push_str(&format!(
                "Captured from {} to {} ({} seconds)\n",
                first.format("%Y-%m-%d %H:%M:%S UTC"),
                last.format("%Y-%m-%d %H:%M:%S UTC"),
                (last - first).num_seconds()
            ));
        }
        summary
    }
}

pub struct Dispatcher {
    protocols: Vec<Box<dyn Protocol>>,
    graph: CommGraph,
    stats: DispatchStats,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher::new(default_protocols())
    }
}

impl Dispatcher {
    pub fn new(protocols: Vec<Box<dyn Protocol>>) -> Self {
        Dispatcher {
            protocols,
            graph: CommGraph::new(),
            stats: DispatchStats::default(),
        }
    }

    /// Consumes the whole packet stream. Read errors are logged and skipped.
    pub fn analyze<I>(&mut self, packets: I) -> DispatchStats
    where
        I: IntoIterator<Item = Result<Packet, SourceError>>,
    {
        for item in packets {
            match item {
                Ok(packet) => self.dispatch(&packet),
                Err(e) => {
                    self.stats.read_errors += 1;
                    warn!("Encountered error while reading packet: {}", e);
                }
            }
        }

        info!(
            "Processed {} of {} packets ({} read errors, {} decode errors)",
            self.stats.processed, self.stats.total, self.stats.read_errors, self.stats.decode_errors
        );
        self.stats.clone()
    }

    /// Hands one packet to every applicable analyzer and records it in the
    /// communication graph.
    pub fn dispatch(&mut self, packet: &Packet) {
        self.stats.observe(packet.timestamp);

        let mut handled = false;
        for protocol in self.protocols.iter_mut() {
            if !protocol.can_analyze(packet) {
                continue;
            }
            handled = true;
            if let Err(e) = protocol.analyze(packet) {
                self.stats.decode_errors += 1;
                debug!("Error while decoding {} packet: {}", protocol.name(), e);
            }
        }
        if handled {
            self.stats.processed += 1;
        }

        self.graph.record(packet);
    }

    /// Lets analyzers with background work wrap up.
    pub fn finish(&mut self, files: &mut FileStore) {
        for protocol in self.protocols.iter_mut() {
            protocol.finish(files);
        }
    }

    /// Overall statistics followed by every analyzer's blocks in
    /// registration order.
    pub fn summaries(&self) -> Vec<Block> {
        let mut blocks = vec![Block::new("Overall statistics", self.stats.summary())];
        for protocol in &self.protocols {
            blocks.extend(protocol.summary());
        }
        blocks
    }

    pub fn graph(&self) -> &CommGraph {
        &self.graph
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}
