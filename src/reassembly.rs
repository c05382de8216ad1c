//! TCP stream reassembly.
//!
//! Segments are fed in capture order per directional flow. Contiguous bytes
//! are handed to the flow's [`Stream`] as soon as they are available;
//! segments ahead of a gap wait until the gap is filled or the capture ends.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::packet::{Packet, TcpSegment};

/// One direction of a TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src: SocketAddr,
    pub dst: SocketAddr,
}

impl FlowKey {
    pub fn from_packet(packet: &Packet) -> Option<Self> {
        let net = packet.network.as_ref()?;
        let tcp = packet.tcp()?;
        Some(FlowKey {
            src: SocketAddr::new(net.source, tcp.source_port),
            dst: SocketAddr::new(net.destination, tcp.destination_port),
        })
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

/// Receiver of the reassembled bytes of one flow.
pub trait Stream {
    fn reassembled(&mut self, data: &[u8], timestamp: DateTime<Utc>);

    /// No more data will arrive.
    fn complete(&mut self);
}

pub trait StreamFactory {
    type Stream: Stream;

    fn new_stream(&mut self, key: &FlowKey) -> Self::Stream;
}

struct Flow<S> {
    stream: S,
    /// Sequence number of the first payload byte.
    base: u32,
    /// Offset from `base` of the next byte to deliver.
    next: u32,
    /// Out-of-order segments by offset from `base`.
    pending: BTreeMap<u32, Vec<u8>>,
}

impl<S: Stream> Flow<S> {
    fn new(stream: S, base: u32) -> Self {
        Flow {
            stream,
            base,
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    fn offset_of(&self, seq: u32) -> i64 {
        // Offsets before `base` come out negative.
        seq.wrapping_sub(self.base) as i32 as i64
    }

    fn add(&mut self, seq: u32, payload: &[u8], timestamp: DateTime<Utc>) {
        let start = self.offset_of(seq);
        let end = start + payload.len() as i64;
        let next = self.next as i64;

        if end <= next {
            trace!("dropping retransmitted segment");
            return;
        }

        let data = if start < next {
            &payload[(next - start) as usize..]
        } else {
            payload
        };
        let start = start.max(next) as u32;

        if start == self.next {
            self.deliver(data, timestamp);
            self.drain_pending(timestamp);
        } else {
            let slot = self.pending.entry(start).or_default();
            if data.len() > slot.len() {
                *slot = data.to_vec();
            }
        }
    }

    fn deliver(&mut self, data: &[u8], timestamp: DateTime<Utc>) {
        self.stream.reassembled(data, timestamp);
        self.next = self.next.wrapping_add(data.len() as u32);
    }

    /// Delivers buffered segments that became contiguous.
    fn drain_pending(&mut self, timestamp: DateTime<Utc>) {
        while let Some((&start, _)) = self.pending.first_key_value() {
            if start > self.next {
                break;
            }
            let Some(data) = self.pending.remove(&start) else {
                break;
            };
            let skip = (self.next - start) as usize;
            if skip < data.len() {
                self.deliver(&data[skip..], timestamp);
            }
        }
    }

    /// Delivers everything still buffered, jumping over gaps.
    fn flush(&mut self, timestamp: DateTime<Utc>) {
        while let Some((&start, _)) = self.pending.first_key_value() {
            if start > self.next {
                debug!("skipping {} missing bytes", start - self.next);
                self.next = start;
            }
            self.drain_pending(timestamp);
        }
    }
}

/// Reassembles every flow it is fed and hands the byte streams to the
/// streams created by `F`.
pub struct Assembler<F: StreamFactory> {
    factory: F,
    flows: HashMap<FlowKey, Flow<F::Stream>>,
    last_seen: Option<DateTime<Utc>>,
}

impl<F: StreamFactory> Assembler<F> {
    pub fn new(factory: F) -> Self {
        Assembler {
            factory,
            flows: HashMap::new(),
            last_seen: None,
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    /// Number of flows still open.
    pub fn open_flows(&self) -> usize {
        self.flows.len()
    }

    pub fn assemble(
        &mut self,
        key: FlowKey,
        segment: &TcpSegment,
        payload: &[u8],
        timestamp: DateTime<Utc>,
    ) {
        self.last_seen = Some(timestamp);

        // SYN occupies one sequence number before the first payload byte.
        let first_byte = if segment.syn {
            segment.sequence.wrapping_add(1)
        } else {
            segment.sequence
        };

        if !self.flows.contains_key(&key) {
            if !segment.syn && payload.is_empty() {
                return;
            }
            trace!("new flow {}", key);
            let stream = self.factory.new_stream(&key);
            self.flows.insert(key, Flow::new(stream, first_byte));
        }

        let Some(flow) = self.flows.get_mut(&key) else {
            return;
        };

        if segment.syn && flow.next == 0 && flow.pending.is_empty() {
            flow.base = first_byte;
        }

        if !payload.is_empty() {
            flow.add(first_byte, payload, timestamp);
        }

        if segment.fin || segment.rst {
            if !flow.pending.is_empty() {
                debug!(
                    "flow {} closed with {} segments missing their predecessors",
                    key,
                    flow.pending.len()
                );
            }
            if let Some(mut flow) = self.flows.remove(&key) {
                flow.stream.complete();
            }
        }
    }

    /// Flushes and closes every open flow.
    pub fn flush_all(&mut self) {
        let timestamp = self.last_seen.unwrap_or_else(Utc::now);
        for (key, mut flow) in self.flows.drain() {
            trace!("flushing flow {}", key);
            flow.flush(timestamp);
            flow.stream.complete();
        }
    }
}
