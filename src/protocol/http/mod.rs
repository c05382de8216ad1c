//! HTTP-over-TCP analyzer.
//!
//! TCP payloads are reassembled per flow direction; every direction gets a
//! request reader and a response reader running on a private tokio runtime.
//! The readers report back over a channel which is drained once all of them
//! have finished.

mod reader;

use crossbeam_channel::{Receiver, Sender};
use futures::future::join_all;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use reader::{MessageKind, StreamRecord};

use super::Protocol;
use crate::error::DecodeError;
use crate::files::FileStore;
use crate::format::generate_tree;
use crate::packet::{ApplicationKind, Packet};
use crate::reassembly::{Assembler, FlowKey, Stream, StreamFactory};
use crate::report::Block;

const FILE_ORIGIN: &str = "HTTP response";
const READER_THREADS: usize = 2;

/// Spawns one reader task per flow direction.
struct ReaderFactory {
    kind: MessageKind,
    handle: Handle,
    results: Sender<StreamRecord>,
    tasks: Vec<JoinHandle<()>>,
}

impl StreamFactory for ReaderFactory {
    type Stream = ReaderStream;

    fn new_stream(&mut self, key: &FlowKey) -> ReaderStream {
        debug!("starting HTTP {:?} reader for {}", self.kind, key);
        let (tx, rx) = mpsc::unbounded_channel();
        let task = self
            .handle
            .spawn(reader::read_messages(self.kind, rx, self.results.clone()));
        self.tasks.push(task);
        ReaderStream { tx: Some(tx) }
    }
}

/// Feeds reassembled bytes to a reader task. Dropping the sender is the
/// reader's end of stream.
struct ReaderStream {
    tx: Option<UnboundedSender<Vec<u8>>>,
}

impl Stream for ReaderStream {
    fn reassembled(&mut self, data: &[u8], _timestamp: chrono::DateTime<chrono::Utc>) {
        if let Some(tx) = &self.tx {
            // The reader only hangs up after it stopped caring.
            let _ = tx.send(data.to_vec());
        }
    }

    fn complete(&mut self) {
        self.tx = None;
    }
}

struct Engine {
    runtime: Runtime,
    requests: Assembler<ReaderFactory>,
    responses: Assembler<ReaderFactory>,
    results: Receiver<StreamRecord>,
}

impl Engine {
    fn start() -> Result<Self, DecodeError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(READER_THREADS)
            .thread_name("wirebrief-http")
            .enable_all()
            .build()
            .map_err(|source| DecodeError::Runtime {
                protocol: "HTTP",
                source,
            })?;
        let (tx, rx) = crossbeam_channel::unbounded();

        let factory = |kind| ReaderFactory {
            kind,
            handle: runtime.handle().clone(),
            results: tx.clone(),
            tasks: Vec::new(),
        };
        let requests = Assembler::new(factory(MessageKind::Request));
        let responses = Assembler::new(factory(MessageKind::Response));

        Ok(Engine {
            runtime,
            requests,
            responses,
            results: rx,
        })
    }

    /// Closes all flows, waits for every reader and returns what they found.
    fn shutdown(mut self) -> Vec<StreamRecord> {
        self.requests.flush_all();
        self.responses.flush_all();

        let mut tasks = std::mem::take(&mut self.requests.factory_mut().tasks);
        tasks.append(&mut self.responses.factory_mut().tasks);
        info!("Waiting for {} HTTP stream readers", tasks.len());

        for result in self.runtime.block_on(join_all(tasks)) {
            if let Err(e) = result {
                warn!("HTTP stream reader failed: {}", e);
            }
        }

        self.results.try_iter().collect()
    }
}

#[derive(Default)]
pub struct HttpProtocol {
    engine: Option<Engine>,
    requests: Vec<String>,
    responses: Vec<String>,
}

impl HttpProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> &[String] {
        &self.requests
    }

    pub fn responses(&self) -> &[String] {
        &self.responses
    }
}

impl Protocol for HttpProtocol {
    fn name(&self) -> &'static str {
        "HTTP"
    }

    fn can_analyze(&self, packet: &Packet) -> bool {
        packet.tcp().is_some() && packet.application_kind() != Some(ApplicationKind::Tls)
    }

    fn analyze(&mut self, packet: &Packet) -> Result<(), DecodeError> {
        let (Some(key), Some(segment)) = (FlowKey::from_packet(packet), packet.tcp()) else {
            return Err(DecodeError::MissingLayer {
                protocol: "HTTP",
                layer: "TCP/IP",
            });
        };

        if self.engine.is_none() {
            self.engine = Some(Engine::start()?);
        }
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };

        let payload = packet.payload();
        engine.requests.assemble(key, segment, payload, packet.timestamp);
        engine.responses.assemble(key, segment, payload, packet.timestamp);
        Ok(())
    }

    fn finish(&mut self, files: &mut FileStore) {
        let Some(engine) = self.engine.take() else {
            return;
        };

        for record in engine.shutdown() {
            match record {
                StreamRecord::Request(line) => self.requests.push(line),
                StreamRecord::Response { line, body } => {
                    files.register("", body, FILE_ORIGIN);
                    self.responses.push(line);
                }
            }
        }
    }

    fn summary(&self) -> Vec<Block> {
        vec![
            Block::new("HTTP Requests", generate_tree(&self.requests)),
            Block::new("HTTP Responses", generate_tree(&self.responses)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{ApplicationLayer, NetworkLayer, TcpSegment, TransportLayer};
    use chrono::Utc;
    use std::net::{IpAddr, Ipv4Addr};

    const CLIENT: u8 = 1;
    const SERVER: u8 = 2;

    fn segment(from: u8, to: u8, sequence: u32, syn: bool, fin: bool, payload: &[u8]) -> Packet {
        let port = |host| if host == SERVER { 80 } else { 40000 };
        let mut p = Packet::new(Utc::now());
        p.network = Some(NetworkLayer {
            source: IpAddr::V4(Ipv4Addr::new(10, 0, 0, from)),
            destination: IpAddr::V4(Ipv4Addr::new(10, 0, 0, to)),
            protocol: 6,
        });
        p.transport = Some(TransportLayer::Tcp(TcpSegment {
            source_port: port(from),
            destination_port: port(to),
            sequence,
            syn,
            fin,
            rst: false,
        }));
        if !payload.is_empty() {
            p.application = Some(ApplicationLayer {
                kind: ApplicationKind::Payload,
                contents: payload.to_vec(),
            });
        }
        p
    }

    #[test]
    fn test_applicability() {
        let http = HttpProtocol::new();
        assert!(http.can_analyze(&segment(CLIENT, SERVER, 0, true, false, b"")));

        let mut tls = segment(CLIENT, SERVER, 1, false, false, b"\x16\x03\x01\x00\x01\x00");
        if let Some(app) = tls.application.as_mut() {
            app.kind = ApplicationKind::Tls;
        }
        assert!(!http.can_analyze(&tls));
        assert!(!http.can_analyze(&Packet::new(Utc::now())));
    }

    #[test]
    fn test_exchange_is_summarized_and_body_stored() {
        let request = b"GET /file.txt HTTP/1.1\r\nHost: files.example\r\n\r\n";
        let response = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 12\r\n\r\nhello world\n";

        let mut http = HttpProtocol::new();
        let packets = [
            segment(CLIENT, SERVER, 100, true, false, b""),
            segment(SERVER, CLIENT, 500, true, false, b""),
            segment(CLIENT, SERVER, 101, false, false, request),
            segment(SERVER, CLIENT, 501, false, false, response),
            segment(CLIENT, SERVER, 101 + request.len() as u32, false, true, b""),
            segment(SERVER, CLIENT, 501 + response.len() as u32, false, true, b""),
        ];
        for p in &packets {
            http.analyze(p).unwrap();
        }

        let mut files = FileStore::new();
        http.finish(&mut files);

        assert_eq!(http.requests(), &["Request GET http://files.example/file.txt".to_string()]);
        assert_eq!(
            http.responses(),
            &["Response 200 OK, Type text/plain, Size 12 bytes".to_string()]
        );
        assert_eq!(files.len(), 1);
        assert_eq!(files.files()[0].content, b"hello world\n");
        assert_eq!(files.files()[0].origin, "HTTP response");

        let blocks = http.summary();
        assert_eq!(blocks[0].content, "'- Request GET http://files.example/file.txt\n");
    }

    #[test]
    fn test_finish_without_traffic() {
        let mut http = HttpProtocol::new();
        let mut files = FileStore::new();
        http.finish(&mut files);
        assert!(files.is_empty());
        assert!(http.summary().iter().all(|b| b.content.is_empty()));
    }
}
