//! Per-flow HTTP message readers.
//!
//! Each reader owns the byte stream of one reassembled flow direction and
//! turns it into summary records, one per parsed message.

use crossbeam_channel::Sender;
use httparse::{Header, Request, Response, Status, EMPTY_HEADER};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, trace};

const MAX_HEADERS: usize = 64;

/// Result of one parsed message, sent back to the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRecord {
    Request(String),
    Response { line: String, body: Vec<u8> },
}

/// Which message type a reader looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    Empty,
    Length(usize),
    Chunked,
    UntilEof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Head {
    len: usize,
    summary: String,
    framing: BodyFraming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HeadParse {
    Complete(Head),
    Partial,
    Invalid,
}

fn header_value(headers: &[Header<'_>], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| String::from_utf8_lossy(h.value).trim().to_string())
}

fn framing_of(headers: &[Header<'_>]) -> Option<BodyFraming> {
    let chunked = header_value(headers, "transfer-encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false);
    if chunked {
        return Some(BodyFraming::Chunked);
    }
    header_value(headers, "content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .map(BodyFraming::Length)
}

fn parse_head(kind: MessageKind, buf: &[u8]) -> HeadParse {
    let mut headers = [EMPTY_HEADER; MAX_HEADERS];

    match kind {
        MessageKind::Request => {
            let mut req = Request::new(&mut headers);
            match req.parse(buf) {
                Ok(Status::Complete(len)) => {
                    let host = header_value(req.headers, "host").unwrap_or_default();
                    let summary = format!(
                        "Request {} http://{}{}",
                        req.method.unwrap_or_default(),
                        host,
                        req.path.unwrap_or_default()
                    );
                    let framing = framing_of(req.headers).unwrap_or(BodyFraming::Empty);
                    HeadParse::Complete(Head {
                        len,
                        summary,
                        framing,
                    })
                }
                Ok(Status::Partial) => HeadParse::Partial,
                Err(_) => HeadParse::Invalid,
            }
        }
        MessageKind::Response => {
            let mut resp = Response::new(&mut headers);
            match resp.parse(buf) {
                Ok(Status::Complete(len)) => {
                    let code = resp.code.unwrap_or_default();
                    let content_type =
                        header_value(resp.headers, "content-type").unwrap_or_else(|| "(unknown)".to_string());
                    let summary = format!(
                        "Response {} {}, Type {}",
                        code,
                        resp.reason.unwrap_or_default(),
                        content_type
                    );
                    // 1xx, 204 and 304 never carry a body.
                    let framing = if (100..200).contains(&code) || code == 204 || code == 304 {
                        BodyFraming::Empty
                    } else {
                        framing_of(resp.headers).unwrap_or(BodyFraming::UntilEof)
                    };
                    HeadParse::Complete(Head {
                        len,
                        summary,
                        framing,
                    })
                }
                Ok(Status::Partial) => HeadParse::Partial,
                Err(_) => HeadParse::Invalid,
            }
        }
    }
}

/// Bytes received so far on one flow direction.
struct ByteStream {
    rx: UnboundedReceiver<Vec<u8>>,
    buf: Vec<u8>,
    eof: bool,
}

impl ByteStream {
    fn new(rx: UnboundedReceiver<Vec<u8>>) -> Self {
        ByteStream {
            rx,
            buf: Vec::new(),
            eof: false,
        }
    }

    /// Waits for the next chunk. Returns false at end of stream.
    async fn fill(&mut self) -> bool {
        if self.eof {
            return false;
        }
        match self.rx.recv().await {
            Some(chunk) => {
                self.buf.extend_from_slice(&chunk);
                true
            }
            None => {
                self.eof = true;
                false
            }
        }
    }

    async fn fill_to(&mut self, len: usize) -> bool {
        while self.buf.len() < len {
            if !self.fill().await {
                return false;
            }
        }
        true
    }

    fn consume(&mut self, len: usize) -> Vec<u8> {
        let len = len.min(self.buf.len());
        self.buf.drain(..len).collect()
    }

    /// Drops everything up to and including the next newline.
    async fn discard_line(&mut self) -> bool {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                self.buf.drain(..=pos);
                return true;
            }
            if !self.fill().await {
                self.buf.clear();
                return false;
            }
        }
    }
}

async fn read_body(stream: &mut ByteStream, framing: BodyFraming) -> Vec<u8> {
    match framing {
        BodyFraming::Empty => Vec::new(),
        BodyFraming::Length(len) => {
            if !stream.fill_to(len).await {
                debug!("stream ended {} bytes into a {} byte body", stream.buf.len(), len);
            }
            stream.consume(len)
        }
        BodyFraming::UntilEof => {
            while stream.fill().await {}
            let len = stream.buf.len();
            stream.consume(len)
        }
        BodyFraming::Chunked => read_chunked(stream).await,
    }
}

async fn read_chunked(stream: &mut ByteStream) -> Vec<u8> {
    let mut body = Vec::new();
    loop {
        match httparse::parse_chunk_size(&stream.buf) {
            Ok(Status::Complete((start, 0))) => {
                stream.consume(start);
                skip_trailer(stream).await;
                return body;
            }
            Ok(Status::Complete((start, size))) => {
                let Some((size, needed)) = usize::try_from(size)
                    .ok()
                    .and_then(|size| start.checked_add(size).and_then(|n| n.checked_add(2)).map(|n| (size, n)))
                else {
                    debug!("chunk size {:#x} out of range, dropping rest of body", size);
                    return body;
                };
                if !stream.fill_to(needed).await {
                    stream.consume(start);
                    body.extend(stream.consume(size));
                    return body;
                }
                body.extend_from_slice(&stream.buf[start..start + size]);
                stream.consume(needed);
            }
            Ok(Status::Partial) => {
                if !stream.fill().await {
                    return body;
                }
            }
            Err(_) => {
                debug!("invalid chunk size, dropping rest of body");
                return body;
            }
        }
    }
}

async fn skip_trailer(stream: &mut ByteStream) {
    loop {
        if stream.buf.starts_with(b"\r\n") {
            stream.consume(2);
            return;
        }
        if let Some(pos) = stream.buf.windows(4).position(|w| w == b"\r\n\r\n") {
            stream.consume(pos + 4);
            return;
        }
        if !stream.fill().await {
            return;
        }
    }
}

/// Reads messages of `kind` until the flow ends. Bytes that do not start a
/// message of that kind are skipped line by line; they usually belong to
/// the other direction's protocol.
pub async fn read_messages(
    kind: MessageKind,
    rx: UnboundedReceiver<Vec<u8>>,
    results: Sender<StreamRecord>,
) {
    let mut stream = ByteStream::new(rx);

    loop {
        if stream.buf.is_empty() && !stream.fill().await {
            break;
        }

        match parse_head(kind, &stream.buf) {
            HeadParse::Complete(head) => {
                stream.consume(head.len);
                let body = read_body(&mut stream, head.framing).await;
                let record = match kind {
                    MessageKind::Request => StreamRecord::Request(head.summary),
                    MessageKind::Response => StreamRecord::Response {
                        line: format!("{}, Size {} bytes", head.summary, body.len()),
                        body,
                    },
                };
                if results.send(record).is_err() {
                    break;
                }
            }
            HeadParse::Partial => {
                if !stream.fill().await {
                    break;
                }
            }
            HeadParse::Invalid => {
                trace!("skipping line that does not start an HTTP {:?}", kind);
                if !stream.discard_line().await {
                    break;
                }
            }
        }
    }
}
