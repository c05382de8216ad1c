//! wirebrief: offline network capture summaries.
//!
//! A capture is read once, packet by packet. Every packet goes to the
//! protocol analyzers that accept it and into the communication graph.
//! Afterwards each analyzer renders its findings as report blocks and
//! files carried over HTTP can be extracted.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod files;
pub mod format;
pub mod graph;
pub mod packet;
pub mod protocol;
pub mod reassembly;
pub mod report;
pub mod source;

pub use config::{Args, Settings};
pub use dispatch::{DispatchStats, Dispatcher};
pub use error::{DecodeError, Error, SourceError};
pub use files::{FileStore, Selection};
pub use graph::CommGraph;
pub use packet::Packet;
pub use protocol::{default_protocols, Protocol};
pub use report::{Block, Notices, RenderOptions, Renderer};
pub use source::CaptureSource;
