//! Error types for wirebrief.
//!
//! Only [`Error`] aborts a run. [`SourceError`] and [`DecodeError`] are
//! per-packet and end up in the log while the analysis carries on.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors: the run cannot start or cannot continue.
#[derive(Error, Debug)]
pub enum Error {
    /// No capture file given on the command line, in the environment or config.
    #[error("missing capture file to analyze, specify it with --file")]
    MissingInput,

    /// The capture file could not be opened or is not a capture.
    #[error("unable to open capture {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: pcap::Error,
    },

    /// Link type other than Ethernet.
    #[error("link type {name} (ID {id}) is not supported")]
    UnsupportedLinkType { name: String, id: i32 },

    /// Config file could not be parsed.
    #[error("invalid config file {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A packet could not be read from the capture source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("read failed: {0}")]
    Read(#[from] pcap::Error),

    #[error("undecodable frame: {0}")]
    Frame(#[from] DecodeError),
}

/// An analyzer could not decode the layer it is responsible for.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("{protocol}: packet too short (need {needed} bytes, have {have})")]
    Truncated {
        protocol: &'static str,
        needed: usize,
        have: usize,
    },

    #[error("{protocol}: invalid {field}: {reason}")]
    Invalid {
        protocol: &'static str,
        field: &'static str,
        reason: String,
    },

    #[error("{protocol}: missing {layer} layer")]
    MissingLayer {
        protocol: &'static str,
        layer: &'static str,
    },

    #[error("{protocol}: unable to start stream readers: {source}")]
    Runtime {
        protocol: &'static str,
        #[source]
        source: io::Error,
    },
}

impl DecodeError {
    pub(crate) fn truncated(protocol: &'static str, needed: usize, have: usize) -> Self {
        DecodeError::Truncated {
            protocol,
            needed,
            have,
        }
    }

    pub(crate) fn invalid(protocol: &'static str, field: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::Invalid {
            protocol,
            field,
            reason: reason.into(),
        }
    }
}
