// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanwerk.

use std::time::Duration;

use thiserror::Error;

use crate::types::ErrorClass;

/// Top-level error type for all Scanwerk operations.
#[derive(Debug, Error)]
pub enum ScanwerkError {
    // -- Transport errors --
    #[error("no candidate endpoints to connect to")]
    NoCandidates,

    /// Every candidate failed; only the last candidate's error is kept.
    #[error("connecting to {candidate} failed (tried {attempts} candidate(s)): {source}")]
    Connect {
        candidate: String,
        attempts: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("connecting to {candidate} timed out after {timeout:?}")]
    ConnectTimeout { candidate: String, timeout: Duration },

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded before a connection could be made")]
    DeadlineExceeded,

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("HTTP exchange failed: {0}")]
    Http(String),

    // -- Protocol errors --
    #[error("{url}: unexpected HTTP status: got {status} ({message}), want {want}")]
    UnexpectedStatus {
        url: String,
        code: u16,
        status: String,
        message: String,
        want: String,
    },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("scan job response is missing a usable Location header: {0}")]
    MissingLocation(String),

    // -- Codec errors --
    #[error("decoding XML: {reason} (invalid input? {payload:?})")]
    Decode { reason: String, payload: String },

    #[error("encoding scan settings: {0}")]
    Encode(String),

    // -- Negotiation errors --
    #[error("invalid scan settings: {0}")]
    InvalidSettings(String),

    #[error("scanner not ready: in state {got:?}, want {want:?}")]
    NotReady { got: String, want: String },

    #[error("scanner feeder contains no documents: status {got:?}, want {want:?}")]
    FeederEmpty { got: String, want: String },

    #[error("this scanner doesn't have an ADF")]
    NoFeeder,

    #[error("this scanner doesn't support duplex mode")]
    DuplexUnsupported,

    #[error("this scanner doesn't support simplex mode")]
    SimplexUnsupported,

    // -- Job errors --
    #[error("503 retry limit ({0}) reached while calling NextDocument")]
    RetryLimit(u32),

    #[error("scan job {0} is already closed")]
    JobClosed(String),

    // -- Discovery --
    #[error("scanner discovery failed: {0}")]
    Discovery(String),

    // -- Local --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScanwerkError {
    /// Classify this error so callers can branch on its nature rather than
    /// its message.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoCandidates
            | Self::Connect { .. }
            | Self::ConnectTimeout { .. }
            | Self::Cancelled
            | Self::DeadlineExceeded
            | Self::Tls(_)
            | Self::Http(_) => ErrorClass::Transport,

            Self::UnexpectedStatus { .. } | Self::InvalidUrl { .. } | Self::MissingLocation(_) => {
                ErrorClass::Protocol
            }

            Self::RetryLimit(_) => ErrorClass::Transient,

            Self::Decode { .. } | Self::Encode(_) => ErrorClass::Decode,

            Self::InvalidSettings(_)
            | Self::NotReady { .. }
            | Self::FeederEmpty { .. }
            | Self::NoFeeder
            | Self::DuplexUnsupported
            | Self::SimplexUnsupported => ErrorClass::Negotiation,

            Self::JobClosed(_) | Self::Discovery(_) | Self::Io(_) | Self::Serialization(_) => {
                ErrorClass::Local
            }
        }
    }

    /// Whether this is a network-level failure (as opposed to the device
    /// answering with something we did not accept).
    pub fn is_transport(&self) -> bool {
        self.class() == ErrorClass::Transport
    }

    /// HTTP status code carried by a protocol status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanwerkError>;
