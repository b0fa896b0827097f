//! Error types for RemotePut
//!
//! Every failure surfaced by an upload names the phase it happened in, so
//! callers can decide on retry or backoff themselves. Nothing in this crate
//! retries.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::trust::Fingerprint;

/// Main error type for upload operations
#[derive(Error, Debug)]
pub enum UploadError {
    /// Connection parameters or transfer request violate an invariant
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Local file missing, unreadable, or failed mid-read
    #[error("Local I/O error at '{path}': {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Host unreachable, TCP failure, or SSH handshake failure
    #[error("Connection error to '{host}': {message}")]
    Connect { host: String, message: String },

    /// Trust policy rejected the host identity
    #[error("Host key for '{host}' rejected: {reason}")]
    Trust {
        host: String,
        reason: TrustRejection,
    },

    /// Credential refused by the remote host
    #[error("SSH authentication failed for '{user}@{host}': {message}")]
    Auth {
        user: String,
        host: String,
        message: String,
    },

    /// Remote filesystem refused the write
    #[error("Remote write error at '{path}': {message}")]
    RemoteIo { path: String, message: String },

    /// Session or subchannel failure outside the remote filesystem
    #[error("Transport error: {0}")]
    Transport(String),

    /// Caller cancelled the upload
    #[error("Upload cancelled")]
    Cancelled,

    /// CLI or profile configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Why a host identity was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustRejection {
    /// No stored key for this host
    #[error("unknown host key {0}")]
    UnknownHost(Fingerprint),

    /// Stored key for this host differs from the presented one
    #[error("REMOTE HOST IDENTIFICATION HAS CHANGED, presented {0}")]
    HostKeyChanged(Fingerprint),

    /// Presented key is marked `@revoked` for this host
    #[error("host key {0} is revoked")]
    Revoked(Fingerprint),

    /// Presented key is not in the pinned set
    #[error("fingerprint {0} is not pinned")]
    NotPinned(Fingerprint),

    /// Server sent a host key blob without an algorithm name
    #[error("malformed host key")]
    MalformedKey,
}

/// Upload phase an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Argument and request validation
    Validate,
    /// Local file access
    Local,
    /// TCP connect and SSH handshake
    Connect,
    /// Host identity check
    Trust,
    /// User authentication
    Authenticate,
    /// Remote file write
    RemoteWrite,
    /// Session/subchannel transport
    Transport,
    /// Cancellation
    Cancelled,
}

impl Phase {
    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validate => 2,
            Self::Local => 3,
            Self::Connect => 4,
            Self::Trust => 5,
            Self::Authenticate => 6,
            Self::RemoteWrite => 7,
            Self::Transport => 8,
            Self::Cancelled => 9,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validate => "validate",
            Self::Local => "local",
            Self::Connect => "connect",
            Self::Trust => "trust",
            Self::Authenticate => "authenticate",
            Self::RemoteWrite => "remote-write",
            Self::Transport => "transport",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

impl UploadError {
    /// Create a local I/O error with path context
    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Create a connection error
    pub fn connect(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a trust error
    pub fn trust(host: impl Into<String>, reason: TrustRejection) -> Self {
        Self::Trust {
            host: host.into(),
            reason,
        }
    }

    /// Create an authentication error
    pub fn auth(
        user: impl Into<String>,
        host: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Auth {
            user: user.into(),
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a remote write error
    pub fn remote_io(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteIo {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Phase this error occurred in
    pub fn phase(&self) -> Phase {
        match self {
            Self::InvalidRequest(_) | Self::Config(_) => Phase::Validate,
            Self::LocalIo { .. } => Phase::Local,
            Self::Connect { .. } => Phase::Connect,
            Self::Trust { .. } => Phase::Trust,
            Self::Auth { .. } => Phase::Authenticate,
            Self::RemoteIo { .. } => Phase::RemoteWrite,
            Self::Transport(_) => Phase::Transport,
            Self::Cancelled => Phase::Cancelled,
        }
    }
}

/// Result type alias for upload operations
pub type Result<T> = std::result::Result<T, UploadError>;

/// Extension trait for adding local path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| UploadError::local_io(path, e))
    }
}
