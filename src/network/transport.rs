//! Seams between the uploader and the SSH/SFTP library
//!
//! The uploader only speaks these traits. [`super::SshConnector`] implements
//! them over `ssh2`; tests substitute an in-memory transport.

use std::fmt;

use crate::core::{Credential, Timeouts};
use crate::error::Result;
use crate::trust::HostKey;

/// Where to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname or address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opens transport sessions
pub trait Connector {
    /// Session type produced
    type Session: Transport;

    /// Connect and complete the transport handshake; no authentication yet
    fn connect(&self, endpoint: &Endpoint, timeouts: &Timeouts) -> Result<Self::Session>;
}

/// A handshaken transport session
pub trait Transport {
    /// File-transfer subchannel type
    type Channel: FileChannel;

    /// Host key the server presented during the handshake
    fn host_key(&self) -> Result<HostKey>;

    /// Authenticate; must leave the session authenticated or fail
    fn authenticate(&mut self, username: &str, credential: &Credential) -> Result<()>;

    /// Open the file-transfer subchannel
    fn open_channel(&mut self) -> Result<Self::Channel>;

    /// Tear the session down
    fn close(&mut self) -> Result<()>;
}

/// File-transfer subchannel
pub trait FileChannel {
    /// Writable remote file
    type File: RemoteFile;

    /// Whether something already exists at `path`
    fn exists(&mut self, path: &str) -> Result<bool>;

    /// Create or truncate `path` for writing
    fn create(&mut self, path: &str, mode: i32) -> Result<Self::File>;

    /// Shut the subchannel down
    fn close(&mut self) -> Result<()>;
}

/// Remote file open for writing
pub trait RemoteFile {
    /// Write all of `buf`
    fn write_chunk(&mut self, buf: &[u8]) -> Result<()>;

    /// Close the remote handle, surfacing any deferred write error
    fn finish(&mut self) -> Result<()>;
}
