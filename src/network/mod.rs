//! Network transport module
//!
//! The uploader drives a transport through four traits:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`Connector`] | TCP connect and SSH handshake |
//! | [`Transport`] | host key, authentication, subchannel |
//! | [`FileChannel`] | SFTP stat/create |
//! | [`RemoteFile`] | streaming writes |
//!
//! [`SshConnector`] is the libssh2-backed implementation.

mod ssh;
mod transport;

pub use ssh::*;
pub use transport::*;
