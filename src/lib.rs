//! # RemotePut - single-file SFTP upload
//!
//! RemotePut uploads one local file to a remote host over SSH/SFTP. Every
//! call opens its own session, checks the server's host key against an
//! explicit trust policy, authenticates, streams the file, and releases the
//! channel and session on every exit path.
//!
//! ## Features
//!
//! - **Explicit host trust**: known_hosts by default, opt-in auto-accept,
//!   or SHA256 fingerprint pinning
//! - **Password, key file or ssh-agent authentication**, with secrets kept
//!   out of logs and `Debug` output
//! - **Bounded waits**: connect, handshake and transfer timeouts
//! - **Classified failures**: each error names the phase that failed
//!
//! ## Quick Start
//!
//! ```no_run
//! use remoteput::{upload, ConnectionParameters, Credential, HostTrustPolicy, TransferRequest};
//!
//! let params = ConnectionParameters::new("logs.example", "student", Credential::Agent);
//! let request = TransferRequest::into_directory(
//!     "/var/log/app/report.log",
//!     "/home/student/ErrorLogFiles/",
//! )
//! .unwrap();
//!
//! let report = upload(&params, &request, &HostTrustPolicy::RejectUnknown).unwrap();
//! println!("Sent {} bytes to {}", report.bytes, report.remote_path);
//! ```
//!
//! ## Advanced Usage
//!
//! ```no_run
//! use remoteput::core::{OverwritePolicy, RemoteUploader, UploadOptions};
//! use remoteput::progress::ProgressReporter;
//! use remoteput::trust::KnownHosts;
//! use remoteput::{ConnectionParameters, Credential, HostTrustPolicy, TransferRequest};
//! use std::path::Path;
//!
//! let options = UploadOptions {
//!     overwrite: OverwritePolicy::Reject,
//!     ..Default::default()
//! };
//! let known_hosts = KnownHosts::load(Path::new("/etc/ssh/ssh_known_hosts")).unwrap();
//! let uploader = RemoteUploader::new(options)
//!     .with_known_hosts(known_hosts)
//!     .with_progress(ProgressReporter::new());
//!
//! let params = ConnectionParameters::new(
//!     "logs.example",
//!     "student",
//!     Credential::key_file("/home/me/.ssh/id_ed25519", None),
//! )
//! .with_port(2222);
//! let request = TransferRequest::new("report.log", "/srv/in/report.log");
//!
//! let report = uploader
//!     .upload(&params, &request, &HostTrustPolicy::RejectUnknown)
//!     .unwrap();
//! report.print_summary();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod progress;
pub mod trust;

// Re-export commonly used types
pub use core::{upload, ConnectionParameters, Credential, RemoteUploader, TransferRequest, UploadReport};
pub use error::{Result, UploadError};
pub use progress::ProgressReporter;
pub use trust::HostTrustPolicy;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use remoteput::prelude::*;
    //! ```

    pub use crate::core::{
        upload, CancelToken, ConnectionParameters, Credential, OverwritePolicy, RemoteUploader,
        Timeouts, TransferRequest, UploadOptions, UploadReport,
    };
    pub use crate::error::{Phase, Result, UploadError};
    pub use crate::progress::ProgressReporter;
    pub use crate::trust::{Fingerprint, HostTrustPolicy, KnownHosts, TrustDecision};
}
