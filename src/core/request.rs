//! Per-call upload inputs and outputs

use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::Credential;
use crate::error::{Result, UploadError};
use crate::trust::{Fingerprint, TrustDecision};

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Default stream buffer (1MB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Largest accepted stream chunk size
pub const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Who to connect to and how to authenticate
#[derive(Debug)]
pub struct ConnectionParameters {
    /// Remote hostname or address
    pub host: String,
    /// SSH port
    pub port: u16,
    /// Remote username
    pub username: String,
    /// Authentication material
    pub credential: Credential,
}

impl ConnectionParameters {
    /// Parameters on the default SSH port
    pub fn new(host: impl Into<String>, username: impl Into<String>, credential: Credential) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            credential,
        }
    }

    /// Override the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Check that every field carries a value
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(UploadError::InvalidRequest("host is empty".into()));
        }
        if self.username.trim().is_empty() {
            return Err(UploadError::InvalidRequest("username is empty".into()));
        }
        if self.port == 0 {
            return Err(UploadError::InvalidRequest("port must be non-zero".into()));
        }
        if self.credential.is_empty() {
            return Err(UploadError::InvalidRequest(format!(
                "{} credential is empty",
                self.credential.method()
            )));
        }
        Ok(())
    }
}

/// One local file and where it goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Local file to read
    pub local_path: PathBuf,
    /// Fully qualified remote destination
    pub remote_path: String,
}

impl TransferRequest {
    /// Upload `local_path` to exactly `remote_path`
    pub fn new(local_path: impl Into<PathBuf>, remote_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
        }
    }

    /// Upload `local_path` into `remote_dir`, keeping its file name
    pub fn into_directory(local_path: impl Into<PathBuf>, remote_dir: &str) -> Result<Self> {
        let local_path = local_path.into();
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                UploadError::InvalidRequest(format!(
                    "local path {:?} has no usable file name",
                    local_path
                ))
            })?
            .to_string();

        let remote_path = join_remote(remote_dir, &file_name);
        Ok(Self {
            local_path,
            remote_path,
        })
    }

    /// Check path shape; does not touch the filesystem
    pub fn validate(&self) -> Result<()> {
        if self.local_path.as_os_str().is_empty() {
            return Err(UploadError::InvalidRequest("local path is empty".into()));
        }
        if !self.remote_path.starts_with('/') {
            return Err(UploadError::InvalidRequest(format!(
                "remote path '{}' must be absolute",
                self.remote_path
            )));
        }
        if self.remote_path.ends_with('/') {
            return Err(UploadError::InvalidRequest(format!(
                "remote path '{}' names a directory, not a file",
                self.remote_path
            )));
        }
        Ok(())
    }
}

/// Join a remote directory and file name with exactly one separator
pub fn join_remote(dir: &str, file_name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    format!("{}/{}", dir, file_name)
}

/// What to do when the destination already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverwritePolicy {
    /// Truncate and replace
    #[default]
    Replace,
    /// Fail with a remote write error
    Reject,
}

/// Limits on each blocking phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Name resolution plus TCP connect, shared across resolved addresses
    pub connect: Duration,
    /// SSH handshake and authentication
    pub session: Duration,
    /// Each blocking read/write while streaming (None = unlimited)
    pub transfer: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            session: Duration::from_secs(30),
            transfer: None,
        }
    }
}

/// Tuning for a single upload
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Phase timeouts
    pub timeouts: Timeouts,
    /// Existing destination handling
    pub overwrite: OverwritePolicy,
    /// Stream chunk size
    pub buffer_size: usize,
    /// Permission bits for a newly created remote file
    pub file_mode: i32,
    /// Cancellation flag
    pub cancel: CancelToken,
}

impl UploadOptions {
    /// Check the stream buffer is within `1..=MAX_BUFFER_SIZE`
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 || self.buffer_size > MAX_BUFFER_SIZE {
            return Err(UploadError::InvalidRequest(format!(
                "buffer size {} outside 1..={} bytes",
                self.buffer_size, MAX_BUFFER_SIZE
            )));
        }
        Ok(())
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            overwrite: OverwritePolicy::Replace,
            buffer_size: DEFAULT_BUFFER_SIZE,
            file_mode: 0o644,
            cancel: CancelToken::new(),
        }
    }
}

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// New, not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` if requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(UploadError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Outcome of a successful upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    /// Remote host
    pub host: String,
    /// Destination written
    pub remote_path: String,
    /// Bytes streamed
    pub bytes: u64,
    /// Wall time
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    /// Host key fingerprint presented by the server
    pub fingerprint: Fingerprint,
    /// How the host identity was accepted
    pub trust: TrustDecision,
}

impl UploadReport {
    /// Average throughput in bytes/second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Upload Summary ===");
        println!("Destination:  {}:{}", self.host, self.remote_path);
        println!("Bytes:        {}", humansize::format_size(self.bytes, humansize::BINARY));
        println!("Duration:     {:.2?}", self.duration);
        println!("Throughput:   {}/s", humansize::format_size(self.throughput() as u64, humansize::BINARY));
        println!("Host key:     {} ({})", self.fingerprint, self.trust);
    }
}

fn serialize_duration<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
