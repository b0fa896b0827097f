//! Single-file remote upload
//!
//! Runs one linear sequence per call: validate, open the local file,
//! connect, check the host identity, authenticate, open the file-transfer
//! subchannel, stream, release. The subchannel and session are held in
//! scoped guards so they are released exactly once on every exit path.

use std::fs::File;
use std::io::Read;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::core::{ConnectionParameters, OverwritePolicy, TransferRequest, UploadOptions, UploadReport};
use crate::error::{IoResultExt, Result, UploadError};
use crate::network::{Connector, Endpoint, FileChannel, RemoteFile, SshConnector, Transport};
use crate::progress::ProgressReporter;
use crate::trust::{HostTrustPolicy, KnownHosts, TrustDecision};

/// Uploads one local file per call over a fresh transport session
pub struct RemoteUploader<C: Connector = SshConnector> {
    /// Transport factory
    connector: C,
    /// Per-call tuning
    options: UploadOptions,
    /// Trusted host keys, extended by `AutoAccept`
    known_hosts: Mutex<KnownHosts>,
    /// Progress display
    progress: ProgressReporter,
}

impl RemoteUploader<SshConnector> {
    /// Uploader over libssh2
    pub fn new(options: UploadOptions) -> Self {
        Self::with_connector(SshConnector, options)
    }
}

impl<C: Connector> RemoteUploader<C> {
    /// Uploader over a custom transport
    pub fn with_connector(connector: C, options: UploadOptions) -> Self {
        Self {
            connector,
            options,
            known_hosts: Mutex::new(KnownHosts::new()),
            progress: ProgressReporter::disabled(),
        }
    }

    /// Replace the trusted host key store
    pub fn with_known_hosts(mut self, known_hosts: KnownHosts) -> Self {
        self.known_hosts = Mutex::new(known_hosts);
        self
    }

    /// Attach a progress reporter
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Current options
    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Snapshot of the trusted host keys, including auto-accepted ones
    pub fn known_hosts(&self) -> KnownHosts {
        self.lock_known_hosts().clone()
    }

    /// Upload `request.local_path` to `request.remote_path` on `params.host`
    ///
    /// One attempt, no retries. The remote file is created or truncated
    /// unless [`OverwritePolicy::Reject`] is set.
    pub fn upload(
        &self,
        params: &ConnectionParameters,
        request: &TransferRequest,
        policy: &HostTrustPolicy,
    ) -> Result<UploadReport> {
        let result = self.run(params, request, policy);
        match &result {
            Ok(report) => {
                info!(
                    "Uploaded {:?} to {}:{} ({})",
                    request.local_path,
                    report.host,
                    report.remote_path,
                    humansize::format_size(report.bytes, humansize::BINARY)
                );
                self.progress.finish_success("Upload complete");
            }
            Err(e) => {
                debug!("Upload failed in {} phase: {}", e.phase(), e);
                self.progress.finish_error(&e.to_string());
            }
        }
        result
    }

    fn run(
        &self,
        params: &ConnectionParameters,
        request: &TransferRequest,
        policy: &HostTrustPolicy,
    ) -> Result<UploadReport> {
        let start = Instant::now();
        let cancel = &self.options.cancel;

        params.validate()?;
        request.validate()?;
        self.options.validate()?;

        // Local precondition comes before any network activity
        let (local, size) = open_local(&request.local_path)?;
        self.progress.set_total_bytes(size);
        cancel.check()?;

        let endpoint = Endpoint::new(&params.host, params.port);
        self.progress.set_status(&format!("Connecting to {}", endpoint));
        debug!("Connecting to {} (trust policy: {})", endpoint, policy.name());
        let mut session = Scoped::new(
            self.connector.connect(&endpoint, &self.options.timeouts)?,
            "session",
            <C::Session as Transport>::close,
        );

        let key = session.host_key()?;
        let fingerprint = key.fingerprint();
        let decision = {
            let mut known = self.lock_known_hosts();
            let decision = policy
                .evaluate(&known, &params.host, params.port, &key)
                .map_err(|reason| UploadError::trust(&params.host, reason))?;
            if decision == TrustDecision::AcceptedNew {
                let entry = known.insert(&params.host, params.port, key);
                warn!("Auto-accepted unverified host key: {}", entry);
            }
            decision
        };
        debug!("Host key {} accepted ({})", fingerprint, decision);
        cancel.check()?;

        self.progress.set_status("Authenticating");
        session.authenticate(&params.username, &params.credential)?;
        info!(
            "Authenticated {}@{} via {}",
            params.username,
            endpoint,
            params.credential.method()
        );
        cancel.check()?;

        let mut channel = Scoped::new(
            session.open_channel()?,
            "file-transfer channel",
            <<C::Session as Transport>::Channel as FileChannel>::close,
        );

        if self.options.overwrite == OverwritePolicy::Reject && channel.exists(&request.remote_path)? {
            return Err(UploadError::remote_io(
                &request.remote_path,
                "destination exists and overwrite is disabled",
            ));
        }

        self.progress.set_status(&format!("Uploading to {}", request.remote_path));
        let mut remote = channel.create(&request.remote_path, self.options.file_mode)?;
        let bytes = self.stream(local, &request.local_path, &mut remote)?;
        remote.finish()?;

        Ok(UploadReport {
            host: params.host.clone(),
            remote_path: request.remote_path.clone(),
            bytes,
            duration: start.elapsed(),
            fingerprint,
            trust: decision,
        })
    }

    /// Copy the local file into the remote handle chunk by chunk
    fn stream<F: RemoteFile>(&self, mut local: File, local_path: &Path, remote: &mut F) -> Result<u64> {
        let mut buffer = vec![0u8; self.options.buffer_size];
        let mut bytes_sent = 0u64;

        loop {
            self.options.cancel.check()?;

            let bytes_read = match local.read(&mut buffer) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(UploadError::local_io(local_path, e)),
            };
            if bytes_read == 0 {
                break;
            }

            remote.write_chunk(&buffer[..bytes_read])?;
            bytes_sent += bytes_read as u64;
            self.progress.increment_bytes(bytes_read as u64);
        }

        Ok(bytes_sent)
    }

    fn lock_known_hosts(&self) -> MutexGuard<'_, KnownHosts> {
        self.known_hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Upload with libssh2, default options and `~/.ssh/known_hosts`
pub fn upload(
    params: &ConnectionParameters,
    request: &TransferRequest,
    policy: &HostTrustPolicy,
) -> Result<UploadReport> {
    let known_hosts = match KnownHosts::default_path() {
        Some(path) => KnownHosts::load(&path)?,
        None => KnownHosts::new(),
    };
    RemoteUploader::new(UploadOptions::default())
        .with_known_hosts(known_hosts)
        .upload(params, request, policy)
}

/// Open the upload source, requiring a regular file
fn open_local(path: &Path) -> Result<(File, u64)> {
    let file = File::open(path).with_path(path)?;
    let metadata = file.metadata().with_path(path)?;
    if !metadata.is_file() {
        return Err(UploadError::local_io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    Ok((file, metadata.len()))
}

/// Owns a resource and releases it once, when dropped
///
/// Release errors are logged and never replace the caller's result.
struct Scoped<T> {
    inner: T,
    what: &'static str,
    release: fn(&mut T) -> Result<()>,
}

impl<T> Scoped<T> {
    fn new(inner: T, what: &'static str, release: fn(&mut T) -> Result<()>) -> Self {
        Self { inner, what, release }
    }
}

impl<T> Deref for Scoped<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for Scoped<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for Scoped<T> {
    fn drop(&mut self) {
        match (self.release)(&mut self.inner) {
            Ok(()) => debug!("Released {}", self.what),
            Err(e) => warn!("Failed to release {}: {}", self.what, e),
        }
    }
}
