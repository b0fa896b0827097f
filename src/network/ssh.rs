//! SSH/SFTP transport over libssh2
//!
//! Implements the transport traits with the `ssh2` crate. All protocol
//! framing, key exchange and SFTP encoding happen inside libssh2.

use secrecy::ExposeSecret;
use ssh2::{ErrorCode, OpenFlags, OpenType, Session, Sftp};
use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::core::{Credential, Timeouts};
use crate::error::{Result, TrustRejection, UploadError};
use crate::network::{Connector, Endpoint, FileChannel, RemoteFile, Transport};
use crate::trust::HostKey;

// libssh2 session error codes that mean the connection itself failed
const LIBSSH2_ERROR_SOCKET_SEND: i32 = -7;
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_SOCKET_DISCONNECT: i32 = -13;
const LIBSSH2_ERROR_SOCKET_TIMEOUT: i32 = -30;
const LIBSSH2_ERROR_SOCKET_RECV: i32 = -43;

// SFTP status codes (draft-ietf-secsh-filexfer)
const SSH_FX_NO_SUCH_FILE: i32 = 2;
const SSH_FX_PERMISSION_DENIED: i32 = 3;
const SSH_FX_NO_CONNECTION: i32 = 6;
const SSH_FX_CONNECTION_LOST: i32 = 7;
const SSH_FX_NO_SUCH_PATH: i32 = 10;
const SSH_FX_FILE_ALREADY_EXISTS: i32 = 11;
const SSH_FX_WRITE_PROTECT: i32 = 12;
const SSH_FX_NO_SPACE_ON_FILESYSTEM: i32 = 14;
const SSH_FX_QUOTA_EXCEEDED: i32 = 15;

/// Connects with a blocking TCP socket and a libssh2 session
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl Connector for SshConnector {
    type Session = SshTransport;

    fn connect(&self, endpoint: &Endpoint, timeouts: &Timeouts) -> Result<SshTransport> {
        let host = &endpoint.host;
        let deadline = Instant::now() + timeouts.connect;
        let addrs = resolve(host, endpoint.port, timeouts.connect)?;

        let mut last_error = None;
        let mut tcp = None;
        for addr in addrs {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                last_error = Some(io::Error::new(io::ErrorKind::TimedOut, "connect timeout exhausted"));
                break;
            }
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(stream) => {
                    tcp = Some(stream);
                    break;
                }
                Err(e) => {
                    debug!("TCP connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }
        let tcp = tcp.ok_or_else(|| {
            let message = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no addresses resolved".to_string());
            UploadError::connect(host, message)
        })?;

        let mut session = Session::new()
            .map_err(|e| UploadError::connect(host, e.to_string()))?;
        session.set_timeout(timeout_millis(Some(timeouts.session)));
        session.set_tcp_stream(tcp);
        session.handshake()
            .map_err(|e| UploadError::connect(host, format!("SSH handshake failed: {}", e)))?;

        debug!("SSH handshake with {} complete", endpoint);

        Ok(SshTransport {
            session,
            endpoint: endpoint.clone(),
            transfer_timeout: timeouts.transfer,
        })
    }
}

/// Handshaken libssh2 session
pub struct SshTransport {
    session: Session,
    endpoint: Endpoint,
    transfer_timeout: Option<Duration>,
}

impl Transport for SshTransport {
    type Channel = SftpChannel;

    fn host_key(&self) -> Result<HostKey> {
        let (blob, _) = self.session.host_key().ok_or_else(|| {
            UploadError::transport(format!("{} presented no host key", self.endpoint))
        })?;
        HostKey::from_blob(blob)
            .ok_or_else(|| UploadError::trust(&self.endpoint.host, TrustRejection::MalformedKey))
    }

    fn authenticate(&mut self, username: &str, credential: &Credential) -> Result<()> {
        let host = &self.endpoint.host;
        let result = match credential {
            Credential::Password(password) => {
                self.session.userauth_password(username, password.expose_secret())
            }
            Credential::KeyFile { private_key, passphrase } => self.session.userauth_pubkey_file(
                username,
                None,
                private_key,
                passphrase.as_ref().map(|p| p.expose_secret().as_str()),
            ),
            Credential::Agent => self.session.userauth_agent(username),
        };

        if let Err(e) = result {
            return Err(match e.code() {
                ErrorCode::Session(code) if is_connection_failure(code) => {
                    UploadError::transport(format!("connection lost during authentication: {}", e))
                }
                _ => UploadError::auth(username, host, e.message()),
            });
        }

        if !self.session.authenticated() {
            return Err(UploadError::auth(username, host, "Authentication failed"));
        }
        Ok(())
    }

    fn open_channel(&mut self) -> Result<SftpChannel> {
        let sftp = self.session.sftp()
            .map_err(|e| UploadError::transport(format!("cannot open SFTP subsystem: {}", e)))?;
        self.session.set_timeout(timeout_millis(self.transfer_timeout));
        Ok(SftpChannel { sftp })
    }

    fn close(&mut self) -> Result<()> {
        self.session
            .disconnect(None, "upload finished", None)
            .map_err(|e| UploadError::transport(e.to_string()))
    }
}

/// SFTP subsystem channel
pub struct SftpChannel {
    sftp: Sftp,
}

impl FileChannel for SftpChannel {
    type File = SftpFile;

    fn exists(&mut self, path: &str) -> Result<bool> {
        match self.sftp.stat(Path::new(path)) {
            Ok(_) => Ok(true),
            Err(e) => match e.code() {
                ErrorCode::SFTP(SSH_FX_NO_SUCH_FILE) | ErrorCode::SFTP(SSH_FX_NO_SUCH_PATH) => Ok(false),
                code => Err(classify(code, e.message(), path)),
            },
        }
    }

    fn create(&mut self, path: &str, mode: i32) -> Result<SftpFile> {
        let flags = OpenFlags::CREATE | OpenFlags::WRITE | OpenFlags::TRUNCATE;
        let file = self.sftp
            .open_mode(Path::new(path), flags, mode, OpenType::File)
            .map_err(|e| classify(e.code(), e.message(), path))?;
        Ok(SftpFile {
            file,
            path: path.to_string(),
        })
    }

    fn close(&mut self) -> Result<()> {
        self.sftp
            .shutdown()
            .map_err(|e| UploadError::transport(e.to_string()))
    }
}

/// Remote file handle opened for writing
pub struct SftpFile {
    file: ssh2::File,
    path: String,
}

impl RemoteFile for SftpFile {
    fn write_chunk(&mut self, buf: &[u8]) -> Result<()> {
        self.file
            .write_all(buf)
            .map_err(|e| classify_io(e, &self.path))
    }

    fn finish(&mut self) -> Result<()> {
        self.file
            .close()
            .map_err(|e| classify(e.code(), e.message(), &self.path))
    }
}

/// Resolve `host:port` within `timeout`
///
/// Lookups run on a helper thread so a stalled resolver cannot outlast the
/// connect budget; a late answer is dropped with the thread.
fn resolve(host: &str, port: u16, timeout: Duration) -> Result<Vec<SocketAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let (tx, rx) = mpsc::channel();
    let target = (host.to_string(), port);
    std::thread::Builder::new()
        .name("remoteput-resolve".into())
        .spawn(move || {
            let _ = tx.send(target.to_socket_addrs().map(|addrs| addrs.collect::<Vec<_>>()));
        })
        .map_err(|e| UploadError::connect(host, format!("cannot start resolver: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(addrs)) => Ok(addrs),
        Ok(Err(e)) => Err(UploadError::connect(host, format!("cannot resolve: {}", e))),
        Err(RecvTimeoutError::Timeout) => Err(UploadError::connect(
            host,
            format!("name resolution timed out after {}", humantime::format_duration(timeout)),
        )),
        Err(RecvTimeoutError::Disconnected) => {
            Err(UploadError::connect(host, "resolver exited without an answer"))
        }
    }
}

/// Map a libssh2 error during a file operation to a remote write or transport error
pub fn classify(code: ErrorCode, message: &str, path: &str) -> UploadError {
    match code {
        ErrorCode::SFTP(SSH_FX_NO_CONNECTION) | ErrorCode::SFTP(SSH_FX_CONNECTION_LOST) => {
            UploadError::transport(format!("SFTP connection lost: {}", message))
        }
        ErrorCode::SFTP(status) => UploadError::remote_io(path, sftp_status_text(status, message)),
        ErrorCode::Session(code) if code == LIBSSH2_ERROR_TIMEOUT => {
            UploadError::transport(format!("timed out: {}", message))
        }
        ErrorCode::Session(_) => UploadError::transport(message.to_string()),
    }
}

/// Map an `io::Error` raised by an `ssh2::File` write
fn classify_io(error: std::io::Error, path: &str) -> UploadError {
    if let Some(inner) = error.get_ref().and_then(|e| e.downcast_ref::<ssh2::Error>()) {
        return classify(inner.code(), inner.message(), path);
    }
    use std::io::ErrorKind;
    match error.kind() {
        ErrorKind::PermissionDenied | ErrorKind::NotFound | ErrorKind::AlreadyExists => {
            UploadError::remote_io(path, error.to_string())
        }
        _ => UploadError::transport(error.to_string()),
    }
}

fn sftp_status_text(status: i32, message: &str) -> String {
    let reason = match status {
        SSH_FX_NO_SUCH_FILE | SSH_FX_NO_SUCH_PATH => "no such file or directory",
        SSH_FX_PERMISSION_DENIED => "permission denied",
        SSH_FX_FILE_ALREADY_EXISTS => "file already exists",
        SSH_FX_WRITE_PROTECT => "filesystem is read-only",
        SSH_FX_NO_SPACE_ON_FILESYSTEM => "no space left on filesystem",
        SSH_FX_QUOTA_EXCEEDED => "quota exceeded",
        _ => return format!("SFTP status {}: {}", status, message),
    };
    format!("{} ({})", reason, message)
}

fn is_connection_failure(code: i32) -> bool {
    matches!(
        code,
        LIBSSH2_ERROR_SOCKET_SEND
            | LIBSSH2_ERROR_TIMEOUT
            | LIBSSH2_ERROR_SOCKET_DISCONNECT
            | LIBSSH2_ERROR_SOCKET_TIMEOUT
            | LIBSSH2_ERROR_SOCKET_RECV
    )
}

/// libssh2 blocking timeout; 0 disables it
fn timeout_millis(timeout: Option<Duration>) -> u32 {
    timeout
        .map(|d| d.as_millis().min(u32::MAX as u128) as u32)
        .unwrap_or(0)
}
