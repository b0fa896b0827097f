//! In-memory transport for uploader tests
//!
//! Counts every connect, authentication, open and close so tests can check
//! release discipline, and can fail at any single point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::{Credential, Timeouts};
use crate::error::{Result, UploadError};
use crate::network::{Connector, Endpoint, FileChannel, RemoteFile, Transport};
use crate::trust::HostKey;
use secrecy::ExposeSecret;

/// Where the fake should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailPoint {
    Connect,
    Authenticate,
    OpenChannel,
    Create,
    /// Transport drops once this many bytes have been written
    Write { after: usize },
    Finish,
    /// Close calls fail (the upload itself succeeds)
    Close,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub connects: AtomicUsize,
    pub sessions_opened: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub auths: AtomicUsize,
    pub channels_opened: AtomicUsize,
    pub channels_closed: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

struct State {
    host_key: HostKey,
    password: String,
    fail: Option<FailPoint>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    counters: Counters,
}

/// Fake SSH server with an in-memory filesystem
#[derive(Clone)]
pub(crate) struct FakeRemote {
    state: Arc<State>,
}

impl FakeRemote {
    pub fn new(host_key: HostKey, password: &str) -> Self {
        Self::build(host_key, password, None)
    }

    pub fn failing(host_key: HostKey, password: &str, fail: FailPoint) -> Self {
        Self::build(host_key, password, Some(fail))
    }

    fn build(host_key: HostKey, password: &str, fail: Option<FailPoint>) -> Self {
        Self {
            state: Arc::new(State {
                host_key,
                password: password.to_string(),
                fail,
                files: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
        }
    }

    pub fn counters(&self) -> &Counters {
        &self.state.counters
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.files.lock().unwrap().get(path).cloned()
    }

    pub fn file_count(&self) -> usize {
        self.state.files.lock().unwrap().len()
    }

    pub fn put_file(&self, path: &str, content: &[u8]) {
        self.state.files.lock().unwrap().insert(path.to_string(), content.to_vec());
    }

    fn fails_at(&self, point: FailPoint) -> bool {
        self.state.fail == Some(point)
    }
}

impl Connector for FakeRemote {
    type Session = FakeSession;

    fn connect(&self, endpoint: &Endpoint, _timeouts: &Timeouts) -> Result<FakeSession> {
        self.state.counters.connects.fetch_add(1, Ordering::SeqCst);
        if self.fails_at(FailPoint::Connect) {
            return Err(UploadError::connect(&endpoint.host, "connection refused"));
        }
        self.state.counters.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            remote: self.clone(),
            host: endpoint.host.clone(),
        })
    }
}

pub(crate) struct FakeSession {
    remote: FakeRemote,
    host: String,
}

impl Transport for FakeSession {
    type Channel = FakeChannel;

    fn host_key(&self) -> Result<HostKey> {
        Ok(self.remote.state.host_key.clone())
    }

    fn authenticate(&mut self, username: &str, credential: &Credential) -> Result<()> {
        self.remote.state.counters.auths.fetch_add(1, Ordering::SeqCst);
        let accepted = match credential {
            Credential::Password(password) => *password.expose_secret() == self.remote.state.password,
            _ => false,
        };
        if !accepted || self.remote.fails_at(FailPoint::Authenticate) {
            return Err(UploadError::auth(username, &self.host, "Authentication failed"));
        }
        Ok(())
    }

    fn open_channel(&mut self) -> Result<FakeChannel> {
        if self.remote.fails_at(FailPoint::OpenChannel) {
            return Err(UploadError::transport("subsystem request failed"));
        }
        self.remote.state.counters.channels_opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeChannel {
            remote: self.remote.clone(),
        })
    }

    fn close(&mut self) -> Result<()> {
        self.remote.state.counters.sessions_closed.fetch_add(1, Ordering::SeqCst);
        if self.remote.fails_at(FailPoint::Close) {
            return Err(UploadError::transport("disconnect failed"));
        }
        Ok(())
    }
}

pub(crate) struct FakeChannel {
    remote: FakeRemote,
}

impl FileChannel for FakeChannel {
    type File = FakeFile;

    fn exists(&mut self, path: &str) -> Result<bool> {
        Ok(self.remote.state.files.lock().unwrap().contains_key(path))
    }

    fn create(&mut self, path: &str, _mode: i32) -> Result<FakeFile> {
        if self.remote.fails_at(FailPoint::Create) {
            return Err(UploadError::remote_io(path, "permission denied"));
        }
        Ok(FakeFile {
            remote: self.remote.clone(),
            path: path.to_string(),
            buffer: Vec::new(),
        })
    }

    fn close(&mut self) -> Result<()> {
        self.remote.state.counters.channels_closed.fetch_add(1, Ordering::SeqCst);
        if self.remote.fails_at(FailPoint::Close) {
            return Err(UploadError::transport("channel close failed"));
        }
        Ok(())
    }
}

pub(crate) struct FakeFile {
    remote: FakeRemote,
    path: String,
    buffer: Vec<u8>,
}

impl RemoteFile for FakeFile {
    fn write_chunk(&mut self, buf: &[u8]) -> Result<()> {
        if let Some(FailPoint::Write { after }) = self.remote.state.fail {
            if self.buffer.len() + buf.len() > after {
                return Err(UploadError::transport("connection reset by peer"));
            }
        }
        self.buffer.extend_from_slice(buf);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.remote.fails_at(FailPoint::Finish) {
            return Err(UploadError::remote_io(&self.path, "no space left on filesystem"));
        }
        self.remote
            .state
            .files
            .lock()
            .unwrap()
            .insert(self.path.clone(), std::mem::take(&mut self.buffer));
        Ok(())
    }
}
