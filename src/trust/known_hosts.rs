//! OpenSSH known_hosts store
//!
//! Supports plain host patterns, `[host]:port` entries, comma-separated
//! pattern lists, `*`/`?` wildcards, `!` negation, hashed hostnames
//! (`|1|salt|hash`, HMAC-SHA1) and `@revoked` markers. `@cert-authority`
//! lines are skipped: they sign host certificates and never match a plain
//! host key.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, UploadError};
use crate::trust::{HostKey, KeyType};

type HmacSha1 = Hmac<Sha1>;

/// Default SSH port, written without brackets
const DEFAULT_PORT: u16 = 22;

/// Prefix of an OpenSSH hashed hostname
const HASH_MAGIC: &str = "|1|";

/// SHA-1 digest length
const HASH_LEN: usize = 20;

/// Host field of a known_hosts line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMatcher {
    /// Comma-separated patterns
    Patterns(Vec<String>),
    /// HMAC-SHA1 of the host token under a per-line salt
    Hashed {
        /// HMAC key
        salt: Vec<u8>,
        /// Expected MAC
        hash: Vec<u8>,
    },
}

impl HostMatcher {
    /// Whether this host field names `host:port`
    pub fn matches(&self, host: &str, port: u16) -> bool {
        let target = host_token(host, port);
        match self {
            Self::Patterns(patterns) => {
                let mut matched = false;
                for pattern in patterns {
                    if let Some(negated) = pattern.strip_prefix('!') {
                        if wildcard_match(&negated.to_ascii_lowercase(), &target) {
                            return false;
                        }
                    } else if wildcard_match(&pattern.to_ascii_lowercase(), &target) {
                        matched = true;
                    }
                }
                matched
            }
            Self::Hashed { salt, hash } => match HmacSha1::new_from_slice(salt) {
                Ok(mut mac) => {
                    mac.update(target.as_bytes());
                    mac.verify_slice(hash).is_ok()
                }
                Err(_) => false,
            },
        }
    }

    fn parse(field: &str) -> Option<Self> {
        if let Some(hashed) = field.strip_prefix(HASH_MAGIC) {
            let (salt, hash) = hashed.split_once('|')?;
            let salt = STANDARD.decode(salt).ok()?;
            let hash = STANDARD.decode(hash).ok()?;
            if salt.is_empty() || hash.len() != HASH_LEN {
                return None;
            }
            return Some(Self::Hashed { salt, hash });
        }
        // Unknown hash scheme
        if field.starts_with('|') {
            return None;
        }

        let patterns: Vec<String> = field
            .split(',')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        if patterns.is_empty() {
            None
        } else {
            Some(Self::Patterns(patterns))
        }
    }
}

impl fmt::Display for HostMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patterns(patterns) => f.write_str(&patterns.join(",")),
            Self::Hashed { salt, hash } => write!(
                f,
                "{}{}|{}",
                HASH_MAGIC,
                STANDARD.encode(salt),
                STANDARD.encode(hash)
            ),
        }
    }
}

/// One known_hosts line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownHostEntry {
    /// Host field
    pub hosts: HostMatcher,
    /// Stored key
    pub key: HostKey,
    /// Line carried the `@revoked` marker
    pub revoked: bool,
}

impl KnownHostEntry {
    /// Whether this entry applies to `host:port`
    pub fn matches(&self, host: &str, port: u16) -> bool {
        self.hosts.matches(host, port)
    }
}

impl fmt::Display for KnownHostEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.revoked {
            f.write_str("@revoked ")?;
        }
        write!(f, "{} {} {}", self.hosts, self.key.key_type, self.key.to_base64())
    }
}

/// Result of looking a presented key up in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyStatus {
    /// A stored key for this host equals the presented key
    Match,
    /// No stored key of this type for this host
    NotFound,
    /// A stored key of the same type differs
    Mismatch,
    /// The presented key is revoked for this host
    Revoked,
}

/// In-memory set of trusted and revoked host keys
#[derive(Debug, Clone, Default)]
pub struct KnownHosts {
    entries: Vec<KnownHostEntry>,
    skipped: usize,
}

impl KnownHosts {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// `~/.ssh/known_hosts`, if `HOME` is set
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".ssh").join("known_hosts"))
    }

    /// Load an OpenSSH known_hosts file; a missing file yields an empty store
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let store = Self::parse(&content);
                debug!(
                    "Loaded {} known host keys from {:?} ({} lines skipped)",
                    store.len(),
                    path,
                    store.skipped
                );
                Ok(store)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No known_hosts file at {:?}", path);
                Ok(Self::new())
            }
            Err(e) => Err(UploadError::config(format!(
                "cannot read known_hosts {:?}: {}",
                path, e
            ))),
        }
    }

    /// Parse known_hosts content, skipping lines it cannot use
    pub fn parse(content: &str) -> Self {
        let mut store = Self::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line) {
                Some(entry) => store.entries.push(entry),
                None => {
                    debug!("Skipping known_hosts line {}", lineno + 1);
                    store.skipped += 1;
                }
            }
        }
        store
    }

    /// Number of usable entries, revocations included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lines that were ignored while parsing
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Entries applying to `host:port`
    pub fn lookup<'a>(&'a self, host: &'a str, port: u16) -> impl Iterator<Item = &'a KnownHostEntry> + 'a {
        self.entries.iter().filter(move |e| e.matches(host, port))
    }

    /// Whether `key` is marked `@revoked` for `host:port`
    pub fn is_revoked(&self, host: &str, port: u16, key: &HostKey) -> bool {
        self.lookup(host, port)
            .any(|entry| entry.revoked && entry.key.blob == key.blob)
    }

    /// Compare a presented key against the store
    pub fn check(&self, host: &str, port: u16, key: &HostKey) -> HostKeyStatus {
        if self.is_revoked(host, port, key) {
            return HostKeyStatus::Revoked;
        }

        let mut same_type_seen = false;
        for entry in self.lookup(host, port).filter(|e| !e.revoked) {
            if entry.key == *key {
                return HostKeyStatus::Match;
            }
            if entry.key.key_type == key.key_type {
                same_type_seen = true;
            }
        }
        if same_type_seen {
            HostKeyStatus::Mismatch
        } else {
            HostKeyStatus::NotFound
        }
    }

    /// Trust `key` for `host:port`
    pub fn insert(&mut self, host: &str, port: u16, key: HostKey) -> &KnownHostEntry {
        self.entries.push(KnownHostEntry {
            hosts: HostMatcher::Patterns(vec![host_token(host, port)]),
            key,
            revoked: false,
        });
        &self.entries[self.entries.len() - 1]
    }
}

/// known_hosts spelling of a host on a port
fn host_token(host: &str, port: u16) -> String {
    let host = host.to_ascii_lowercase();
    if port == DEFAULT_PORT {
        host
    } else {
        format!("[{}]:{}", host, port)
    }
}

fn parse_line(line: &str) -> Option<KnownHostEntry> {
    let mut fields = line.split_whitespace();
    let mut hosts = fields.next()?;

    let mut revoked = false;
    if let Some(marker) = hosts.strip_prefix('@') {
        match marker {
            "revoked" => revoked = true,
            _ => return None,
        }
        hosts = fields.next()?;
    }

    let hosts = HostMatcher::parse(hosts)?;
    let key_type = KeyType::from_name(fields.next()?);
    let key = HostKey::from_base64(key_type, fields.next()?)?;

    Some(KnownHostEntry { hosts, key, revoked })
}

/// Glob match supporting `*` and `?`
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
