//! Configuration settings for RemotePut
//!
//! Defines CLI arguments, the optional JSON upload profile, and how both
//! are merged into the inputs of a single upload.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{
    ConnectionParameters, Credential, OverwritePolicy, Timeouts, TransferRequest,
    UploadOptions, DEFAULT_PORT, MAX_BUFFER_SIZE,
};
use crate::error::{Result, UploadError};
use crate::trust::{Fingerprint, HostTrustPolicy, KnownHosts};

/// RemotePut - upload one file over SFTP
#[derive(Parser, Debug, Clone)]
#[command(name = "remoteput")]
#[command(author = "RemotePut Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Upload a single file over SSH/SFTP with an explicit host trust policy")]
#[command(long_about = r#"
RemotePut uploads one local file to a remote host over SFTP.

The host key is checked against known_hosts by default. Unknown hosts are
refused unless --trust auto-accept or --trust pinned is given.

Examples:
  remoteput report.log student@logs:/home/student/ErrorLogFiles/
  remoteput report.log student@logs:/srv/in/today.log -i ~/.ssh/id_ed25519
  remoteput report.log logs:/srv/in/ --trust pinned --fingerprint SHA256:...
  remoteput report.log --config upload.json
"#)]
pub struct CliArgs {
    /// Local file to upload
    #[arg(value_name = "LOCAL")]
    pub local: PathBuf,

    /// Destination ([user@]host:/path, trailing '/' keeps the local file name)
    #[arg(value_name = "DESTINATION")]
    pub destination: Option<String>,

    /// SSH port (default: 22)
    #[arg(short = 'P', long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Private key for public key authentication
    #[arg(short = 'i', long, value_name = "PATH")]
    pub identity: Option<PathBuf>,

    /// Passphrase for the private key
    #[arg(long, env = "REMOTEPUT_PASSPHRASE", hide_env_values = true, value_name = "PASSPHRASE")]
    pub passphrase: Option<String>,

    /// Password authentication (prefer the environment variable)
    #[arg(long, env = "REMOTEPUT_PASSWORD", hide_env_values = true, hide = true, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Authenticate with identities from ssh-agent
    #[arg(long)]
    pub agent: bool,

    /// Host trust policy
    #[arg(long, value_enum, value_name = "POLICY")]
    pub trust: Option<TrustMode>,

    /// Pinned host key fingerprint (repeatable)
    #[arg(long = "fingerprint", value_name = "SHA256:...")]
    pub fingerprints: Vec<String>,

    /// known_hosts file (default: ~/.ssh/known_hosts)
    #[arg(long, value_name = "PATH")]
    pub known_hosts: Option<PathBuf>,

    /// TCP connect timeout (e.g. 10s)
    #[arg(long, value_name = "DURATION")]
    pub connect_timeout: Option<String>,

    /// Handshake and authentication timeout (e.g. 30s)
    #[arg(long, value_name = "DURATION")]
    pub session_timeout: Option<String>,

    /// Per read/write timeout while streaming (0 = none)
    #[arg(long, value_name = "DURATION")]
    pub transfer_timeout: Option<String>,

    /// Fail instead of replacing an existing remote file
    #[arg(long)]
    pub no_clobber: bool,

    /// Stream buffer size (e.g., 1M, 64K)
    #[arg(short = 'b', long, default_value = "1M", value_name = "SIZE")]
    pub buffer_size: String,

    /// JSON upload profile
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Show a progress bar
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Log line format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,
}

/// Host trust policy selector
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TrustMode {
    /// Only hosts already in known_hosts
    #[default]
    RejectUnknown,
    /// Accept unseen hosts for this run (legacy, insecure)
    AutoAccept,
    /// Only hosts matching a --fingerprint
    Pinned,
}

/// Log line format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Output format for the upload report
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Saved upload target, read from a JSON file
///
/// Passwords are deliberately not part of a profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadProfile {
    /// Remote host
    pub host: Option<String>,
    /// SSH port
    pub port: Option<u16>,
    /// Remote username
    pub username: Option<String>,
    /// Private key path
    pub identity: Option<PathBuf>,
    /// known_hosts path
    pub known_hosts: Option<PathBuf>,
    /// Trust policy
    pub trust: Option<TrustMode>,
    /// Pinned fingerprints
    #[serde(default)]
    pub fingerprints: Vec<String>,
    /// Remote directory receiving uploads
    pub remote_dir: Option<String>,
    /// TCP connect timeout
    pub connect_timeout_secs: Option<u64>,
    /// Handshake and authentication timeout
    pub session_timeout_secs: Option<u64>,
    /// Streaming timeout (0 = none)
    pub transfer_timeout_secs: Option<u64>,
    /// Refuse to replace existing files
    #[serde(default)]
    pub no_clobber: bool,
}

impl UploadProfile {
    /// Load a profile from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| UploadError::config(format!("cannot read profile {:?}: {}", path, e)))?;
        serde_json::from_str(&content)
            .map_err(|e| UploadError::config(format!("invalid profile {:?}: {}", path, e)))
    }
}

/// Everything one upload needs, resolved from CLI and profile
#[derive(Debug)]
pub struct RunConfig {
    /// Who to connect to
    pub params: ConnectionParameters,
    /// What to send where
    pub request: TransferRequest,
    /// Host trust policy
    pub policy: HostTrustPolicy,
    /// Upload tuning
    pub options: UploadOptions,
    /// known_hosts file to load, if any
    pub known_hosts_path: Option<PathBuf>,
}

impl RunConfig {
    /// Create config from CLI arguments, reading `--config` if given
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let profile = match &args.config {
            Some(path) => UploadProfile::load(path)?,
            None => UploadProfile::default(),
        };
        Self::resolve(args, profile)
    }

    /// Merge CLI arguments over a profile
    pub fn resolve(args: &CliArgs, profile: UploadProfile) -> Result<Self> {
        let target = match &args.destination {
            Some(dest) => Some(parse_remote_target(dest).ok_or_else(|| {
                UploadError::config(format!(
                    "invalid destination '{}', expected [user@]host:/path",
                    dest
                ))
            })?),
            None => None,
        };

        let host = target
            .as_ref()
            .map(|t| t.host.clone())
            .or_else(|| profile.host.clone())
            .ok_or_else(|| UploadError::config("no destination host given"))?;
        let username = target
            .as_ref()
            .and_then(|t| t.user.clone())
            .or_else(|| profile.username.clone())
            .ok_or_else(|| UploadError::config(format!("no username given for {}", host)))?;
        let port = args.port.or(profile.port).unwrap_or(DEFAULT_PORT);

        let remote_path = target.as_ref().map(|t| t.path.as_str()).filter(|p| !p.is_empty());
        let request = match (remote_path, profile.remote_dir.as_deref()) {
            (Some(path), _) if path.ends_with('/') => TransferRequest::into_directory(&args.local, path)?,
            (Some(path), _) => TransferRequest::new(&args.local, path),
            (None, Some(dir)) => TransferRequest::into_directory(&args.local, dir)?,
            (None, None) => {
                return Err(UploadError::config(
                    "no remote path given and profile has no remote_dir",
                ))
            }
        };

        let credential = if args.agent {
            Credential::Agent
        } else if let Some(identity) = &args.identity {
            Credential::key_file(identity, args.passphrase.clone())
        } else if let Some(password) = &args.password {
            Credential::password(password.clone())
        } else if let Some(identity) = &profile.identity {
            Credential::key_file(identity, args.passphrase.clone())
        } else {
            Credential::Agent
        };

        let policy = resolve_policy(
            args.trust.or(profile.trust),
            args.fingerprints.iter().chain(profile.fingerprints.iter()),
        )?;

        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            connect: match &args.connect_timeout {
                Some(s) => parse_duration(s)?,
                None => profile.connect_timeout_secs.map(Duration::from_secs).unwrap_or(defaults.connect),
            },
            session: match &args.session_timeout {
                Some(s) => parse_duration(s)?,
                None => profile.session_timeout_secs.map(Duration::from_secs).unwrap_or(defaults.session),
            },
            transfer: match &args.transfer_timeout {
                Some(s) => Some(parse_duration(s)?),
                None => profile.transfer_timeout_secs.map(Duration::from_secs),
            }
            .filter(|d| !d.is_zero()),
        };
        if timeouts.connect.is_zero() || timeouts.session.is_zero() {
            return Err(UploadError::config("connect and session timeouts must be non-zero"));
        }

        let buffer_size = parse_size(&args.buffer_size)
            .map_err(|e| UploadError::config(format!("Invalid buffer size: {}", e)))?;
        let buffer_size = match usize::try_from(buffer_size) {
            Ok(size) if (1..=MAX_BUFFER_SIZE).contains(&size) => size,
            _ => {
                return Err(UploadError::config(format!(
                    "buffer size must be between 1 byte and {}",
                    humansize::format_size(MAX_BUFFER_SIZE as u64, humansize::BINARY)
                )))
            }
        };

        let options = UploadOptions {
            timeouts,
            overwrite: if args.no_clobber || profile.no_clobber {
                OverwritePolicy::Reject
            } else {
                OverwritePolicy::Replace
            },
            buffer_size,
            ..Default::default()
        };

        let known_hosts_path = args
            .known_hosts
            .clone()
            .or(profile.known_hosts)
            .or_else(KnownHosts::default_path);

        let params = ConnectionParameters {
            host,
            port,
            username,
            credential,
        };

        Ok(Self {
            params,
            request,
            policy,
            options,
            known_hosts_path,
        })
    }
}

fn resolve_policy<'a>(
    mode: Option<TrustMode>,
    fingerprints: impl Iterator<Item = &'a String>,
) -> Result<HostTrustPolicy> {
    let pins = fingerprints
        .map(|s| s.parse::<Fingerprint>())
        .collect::<Result<Vec<_>>>()?;

    let mode = mode.unwrap_or(if pins.is_empty() {
        TrustMode::RejectUnknown
    } else {
        TrustMode::Pinned
    });

    match mode {
        TrustMode::Pinned if pins.is_empty() => Err(UploadError::config(
            "--trust pinned requires at least one --fingerprint",
        )),
        TrustMode::Pinned => Ok(HostTrustPolicy::pinned(pins)),
        _ if !pins.is_empty() => Err(UploadError::config(
            "--fingerprint only applies with --trust pinned",
        )),
        TrustMode::RejectUnknown => Ok(HostTrustPolicy::RejectUnknown),
        TrustMode::AutoAccept => Ok(HostTrustPolicy::AutoAccept),
    }
}

/// Destination parsed from `[user@]host:path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    /// Username, if given
    pub user: Option<String>,
    /// Hostname or address (IPv6 without brackets)
    pub host: String,
    /// Remote path, possibly empty
    pub path: String,
}

/// Parse remote destination (`[user@]host:path`, `user@[::1]:path`)
pub fn parse_remote_target(target: &str) -> Option<RemoteTarget> {
    let (user, rest) = match target.split_once('@') {
        Some((user, rest)) if !user.is_empty() && !user.contains(':') && !user.contains('/') => {
            (Some(user.to_string()), rest)
        }
        _ => (None, target),
    };

    let (host, path) = match rest.strip_prefix('[') {
        Some(bracketed) => {
            let (host, after) = bracketed.split_once(']')?;
            (host, after.strip_prefix(':')?)
        }
        None => rest.split_once(':')?,
    };

    if host.is_empty() || host.contains('/') {
        return None;
    }

    Some(RemoteTarget {
        user,
        host: host.to_string(),
        path: path.to_string(),
    })
}

/// Parse a humantime duration (`30s`, `2m`); a bare number means seconds
pub fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value)
        .map_err(|e| UploadError::config(format!("invalid duration '{}': {}", value, e)))
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(['G', 'B']), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(['M', 'B']), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(['K', 'B']), 1024u64)
    } else if size.ends_with('B') {
        (size.trim_end_matches('B'), 1u64)
    } else {
        // Assume bytes if no suffix
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        return Err(format!("Invalid size: {}", num_str));
    }

    let bytes = num * multiplier as f64;
    if bytes >= u64::MAX as f64 {
        return Err(format!("Size too large: {}", size));
    }
    Ok(bytes as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(argv: &[&str]) -> CliArgs {
        let mut full = vec!["remoteput"];
        full.extend_from_slice(argv);
        CliArgs::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("64kb").unwrap(), 64 * 1024);
        assert_eq!(parse_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("1.5G").unwrap(), (1.5 * 1024.0 * 1024.0 * 1024.0) as u64);
        assert!(parse_size("").is_err());
        assert!(parse_size("lots").is_err());
        assert!(parse_size("-1K").is_err());
        assert!(parse_size("1e30").is_err());
        assert!(parse_size("inf").is_err());
        assert!(parse_size("NaN").is_err());
    }

    #[test]
    fn test_parse_remote_target() {
        let t = parse_remote_target("student@logs:/home/student/ErrorLogFiles/").unwrap();
        assert_eq!(t.user.as_deref(), Some("student"));
        assert_eq!(t.host, "logs");
        assert_eq!(t.path, "/home/student/ErrorLogFiles/");

        let t = parse_remote_target("logs.example:/srv/a.log").unwrap();
        assert_eq!(t.user, None);

        let t = parse_remote_target("root@[::1]:/tmp/x").unwrap();
        assert_eq!(t.host, "::1");
        assert_eq!(t.path, "/tmp/x");

        let t = parse_remote_target("u@h:").unwrap();
        assert_eq!(t.path, "");

        assert!(parse_remote_target("/local/path").is_none());
        assert!(parse_remote_target("/tmp/a:b").is_none());
        assert!(parse_remote_target("u@[::1]/tmp").is_none());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_resolve_directory_destination() {
        let a = args(&[
            "/var/log/report.log",
            "student@logs:/home/student/ErrorLogFiles/",
            "--agent",
        ]);
        let config = RunConfig::resolve(&a, UploadProfile::default()).unwrap();
        assert_eq!(config.params.host, "logs");
        assert_eq!(config.params.username, "student");
        assert_eq!(config.params.port, 22);
        assert_eq!(config.request.remote_path, "/home/student/ErrorLogFiles/report.log");
        assert_eq!(config.policy, HostTrustPolicy::RejectUnknown);
        assert_eq!(config.options.overwrite, OverwritePolicy::Replace);
        assert_eq!(config.options.buffer_size, 1024 * 1024);
        assert!(matches!(config.params.credential, Credential::Agent));
    }

    #[test]
    fn test_resolve_credentials() {
        let a = args(&["a.log", "u@h:/srv/a.log", "-i", "/keys/id", "--passphrase", "pp"]);
        let config = RunConfig::resolve(&a, UploadProfile::default()).unwrap();
        match config.params.credential {
            Credential::KeyFile { private_key, passphrase } => {
                assert_eq!(private_key, PathBuf::from("/keys/id"));
                assert!(passphrase.is_some());
            }
            other => panic!("unexpected: {:?}", other),
        }

        let a = args(&["a.log", "u@h:/srv/a.log", "--password", "pw"]);
        let config = RunConfig::resolve(&a, UploadProfile::default()).unwrap();
        assert_eq!(config.params.credential.method(), "password");
    }

    #[test]
    fn test_resolve_from_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "host": "logs.example",
                "port": 2222,
                "username": "student",
                "remote_dir": "/home/student/ErrorLogFiles",
                "trust": "auto-accept",
                "connect_timeout_secs": 3,
                "transfer_timeout_secs": 0,
                "no_clobber": true
            }}"#
        )
        .unwrap();
        drop(file);

        let a = args(&["build/report.log", "--config", path.to_str().unwrap(), "--agent"]);
        let config = RunConfig::from_cli(&a).unwrap();
        assert_eq!(config.params.host, "logs.example");
        assert_eq!(config.params.port, 2222);
        assert_eq!(config.request.remote_path, "/home/student/ErrorLogFiles/report.log");
        assert_eq!(config.policy, HostTrustPolicy::AutoAccept);
        assert_eq!(config.options.timeouts.connect, Duration::from_secs(3));
        assert_eq!(config.options.timeouts.transfer, None);
        assert_eq!(config.options.overwrite, OverwritePolicy::Reject);
    }

    #[test]
    fn test_cli_overrides_profile() {
        let profile = UploadProfile {
            host: Some("profile-host".into()),
            username: Some("profile-user".into()),
            port: Some(2222),
            remote_dir: Some("/srv/drop".into()),
            ..Default::default()
        };
        let a = args(&["a.log", "other@cli-host:/tmp/", "-P", "2200", "--agent"]);
        let config = RunConfig::resolve(&a, profile).unwrap();
        assert_eq!(config.params.host, "cli-host");
        assert_eq!(config.params.username, "other");
        assert_eq!(config.params.port, 2200);
        assert_eq!(config.request.remote_path, "/tmp/a.log");
    }

    #[test]
    fn test_profile_rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"host": "h", "password": "nope"}"#).unwrap();
        assert!(matches!(UploadProfile::load(&path), Err(UploadError::Config(_))));
    }

    #[test]
    fn test_trust_resolution() {
        let fp = crate::trust::HostKey::new(crate::trust::KeyType::Ed25519, vec![1u8; 51])
            .fingerprint()
            .to_string();

        let a = args(&["a.log", "u@h:/x", "--agent", "--fingerprint", &fp]);
        let config = RunConfig::resolve(&a, UploadProfile::default()).unwrap();
        assert!(matches!(config.policy, HostTrustPolicy::PinnedFingerprint(ref pins) if pins.len() == 1));

        let a = args(&["a.log", "u@h:/x", "--agent", "--trust", "pinned"]);
        assert!(RunConfig::resolve(&a, UploadProfile::default()).is_err());

        let a = args(&["a.log", "u@h:/x", "--agent", "--trust", "auto-accept", "--fingerprint", &fp]);
        assert!(RunConfig::resolve(&a, UploadProfile::default()).is_err());

        let a = args(&["a.log", "u@h:/x", "--agent", "--fingerprint", "SHA256:short"]);
        assert!(RunConfig::resolve(&a, UploadProfile::default()).is_err());
    }

    #[test]
    fn test_missing_pieces_are_config_errors() {
        let a = args(&["a.log", "--agent"]);
        assert!(matches!(
            RunConfig::resolve(&a, UploadProfile::default()),
            Err(UploadError::Config(_))
        ));

        let a = args(&["a.log", "h:/srv/a.log", "--agent"]);
        assert!(RunConfig::resolve(&a, UploadProfile::default()).is_err());

        let a = args(&["a.log", "u@h:", "--agent"]);
        assert!(RunConfig::resolve(&a, UploadProfile::default()).is_err());

        for size in ["0", "65M", "100G", "1e30"] {
            let a = args(&["a.log", "u@h:/x", "--agent", "-b", size]);
            assert!(
                matches!(RunConfig::resolve(&a, UploadProfile::default()), Err(UploadError::Config(_))),
                "{}",
                size
            );
        }

        let a = args(&["a.log", "u@h:/x", "--agent", "-b", "64M"]);
        let config = RunConfig::resolve(&a, UploadProfile::default()).unwrap();
        assert_eq!(config.options.buffer_size, MAX_BUFFER_SIZE);
    }
}
