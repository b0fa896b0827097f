//! Host keys and their SHA-256 fingerprints

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::UploadError;

/// Host key algorithm
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// ssh-rsa
    Rsa,
    /// ssh-dss
    Dss,
    /// ecdsa-sha2-nistp256
    Ecdsa256,
    /// ecdsa-sha2-nistp384
    Ecdsa384,
    /// ecdsa-sha2-nistp521
    Ecdsa521,
    /// ssh-ed25519
    Ed25519,
    /// Any other algorithm name, kept verbatim
    Other(String),
}

impl KeyType {
    /// OpenSSH algorithm name
    pub fn name(&self) -> &str {
        match self {
            Self::Rsa => "ssh-rsa",
            Self::Dss => "ssh-dss",
            Self::Ecdsa256 => "ecdsa-sha2-nistp256",
            Self::Ecdsa384 => "ecdsa-sha2-nistp384",
            Self::Ecdsa521 => "ecdsa-sha2-nistp521",
            Self::Ed25519 => "ssh-ed25519",
            Self::Other(name) => name,
        }
    }

    /// Parse an OpenSSH algorithm name
    pub fn from_name(name: &str) -> Self {
        match name {
            "ssh-rsa" => Self::Rsa,
            "ssh-dss" => Self::Dss,
            "ecdsa-sha2-nistp256" => Self::Ecdsa256,
            "ecdsa-sha2-nistp384" => Self::Ecdsa384,
            "ecdsa-sha2-nistp521" => Self::Ecdsa521,
            "ssh-ed25519" => Self::Ed25519,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Public host key as presented on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostKey {
    /// Algorithm
    pub key_type: KeyType,
    /// Raw key blob
    pub blob: Vec<u8>,
}

impl HostKey {
    /// Wrap a raw blob
    pub fn new(key_type: KeyType, blob: impl Into<Vec<u8>>) -> Self {
        Self {
            key_type,
            blob: blob.into(),
        }
    }

    /// Wrap a wire blob, reading the algorithm from its leading name field
    ///
    /// Returns `None` only for a blob too short to carry a name.
    pub fn from_blob(blob: &[u8]) -> Option<Self> {
        let len_bytes: [u8; 4] = blob.get(..4)?.try_into().ok()?;
        let name_len = u32::from_be_bytes(len_bytes) as usize;
        let name = blob.get(4..4usize.checked_add(name_len)?)?;
        let name = std::str::from_utf8(name).ok().filter(|n| !n.is_empty())?;
        Some(Self::new(KeyType::from_name(name), blob))
    }

    /// Decode the base64 body of a known_hosts or authorized_keys line
    pub fn from_base64(key_type: KeyType, encoded: &str) -> Option<Self> {
        STANDARD
            .decode(encoded.trim())
            .ok()
            .filter(|blob| !blob.is_empty())
            .map(|blob| Self::new(key_type, blob))
    }

    /// Base64 body for a known_hosts line
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.blob)
    }

    /// OpenSSH SHA-256 fingerprint
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.blob)
    }
}

/// OpenSSH-style `SHA256:<base64>` fingerprint
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    const PREFIX: &'static str = "SHA256:";

    /// Fingerprint of a raw key blob
    pub fn of(blob: &[u8]) -> Self {
        let digest = Sha256::digest(blob);
        Self(format!("{}{}", Self::PREFIX, STANDARD_NO_PAD.encode(digest)))
    }

    /// Canonical text form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = match trimmed.split_once(':') {
            Some((algo, body)) if algo.eq_ignore_ascii_case("sha256") => body,
            Some((algo, _)) => {
                return Err(UploadError::config(format!(
                    "unsupported fingerprint algorithm '{}', expected SHA256",
                    algo
                )))
            }
            None => trimmed,
        };
        let body = body.trim_end_matches('=');

        let digest = STANDARD_NO_PAD
            .decode(body)
            .map_err(|e| UploadError::config(format!("invalid fingerprint '{}': {}", s, e)))?;
        if digest.len() != 32 {
            return Err(UploadError::config(format!(
                "invalid fingerprint '{}': expected 32 digest bytes, got {}",
                s,
                digest.len()
            )));
        }

        Ok(Self(format!("{}{}", Self::PREFIX, STANDARD_NO_PAD.encode(digest))))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Well-formed ed25519 public key blob with a recognizable body
    pub(crate) fn ed25519_key(seed: u8) -> HostKey {
        let mut blob = Vec::new();
        blob.extend_from_slice(&11u32.to_be_bytes());
        blob.extend_from_slice(b"ssh-ed25519");
        blob.extend_from_slice(&32u32.to_be_bytes());
        blob.extend((0..32).map(|i| seed.wrapping_add(i)));
        HostKey::new(KeyType::Ed25519, blob)
    }

    #[test]
    fn test_fingerprint_format() {
        let fp = ed25519_key(1).fingerprint();
        let body = fp.as_str().strip_prefix("SHA256:").unwrap();
        assert_eq!(body.len(), 43);
        assert!(!body.contains('='));
        assert_ne!(fp, ed25519_key(2).fingerprint());
    }

    #[test]
    fn test_fingerprint_parse_variants() {
        let fp = ed25519_key(7).fingerprint();
        let body = fp.as_str().trim_start_matches("SHA256:");

        assert_eq!(fp.as_str().parse::<Fingerprint>().unwrap(), fp);
        assert_eq!(body.parse::<Fingerprint>().unwrap(), fp);
        assert_eq!(format!("sha256:{}=", body).parse::<Fingerprint>().unwrap(), fp);
    }

    #[test]
    fn test_fingerprint_parse_rejects_garbage() {
        assert!("MD5:aa:bb".parse::<Fingerprint>().is_err());
        assert!("SHA256:abc".parse::<Fingerprint>().is_err());
        assert!("SHA256:!!!".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn test_key_type_names() {
        for kt in [
            KeyType::Rsa,
            KeyType::Dss,
            KeyType::Ecdsa256,
            KeyType::Ecdsa384,
            KeyType::Ecdsa521,
            KeyType::Ed25519,
        ] {
            assert_eq!(KeyType::from_name(kt.name()), kt);
        }
        assert_eq!(KeyType::from_name("ssh-ed448"), KeyType::Other("ssh-ed448".into()));
        assert_eq!(KeyType::from_name("ssh-ed448").to_string(), "ssh-ed448");
    }

    #[test]
    fn test_from_blob_reads_algorithm() {
        let key = ed25519_key(9);
        assert_eq!(HostKey::from_blob(&key.blob), Some(key));

        let mut unknown = 7u32.to_be_bytes().to_vec();
        unknown.extend_from_slice(b"ssh-foo");
        unknown.extend_from_slice(&[1, 2, 3]);
        let key = HostKey::from_blob(&unknown).unwrap();
        assert_eq!(key.key_type, KeyType::Other("ssh-foo".into()));
        assert_eq!(key.fingerprint(), Fingerprint::of(&unknown));

        assert_eq!(HostKey::from_blob(&[0, 0, 0, 200, b's']), None);
        assert_eq!(HostKey::from_blob(&[0, 0, 0, 0]), None);
        assert_eq!(HostKey::from_blob(&[0, 0]), None);
    }

    #[test]
    fn test_base64_body() {
        let key = ed25519_key(3);
        let decoded = HostKey::from_base64(KeyType::Ed25519, &key.to_base64()).unwrap();
        assert_eq!(decoded, key);
        assert!(HostKey::from_base64(KeyType::Ed25519, "not base64!").is_none());
        assert!(HostKey::from_base64(KeyType::Ed25519, "").is_none());
    }
}
