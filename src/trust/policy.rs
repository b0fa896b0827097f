//! Host trust decisions

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::TrustRejection;
use crate::trust::{Fingerprint, HostKey, HostKeyStatus, KnownHosts};

/// Rule for accepting a server's host key
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HostTrustPolicy {
    /// Accept only keys already in known_hosts
    #[default]
    RejectUnknown,
    /// Accept and remember unseen hosts (legacy, opt-in)
    AutoAccept,
    /// Accept only keys with one of these fingerprints
    PinnedFingerprint(BTreeSet<Fingerprint>),
}

/// How a host key was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustDecision {
    /// Matched a stored key
    Known,
    /// Matched a pinned fingerprint
    Pinned,
    /// First contact under `AutoAccept`; caller should record the key
    AcceptedNew,
}

impl fmt::Display for TrustDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Known => "known host",
            Self::Pinned => "pinned",
            Self::AcceptedNew => "auto-accepted",
        })
    }
}

impl HostTrustPolicy {
    /// Pin a set of fingerprints
    pub fn pinned(fingerprints: impl IntoIterator<Item = Fingerprint>) -> Self {
        Self::PinnedFingerprint(fingerprints.into_iter().collect())
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::RejectUnknown => "reject-unknown",
            Self::AutoAccept => "auto-accept",
            Self::PinnedFingerprint(_) => "pinned",
        }
    }

    /// Decide whether `key` presented by `host:port` is trusted
    ///
    /// A key marked `@revoked` in `known` is refused under every policy.
    /// Does not modify `known`; on [`TrustDecision::AcceptedNew`] the caller
    /// records the key.
    pub fn evaluate(
        &self,
        known: &KnownHosts,
        host: &str,
        port: u16,
        key: &HostKey,
    ) -> Result<TrustDecision, TrustRejection> {
        let fingerprint = key.fingerprint();
        if known.is_revoked(host, port, key) {
            return Err(TrustRejection::Revoked(fingerprint));
        }
        match self {
            Self::PinnedFingerprint(pins) => {
                if pins.contains(&fingerprint) {
                    Ok(TrustDecision::Pinned)
                } else {
                    Err(TrustRejection::NotPinned(fingerprint))
                }
            }
            Self::RejectUnknown => match known.check(host, port, key) {
                HostKeyStatus::Match => Ok(TrustDecision::Known),
                HostKeyStatus::NotFound => Err(TrustRejection::UnknownHost(fingerprint)),
                HostKeyStatus::Mismatch => Err(TrustRejection::HostKeyChanged(fingerprint)),
                HostKeyStatus::Revoked => Err(TrustRejection::Revoked(fingerprint)),
            },
            Self::AutoAccept => match known.check(host, port, key) {
                HostKeyStatus::Match => Ok(TrustDecision::Known),
                HostKeyStatus::NotFound => Ok(TrustDecision::AcceptedNew),
                HostKeyStatus::Mismatch => Err(TrustRejection::HostKeyChanged(fingerprint)),
                HostKeyStatus::Revoked => Err(TrustRejection::Revoked(fingerprint)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::key::tests::ed25519_key;
    use crate::trust::known_hosts::tests::{line, HASHED_LOGS_EXAMPLE};
    use crate::trust::{HostKey, KeyType};

    #[test]
    fn test_default_is_strict() {
        assert_eq!(HostTrustPolicy::default(), HostTrustPolicy::RejectUnknown);
    }

    #[test]
    fn test_reject_unknown() {
        let key = ed25519_key(1);
        let mut known = KnownHosts::new();
        let policy = HostTrustPolicy::RejectUnknown;

        assert_eq!(
            policy.evaluate(&known, "h", 22, &key),
            Err(TrustRejection::UnknownHost(key.fingerprint()))
        );

        known.insert("h", 22, key.clone());
        assert_eq!(policy.evaluate(&known, "h", 22, &key), Ok(TrustDecision::Known));
    }

    #[test]
    fn test_auto_accept_refuses_changed_key() {
        let old = ed25519_key(1);
        let new = ed25519_key(2);
        let mut known = KnownHosts::new();
        let policy = HostTrustPolicy::AutoAccept;

        assert_eq!(policy.evaluate(&known, "h", 22, &new), Ok(TrustDecision::AcceptedNew));

        known.insert("h", 22, old);
        assert_eq!(
            policy.evaluate(&known, "h", 22, &new),
            Err(TrustRejection::HostKeyChanged(new.fingerprint()))
        );
    }

    #[test]
    fn test_pinned_ignores_known_hosts() {
        let key = ed25519_key(3);
        let other = ed25519_key(4);
        let mut known = KnownHosts::new();
        known.insert("h", 22, other.clone());

        let policy = HostTrustPolicy::pinned([key.fingerprint()]);
        assert_eq!(policy.evaluate(&known, "h", 22, &key), Ok(TrustDecision::Pinned));
        assert_eq!(
            policy.evaluate(&known, "h", 22, &other),
            Err(TrustRejection::NotPinned(other.fingerprint()))
        );
        assert_eq!(
            HostTrustPolicy::PinnedFingerprint(BTreeSet::new()).evaluate(&known, "h", 22, &key),
            Err(TrustRejection::NotPinned(key.fingerprint()))
        );
    }

    #[test]
    fn test_hashed_entries_are_honoured() {
        let stored = ed25519_key(1);
        let presented = ed25519_key(2);
        let known = KnownHosts::parse(&line(HASHED_LOGS_EXAMPLE, &stored));

        assert_eq!(
            HostTrustPolicy::RejectUnknown.evaluate(&known, "logs.example", 22, &stored),
            Ok(TrustDecision::Known)
        );
        assert_eq!(
            HostTrustPolicy::AutoAccept.evaluate(&known, "logs.example", 22, &presented),
            Err(TrustRejection::HostKeyChanged(presented.fingerprint()))
        );
    }

    #[test]
    fn test_revoked_key_refused_under_every_policy() {
        let revoked = ed25519_key(2);
        let known = KnownHosts::parse(&format!("@revoked {}", line("logs.example", &revoked)));
        let expected = Err(TrustRejection::Revoked(revoked.fingerprint()));

        for policy in [
            HostTrustPolicy::RejectUnknown,
            HostTrustPolicy::AutoAccept,
            HostTrustPolicy::pinned([revoked.fingerprint()]),
        ] {
            assert_eq!(policy.evaluate(&known, "logs.example", 22, &revoked), expected, "{}", policy.name());
        }

        let other = ed25519_key(3);
        assert_eq!(
            HostTrustPolicy::AutoAccept.evaluate(&known, "logs.example", 22, &other),
            Ok(TrustDecision::AcceptedNew)
        );
    }

    #[test]
    fn test_pinning_works_for_any_algorithm() {
        let mut blob = 7u32.to_be_bytes().to_vec();
        blob.extend_from_slice(b"ssh-foo");
        blob.extend_from_slice(&[4, 5, 6]);
        let key = HostKey::from_blob(&blob).unwrap();
        assert_eq!(key.key_type, KeyType::Other("ssh-foo".into()));

        let policy = HostTrustPolicy::pinned([key.fingerprint()]);
        assert_eq!(policy.evaluate(&KnownHosts::new(), "h", 22, &key), Ok(TrustDecision::Pinned));
    }
}
