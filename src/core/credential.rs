//! Authentication material
//!
//! Secrets live in `secrecy::SecretString`, which redacts `Debug` output and
//! zeroizes the buffer on drop. Nothing here implements `Serialize`.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::PathBuf;

/// How to authenticate the SSH user
pub enum Credential {
    /// Password authentication
    Password(SecretString),
    /// Public key authentication from a private key file
    KeyFile {
        /// Path to the private key
        private_key: PathBuf,
        /// Passphrase for an encrypted key
        passphrase: Option<SecretString>,
    },
    /// Identities offered by a running ssh-agent
    Agent,
}

impl Credential {
    /// Password credential
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password(SecretString::new(password.into()))
    }

    /// Key file credential
    pub fn key_file(private_key: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        Self::KeyFile {
            private_key: private_key.into(),
            passphrase: passphrase.map(SecretString::new),
        }
    }

    /// Whether the credential carries usable material
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Password(secret) => secret.expose_secret().is_empty(),
            Self::KeyFile { private_key, .. } => private_key.as_os_str().is_empty(),
            Self::Agent => false,
        }
    }

    /// Authentication method name, safe to log
    pub fn method(&self) -> &'static str {
        match self {
            Self::Password(_) => "password",
            Self::KeyFile { .. } => "publickey",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Credential::Password([REDACTED])"),
            Self::KeyFile { private_key, passphrase } => f
                .debug_struct("Credential::KeyFile")
                .field("private_key", private_key)
                .field("passphrase", &passphrase.as_ref().map(|_| "[REDACTED]"))
                .finish(),
            Self::Agent => f.write_str("Credential::Agent"),
        }
    }
}
