//! Host identity verification
//!
//! Host keys, OpenSSH fingerprints, the known_hosts store and the
//! [`HostTrustPolicy`] that decides whether a server is accepted.

pub(crate) mod key;
mod known_hosts;
mod policy;

pub use key::*;
pub use known_hosts::*;
pub use policy::*;
