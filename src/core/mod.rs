//! Core upload module
//!
//! Provides the [`RemoteUploader`] and the per-call data it consumes:
//! connection parameters, the transfer request, options and the report.

mod credential;
mod request;
mod uploader;

#[cfg(test)]
pub(crate) mod fake;

pub use credential::*;
pub use request::*;
pub use uploader::*;
