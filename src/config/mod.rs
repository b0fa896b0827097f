//! Configuration module for RemotePut
//!
//! Provides CLI arguments, JSON upload profiles, and their merge into the
//! parameters of one upload.

mod settings;

pub use settings::*;
