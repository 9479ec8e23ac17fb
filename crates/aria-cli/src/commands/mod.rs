//! CLI command implementations.

pub(crate) mod artist;
pub(crate) mod config;
