//! Operator-facing caller for the XML inbox: configuration, logging and the
//! command-line front end. Protocol logic lives in `inbox-core` and
//! `inbox-sftp`.

pub mod cli;
pub mod config;
pub mod logging;

pub use config::{ConfigError, ConfigOverrides, InboxConfig};
