// ── inbox-sftp / sftp module ──────────────────────────────────────────────────
//
// Single-document placement into a remote inbox over SFTP:
//   • Password (and keyboard-interactive) authentication with a 10 s connect bound
//   • Host-key policy and fingerprint logging
//   • Stat-then-mkdir inbox handling, tolerant of concurrent creation
//   • Whole-document writes with a conflict policy
//   • Per-session verification state, success counter and history
//   • Async command wrappers for a front end

pub mod types;
pub mod error;
pub mod connection;
pub mod dir_ops;
pub mod transfer;
pub mod history;
pub mod service;
pub mod commands;

pub use types::*;
pub use error::{InboxError, InboxErrorKind, InboxResult, RemoteFsError, RemoteFsErrorKind};
pub use connection::{Connector, RemoteConnection, SshConnector};
pub use dir_ops::{DirectoryEnsurer, DirectoryOutcome};
pub use transfer::FileTransferer;
pub use service::UploadSession;
pub use commands::*;
