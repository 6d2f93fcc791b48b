// ── Types ─────────────────────────────────────────────────────────────────────

use crate::sftp::error::{InboxError, InboxErrorKind};
use crate::sftp::service::UploadSession;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_connect_timeout_secs() -> u64 {
    10
}

// ── Credentials ──────────────────────────────────────────────────────────────

/// Everything needed to reach the remote inbox for one attempt.
///
/// Immutable once built. The secret is held in a [`SecretString`] so it is
/// zeroed on drop and never appears in `Debug` output.
#[derive(Clone)]
pub struct TransferCredentials {
    host: String,
    port: u16,
    username: String,
    secret: SecretString,
    remote_directory: String,
}

impl TransferCredentials {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        secret: impl Into<String>,
        remote_directory: impl Into<String>,
    ) -> Self {
        Self::from_secret(
            host,
            port,
            username,
            SecretString::new(secret.into()),
            remote_directory,
        )
    }

    /// Take ownership of an already-protected secret without copying it.
    pub fn from_secret(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        secret: SecretString,
        remote_directory: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            secret,
            remote_directory: remote_directory.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    pub fn remote_directory(&self) -> &str {
        &self.remote_directory
    }

    /// Host, username and secret are filled in and the port is usable.
    pub fn is_complete(&self) -> bool {
        !self.host.trim().is_empty()
            && self.port != 0
            && !self.username.trim().is_empty()
            && !self.secret.expose_secret().is_empty()
    }

    /// Full remote path for `target_name` inside the inbox directory.
    pub fn remote_path(&self, target_name: &str) -> String {
        let dir = self.remote_directory.trim_end_matches('/');
        if dir.is_empty() {
            if self.remote_directory.starts_with('/') {
                format!("/{}", target_name)
            } else {
                target_name.to_string()
            }
        } else {
            format!("{}/{}", dir, target_name)
        }
    }

    /// `host:path` label used in reports.
    pub fn destination(&self, target_name: &str) -> String {
        format!("{}:{}", self.host, self.remote_path(target_name))
    }

    /// SHA-256 over every field, secret included. Kept in memory only, so a
    /// session can tell whether the credentials changed since the last test.
    pub(crate) fn fingerprint(&self) -> String {
        let port = self.port.to_be_bytes();
        let parts: [&[u8]; 5] = [
            self.host.as_bytes(),
            &port,
            self.username.as_bytes(),
            self.secret.expose_secret().as_bytes(),
            self.remote_directory.as_bytes(),
        ];
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Debug for TransferCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .field("remote_directory", &self.remote_directory)
            .finish()
    }
}

// ── Policies ─────────────────────────────────────────────────────────────────

/// How the server's host key is checked during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum HostKeyPolicy {
    /// Accept any key without recording it (trust-on-first-use without
    /// pinning). This is a known security gap; the fingerprint is logged.
    #[default]
    AcceptUnverified,
    /// Require a matching entry in an OpenSSH known_hosts file.
    KnownHosts,
}

/// What to do when the destination file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ConflictPolicy {
    /// Last write wins.
    #[default]
    Overwrite,
    /// Fail the transfer instead of replacing the existing file.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
    /// Defaults to `~/.ssh/known_hosts` when the policy needs one.
    #[serde(default)]
    pub known_hosts_file: Option<PathBuf>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_file: None,
        }
    }
}

// ── Connection state ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", tag = "state", content = "cause")]
pub enum ConnectionState {
    #[default]
    Unverified,
    Verified,
    Failed(InboxError),
}

/// Kind of object found at a remote path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemoteEntryKind {
    Directory,
    File,
    Other,
}

// ── Upload records ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum UploadOutcome {
    Success,
    Failure {
        kind: InboxErrorKind,
        message: String,
    },
}

/// One upload attempt, as reported to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: String,
    pub filename: String,
    pub size_bytes: u64,
    pub timestamp: DateTime<Utc>,
    pub destination: String,
    pub outcome: UploadOutcome,
}

impl UploadRecord {
    pub fn is_success(&self) -> bool {
        self.outcome == UploadOutcome::Success
    }
}

impl From<&InboxError> for UploadOutcome {
    fn from(e: &InboxError) -> Self {
        UploadOutcome::Failure {
            kind: e.kind,
            message: e.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionCounters {
    successful_uploads: u64,
}

impl SessionCounters {
    pub fn successful_uploads(&self) -> u64 {
        self.successful_uploads
    }

    pub(crate) fn record_success(&mut self) {
        self.successful_uploads += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub attempts: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_bytes_sent: u64,
}

// ── Boundary responses ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConnectionResponse {
    pub verified: bool,
    pub message: String,
    #[serde(default)]
    pub error_kind: Option<InboxErrorKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub bytes_sent: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub error_kind: Option<InboxErrorKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub successful_uploads: u64,
    pub stats: HistoryStats,
}

// ── State alias ──────────────────────────────────────────────────────────────

pub type UploadSessionState = Arc<Mutex<UploadSession>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(dir: &str) -> TransferCredentials {
        TransferCredentials::new("sftp.example.net", 22, "ops", "hunter2", dir)
    }

    #[test]
    fn test_debug_redacts_secret() {
        let dbg = format!("{:?}", creds("inbox"));
        assert!(dbg.contains("[REDACTED]"));
        assert!(!dbg.contains("hunter2"));
    }

    #[test]
    fn test_remote_path_joins_directory() {
        assert_eq!(creds("inbox").remote_path("a.xml"), "inbox/a.xml");
        assert_eq!(creds("inbox/").remote_path("a.xml"), "inbox/a.xml");
        assert_eq!(creds("/srv/inbox").remote_path("a.xml"), "/srv/inbox/a.xml");
        assert_eq!(creds("/").remote_path("a.xml"), "/a.xml");
        assert_eq!(creds("").remote_path("a.xml"), "a.xml");
    }

    #[test]
    fn test_destination_label() {
        assert_eq!(creds("inbox").destination("a.xml"), "sftp.example.net:inbox/a.xml");
    }

    #[test]
    fn test_is_complete() {
        assert!(creds("inbox").is_complete());
        assert!(!TransferCredentials::new("h", 22, "", "pw", "inbox").is_complete());
        assert!(!TransferCredentials::new("h", 22, "u", "", "inbox").is_complete());
        assert!(!TransferCredentials::new("h", 0, "u", "pw", "inbox").is_complete());
    }

    #[test]
    fn test_fingerprint_tracks_every_field() {
        let base = creds("inbox").fingerprint();
        assert_eq!(base, creds("inbox").fingerprint());
        assert_ne!(base, creds("outbox").fingerprint());
        let other_secret = TransferCredentials::new("sftp.example.net", 22, "ops", "hunter3", "inbox");
        assert_ne!(base, other_secret.fingerprint());
        assert!(!base.contains("hunter2"));
    }

    #[test]
    fn test_counters_only_go_up() {
        let mut counters = SessionCounters::default();
        assert_eq!(counters.successful_uploads(), 0);
        counters.record_success();
        counters.record_success();
        assert_eq!(counters.successful_uploads(), 2);
    }

    #[test]
    fn test_connection_state_serialisation() {
        let json = serde_json::to_value(ConnectionState::Failed(InboxError::timeout("slow"))).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["cause"]["kind"], "timeout");
    }

    #[test]
    fn test_connect_options_defaults() {
        let opts: ConnectOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.connect_timeout_secs, 10);
        assert_eq!(opts.host_key_policy, HostKeyPolicy::AcceptUnverified);
        assert!(opts.known_hosts_file.is_none());
    }
}
