//! Error taxonomy for upload attempts.
//!
//! [`InboxError`] is what callers see: one of six kinds plus a message.
//! [`RemoteFsError`] is the lower-level classification of SFTP failures that
//! the directory and transfer steps translate into an [`InboxError`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised failure of a connection test or upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InboxErrorKind {
    /// Malformed input (XML, target name, incomplete credentials). No network I/O happened.
    Validation,
    /// Username/password rejected by the server.
    Authentication,
    /// The connect phase exceeded its time bound.
    Timeout,
    /// DNS, TCP, SSH handshake, host-key or SFTP-subsystem failure.
    Transport,
    /// The inbox path is not a directory or could not be created.
    Directory,
    /// Writing the remote file failed or was interrupted.
    Transfer,
}

impl fmt::Display for InboxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validation => "Validation error",
            Self::Authentication => "Authentication error",
            Self::Timeout => "Timeout",
            Self::Transport => "Connection error",
            Self::Directory => "Remote directory error",
            Self::Transfer => "Transfer error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind}: {message}")]
pub struct InboxError {
    pub kind: InboxErrorKind,
    pub message: String,
}

pub type InboxResult<T> = Result<T, InboxError>;

// ── Construction helpers ─────────────────────────────────────────────

impl InboxError {
    pub fn new(kind: InboxErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(InboxErrorKind::Validation, msg)
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::new(InboxErrorKind::Authentication, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(InboxErrorKind::Timeout, msg)
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::new(InboxErrorKind::Transport, msg)
    }

    pub fn directory(msg: impl Into<String>) -> Self {
        Self::new(InboxErrorKind::Directory, msg)
    }

    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::new(InboxErrorKind::Transfer, msg)
    }

    /// Classify a libssh2 session error raised while connecting.
    pub fn from_session(context: &str, err: &ssh2::Error) -> Self {
        let msg = format!("{}: {}", context, err);
        match err.code() {
            ssh2::ErrorCode::Session(code) if is_auth_code(code) => Self::authentication(msg),
            ssh2::ErrorCode::Session(code) if is_timeout_code(code) => Self::timeout(msg),
            _ => Self::transport(msg),
        }
    }

    /// The single message shown to the operator for this attempt.
    pub fn user_message(&self) -> String {
        match self.kind {
            InboxErrorKind::Authentication => {
                format!("{}: {} (check your username and password)", self.kind, self.message)
            }
            InboxErrorKind::Timeout => {
                format!("{}: {} (check the host, port and network)", self.kind, self.message)
            }
            _ => self.to_string(),
        }
    }
}

impl From<InboxError> for String {
    fn from(e: InboxError) -> String {
        e.user_message()
    }
}

// ── libssh2 codes ────────────────────────────────────────────────────

const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_SOCKET_SEND: i32 = -7;
const LIBSSH2_ERROR_SOCKET_DISCONNECT: i32 = -13;
const LIBSSH2_ERROR_PASSWORD_EXPIRED: i32 = -15;
const LIBSSH2_ERROR_AUTHENTICATION_FAILED: i32 = -18;
const LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED: i32 = -19;
const LIBSSH2_ERROR_SOCKET_TIMEOUT: i32 = -30;
const LIBSSH2_ERROR_SOCKET_RECV: i32 = -43;

const LIBSSH2_FX_NO_SUCH_FILE: i32 = 2;
const LIBSSH2_FX_PERMISSION_DENIED: i32 = 3;
const LIBSSH2_FX_NO_CONNECTION: i32 = 6;
const LIBSSH2_FX_CONNECTION_LOST: i32 = 7;
const LIBSSH2_FX_NO_SUCH_PATH: i32 = 10;
const LIBSSH2_FX_FILE_ALREADY_EXISTS: i32 = 11;
const LIBSSH2_FX_WRITE_PROTECT: i32 = 12;
const LIBSSH2_FX_NO_SPACE_ON_FILESYSTEM: i32 = 14;
const LIBSSH2_FX_QUOTA_EXCEEDED: i32 = 15;
const LIBSSH2_FX_NOT_A_DIRECTORY: i32 = 19;

fn is_auth_code(code: i32) -> bool {
    matches!(
        code,
        LIBSSH2_ERROR_AUTHENTICATION_FAILED
            | LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED
            | LIBSSH2_ERROR_PASSWORD_EXPIRED
    )
}

fn is_timeout_code(code: i32) -> bool {
    matches!(code, LIBSSH2_ERROR_TIMEOUT | LIBSSH2_ERROR_SOCKET_TIMEOUT)
}

// ── Remote filesystem errors ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemoteFsErrorKind {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    NotADirectory,
    NoSpace,
    ConnectionLost,
    Other,
}

/// Failure of a single stat / mkdir / write request on an open connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct RemoteFsError {
    pub kind: RemoteFsErrorKind,
    pub message: String,
}

impl RemoteFsError {
    pub fn new(kind: RemoteFsErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(RemoteFsErrorKind::NotFound, msg)
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::new(RemoteFsErrorKind::AlreadyExists, msg)
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::new(RemoteFsErrorKind::PermissionDenied, msg)
    }

    pub fn connection_lost(msg: impl Into<String>) -> Self {
        Self::new(RemoteFsErrorKind::ConnectionLost, msg)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteFsErrorKind::NotFound
    }

    /// Classify an SFTP status or session error.
    pub fn from_ssh2(err: &ssh2::Error) -> Self {
        let kind = match err.code() {
            ssh2::ErrorCode::SFTP(code) => match code {
                LIBSSH2_FX_NO_SUCH_FILE | LIBSSH2_FX_NO_SUCH_PATH => RemoteFsErrorKind::NotFound,
                LIBSSH2_FX_FILE_ALREADY_EXISTS => RemoteFsErrorKind::AlreadyExists,
                LIBSSH2_FX_PERMISSION_DENIED | LIBSSH2_FX_WRITE_PROTECT => {
                    RemoteFsErrorKind::PermissionDenied
                }
                LIBSSH2_FX_NOT_A_DIRECTORY => RemoteFsErrorKind::NotADirectory,
                LIBSSH2_FX_NO_SPACE_ON_FILESYSTEM | LIBSSH2_FX_QUOTA_EXCEEDED => {
                    RemoteFsErrorKind::NoSpace
                }
                LIBSSH2_FX_NO_CONNECTION | LIBSSH2_FX_CONNECTION_LOST => {
                    RemoteFsErrorKind::ConnectionLost
                }
                _ => RemoteFsErrorKind::Other,
            },
            ssh2::ErrorCode::Session(code) => match code {
                LIBSSH2_ERROR_SOCKET_SEND
                | LIBSSH2_ERROR_SOCKET_RECV
                | LIBSSH2_ERROR_SOCKET_DISCONNECT
                | LIBSSH2_ERROR_TIMEOUT
                | LIBSSH2_ERROR_SOCKET_TIMEOUT => RemoteFsErrorKind::ConnectionLost,
                _ => RemoteFsErrorKind::Other,
            },
        };
        Self::new(kind, err.to_string())
    }
}

impl From<std::io::Error> for RemoteFsError {
    fn from(e: std::io::Error) -> Self {
        // ssh2 wraps its own error inside the io::Error it hands back from Write.
        if let Some(inner) = e.get_ref().and_then(|i| i.downcast_ref::<ssh2::Error>()) {
            return Self::from_ssh2(inner);
        }
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => RemoteFsErrorKind::NotFound,
            std::io::ErrorKind::AlreadyExists => RemoteFsErrorKind::AlreadyExists,
            std::io::ErrorKind::PermissionDenied => RemoteFsErrorKind::PermissionDenied,
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::TimedOut => RemoteFsErrorKind::ConnectionLost,
            _ => RemoteFsErrorKind::Other,
        };
        Self::new(kind, e.to_string())
    }
}
