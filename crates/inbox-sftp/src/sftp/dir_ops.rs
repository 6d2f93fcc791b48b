// ── Directory operations ─────────────────────────────────────────────────────

use crate::sftp::connection::RemoteConnection;
use crate::sftp::error::{InboxError, InboxResult};
use crate::sftp::types::RemoteEntryKind;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const INBOX_DIR_MODE: i32 = 0o755;

/// How the inbox directory came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DirectoryOutcome {
    AlreadyPresent,
    Created,
    /// mkdir failed but the directory was there on re-check; another client
    /// created it in between.
    CreatedConcurrently,
}

/// Makes sure the inbox directory exists before a file is placed in it.
pub struct DirectoryEnsurer;

impl DirectoryEnsurer {
    /// Guarantee `path` is an existing directory. Creates it (single level)
    /// when absent. Anything else at that path is a `Directory` error.
    pub fn ensure(conn: &mut dyn RemoteConnection, path: &str) -> InboxResult<DirectoryOutcome> {
        let path = path.trim_end_matches('/');
        if path.is_empty() || path == "." {
            // Home directory of the login, always present.
            return Ok(DirectoryOutcome::AlreadyPresent);
        }

        match conn.stat(path) {
            Ok(RemoteEntryKind::Directory) => {
                debug!("Remote directory '{}' already present", path);
                return Ok(DirectoryOutcome::AlreadyPresent);
            }
            Ok(other) => {
                return Err(InboxError::directory(format!(
                    "'{}' exists but is not a directory ({:?})",
                    path, other
                )));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                return Err(InboxError::directory(format!("Cannot stat '{}': {}", path, e)));
            }
        }

        match conn.mkdir(path, INBOX_DIR_MODE) {
            Ok(()) => {
                info!("Created remote directory '{}'", path);
                Ok(DirectoryOutcome::Created)
            }
            Err(mkdir_err) => match conn.stat(path) {
                Ok(RemoteEntryKind::Directory) => {
                    debug!("Remote directory '{}' appeared concurrently", path);
                    Ok(DirectoryOutcome::CreatedConcurrently)
                }
                _ => Err(InboxError::directory(format!(
                    "Cannot create '{}': {}",
                    path, mkdir_err
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::connection::MockRemoteConnection;
    use crate::sftp::error::{InboxErrorKind, RemoteFsError};

    #[test]
    fn existing_directory_is_left_alone() {
        let mut conn = MockRemoteConnection::new();
        conn.expect_stat()
            .withf(|p| p == "inbox")
            .times(1)
            .returning(|_| Ok(RemoteEntryKind::Directory));
        conn.expect_mkdir().never();

        let outcome = DirectoryEnsurer::ensure(&mut conn, "inbox").unwrap();
        assert_eq!(outcome, DirectoryOutcome::AlreadyPresent);
    }

    #[test]
    fn missing_directory_is_created_once() {
        let mut conn = MockRemoteConnection::new();
        conn.expect_stat()
            .times(1)
            .returning(|p| Err(RemoteFsError::not_found(format!("{} missing", p))));
        conn.expect_mkdir()
            .withf(|p, mode| p == "inbox" && *mode == 0o755)
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = DirectoryEnsurer::ensure(&mut conn, "inbox/").unwrap();
        assert_eq!(outcome, DirectoryOutcome::Created);
    }

    #[test]
    fn file_in_place_of_directory_fails() {
        let mut conn = MockRemoteConnection::new();
        conn.expect_stat().returning(|_| Ok(RemoteEntryKind::File));
        conn.expect_mkdir().never();

        let err = DirectoryEnsurer::ensure(&mut conn, "inbox").unwrap_err();
        assert_eq!(err.kind, InboxErrorKind::Directory);
        assert!(err.message.contains("not a directory"));
    }

    #[test]
    fn stat_permission_error_is_not_treated_as_missing() {
        let mut conn = MockRemoteConnection::new();
        conn.expect_stat()
            .returning(|_| Err(RemoteFsError::permission_denied("denied")));
        conn.expect_mkdir().never();

        let err = DirectoryEnsurer::ensure(&mut conn, "inbox").unwrap_err();
        assert_eq!(err.kind, InboxErrorKind::Directory);
    }

    #[test]
    fn concurrent_creation_is_tolerated() {
        let mut conn = MockRemoteConnection::new();
        let mut calls = 0;
        conn.expect_stat().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(RemoteFsError::not_found("no such file"))
            } else {
                Ok(RemoteEntryKind::Directory)
            }
        });
        conn.expect_mkdir()
            .times(1)
            .returning(|_, _| Err(RemoteFsError::already_exists("exists")));

        let outcome = DirectoryEnsurer::ensure(&mut conn, "inbox").unwrap();
        assert_eq!(outcome, DirectoryOutcome::CreatedConcurrently);
    }

    #[test]
    fn mkdir_failure_without_directory_is_reported() {
        let mut conn = MockRemoteConnection::new();
        conn.expect_stat()
            .times(2)
            .returning(|_| Err(RemoteFsError::not_found("no such file")));
        conn.expect_mkdir()
            .returning(|_, _| Err(RemoteFsError::permission_denied("read-only")));

        let err = DirectoryEnsurer::ensure(&mut conn, "inbox").unwrap_err();
        assert_eq!(err.kind, InboxErrorKind::Directory);
        assert!(err.message.contains("read-only"));
    }

    #[test]
    fn home_directory_needs_no_requests() {
        let mut conn = MockRemoteConnection::new();
        conn.expect_stat().never();
        conn.expect_mkdir().never();

        assert_eq!(
            DirectoryEnsurer::ensure(&mut conn, "").unwrap(),
            DirectoryOutcome::AlreadyPresent
        );
        assert_eq!(
            DirectoryEnsurer::ensure(&mut conn, ".").unwrap(),
            DirectoryOutcome::AlreadyPresent
        );
    }
}
