// ── Transfer ─────────────────────────────────────────────────────────────────

use crate::sftp::connection::RemoteConnection;
use crate::sftp::error::{InboxError, InboxResult, RemoteFsErrorKind};
use crate::sftp::types::ConflictPolicy;
use tracing::{info, warn};

/// Writes a whole in-memory document to a remote path.
pub struct FileTransferer;

impl FileTransferer {
    /// Write `content` to `remote_path` and return the number of bytes sent.
    ///
    /// With [`ConflictPolicy::Overwrite`] an existing file is replaced. With
    /// [`ConflictPolicy::Reject`] the path is checked first and the write is
    /// refused when something is already there.
    pub fn put(
        conn: &mut dyn RemoteConnection,
        content: &[u8],
        remote_path: &str,
        on_conflict: ConflictPolicy,
    ) -> InboxResult<u64> {
        if on_conflict == ConflictPolicy::Reject {
            match conn.stat(remote_path) {
                Ok(_) => {
                    return Err(InboxError::transfer(format!(
                        "'{}' already exists on the server",
                        remote_path
                    )));
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    return Err(InboxError::transfer(format!(
                        "Cannot check '{}': {}",
                        remote_path, e
                    )));
                }
            }
        }

        let expected = content.len() as u64;
        let written = conn.put(remote_path, content).map_err(|e| {
            let detail = match e.kind {
                RemoteFsErrorKind::ConnectionLost => "connection lost during write",
                RemoteFsErrorKind::PermissionDenied => "permission denied",
                RemoteFsErrorKind::NoSpace => "no space left on the server",
                _ => "write failed",
            };
            InboxError::transfer(format!("Upload to '{}' failed, {}: {}", remote_path, detail, e))
        })?;

        if written != expected {
            warn!(
                "Short write to '{}': {} of {} bytes",
                remote_path, written, expected
            );
            return Err(InboxError::transfer(format!(
                "Upload to '{}' incomplete: {} of {} bytes written",
                remote_path, written, expected
            )));
        }

        info!("Wrote {} bytes to '{}'", written, remote_path);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::connection::MockRemoteConnection;
    use crate::sftp::error::{InboxErrorKind, RemoteFsError};
    use crate::sftp::types::RemoteEntryKind;

    #[test]
    fn writes_exact_bytes_to_path() {
        let mut conn = MockRemoteConnection::new();
        conn.expect_stat().never();
        conn.expect_put()
            .withf(|p, c| p == "inbox/order.xml" && c == b"<a/>")
            .times(1)
            .returning(|_, c| Ok(c.len() as u64));

        let n = FileTransferer::put(&mut conn, b"<a/>", "inbox/order.xml", ConflictPolicy::Overwrite)
            .unwrap();
        assert_eq!(n, 4);
    }

    #[test]
    fn empty_content_is_allowed() {
        let mut conn = MockRemoteConnection::new();
        conn.expect_put().returning(|_, _| Ok(0));

        let n = FileTransferer::put(&mut conn, b"", "inbox/empty.xml", ConflictPolicy::Overwrite)
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn dropped_connection_maps_to_transfer_error() {
        let mut conn = MockRemoteConnection::new();
        conn.expect_put()
            .returning(|_, _| Err(RemoteFsError::connection_lost("socket closed")));

        let err = FileTransferer::put(&mut conn, b"<a/>", "inbox/a.xml", ConflictPolicy::Overwrite)
            .unwrap_err();
        assert_eq!(err.kind, InboxErrorKind::Transfer);
        assert!(err.message.contains("connection lost"));
    }

    #[test]
    fn short_write_is_an_error() {
        let mut conn = MockRemoteConnection::new();
        conn.expect_put().returning(|_, _| Ok(2));

        let err = FileTransferer::put(&mut conn, b"<a/>", "inbox/a.xml", ConflictPolicy::Overwrite)
            .unwrap_err();
        assert_eq!(err.kind, InboxErrorKind::Transfer);
        assert!(err.message.contains("2 of 4"));
    }

    #[test]
    fn reject_policy_refuses_existing_file() {
        let mut conn = MockRemoteConnection::new();
        conn.expect_stat()
            .withf(|p| p == "inbox/a.xml")
            .returning(|_| Ok(RemoteEntryKind::File));
        conn.expect_put().never();

        let err = FileTransferer::put(&mut conn, b"<a/>", "inbox/a.xml", ConflictPolicy::Reject)
            .unwrap_err();
        assert_eq!(err.kind, InboxErrorKind::Transfer);
        assert!(err.message.contains("already exists"));
    }

    #[test]
    fn reject_policy_writes_new_file() {
        let mut conn = MockRemoteConnection::new();
        conn.expect_stat()
            .returning(|_| Err(RemoteFsError::not_found("no such file")));
        conn.expect_put().times(1).returning(|_, c| Ok(c.len() as u64));

        let n = FileTransferer::put(&mut conn, b"<a/>", "inbox/a.xml", ConflictPolicy::Reject)
            .unwrap();
        assert_eq!(n, 4);
    }
}
