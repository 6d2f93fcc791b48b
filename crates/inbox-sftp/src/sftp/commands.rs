// ── Command boundary ──────────────────────────────────────────────────────────
//
// Thin async wrappers that take the shared `UploadSessionState`, lock it and
// run the blocking session call on the blocking pool.  Holding the lock for
// the whole attempt serialises attempts and the counter update.

use crate::sftp::error::InboxError;
use crate::sftp::types::*;

// ── Connection ───────────────────────────────────────────────────────────────

pub async fn inbox_test_connection(
    state: &UploadSessionState,
    creds: TransferCredentials,
) -> Result<TestConnectionResponse, String> {
    let mut session = state.clone().lock_owned().await;
    tokio::task::spawn_blocking(move || session.test_connection(&creds))
        .await
        .map_err(|e| InboxError::transport(format!("Connection test aborted: {}", e)).into())
}

// ── Upload ───────────────────────────────────────────────────────────────────

pub async fn inbox_upload(
    state: &UploadSessionState,
    creds: TransferCredentials,
    content: Vec<u8>,
    target_name: String,
) -> Result<UploadResponse, String> {
    let mut session = state.clone().lock_owned().await;
    tokio::task::spawn_blocking(move || session.upload(&creds, &content, &target_name))
        .await
        .map_err(|e| InboxError::transfer(format!("Upload aborted: {}", e)).into())
}

// ── Reporting ────────────────────────────────────────────────────────────────

pub async fn inbox_connection_state(
    state: &UploadSessionState,
    creds: TransferCredentials,
) -> Result<ConnectionState, String> {
    let session = state.lock().await;
    Ok(session.connection_state(&creds))
}

pub async fn inbox_history(
    state: &UploadSessionState,
    limit: Option<usize>,
) -> Result<Vec<UploadRecord>, String> {
    let session = state.lock().await;
    Ok(session.history(limit))
}

pub async fn inbox_session_stats(state: &UploadSessionState) -> Result<SessionSummary, String> {
    let session = state.lock().await;
    Ok(session.summary())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::connection::{Connector, MockRemoteConnection, RemoteConnection};
    use crate::sftp::error::{InboxErrorKind, InboxResult};
    use crate::sftp::service::UploadSession;
    use std::sync::Arc;

    struct DirectoryPresent;

    impl Connector for DirectoryPresent {
        fn open(&self, _creds: &TransferCredentials) -> InboxResult<Box<dyn RemoteConnection>> {
            let mut conn = MockRemoteConnection::new();
            conn.expect_stat().returning(|_| Ok(RemoteEntryKind::Directory));
            conn.expect_put().returning(|_, c| Ok(c.len() as u64));
            conn.expect_close().return_const(());
            Ok(Box::new(conn))
        }
    }

    fn creds() -> TransferCredentials {
        TransferCredentials::new("sftp.example.net", 22, "ops", "pw", "inbox")
    }

    #[tokio::test]
    async fn concurrent_uploads_are_all_counted() {
        let state = UploadSession::new(Arc::new(DirectoryPresent)).into_state();

        let mut handles = Vec::new();
        for n in 0..8 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                inbox_upload(&state, creds(), b"<a/>".to_vec(), format!("{}.xml", n)).await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().unwrap().success);
        }

        let summary = inbox_session_stats(&state).await.unwrap();
        assert_eq!(summary.successful_uploads, 8);
        assert_eq!(summary.stats.attempts, 8);
    }

    #[tokio::test]
    async fn invalid_document_reports_validation() {
        let state = UploadSession::new(Arc::new(DirectoryPresent)).into_state();
        let response = inbox_upload(&state, creds(), b"not xml at all".to_vec(), "a.xml".into())
            .await
            .unwrap();
        assert!(!response.success);
        assert_eq!(response.error_kind, Some(InboxErrorKind::Validation));

        let history = inbox_history(&state, None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].is_success());
    }

    #[tokio::test]
    async fn test_connection_then_state_is_verified() {
        let state = UploadSession::new(Arc::new(DirectoryPresent)).into_state();
        let response = inbox_test_connection(&state, creds()).await.unwrap();
        assert!(response.verified);
        assert_eq!(
            inbox_connection_state(&state, creds()).await.unwrap(),
            ConnectionState::Verified
        );
    }
}
