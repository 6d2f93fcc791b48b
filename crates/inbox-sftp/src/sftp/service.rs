// ── Upload session ────────────────────────────────────────────────────────────
//
// One `UploadSession` per operator.  It owns the verification state, the
// success counter and the attempt history; nothing here is process-global.

use crate::sftp::connection::{Connector, RemoteConnection, SshConnector};
use crate::sftp::dir_ops::DirectoryEnsurer;
use crate::sftp::error::{InboxError, InboxResult};
use crate::sftp::history::record_upload;
use crate::sftp::transfer::FileTransferer;
use crate::sftp::types::*;
use chrono::Utc;
use inbox_core::{validate_target_name, XmlValidator};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

pub struct UploadSession {
    connector: Arc<dyn Connector>,
    on_conflict: ConflictPolicy,
    state: ConnectionState,
    /// Fingerprint of the credentials `state` was derived from.
    state_for: Option<String>,
    counters: SessionCounters,
    pub(crate) history: Vec<UploadRecord>,
}

impl UploadSession {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            on_conflict: ConflictPolicy::default(),
            state: ConnectionState::Unverified,
            state_for: None,
            counters: SessionCounters::default(),
            history: Vec::new(),
        }
    }

    /// Session backed by real SSH connections.
    pub fn ssh(options: ConnectOptions) -> Self {
        Self::new(Arc::new(SshConnector::new(options)))
    }

    pub fn with_conflict_policy(mut self, on_conflict: ConflictPolicy) -> Self {
        self.on_conflict = on_conflict;
        self
    }

    pub fn into_state(self) -> UploadSessionState {
        Arc::new(Mutex::new(self))
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.on_conflict
    }

    // ── State queries ────────────────────────────────────────────────────────

    /// Verification state for `creds`. Anything learned about different
    /// credentials reads back as `Unverified`.
    pub fn connection_state(&self, creds: &TransferCredentials) -> ConnectionState {
        match &self.state_for {
            Some(fp) if *fp == creds.fingerprint() => self.state.clone(),
            _ => ConnectionState::Unverified,
        }
    }

    /// Advisory gate for callers; `upload` does not consult it.
    pub fn can_upload(&self, creds: &TransferCredentials) -> bool {
        creds.is_complete() && self.connection_state(creds) == ConnectionState::Verified
    }

    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    pub fn successful_uploads(&self) -> u64 {
        self.counters.successful_uploads()
    }

    fn set_state(&mut self, creds: &TransferCredentials, state: ConnectionState) {
        self.state = state;
        self.state_for = Some(creds.fingerprint());
    }

    // ── Test connection ──────────────────────────────────────────────────────

    /// Open and immediately close a connection. Never touches the counter.
    pub fn test_connection(&mut self, creds: &TransferCredentials) -> TestConnectionResponse {
        if !creds.is_complete() {
            let err = InboxError::validation("Host, port, username and password are all required");
            return TestConnectionResponse {
                verified: false,
                message: err.user_message(),
                error_kind: Some(err.kind),
            };
        }

        match self.connector.open(creds) {
            Ok(mut conn) => {
                conn.close();
                self.set_state(creds, ConnectionState::Verified);
                info!("Connection test to {} succeeded", creds.host());
                TestConnectionResponse {
                    verified: true,
                    message: format!(
                        "Connected to {}:{} as {}",
                        creds.host(),
                        creds.port(),
                        creds.username()
                    ),
                    error_kind: None,
                }
            }
            Err(e) => {
                warn!("Connection test to {} failed: {}", creds.host(), e);
                let response = TestConnectionResponse {
                    verified: false,
                    message: e.user_message(),
                    error_kind: Some(e.kind),
                };
                self.set_state(creds, ConnectionState::Failed(e));
                response
            }
        }
    }

    // ── Upload ───────────────────────────────────────────────────────────────

    /// Validate `content` and place exactly those bytes at
    /// `<remote directory>/<target_name>` over a fresh connection.
    pub fn upload(
        &mut self,
        creds: &TransferCredentials,
        content: &[u8],
        target_name: &str,
    ) -> UploadResponse {
        let result = self.try_upload(creds, content, target_name);
        let timestamp = Utc::now();

        let (response, outcome) = match result {
            Ok(bytes_sent) => {
                self.counters.record_success();
                let message = format!(
                    "Uploaded '{}' ({} bytes) to {} on {} as {}",
                    target_name,
                    bytes_sent,
                    creds.remote_path(target_name),
                    creds.host(),
                    creds.username()
                );
                info!("{}", message);
                (
                    UploadResponse {
                        success: true,
                        message,
                        bytes_sent,
                        timestamp,
                        error_kind: None,
                    },
                    UploadOutcome::Success,
                )
            }
            Err(e) => {
                warn!("Upload of '{}' failed: {}", target_name, e);
                let outcome = UploadOutcome::from(&e);
                (
                    UploadResponse {
                        success: false,
                        message: e.user_message(),
                        bytes_sent: 0,
                        timestamp,
                        error_kind: Some(e.kind),
                    },
                    outcome,
                )
            }
        };

        record_upload(
            &mut self.history,
            UploadRecord {
                id: Uuid::new_v4().to_string(),
                filename: target_name.to_string(),
                size_bytes: content.len() as u64,
                timestamp,
                destination: creds.destination(target_name),
                outcome,
            },
        );
        response
    }

    fn try_upload(
        &mut self,
        creds: &TransferCredentials,
        content: &[u8],
        target_name: &str,
    ) -> InboxResult<u64> {
        let validation = XmlValidator::validate(content);
        if !validation.ok {
            return Err(InboxError::validation(validation.detail));
        }
        validate_target_name(target_name).map_err(|e| InboxError::validation(e.to_string()))?;
        if !creds.is_complete() {
            return Err(InboxError::validation(
                "Host, port, username and password are all required",
            ));
        }

        let mut conn = match self.connector.open(creds) {
            Ok(conn) => conn,
            Err(e) => {
                self.set_state(creds, ConnectionState::Failed(e.clone()));
                return Err(e);
            }
        };
        self.set_state(creds, ConnectionState::Verified);

        let result = self.place(conn.as_mut(), creds, content, target_name);
        conn.close();
        result
    }

    fn place(
        &self,
        conn: &mut dyn RemoteConnection,
        creds: &TransferCredentials,
        content: &[u8],
        target_name: &str,
    ) -> InboxResult<u64> {
        DirectoryEnsurer::ensure(conn, creds.remote_directory())?;
        FileTransferer::put(conn, content, &creds.remote_path(target_name), self.on_conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::connection::MockRemoteConnection;
    use crate::sftp::error::InboxErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out a happy-path mock, or fails every open with `fail_with`.
    struct StubConnector {
        opens: AtomicUsize,
        fail_with: Option<InboxError>,
    }

    impl StubConnector {
        fn ok() -> Arc<Self> {
            Arc::new(Self { opens: AtomicUsize::new(0), fail_with: None })
        }

        fn failing(e: InboxError) -> Arc<Self> {
            Arc::new(Self { opens: AtomicUsize::new(0), fail_with: Some(e) })
        }
    }

    impl Connector for StubConnector {
        fn open(&self, _creds: &TransferCredentials) -> InboxResult<Box<dyn RemoteConnection>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = &self.fail_with {
                return Err(e.clone());
            }
            let mut conn = MockRemoteConnection::new();
            conn.expect_stat().returning(|_| Ok(RemoteEntryKind::Directory));
            conn.expect_put().returning(|_, c| Ok(c.len() as u64));
            conn.expect_close().return_const(());
            Ok(Box::new(conn))
        }
    }

    fn creds(secret: &str) -> TransferCredentials {
        TransferCredentials::new("sftp.example.net", 22, "ops", secret, "inbox")
    }

    #[test]
    fn state_is_unverified_until_tested() {
        let session = UploadSession::new(StubConnector::ok());
        assert_eq!(session.connection_state(&creds("pw")), ConnectionState::Unverified);
        assert!(!session.can_upload(&creds("pw")));
    }

    #[test]
    fn verified_state_is_tied_to_credentials() {
        let mut session = UploadSession::new(StubConnector::ok());
        let response = session.test_connection(&creds("pw"));
        assert!(response.verified);
        assert!(response.message.contains("sftp.example.net"));
        assert_eq!(session.connection_state(&creds("pw")), ConnectionState::Verified);
        assert!(session.can_upload(&creds("pw")));

        // A changed secret must be verified again.
        assert_eq!(session.connection_state(&creds("other")), ConnectionState::Unverified);
        assert_eq!(session.successful_uploads(), 0);
    }

    #[test]
    fn failed_test_records_cause() {
        let mut session =
            UploadSession::new(StubConnector::failing(InboxError::timeout("no answer")));
        let response = session.test_connection(&creds("pw"));
        assert!(!response.verified);
        assert_eq!(response.error_kind, Some(InboxErrorKind::Timeout));
        assert!(matches!(
            session.connection_state(&creds("pw")),
            ConnectionState::Failed(ref e) if e.kind == InboxErrorKind::Timeout
        ));
    }

    #[test]
    fn incomplete_credentials_never_connect() {
        let connector = StubConnector::ok();
        let mut session = UploadSession::new(connector.clone());
        let response = session.test_connection(&creds(""));
        assert!(!response.verified);
        assert_eq!(response.error_kind, Some(InboxErrorKind::Validation));

        let response = session.upload(&creds(""), b"<a/>", "a.xml");
        assert_eq!(response.error_kind, Some(InboxErrorKind::Validation));
        assert_eq!(connector.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn traversing_target_name_is_rejected_before_connecting() {
        let connector = StubConnector::ok();
        let mut session = UploadSession::new(connector.clone());
        let response = session.upload(&creds("pw"), b"<a/>", "../a.xml");
        assert!(!response.success);
        assert_eq!(response.error_kind, Some(InboxErrorKind::Validation));
        assert_eq!(connector.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn upload_records_history_and_counts() {
        let mut session = UploadSession::new(StubConnector::ok());
        let response = session.upload(&creds("pw"), b"<a/>", "a.xml");
        assert!(response.success, "{}", response.message);
        assert_eq!(response.bytes_sent, 4);
        assert!(response.message.contains("inbox/a.xml"));
        assert_eq!(session.successful_uploads(), 1);

        let history = session.history(None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].destination, "sftp.example.net:inbox/a.xml");
        assert!(history[0].is_success());
    }
}
