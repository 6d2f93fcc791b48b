// ── Remote connection ─────────────────────────────────────────────────────────
//
// `Connector` opens an authenticated SFTP channel; `RemoteConnection` is the
// handful of filesystem requests an upload needs on that channel.  Both are
// traits so the session logic can run against an in-memory endpoint in tests.

use crate::sftp::error::{InboxError, InboxResult, RemoteFsError};
use crate::sftp::types::*;
use secrecy::ExposeSecret;
use ssh2::{CheckResult, KnownHostFileKind, Session, Sftp};
use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// An open, authenticated SFTP channel.
#[cfg_attr(test, mockall::automock)]
pub trait RemoteConnection: Send {
    /// Kind of object at `path`; `NotFound` when nothing is there.
    fn stat(&mut self, path: &str) -> Result<RemoteEntryKind, RemoteFsError>;

    fn mkdir(&mut self, path: &str, mode: i32) -> Result<(), RemoteFsError>;

    /// Create or truncate `path` and write all of `content`. Returns the
    /// number of bytes written.
    fn put(&mut self, path: &str, content: &[u8]) -> Result<u64, RemoteFsError>;

    /// Release the channel. Safe to call more than once.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Opens connections for a set of credentials.
pub trait Connector: Send + Sync {
    fn open(&self, creds: &TransferCredentials) -> InboxResult<Box<dyn RemoteConnection>>;
}

// ── ssh2-backed connector ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    options: ConnectOptions,
}

impl SshConnector {
    pub fn new(options: ConnectOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.options.connect_timeout_secs.max(1))
    }

    fn connect_tcp(&self, creds: &TransferCredentials) -> InboxResult<TcpStream> {
        let addr = format!("{}:{}", creds.host(), creds.port());
        let addrs: Vec<SocketAddr> = (creds.host(), creds.port())
            .to_socket_addrs()
            .map_err(|e| InboxError::transport(format!("Cannot resolve '{}': {}", addr, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(InboxError::transport(format!("'{}' resolved to no addresses", addr)));
        }

        let deadline = Instant::now() + self.timeout();
        let mut last_err = None;
        for sock in &addrs {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match TcpStream::connect_timeout(sock, remaining) {
                Ok(tcp) => return Ok(tcp),
                Err(e) => {
                    debug!("TCP connect to {} failed: {}", sock, e);
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if e.kind() != std::io::ErrorKind::TimedOut => Err(InboxError::transport(
                format!("TCP connection to {} failed: {}", addr, e),
            )),
            _ => Err(InboxError::timeout(format!(
                "No response from {} within {}s",
                addr,
                self.timeout().as_secs()
            ))),
        }
    }

    fn verify_host_key(&self, session: &Session, creds: &TransferCredentials) -> InboxResult<()> {
        let fingerprint = host_key_fingerprint(session)
            .unwrap_or_else(|| "<unavailable>".to_string());

        match self.options.host_key_policy {
            HostKeyPolicy::AcceptUnverified => {
                warn!(
                    "Accepting unverified host key for {}:{} ({})",
                    creds.host(),
                    creds.port(),
                    fingerprint
                );
                Ok(())
            }
            HostKeyPolicy::KnownHosts => {
                let file = self
                    .options
                    .known_hosts_file
                    .clone()
                    .or_else(default_known_hosts_file)
                    .ok_or_else(|| {
                        InboxError::transport("No known_hosts file configured or found")
                    })?;
                check_known_host(session, creds, &file)?;
                info!("Host key for {} matches {}", creds.host(), file.display());
                Ok(())
            }
        }
    }

    fn authenticate(&self, session: &Session, creds: &TransferCredentials) -> InboxResult<()> {
        let secret = creds.secret().expose_secret();

        let password_err = match session.userauth_password(creds.username(), secret) {
            Ok(()) if session.authenticated() => return Ok(()),
            Ok(()) => None,
            Err(e) => Some(e),
        };

        struct SecretKbdHandler<'a> {
            secret: &'a str,
        }

        impl ssh2::KeyboardInteractivePrompt for SecretKbdHandler<'_> {
            fn prompt<'b>(
                &mut self,
                _username: &str,
                _instructions: &str,
                prompts: &[ssh2::Prompt<'b>],
            ) -> Vec<String> {
                prompts.iter().map(|_| self.secret.to_string()).collect()
            }
        }

        let mut handler = SecretKbdHandler { secret };
        if session
            .userauth_keyboard_interactive(creds.username(), &mut handler)
            .is_ok()
            && session.authenticated()
        {
            debug!("Authenticated {} via keyboard-interactive", creds.username());
            return Ok(());
        }

        match password_err {
            Some(e) => Err(InboxError::from_session("Authentication failed", &e)),
            None => Err(InboxError::authentication(format!(
                "Server rejected the credentials for '{}'",
                creds.username()
            ))),
        }
    }
}

impl Connector for SshConnector {
    fn open(&self, creds: &TransferCredentials) -> InboxResult<Box<dyn RemoteConnection>> {
        let label = format!("{}@{}:{}", creds.username(), creds.host(), creds.port());
        info!("Connecting to {}", label);

        let tcp = self.connect_tcp(creds)?;

        let mut session = Session::new()
            .map_err(|e| InboxError::transport(format!("Failed to create SSH session: {}", e)))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(self.timeout().as_millis().min(u32::MAX as u128) as u32);
        session
            .handshake()
            .map_err(|e| InboxError::from_session("SSH handshake failed", &e))?;

        self.verify_host_key(&session, creds)?;
        self.authenticate(&session, creds)?;

        // The connect phase is bounded; the transfer itself is not.
        session.set_timeout(0);

        let sftp = session
            .sftp()
            .map_err(|e| InboxError::transport(format!("SFTP subsystem unavailable: {}", e)))?;

        info!("Connected to {}", label);
        Ok(Box::new(SshConnection {
            session: Some(session),
            sftp: Some(sftp),
            label,
        }))
    }
}

// ── Host-key helpers ─────────────────────────────────────────────────────────

/// `SHA256:<base64>` fingerprint of the server's host key.
pub fn host_key_fingerprint(session: &Session) -> Option<String> {
    session.host_key_hash(ssh2::HashType::Sha256).map(|bytes| {
        let encoded =
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes);
        format!("SHA256:{}", encoded)
    })
}

fn default_known_hosts_file() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".ssh").join("known_hosts"))
}

fn check_known_host(session: &Session, creds: &TransferCredentials, file: &Path) -> InboxResult<()> {
    let (key, _) = session
        .host_key()
        .ok_or_else(|| InboxError::transport("Server sent no host key"))?;

    let mut known = session
        .known_hosts()
        .map_err(|e| InboxError::transport(format!("known_hosts init failed: {}", e)))?;
    known
        .read_file(file, KnownHostFileKind::OpenSSH)
        .map_err(|e| {
            InboxError::transport(format!("Cannot read '{}': {}", file.display(), e))
        })?;

    match known.check_port(creds.host(), creds.port(), key) {
        CheckResult::Match => Ok(()),
        CheckResult::Mismatch => Err(InboxError::transport(format!(
            "Host key for {} does NOT match {}",
            creds.host(),
            file.display()
        ))),
        CheckResult::NotFound => Err(InboxError::transport(format!(
            "Host {} is not listed in {}",
            creds.host(),
            file.display()
        ))),
        CheckResult::Failure => Err(InboxError::transport(format!(
            "Host key check against {} failed",
            file.display()
        ))),
    }
}

// ── ssh2-backed connection ───────────────────────────────────────────────────

pub struct SshConnection {
    session: Option<Session>,
    sftp: Option<Sftp>,
    label: String,
}

impl SshConnection {
    fn sftp(&self) -> Result<&Sftp, RemoteFsError> {
        self.sftp
            .as_ref()
            .ok_or_else(|| RemoteFsError::connection_lost("connection already closed"))
    }
}

impl RemoteConnection for SshConnection {
    fn stat(&mut self, path: &str) -> Result<RemoteEntryKind, RemoteFsError> {
        let stat = self
            .sftp()?
            .stat(Path::new(path))
            .map_err(|e| RemoteFsError::from_ssh2(&e))?;
        Ok(if stat.is_dir() {
            RemoteEntryKind::Directory
        } else if stat.is_file() {
            RemoteEntryKind::File
        } else {
            RemoteEntryKind::Other
        })
    }

    fn mkdir(&mut self, path: &str, mode: i32) -> Result<(), RemoteFsError> {
        self.sftp()?
            .mkdir(Path::new(path), mode)
            .map_err(|e| RemoteFsError::from_ssh2(&e))
    }

    fn put(&mut self, path: &str, content: &[u8]) -> Result<u64, RemoteFsError> {
        let mut file = self
            .sftp()?
            .create(Path::new(path))
            .map_err(|e| RemoteFsError::from_ssh2(&e))?;
        file.write_all(content)?;
        file.flush()?;
        Ok(content.len() as u64)
    }

    fn close(&mut self) {
        // Channel first, then the session that owns it.
        drop(self.sftp.take());
        if let Some(session) = self.session.take() {
            let _ = session.disconnect(None, "Client disconnecting", None);
            debug!("Disconnected from {}", self.label);
        }
    }

    fn is_open(&self) -> bool {
        self.session.is_some()
    }
}

impl Drop for SshConnection {
    fn drop(&mut self) {
        self.close();
    }
}
