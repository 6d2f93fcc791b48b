//! In-memory SFTP endpoint used by the integration tests.
//!
//! `FakeInbox` plays the server: it enforces one username/secret pair, keeps
//! directories and files in maps, and counts every request it sees.

#![allow(dead_code)]

use inbox_sftp::sftp::{
    Connector, InboxError, InboxResult, RemoteConnection, RemoteEntryKind, RemoteFsError,
    TransferCredentials,
};
use secrecy::ExposeSecret;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

pub const HOST: &str = "sftp.test.local";
pub const USER: &str = "integration";
pub const SECRET: &str = "correct horse";
pub const INBOX: &str = "inbox";

#[derive(Default)]
pub struct Endpoint {
    pub dirs: HashSet<String>,
    pub files: HashMap<String, Vec<u8>>,

    pub opens: usize,
    pub closes: usize,
    pub stats: usize,
    pub mkdirs: usize,
    pub puts: usize,

    /// Every open fails with this error after the credential check.
    pub refuse_open: Option<InboxError>,
    /// Every write fails with this error.
    pub fail_put: Option<RemoteFsError>,
    /// mkdir creates the directory but reports that it already existed,
    /// as if another client won the race.
    pub mkdir_race: bool,
}

#[derive(Clone, Default)]
pub struct FakeInbox {
    endpoint: Arc<Mutex<Endpoint>>,
}

impl FakeInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dir(self, dir: &str) -> Self {
        self.endpoint().dirs.insert(dir.to_string());
        self
    }

    pub fn endpoint(&self) -> MutexGuard<'_, Endpoint> {
        self.endpoint.lock().unwrap()
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.endpoint().files.get(path).cloned()
    }

    /// Requests that touch the remote filesystem or the network.
    pub fn network_calls(&self) -> usize {
        let ep = self.endpoint();
        ep.opens + ep.stats + ep.mkdirs + ep.puts
    }
}

impl Connector for FakeInbox {
    fn open(&self, creds: &TransferCredentials) -> InboxResult<Box<dyn RemoteConnection>> {
        let mut ep = self.endpoint();
        ep.opens += 1;
        if creds.host() != HOST {
            return Err(InboxError::transport(format!(
                "Cannot resolve '{}:{}'",
                creds.host(),
                creds.port()
            )));
        }
        if creds.username() != USER || creds.secret().expose_secret() != SECRET {
            return Err(InboxError::authentication("Authentication failed"));
        }
        if let Some(e) = &ep.refuse_open {
            return Err(e.clone());
        }
        Ok(Box::new(FakeConnection {
            endpoint: self.endpoint.clone(),
            open: true,
        }))
    }
}

pub struct FakeConnection {
    endpoint: Arc<Mutex<Endpoint>>,
    open: bool,
}

impl FakeConnection {
    fn endpoint(&self) -> Result<MutexGuard<'_, Endpoint>, RemoteFsError> {
        if !self.open {
            return Err(RemoteFsError::connection_lost("connection closed"));
        }
        Ok(self.endpoint.lock().unwrap())
    }
}

fn parent(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

impl RemoteConnection for FakeConnection {
    fn stat(&mut self, path: &str) -> Result<RemoteEntryKind, RemoteFsError> {
        let mut ep = self.endpoint()?;
        ep.stats += 1;
        if ep.dirs.contains(path) {
            Ok(RemoteEntryKind::Directory)
        } else if ep.files.contains_key(path) {
            Ok(RemoteEntryKind::File)
        } else {
            Err(RemoteFsError::not_found(format!("{}: no such file", path)))
        }
    }

    fn mkdir(&mut self, path: &str, _mode: i32) -> Result<(), RemoteFsError> {
        let mut ep = self.endpoint()?;
        ep.mkdirs += 1;
        if ep.mkdir_race {
            ep.dirs.insert(path.to_string());
            return Err(RemoteFsError::already_exists(format!("{}: exists", path)));
        }
        if ep.dirs.contains(path) || ep.files.contains_key(path) {
            return Err(RemoteFsError::already_exists(format!("{}: exists", path)));
        }
        ep.dirs.insert(path.to_string());
        Ok(())
    }

    fn put(&mut self, path: &str, content: &[u8]) -> Result<u64, RemoteFsError> {
        let mut ep = self.endpoint()?;
        ep.puts += 1;
        if let Some(e) = &ep.fail_put {
            return Err(e.clone());
        }
        let dir = parent(path);
        if !dir.is_empty() && !ep.dirs.contains(dir) {
            return Err(RemoteFsError::not_found(format!("{}: no such directory", dir)));
        }
        ep.files.insert(path.to_string(), content.to_vec());
        Ok(content.len() as u64)
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.endpoint.lock().unwrap().closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

pub fn creds() -> TransferCredentials {
    TransferCredentials::new(HOST, 22, USER, SECRET, INBOX)
}

pub fn creds_with_secret(secret: &str) -> TransferCredentials {
    TransferCredentials::new(HOST, 22, USER, secret, INBOX)
}
