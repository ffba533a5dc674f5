//! In-memory remote host
//!
//! Stands in for a real SSH server in tests and dry tooling. Directories
//! must exist before files are written into them, like on a real host.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use kh_core::error::{ConnectionError, RemoteIoError};

use crate::remote::{Connector, RemoteFs, RemoteSession};
use crate::types::InstallRequest;

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    modes: BTreeMap<String, u32>,
    read_only: bool,
}

/// Parent directories of `path`, shortest first
fn parents(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut end = 0;
    while let Some(offset) = path[end..].find('/') {
        end += offset;
        if end > 0 {
            out.push(path[..end].to_string());
        }
        end += 1;
    }
    out
}

/// A remote filesystem held in memory
#[derive(Debug, Default)]
pub struct MemoryFs {
    state: Mutex<MemoryState>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a text file, creating its parent directories
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.with_bytes(path, content.as_bytes())
    }

    /// Seed a file with raw content, creating its parent directories
    pub fn with_bytes(self, path: &str, content: &[u8]) -> Self {
        {
            let mut state = self.lock();
            state.dirs.extend(parents(path));
            state.files.insert(path.to_string(), content.to_vec());
        }
        self
    }

    /// Make every mutating operation fail
    pub fn set_read_only(&self, read_only: bool) {
        self.lock().read_only = read_only;
    }

    /// Current content of a file as text
    pub fn file(&self, path: &str) -> Option<String> {
        self.lock()
            .files
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Current content of a file, byte for byte
    pub fn bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    /// Permission bits last set on `path`
    pub fn mode(&self, path: &str) -> Option<u32> {
        self.lock().modes.get(path).copied()
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.lock().dirs.contains(path)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test thread must not hide the state from assertions
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RemoteFs for MemoryFs {
    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteIoError> {
        let state = self.lock();
        if state.dirs.contains(path) {
            return Err(RemoteIoError::new("read", path, "is a directory"));
        }
        Ok(state.files.get(path).cloned())
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), RemoteIoError> {
        let mut state = self.lock();
        if state.read_only {
            return Err(RemoteIoError::new("write", path, "permission denied"));
        }
        if let Some(parent) = parents(path).pop() {
            if !state.dirs.contains(&parent) {
                return Err(RemoteIoError::new("write", path, "no such file"));
            }
        }
        state.files.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn create_dir_all(&self, path: &str) -> Result<(), RemoteIoError> {
        let mut state = self.lock();
        if state.read_only {
            return Err(RemoteIoError::new("create directory", path, "permission denied"));
        }
        let path = path.trim_end_matches('/');
        let mut dirs = parents(path);
        dirs.push(path.to_string());
        if let Some(file) = dirs.iter().find(|dir| state.files.contains_key(*dir)) {
            return Err(RemoteIoError::new(
                "create directory",
                file.as_str(),
                "not a directory",
            ));
        }
        state.dirs.extend(dirs);
        Ok(())
    }

    async fn set_mode(&self, path: &str, mode: u32) -> Result<(), RemoteIoError> {
        let mut state = self.lock();
        if state.read_only {
            return Err(RemoteIoError::new("chmod", path, "permission denied"));
        }
        if !state.dirs.contains(path) && !state.files.contains_key(path) {
            return Err(RemoteIoError::new("chmod", path, "no such file"));
        }
        state.modes.insert(path.to_string(), mode);
        Ok(())
    }
}

/// One recorded connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRecord {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub private_key_path: Option<PathBuf>,
}

/// Connector that hands out sessions on a shared [`MemoryFs`]
#[derive(Debug, Default)]
pub struct MemoryConnector {
    fs: Arc<MemoryFs>,
    attempts: AtomicUsize,
    failing: Mutex<HashSet<usize>>,
    records: Mutex<Vec<ConnectRecord>>,
}

impl MemoryConnector {
    pub fn new(fs: MemoryFs) -> Self {
        Self {
            fs: Arc::new(fs),
            ..Self::default()
        }
    }

    /// The filesystem every session sees
    pub fn fs(&self) -> &MemoryFs {
        &self.fs
    }

    /// Refuse the `attempt`-th connection (1-based)
    pub fn fail_attempt(&self, attempt: usize) {
        self.failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(attempt);
    }

    /// Number of connections attempted so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Every connection attempt, in order
    pub fn records(&self) -> Vec<ConnectRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        request: &InstallRequest,
    ) -> Result<Box<dyn RemoteSession>, ConnectionError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(ConnectRecord {
                user: request.user.clone(),
                host: request.host.clone(),
                port: request.port,
                private_key_path: request.private_key_path.clone(),
            });

        let refused = self
            .failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&attempt);
        if refused {
            return Err(ConnectionError::Dial {
                target: request.target(),
                message: "connection refused".to_string(),
            });
        }

        Ok(Box::new(MemorySession {
            fs: Arc::clone(&self.fs),
        }))
    }
}

struct MemorySession {
    fs: Arc<MemoryFs>,
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn fs<'a>(&'a mut self) -> Result<&'a dyn RemoteFs, RemoteIoError> {
        Ok(self.fs.as_ref())
    }

    async fn close(self: Box<Self>) -> Result<(), ConnectionError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parents() {
        assert_eq!(parents(".ssh/authorized_keys"), vec![".ssh"]);
        assert_eq!(parents("/home/me/.ssh"), vec!["/home", "/home/me"]);
        assert!(parents("file").is_empty());
    }

    #[tokio::test]
    async fn test_write_requires_parent_directory() {
        let fs = MemoryFs::new();
        assert!(fs.write_file(".ssh/authorized_keys", b"x").await.is_err());

        fs.create_dir_all(".ssh").await.unwrap();
        fs.write_file(".ssh/authorized_keys", b"x").await.unwrap();
        assert_eq!(fs.file(".ssh/authorized_keys").as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_chmod_missing_path_fails() {
        let fs = MemoryFs::new();
        let err = fs.set_mode(".ssh", 0o700).await.unwrap_err();
        assert_eq!(err.op, "chmod");
    }

    #[tokio::test]
    async fn test_connector_counts_and_fails_attempts() {
        let connector = MemoryConnector::new(MemoryFs::new());
        connector.fail_attempt(2);
        let request = InstallRequest::new("h", "me", "/k.pub");

        assert!(connector.connect(&request).await.is_ok());
        assert!(matches!(
            connector.connect(&request).await,
            Err(ConnectionError::Dial { .. })
        ));
        assert!(connector.connect(&request).await.is_ok());
        assert_eq!(connector.attempts(), 3);
        assert_eq!(connector.records()[0].host, "h");
    }
}
