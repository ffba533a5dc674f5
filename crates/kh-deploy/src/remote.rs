//! Remote session abstractions
//!
//! The installer talks to hosts only through these traits, so the SSH
//! transport and the in-memory test double are interchangeable.

use async_trait::async_trait;

use kh_core::error::{ConnectionError, RemoteIoError};

use crate::types::InstallRequest;

/// File operations on the remote host, paths relative to the login home
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Read a whole file; `Ok(None)` when it does not exist
    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteIoError>;

    /// Create or truncate a file and write `data` to it
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), RemoteIoError>;

    /// Create a directory and any missing parents
    async fn create_dir_all(&self, path: &str) -> Result<(), RemoteIoError>;

    /// Set permission bits
    async fn set_mode(&self, path: &str, mode: u32) -> Result<(), RemoteIoError>;
}

/// An authenticated connection to a host
#[async_trait]
pub trait RemoteSession: Send {
    /// File access over this connection, opened on first use
    async fn fs<'a>(&'a mut self) -> Result<&'a dyn RemoteFs, RemoteIoError>;

    /// Disconnect
    async fn close(self: Box<Self>) -> Result<(), ConnectionError>;
}

/// Opens authenticated sessions
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dial and authenticate for `request`
    async fn connect(
        &self,
        request: &InstallRequest,
    ) -> Result<Box<dyn RemoteSession>, ConnectionError>;
}
