//! SFTP-backed remote filesystem

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::Handle;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, Status, StatusCode};
use tokio::io::AsyncWriteExt;

use kh_core::error::RemoteIoError;

use crate::remote::RemoteFs;
use crate::session::ClientHandler;

/// Remote file access over an SFTP subsystem channel
pub struct SftpFs {
    sftp: SftpSession,
    operation_timeout: Option<Duration>,
}

fn is_not_found(err: &SftpError) -> bool {
    matches!(
        err,
        SftpError::Status(Status {
            status_code: StatusCode::NoSuchFile,
            ..
        })
    )
}

impl SftpFs {
    /// Open an SFTP channel on an authenticated connection
    pub async fn open(
        handle: &Handle<ClientHandler>,
        operation_timeout: Option<Duration>,
    ) -> Result<Self, RemoteIoError> {
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| RemoteIoError::new("open channel for", "sftp", e))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| RemoteIoError::new("request subsystem", "sftp", e))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| RemoteIoError::new("start", "sftp", e))?;

        Ok(Self {
            sftp,
            operation_timeout,
        })
    }

    /// Apply the operation timeout, if any
    async fn bounded<T, F>(&self, op: &'static str, path: &str, fut: F) -> Result<T, RemoteIoError>
    where
        F: Future<Output = Result<T, RemoteIoError>> + Send,
    {
        match self.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                RemoteIoError::new(op, path, format!("timed out after {:?}", limit))
            })?,
            None => fut.await,
        }
    }
}

#[async_trait]
impl RemoteFs for SftpFs {
    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteIoError> {
        self.bounded("read", path, async {
            match self.sftp.read(path).await {
                Ok(data) => Ok(Some(data)),
                Err(e) if is_not_found(&e) => Ok(None),
                Err(e) => Err(RemoteIoError::new("read", path, e)),
            }
        })
        .await
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), RemoteIoError> {
        self.bounded("write", path, async {
            let mut file = self
                .sftp
                .create(path)
                .await
                .map_err(|e| RemoteIoError::new("create", path, e))?;
            file.write_all(data)
                .await
                .map_err(|e| RemoteIoError::new("write", path, e))?;
            file.shutdown()
                .await
                .map_err(|e| RemoteIoError::new("close", path, e))?;
            Ok(())
        })
        .await
    }

    async fn create_dir_all(&self, path: &str) -> Result<(), RemoteIoError> {
        self.bounded("create directory", path, async {
            let mut current = String::new();
            for component in path.split('/').filter(|c| !c.is_empty()) {
                if !current.is_empty() || path.starts_with('/') {
                    current.push('/');
                }
                current.push_str(component);

                match self.sftp.metadata(current.as_str()).await {
                    Ok(attrs) if attrs.is_dir() => {}
                    Ok(_) => {
                        return Err(RemoteIoError::new(
                            "create directory",
                            current.as_str(),
                            "exists and is not a directory",
                        ))
                    }
                    Err(e) if is_not_found(&e) => {
                        tracing::debug!("Creating remote directory {}", current);
                        self.sftp
                            .create_dir(current.as_str())
                            .await
                            .map_err(|e| RemoteIoError::new("create directory", current.as_str(), e))?;
                    }
                    Err(e) => {
                        return Err(RemoteIoError::new("stat", current.as_str(), e));
                    }
                }
            }
            Ok(())
        })
        .await
    }

    async fn set_mode(&self, path: &str, mode: u32) -> Result<(), RemoteIoError> {
        self.bounded("chmod", path, async {
            let mut attrs = FileAttributes::empty();
            attrs.permissions = Some(mode);
            self.sftp
                .set_metadata(path, attrs)
                .await
                .map_err(|e| RemoteIoError::new("chmod", path, e))
        })
        .await
    }
}
