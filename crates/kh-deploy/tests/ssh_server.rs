//! SSH connector integration tests
//!
//! Runs an in-process russh server with an SFTP subsystem backed by a
//! temporary directory, then drives the real connector and SFTP filesystem
//! against it.

#![cfg(unix)]

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{Seek, SeekFrom, Write};
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use russh::server::{Auth, Msg, Response, Session};
use russh::{Channel, ChannelId};
use russh_keys::key::{KeyPair, PublicKey};
use russh_sftp::protocol::{
    Attrs, Data, FileAttributes, Handle, OpenFlags, Status, StatusCode, Version,
};
use tempfile::TempDir;
use tokio::net::TcpListener;
use zeroize::Zeroizing;

use kh_core::config::DeployConfig;
use kh_core::keys::PublicKeyLine;
use kh_core::prompt::ScriptedPrompt;
use kh_deploy::{
    Connector, InstallRequest, KeyDeployer, KeyInstaller, RemoteFs, RemoteSession, SshConnector,
    AUTHORIZED_KEYS_PATH, SSH_DIR,
};

const PASSWORD: &str = "s3cret";
const PUBLIC_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAITEST deploy@test";

/// Which methods the test server lets through
#[derive(Clone, Copy, PartialEq)]
enum AuthMode {
    /// Public keys are rejected, the right password is accepted
    Password,
    /// Only keyboard-interactive with a "Password:" challenge succeeds
    KeyboardInteractive,
}

type AttemptLog = Arc<Mutex<Vec<&'static str>>>;

struct TestServer {
    mode: AuthMode,
    root: PathBuf,
    attempts: AttemptLog,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl TestServer {
    fn record(&self, method: &'static str) {
        self.attempts.lock().unwrap().push(method);
    }
}

fn reject() -> Auth {
    Auth::Reject {
        proceed_with_methods: None,
    }
}

#[async_trait]
impl russh::server::Handler for TestServer {
    type Error = anyhow::Error;

    async fn auth_publickey(
        &mut self,
        _user: &str,
        _public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        self.record("publickey");
        Ok(reject())
    }

    async fn auth_password(&mut self, _user: &str, password: &str) -> Result<Auth, Self::Error> {
        self.record("password");
        if self.mode == AuthMode::Password && password == PASSWORD {
            Ok(Auth::Accept)
        } else {
            Ok(reject())
        }
    }

    async fn auth_keyboard_interactive(
        &mut self,
        _user: &str,
        _submethods: &str,
        response: Option<Response<'async_trait>>,
    ) -> Result<Auth, Self::Error> {
        if self.mode != AuthMode::KeyboardInteractive {
            self.record("keyboard-interactive");
            return Ok(reject());
        }

        match response {
            None => {
                self.record("keyboard-interactive");
                Ok(Auth::Partial {
                    name: Cow::Borrowed(""),
                    instructions: Cow::Borrowed(""),
                    prompts: Cow::Owned(vec![(Cow::Borrowed("Password: "), false)]),
                })
            }
            Some(response) => {
                let answers: Vec<Vec<u8>> = response.map(<[u8]>::to_vec).collect();
                if answers == vec![PASSWORD.as_bytes().to_vec()] {
                    Ok(Auth::Accept)
                } else {
                    Ok(reject())
                }
            }
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        match self.channels.remove(&channel_id) {
            Some(channel) if name == "sftp" => {
                session.channel_success(channel_id);
                let sftp = SftpServer::new(self.root.clone());
                tokio::spawn(russh_sftp::server::run(channel.into_stream(), sftp));
            }
            _ => session.channel_failure(channel_id),
        }
        Ok(())
    }
}

/// SFTP server rooted at a local directory; relative paths resolve
/// against the root
struct SftpServer {
    root: PathBuf,
    handles: HashMap<String, PathBuf>,
    next_handle: u64,
}

impl SftpServer {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            handles: HashMap::new(),
            next_handle: 0,
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn handle_path(&self, handle: &str) -> Result<PathBuf, StatusCode> {
        self.handles.get(handle).cloned().ok_or(StatusCode::Failure)
    }
}

fn ok(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

fn io_status(err: std::io::Error) -> StatusCode {
    match err.kind() {
        std::io::ErrorKind::NotFound => StatusCode::NoSuchFile,
        std::io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
        _ => StatusCode::Failure,
    }
}

fn attrs_of(id: u32, path: &Path) -> Result<Attrs, StatusCode> {
    let metadata = std::fs::metadata(path).map_err(io_status)?;
    Ok(Attrs {
        id,
        attrs: FileAttributes::from(&metadata),
    })
}

impl russh_sftp::server::Handler for SftpServer {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        _version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        Ok(Version::new())
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let path = self.resolve(&filename);
        if pflags.contains(OpenFlags::CREATE) {
            std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(pflags.contains(OpenFlags::TRUNCATE))
                .open(&path)
                .map_err(io_status)?;
        } else if !path.is_file() {
            return Err(StatusCode::NoSuchFile);
        }

        self.next_handle += 1;
        let handle = self.next_handle.to_string();
        self.handles.insert(handle.clone(), path);
        Ok(Handle { id, handle })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        self.handles.remove(&handle);
        Ok(ok(id))
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let content = std::fs::read(self.handle_path(&handle)?).map_err(io_status)?;
        let start = offset as usize;
        if start >= content.len() {
            return Err(StatusCode::Eof);
        }
        let end = content.len().min(start + len as usize);
        Ok(Data {
            id,
            data: content[start..end].to_vec(),
        })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .open(self.handle_path(&handle)?)
            .map_err(io_status)?;
        file.seek(SeekFrom::Start(offset)).map_err(io_status)?;
        file.write_all(&data).map_err(io_status)?;
        Ok(ok(id))
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        attrs_of(id, &self.resolve(&path))
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        attrs_of(id, &self.resolve(&path))
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        attrs_of(id, &self.handle_path(&handle)?)
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        if let Some(mode) = attrs.permissions {
            std::fs::set_permissions(
                self.resolve(&path),
                std::fs::Permissions::from_mode(mode & 0o7777),
            )
            .map_err(io_status)?;
        }
        Ok(ok(id))
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        std::fs::create_dir(self.resolve(&path)).map_err(io_status)?;
        Ok(ok(id))
    }
}

/// A running test server and the state it shares with the test
struct Harness {
    addr: SocketAddr,
    attempts: AttemptLog,
    remote_home: TempDir,
    local: TempDir,
}

impl Harness {
    async fn start(mode: AuthMode) -> Self {
        let remote_home = TempDir::new().unwrap();
        let attempts: AttemptLog = Arc::new(Mutex::new(Vec::new()));

        let mut config = russh::server::Config::default();
        config.keys.push(KeyPair::generate_ed25519().unwrap());
        config.auth_rejection_time = Duration::from_millis(10);
        config.auth_rejection_time_initial = Some(Duration::from_secs(0));
        let config = Arc::new(config);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let root = remote_home.path().to_path_buf();
        let log = attempts.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handler = TestServer {
                    mode,
                    root: root.clone(),
                    attempts: log.clone(),
                    channels: HashMap::new(),
                };
                let config = config.clone();
                tokio::spawn(async move {
                    if let Ok(session) = russh::server::run_stream(config, socket, handler).await
                    {
                        let _ = session.await;
                    }
                });
            }
        });

        Self {
            addr,
            attempts,
            remote_home,
            local: TempDir::new().unwrap(),
        }
    }

    /// Request for the server with a local public key file and a password
    fn request(&self) -> InstallRequest {
        let public_key = self.local.path().join("id_test.pub");
        std::fs::write(&public_key, format!("{}\n", PUBLIC_KEY)).unwrap();

        let mut request = InstallRequest::new("127.0.0.1", "deploy", public_key);
        request.port = self.addr.port();
        request.password = Some(Zeroizing::new(PASSWORD.to_string()));
        request
    }

    /// Write a fresh unencrypted private key the server will not accept
    fn identity(&self) -> PathBuf {
        let path = self.local.path().join("id_test");
        let key = KeyPair::generate_ed25519().unwrap();
        let file = std::fs::File::create(&path).unwrap();
        russh_keys::encode_pkcs8_pem(&key, file).unwrap();
        path
    }

    fn attempts(&self) -> Vec<&'static str> {
        self.attempts.lock().unwrap().clone()
    }

    fn remote(&self, relative: &str) -> PathBuf {
        self.remote_home.path().join(relative)
    }

    fn remote_mode(&self, relative: &str) -> u32 {
        std::fs::metadata(self.remote(relative))
            .unwrap()
            .permissions()
            .mode()
            & 0o777
    }
}

fn connector() -> SshConnector {
    SshConnector::new(
        DeployConfig::default(),
        Arc::new(ScriptedPrompt::new(Vec::<String>::new())),
    )
}

#[tokio::test]
async fn test_publickey_rejected_then_password_accepted() {
    let harness = Harness::start(AuthMode::Password).await;
    let mut request = harness.request();
    request.private_key_path = Some(harness.identity());

    let session = connector().connect(&request).await.unwrap();
    assert_eq!(harness.attempts(), vec!["publickey", "password"]);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_keyboard_interactive_answers_password_challenge() {
    let harness = Harness::start(AuthMode::KeyboardInteractive).await;
    let request = harness.request();

    let session = connector().connect(&request).await.unwrap();
    assert_eq!(harness.attempts(), vec!["password", "keyboard-interactive"]);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_wrong_password_fails_authentication() {
    let harness = Harness::start(AuthMode::Password).await;
    let mut request = harness.request();
    request.password = Some(Zeroizing::new("wrong".to_string()));

    let err = connector().connect(&request).await.err().unwrap();
    assert!(err.to_string().contains("authentication failed"));
    assert_eq!(harness.attempts(), vec!["password", "keyboard-interactive"]);
}

#[tokio::test]
async fn test_deployer_over_sftp() {
    let harness = Harness::start(AuthMode::Password).await;
    std::fs::create_dir(harness.remote(SSH_DIR)).unwrap();
    std::fs::write(
        harness.remote(AUTHORIZED_KEYS_PATH),
        b"ssh-rsa BBBB caf\xe9@host\n",
    )
    .unwrap();

    let mut session = connector().connect(&harness.request()).await.unwrap();
    let fs = session.fs().await.unwrap();
    let deployer = KeyDeployer::new(false);
    let key = PublicKeyLine::parse(PUBLIC_KEY).unwrap();

    assert!(fs.read_file("missing").await.unwrap().is_none());
    assert!(!deployer.exists(fs, &key).await.unwrap());
    assert_eq!(deployer.install(fs, &key).await.unwrap(), 2);
    assert!(deployer.exists(fs, &key).await.unwrap());

    fs.create_dir_all("nested/deeper").await.unwrap();
    assert!(harness.remote("nested/deeper").is_dir());

    session.close().await.unwrap();

    let mut expected = b"ssh-rsa BBBB caf\xe9@host\n".to_vec();
    expected.extend_from_slice(format!("{}\n", PUBLIC_KEY).as_bytes());
    assert_eq!(
        std::fs::read(harness.remote(AUTHORIZED_KEYS_PATH)).unwrap(),
        expected
    );
    assert_eq!(harness.remote_mode(SSH_DIR), 0o700);
    assert_eq!(harness.remote_mode(AUTHORIZED_KEYS_PATH), 0o600);
}

#[tokio::test]
async fn test_installer_end_to_end() {
    let harness = Harness::start(AuthMode::Password).await;
    let request = harness.request();
    let installer = KeyInstaller::new(connector(), false);

    let first = installer.install_public_key(&request).await.unwrap();
    assert!(first.success);
    assert!(first.key_added);
    assert_eq!(harness.remote_mode(SSH_DIR), 0o700);

    let second = installer.install_public_key(&request).await.unwrap();
    assert!(second.success);
    assert!(second.key_exists);
    assert!(!second.key_added);

    assert_eq!(
        std::fs::read_to_string(harness.remote(AUTHORIZED_KEYS_PATH)).unwrap(),
        format!("{}\n", PUBLIC_KEY)
    );
}
