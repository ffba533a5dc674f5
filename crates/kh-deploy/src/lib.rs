//! kh-deploy: Public key deployment for keyhop
//!
//! Connects to a host over SSH, negotiates authentication, and merges a
//! public key into the remote `~/.ssh/authorized_keys` over SFTP. Single
//! keys and whole key bundles are supported.

/// Log a deployment step at info when verbose, debug otherwise
macro_rules! step {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

pub mod deployer;
pub mod installer;
pub mod memory;
pub mod remote;
pub mod session;
pub mod sftp;
pub mod types;

pub use deployer::{merge_authorized_keys, KeyDeployer, AUTHORIZED_KEYS_PATH, SSH_DIR};
pub use installer::KeyInstaller;
pub use remote::{Connector, RemoteFs, RemoteSession};
pub use session::SshConnector;
pub use types::{InstallRequest, InstallResult, SharedOptions};
