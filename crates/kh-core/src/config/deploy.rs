//! Deployment configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_secs, option_duration_secs};

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Configuration for connecting to hosts and installing keys
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Port used when a request does not name one
    pub default_port: u16,

    /// Upper bound on dialing and the SSH handshake
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Upper bound on each remote file operation.
    ///
    /// `None` leaves remote operations unbounded once connected.
    #[serde(
        with = "option_duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_timeout: Option<Duration>,

    /// Log each deployment step at info level instead of debug
    pub verbose: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_SSH_PORT,
            connect_timeout: Duration::from_secs(30),
            operation_timeout: None,
            verbose: false,
        }
    }
}
