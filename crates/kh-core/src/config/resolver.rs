//! SSH config and bundle store locations

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where to find the SSH client config and where key bundles live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Main SSH client config file
    pub ssh_config: PathBuf,

    /// Directory holding named key bundles
    pub bundle_dir: PathBuf,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ssh_config: dirs::home_dir()
                .unwrap_or_default()
                .join(".ssh")
                .join("config"),
            bundle_dir: super::default_config_dir().join("bundles"),
        }
    }
}
