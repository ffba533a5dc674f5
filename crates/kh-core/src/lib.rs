//! kh-core: Local building blocks for keyhop
//!
//! This crate resolves SSH client configuration, models public key lines,
//! reads secrets from the user, manages named key bundles and loads
//! settings. Nothing here touches the network.

pub mod bundle;
pub mod config;
pub mod error;
pub mod keys;
pub mod prompt;
pub mod ssh_config;

pub use bundle::{BundleStore, BundledKey, KeyBundle};
pub use error::DeployError;
pub use keys::PublicKeyLine;
pub use prompt::{SecretPrompt, StdinPrompt};
pub use ssh_config::{ConfigResolver, ParsedConfig};
