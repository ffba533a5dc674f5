//! CLI command implementations

mod capture;
mod config;
mod install;
mod list;
mod resolve;

pub use capture::capture_command;
pub use config::{config_init, config_path, config_show};
pub use install::{install_bundle_command, install_command, InstallArgs};
pub use list::list_command;
pub use resolve::resolve_command;
