//! Capture command implementation

use std::path::Path;

use anyhow::{Context, Result};

use super::resolve::resolve_ssh_config;
use crate::output::{print_info, print_success};
use kh_core::bundle::{BundleStore, CaptureOptions};
use kh_core::config::ConfigFile;

/// Execute the capture command
pub fn capture_command(
    settings: &ConfigFile,
    name: &str,
    ssh_config: Option<&Path>,
    options: &CaptureOptions,
) -> Result<()> {
    let parsed = resolve_ssh_config(settings, ssh_config)?;

    let store = BundleStore::new(&settings.resolver.bundle_dir);
    let report = store
        .capture(name, &parsed, options)
        .with_context(|| format!("Failed to capture bundle '{}'", name))?;

    print_success(&format!("Captured bundle '{}' at {:?}", name, report.bundle_dir));
    print_info(&format!(
        "{} include files, {} private keys, {} public keys",
        report.include_files, report.private_keys, report.public_keys
    ));
    Ok(())
}
