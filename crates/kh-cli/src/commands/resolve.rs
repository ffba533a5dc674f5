//! Resolve command implementation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{format_parsed_config, print_warning};
use kh_core::config::ConfigFile;
use kh_core::ssh_config::{ConfigResolver, ParsedConfig};

/// Resolve the SSH config named on the command line, or the configured one
pub(crate) fn resolve_ssh_config(
    settings: &ConfigFile,
    ssh_config: Option<&Path>,
) -> Result<ParsedConfig> {
    let path: PathBuf = ssh_config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| settings.resolver.ssh_config.clone());

    let parsed = ConfigResolver::new()
        .parse(&path)
        .with_context(|| format!("Failed to resolve SSH config {:?}", path))?;

    for warning in &parsed.warnings {
        print_warning(warning);
    }

    Ok(parsed)
}

/// Execute the resolve command
pub fn resolve_command(settings: &ConfigFile, ssh_config: Option<&Path>) -> Result<()> {
    let parsed = resolve_ssh_config(settings, ssh_config)?;
    print!("{}", format_parsed_config(&parsed));
    Ok(())
}
