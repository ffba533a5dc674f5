//! Config command implementations

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use kh_core::config::{self, ConfigFile};

fn settings_path(config_path: Option<&PathBuf>) -> PathBuf {
    config_path.cloned().unwrap_or_else(config::default_config_path)
}

/// Print the settings file location
pub fn config_path(config_path: Option<&PathBuf>) -> Result<()> {
    println!("{}", settings_path(config_path).display());
    Ok(())
}

/// Show current configuration
///
/// Prints the file as written, or the effective defaults when there is none.
pub fn config_show(config_path: Option<&PathBuf>, effective: &ConfigFile) -> Result<()> {
    let path = settings_path(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Run 'keyhop config init' to create one. Effective defaults:");
        println!();
        println!("{}", toml::to_string_pretty(effective)?);
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    println!("{}", content);

    Ok(())
}

/// Initialize default configuration
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let config_file = settings_path(config_path);

    if config_file.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", config_file));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    if let Some(config_dir) = config_file.parent() {
        if !config_dir.as_os_str().is_empty() && !config_dir.exists() {
            std::fs::create_dir_all(config_dir).with_context(|| {
                format!("Failed to create config directory: {:?}", config_dir)
            })?;
            print_success(&format!("Created config directory: {:?}", config_dir));
        }
    }

    std::fs::write(&config_file, generate_default_config(&ConfigFile::default()))
        .with_context(|| format!("Failed to write config file: {:?}", config_file))?;

    print_success(&format!("Created configuration file: {:?}", config_file));
    Ok(())
}

/// Generate default configuration content
fn generate_default_config(defaults: &ConfigFile) -> String {
    format!(
        r#"# keyhop configuration

[resolver]
# SSH client config to resolve Include and IdentityFile directives from
ssh_config = "{ssh_config}"

# Directory holding captured key bundles
bundle_dir = "{bundle_dir}"

[deploy]
# Port used when none is given on the command line
default_port = {port}

# Dial and handshake timeout in seconds
connect_timeout = {connect_timeout}

# Per remote file operation timeout in seconds (unbounded when unset)
# operation_timeout = 60

# Log each deployment step at info level
verbose = false
"#,
        ssh_config = toml_escape(&defaults.resolver.ssh_config.display().to_string()),
        bundle_dir = toml_escape(&defaults.resolver.bundle_dir.display().to_string()),
        port = defaults.deploy.default_port,
        connect_timeout = defaults.deploy.connect_timeout.as_secs(),
    )
}

fn toml_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
