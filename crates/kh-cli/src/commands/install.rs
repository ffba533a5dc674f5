//! Install command implementations

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

use crate::output::{print_info, print_install_result, print_success};
use kh_core::bundle::BundleStore;
use kh_core::config::ConfigFile;
use kh_core::prompt::StdinPrompt;
use kh_deploy::{InstallRequest, KeyInstaller, SharedOptions, SshConnector};

/// Options shared by `install` and `install-bundle`
#[derive(Debug, Clone)]
pub struct InstallArgs {
    pub host: String,
    pub user: String,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub force: bool,
    pub dry_run: bool,
}

impl InstallArgs {
    fn password(&self) -> Option<Zeroizing<String>> {
        self.password.clone().map(Zeroizing::new)
    }
}

fn installer(settings: &ConfigFile) -> KeyInstaller<SshConnector> {
    let connector = SshConnector::new(settings.deploy.clone(), Arc::new(StdinPrompt));
    KeyInstaller::new(connector, settings.deploy.verbose)
}

/// Execute the install command for a single public key
pub async fn install_command(
    settings: &ConfigFile,
    args: &InstallArgs,
    public_key: PathBuf,
    identity: Option<PathBuf>,
) -> Result<()> {
    let mut request = InstallRequest::new(&args.host, &args.user, public_key);
    request.port = args.port.unwrap_or(settings.deploy.default_port);
    request.private_key_path = identity;
    request.password = args.password();
    request.force = args.force;
    request.dry_run = args.dry_run;
    tracing::debug!("Install request: {:?}", request);

    let result = installer(settings)
        .install_public_key(&request)
        .await
        .with_context(|| format!("Failed to install key on {}", request.target()))?;

    print_install_result(&result);
    Ok(())
}

/// Execute the install-bundle command
pub async fn install_bundle_command(
    settings: &ConfigFile,
    bundle: &str,
    args: &InstallArgs,
) -> Result<()> {
    let store = BundleStore::new(&settings.resolver.bundle_dir);
    let options = SharedOptions {
        port: Some(args.port.unwrap_or(settings.deploy.default_port)),
        password: args.password(),
        force: args.force,
        dry_run: args.dry_run,
    };

    let results = installer(settings)
        .install_from_bundle(&store, bundle, &args.host, &args.user, &options)
        .await
        .with_context(|| format!("Failed to install bundle '{}'", bundle))?;

    for result in &results {
        print_install_result(result);
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    let summary = format!("{}/{} succeeded", succeeded, results.len());
    if succeeded < results.len() {
        anyhow::bail!("{} keys failed ({})", results.len() - succeeded, summary);
    }

    if args.dry_run {
        print_info(&summary);
    } else {
        print_success(&summary);
    }
    Ok(())
}
