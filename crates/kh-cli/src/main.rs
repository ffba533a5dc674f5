//! keyhop CLI
//!
//! Single binary for SSH key operations:
//! - Resolve an SSH client config and its Include/IdentityFile directives
//! - Capture the resolved config and keys into a named bundle
//! - List the bundles in the store
//! - Install public keys into a remote authorized_keys, singly or per bundle

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyhop::commands::{self, InstallArgs};
use keyhop::output::print_error;
use kh_core::bundle::CaptureOptions;
use kh_core::config::{self, ConfigFile};

#[derive(Parser)]
#[command(name = "keyhop")]
#[command(author, version, about = "Resolve SSH configs and deploy public keys to remote hosts")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the keyhop settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bundle store directory (overrides settings)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Connection options shared by the install commands
#[derive(clap::Args)]
struct TargetArgs {
    /// Remote host name or address
    #[arg(long)]
    host: String,
    /// Remote login user
    #[arg(short, long)]
    user: String,
    /// Remote SSH port (defaults to settings)
    #[arg(short, long)]
    port: Option<u16>,
    /// Password for password and keyboard-interactive auth (prompted if unset)
    #[arg(long, env = "KEYHOP_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Rewrite authorized_keys even if the key is already present
    #[arg(short, long)]
    force: bool,
    /// Show what would be installed without connecting
    #[arg(long)]
    dry_run: bool,
}

impl TargetArgs {
    fn into_install_args(self) -> InstallArgs {
        InstallArgs {
            host: self.host,
            user: self.user,
            port: self.port,
            password: self.password,
            force: self.force,
            dry_run: self.dry_run,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an SSH config and list its include files and keys
    Resolve {
        /// SSH config to start from (defaults to settings)
        #[arg(short, long)]
        ssh_config: Option<PathBuf>,
    },

    /// Save a resolved SSH config and its keys as a named bundle
    Capture {
        /// Bundle name
        name: String,
        /// SSH config to start from (defaults to settings)
        #[arg(short, long)]
        ssh_config: Option<PathBuf>,
        /// Free-form description stored with the bundle
        #[arg(short, long, default_value = "")]
        description: String,
        /// Replace an existing bundle of the same name
        #[arg(short, long)]
        force: bool,
        /// Do not copy private keys
        #[arg(long)]
        no_private: bool,
        /// Do not copy public keys
        #[arg(long)]
        no_public: bool,
    },

    /// List captured bundles
    List,

    /// Install one public key into a remote authorized_keys
    Install {
        #[command(flatten)]
        target: TargetArgs,
        /// Public key file to install
        #[arg(short, long)]
        key: PathBuf,
        /// Private key to authenticate with
        #[arg(short, long)]
        identity: Option<PathBuf>,
    },

    /// Install every public key of a bundle, each authenticating with its own private key
    InstallBundle {
        /// Bundle name
        name: String,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print the settings file location
    Path,
    /// Initialize default configuration
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

/// Load settings and apply command-line overrides.
///
/// A missing default settings file means defaults; an explicitly named
/// file must exist.
fn load_settings(cli: &Cli) -> Result<ConfigFile> {
    let mut settings = match &cli.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load settings from {:?}", path))?,
        None => {
            let path = config::default_config_path();
            if path.exists() {
                config::load_config(&path)
                    .with_context(|| format!("Failed to load settings from {:?}", path))?
            } else {
                ConfigFile::default()
            }
        }
    };

    if let Some(store) = &cli.store {
        settings.resolver.bundle_dir = store.clone();
    }
    if cli.verbose > 0 {
        settings.deploy.verbose = true;
    }

    Ok(settings)
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Config { action } = &cli.command {
        return match action {
            ConfigAction::Path => commands::config_path(cli.config.as_ref()),
            ConfigAction::Init { force } => commands::config_init(cli.config.as_ref(), *force),
            ConfigAction::Show => {
                let settings = load_settings(&cli).unwrap_or_default();
                commands::config_show(cli.config.as_ref(), &settings)
            }
        };
    }

    let settings = load_settings(&cli)?;

    match cli.command {
        Commands::Resolve { ssh_config } => {
            commands::resolve_command(&settings, ssh_config.as_deref())?;
        }

        Commands::Capture {
            name,
            ssh_config,
            description,
            force,
            no_private,
            no_public,
        } => {
            let options = CaptureOptions {
                description,
                include_private: !no_private,
                include_public: !no_public,
                force,
            };
            commands::capture_command(&settings, &name, ssh_config.as_deref(), &options)?;
        }

        Commands::List => {
            commands::list_command(&settings)?;
        }

        Commands::Install {
            target,
            key,
            identity,
        } => {
            let args = target.into_install_args();
            commands::install_command(&settings, &args, key, identity).await?;
        }

        Commands::InstallBundle { name, target } => {
            let args = target.into_install_args();
            commands::install_bundle_command(&settings, &name, &args).await?;
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
