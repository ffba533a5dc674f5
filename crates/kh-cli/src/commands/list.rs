//! List command implementation

use anyhow::{Context, Result};

use crate::output::print_info;
use kh_core::bundle::{BundleStore, KeyBundle};
use kh_core::config::ConfigFile;

fn format_bundle(bundle: &KeyBundle) -> String {
    let keys = bundle.public_keys().len();
    let mut line = format!(
        "{}  ({} public key{})",
        bundle.name(),
        keys,
        if keys == 1 { "" } else { "s" }
    );
    let description = &bundle.metadata().description;
    if !description.is_empty() {
        line.push_str("  ");
        line.push_str(description);
    }
    line
}

/// Execute the list command
pub fn list_command(settings: &ConfigFile) -> Result<()> {
    let store = BundleStore::new(&settings.resolver.bundle_dir);
    let bundles = store
        .list()
        .with_context(|| format!("Failed to list bundles in {:?}", store.root()))?;

    if bundles.is_empty() {
        print_info(&format!("No bundles in {}", store.root().display()));
        return Ok(());
    }

    println!("Bundles in {}:", store.root().display());
    for bundle in &bundles {
        println!("  {}", format_bundle(bundle));
    }
    Ok(())
}
