//! Named key bundles
//!
//! A bundle is a directory `<store>/<name>/` holding a copy of an SSH
//! config, its include files, and the keys it names:
//!
//! ```text
//! <store>/<name>/
//!   config
//!   includes/include_<n>_<file>
//!   keys/<private key>      (0600)
//!   keys/<public key>.pub
//!   metadata.json
//! ```
//!
//! `metadata.json` records the *original* paths the files were copied
//! from; deployment maps each original public key path back to its copy
//! under `keys/`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::BundleError;
use crate::ssh_config::ParsedConfig;

const METADATA_FILE: &str = "metadata.json";
const KEYS_DIR: &str = "keys";
const INCLUDES_DIR: &str = "includes";
const CONFIG_FILE: &str = "config";

/// Contents of a bundle's `metadata.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleMetadata {
    pub description: String,
    /// Seconds since the Unix epoch
    pub saved_at: u64,
    pub source_path: PathBuf,
    pub include_files: Vec<PathBuf>,
    pub private_keys: Vec<PathBuf>,
    /// Original locations of the captured public keys, in capture order
    pub public_keys: Vec<PathBuf>,
    pub has_includes: bool,
    pub has_keys: bool,
}

/// A bundle loaded from the store. Read-only.
#[derive(Debug, Clone)]
pub struct KeyBundle {
    name: String,
    root: PathBuf,
    metadata: BundleMetadata,
}

/// A public key captured in a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledKey {
    /// File name shared by the original and the copy, e.g. `id_ed25519.pub`
    pub file_name: String,
    /// Where the key lived when the bundle was captured
    pub original_path: PathBuf,
    /// The copy inside the bundle's `keys/` directory
    pub public_key_path: PathBuf,
    /// The copy's path without `.pub`; may not exist
    pub private_key_path: PathBuf,
}

impl KeyBundle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata(&self) -> &BundleMetadata {
        &self.metadata
    }

    /// Directory holding the copied key files
    pub fn keys_dir(&self) -> PathBuf {
        self.root.join(KEYS_DIR)
    }

    /// Captured public keys mapped to their copies, in capture order
    pub fn public_keys(&self) -> Vec<BundledKey> {
        let keys_dir = self.keys_dir();
        self.metadata
            .public_keys
            .iter()
            .filter_map(|original| {
                let file_name = original.file_name()?.to_string_lossy().into_owned();
                let public_key_path = keys_dir.join(&file_name);
                let private_key_path = keys_dir.join(
                    file_name
                        .strip_suffix(".pub")
                        .unwrap_or(file_name.as_str()),
                );
                Some(BundledKey {
                    file_name,
                    original_path: original.clone(),
                    public_key_path,
                    private_key_path,
                })
            })
            .collect()
    }
}

/// What to copy when capturing a bundle
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub description: String,
    /// Copy private keys
    pub include_private: bool,
    /// Copy public keys
    pub include_public: bool,
    /// Replace an existing bundle of the same name
    pub force: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            description: String::new(),
            include_private: true,
            include_public: true,
            force: false,
        }
    }
}

/// Summary of a capture
#[derive(Debug, Clone)]
pub struct CaptureReport {
    pub bundle_dir: PathBuf,
    pub include_files: usize,
    pub private_keys: usize,
    pub public_keys: usize,
    /// Files that could not be copied
    pub warnings: Vec<String>,
}

/// Directory of named bundles
#[derive(Debug, Clone)]
pub struct BundleStore {
    root: PathBuf,
}

impl BundleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bundle_dir(&self, name: &str) -> Result<PathBuf, BundleError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(BundleError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    /// Load a bundle's metadata
    pub fn load(&self, name: &str) -> Result<KeyBundle, BundleError> {
        let root = self.bundle_dir(name)?;
        let metadata_path = root.join(METADATA_FILE);
        if !metadata_path.is_file() {
            return Err(BundleError::NotFound {
                name: name.to_string(),
                store: self.root.clone(),
            });
        }

        let content = std::fs::read_to_string(&metadata_path)?;
        let metadata: BundleMetadata =
            serde_json::from_str(&content).map_err(|source| BundleError::Metadata {
                path: metadata_path.clone(),
                source,
            })?;

        tracing::debug!(
            "Loaded bundle '{}' with {} public keys",
            name,
            metadata.public_keys.len()
        );

        Ok(KeyBundle {
            name: name.to_string(),
            root,
            metadata,
        })
    }

    /// Every bundle in the store, sorted by name.
    ///
    /// A missing store directory holds no bundles. Directories without
    /// `metadata.json` are ignored, and bundles whose metadata fails to load
    /// are skipped with a warning.
    pub fn list(&self) -> Result<Vec<KeyBundle>, BundleError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut bundles = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.path().join(METADATA_FILE).is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match self.load(&name) {
                Ok(bundle) => bundles.push(bundle),
                Err(e) => tracing::warn!("Skipping bundle '{}': {}", name, e),
            }
        }

        bundles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(bundles)
    }

    /// Copy a resolved SSH config and its keys into a new bundle
    pub fn capture(
        &self,
        name: &str,
        parsed: &ParsedConfig,
        options: &CaptureOptions,
    ) -> Result<CaptureReport, BundleError> {
        let bundle_dir = self.bundle_dir(name)?;
        if bundle_dir.exists() {
            if !options.force {
                return Err(BundleError::AlreadyExists(name.to_string()));
            }
            std::fs::remove_dir_all(&bundle_dir)?;
        }
        std::fs::create_dir_all(&bundle_dir)?;

        std::fs::copy(&parsed.main_config_path, bundle_dir.join(CONFIG_FILE))?;

        let mut warnings = Vec::new();

        if parsed.has_includes() {
            let includes_dir = bundle_dir.join(INCLUDES_DIR);
            std::fs::create_dir_all(&includes_dir)?;
            for (i, include) in parsed.include_files.iter().enumerate() {
                let dest = includes_dir.join(format!("include_{}_{}", i, file_name(include)));
                copy_or_warn(include, &dest, &mut warnings);
            }
        }

        let keys_dir = bundle_dir.join(KEYS_DIR);
        let copy_private = options.include_private && !parsed.private_keys.is_empty();
        let copy_public = options.include_public && !parsed.public_keys.is_empty();
        if copy_private || copy_public {
            std::fs::create_dir_all(&keys_dir)?;
            set_mode(&keys_dir, 0o700);
        }

        if copy_private {
            for key in &parsed.private_keys {
                let dest = keys_dir.join(file_name(key));
                if copy_or_warn(key, &dest, &mut warnings) {
                    set_mode(&dest, 0o600);
                }
            }
        }

        if copy_public {
            for key in &parsed.public_keys {
                copy_or_warn(key, &keys_dir.join(file_name(key)), &mut warnings);
            }
        }

        let saved_at = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let metadata = BundleMetadata {
            description: options.description.clone(),
            saved_at,
            source_path: parsed.main_config_path.clone(),
            include_files: parsed.include_files.clone(),
            private_keys: parsed.private_keys.clone(),
            public_keys: if options.include_public {
                parsed.public_keys.clone()
            } else {
                Vec::new()
            },
            has_includes: parsed.has_includes(),
            has_keys: parsed.has_keys(),
        };

        let json = serde_json::to_string_pretty(&metadata).map_err(|source| {
            BundleError::Metadata {
                path: bundle_dir.join(METADATA_FILE),
                source,
            }
        })?;
        std::fs::write(bundle_dir.join(METADATA_FILE), json)?;

        tracing::info!("Captured bundle '{}' at {:?}", name, bundle_dir);

        Ok(CaptureReport {
            bundle_dir,
            include_files: parsed.include_files.len(),
            private_keys: if options.include_private {
                parsed.private_keys.len()
            } else {
                0
            },
            public_keys: metadata.public_keys.len(),
            warnings,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn copy_or_warn(src: &Path, dest: &Path, warnings: &mut Vec<String>) -> bool {
    match std::fs::copy(src, dest) {
        Ok(_) => true,
        Err(e) => {
            let msg = format!("failed to copy {}: {}", src.display(), e);
            tracing::warn!("{}", msg);
            warnings.push(msg);
            false
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
        tracing::warn!("Failed to set mode {:o} on {:?}: {}", mode, path, e);
    }
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh_config::ConfigResolver;
    use std::fs;
    use tempfile::TempDir;

    fn fixture(dir: &Path) -> ParsedConfig {
        let ssh = dir.join("ssh");
        fs::create_dir_all(ssh.join("conf.d")).unwrap();
        fs::write(
            ssh.join("config"),
            "Include conf.d/*\nHost a\n  IdentityFile id_a\n",
        )
        .unwrap();
        fs::write(ssh.join("conf.d/work"), "Host b\n  IdentityFile id_b\n").unwrap();
        for name in ["id_a", "id_a.pub", "id_b", "id_b.pub"] {
            fs::write(ssh.join(name), format!("contents of {}", name)).unwrap();
        }
        ConfigResolver::with_home(dir)
            .parse(&ssh.join("config"))
            .unwrap()
    }

    #[test]
    fn test_capture_and_load() {
        let dir = TempDir::new().unwrap();
        let parsed = fixture(dir.path());
        let store = BundleStore::new(dir.path().join("store"));

        let report = store
            .capture(
                "laptop",
                &parsed,
                &CaptureOptions {
                    description: "work laptop".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(report.include_files, 1);
        assert_eq!(report.private_keys, 2);
        assert_eq!(report.public_keys, 2);
        assert!(report.warnings.is_empty());
        assert!(report.bundle_dir.join("config").is_file());
        assert!(report.bundle_dir.join("includes/include_0_work").is_file());

        let bundle = store.load("laptop").unwrap();
        assert_eq!(bundle.name(), "laptop");
        assert_eq!(bundle.metadata().description, "work laptop");
        assert!(bundle.metadata().has_includes);

        let keys = bundle.public_keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].file_name, "id_a.pub");
        assert_eq!(keys[0].public_key_path, bundle.keys_dir().join("id_a.pub"));
        assert_eq!(keys[0].private_key_path, bundle.keys_dir().join("id_a"));
        assert!(keys[0].public_key_path.is_file());
        assert!(keys[0].private_key_path.is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_private_key_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let parsed = fixture(dir.path());
        let store = BundleStore::new(dir.path().join("store"));
        store
            .capture("modes", &parsed, &CaptureOptions::default())
            .unwrap();

        let mode = fs::metadata(dir.path().join("store/modes/keys/id_a"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_capture_refuses_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let parsed = fixture(dir.path());
        let store = BundleStore::new(dir.path().join("store"));

        store
            .capture("dup", &parsed, &CaptureOptions::default())
            .unwrap();
        let err = store
            .capture("dup", &parsed, &CaptureOptions::default())
            .unwrap_err();
        assert!(matches!(err, BundleError::AlreadyExists(_)));

        let forced = CaptureOptions {
            force: true,
            ..Default::default()
        };
        store.capture("dup", &parsed, &forced).unwrap();
    }

    #[test]
    fn test_capture_without_public_keys() {
        let dir = TempDir::new().unwrap();
        let parsed = fixture(dir.path());
        let store = BundleStore::new(dir.path().join("store"));

        let options = CaptureOptions {
            include_public: false,
            ..Default::default()
        };
        store.capture("private-only", &parsed, &options).unwrap();

        let bundle = store.load("private-only").unwrap();
        assert!(bundle.public_keys().is_empty());
        assert!(bundle.keys_dir().join("id_a").is_file());
        assert!(!bundle.keys_dir().join("id_a.pub").exists());
    }

    #[test]
    fn test_load_missing_bundle() {
        let dir = TempDir::new().unwrap();
        let store = BundleStore::new(dir.path());
        assert!(matches!(
            store.load("ghost"),
            Err(BundleError::NotFound { .. })
        ));
        assert!(matches!(
            store.load("../escape"),
            Err(BundleError::InvalidName(_))
        ));
    }

    #[test]
    fn test_list_bundles() {
        let dir = TempDir::new().unwrap();
        let parsed = fixture(dir.path());
        let store = BundleStore::new(dir.path().join("store"));
        assert!(store.list().unwrap().is_empty());

        store
            .capture("work", &parsed, &CaptureOptions::default())
            .unwrap();
        store
            .capture("home", &parsed, &CaptureOptions::default())
            .unwrap();
        fs::create_dir_all(dir.path().join("store/not-a-bundle")).unwrap();
        fs::create_dir_all(dir.path().join("store/broken")).unwrap();
        fs::write(dir.path().join("store/broken/metadata.json"), "{not json").unwrap();

        let names: Vec<String> = store
            .list()
            .unwrap()
            .iter()
            .map(|bundle| bundle.name().to_string())
            .collect();
        assert_eq!(names, vec!["home", "work"]);
    }

    #[test]
    fn test_load_malformed_metadata() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("bad")).unwrap();
        fs::write(dir.path().join("bad/metadata.json"), "{not json").unwrap();

        let store = BundleStore::new(dir.path());
        assert!(matches!(
            store.load("bad"),
            Err(BundleError::Metadata { .. })
        ));
    }
}
