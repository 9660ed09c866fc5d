//! TOML configuration for the Eddy agent.
//!
//! Every section is optional; a missing file means a single `demoResc`
//! resource with the catalog and vault under `~/.eddy`.

use std::path::{Path, PathBuf};

use eddy_catalog::{Grant, StaticAccessControl};
use eddy_storage::StaticTopology;
use eddy_types::{ChecksumScheme, EngineConfig, ResourceSpec};
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Catalog location.
    pub catalog: CatalogSection,
    /// Physical storage backend.
    pub storage: StorageSection,
    /// Resource topology, one `[[resources]]` table per resource.
    pub resources: Vec<ResourceSpec>,
    pub checksum: ChecksumSection,
    pub replication: ReplicationSection,
    /// Administrators, grants and the acting user.
    pub access: AccessSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[catalog]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    /// Directory for persistent data (catalog database, vault).
    pub data_dir: PathBuf,
    /// Keep the catalog in a temporary directory removed on exit.
    pub temporary: bool,
}

impl Default for CatalogSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".eddy"))
            .unwrap_or_else(|| PathBuf::from(".eddy"));
        Self {
            data_dir,
            temporary: false,
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Backend type: `"file"` (default) or `"memory"`.
    pub backend: String,
    /// Root of the file vault. Defaults to `<data_dir>/vault`.
    pub vault_dir: Option<PathBuf>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
            vault_dir: None,
        }
    }
}

/// `[checksum]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChecksumSection {
    /// `"sha2"` (default) or `"blake3"`.
    pub scheme: ChecksumScheme,
}

/// `[replication]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReplicationSection {
    /// Resource used when a create or replication names none.
    pub default_resource: String,
    /// Fail replications whose copied length differs from the source size.
    pub verify_copy_length: bool,
}

impl Default for ReplicationSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            default_resource: engine.default_resource,
            verify_copy_length: engine.verify_copy_length,
        }
    }
}

/// `[access]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AccessSection {
    /// User the CLI acts as unless `--user` is given.
    pub user: String,
    /// Users allowed administrative overrides.
    pub admins: Vec<String>,
    pub grants: Vec<Grant>,
}

impl Default for AccessSection {
    fn default() -> Self {
        Self {
            user: "rods".to_string(),
            admins: vec!["rods".to_string()],
            grants: Vec::new(),
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog.data_dir.join("catalog")
    }

    pub fn vault_dir(&self) -> PathBuf {
        self.storage
            .vault_dir
            .clone()
            .unwrap_or_else(|| self.catalog.data_dir.join("vault"))
    }

    /// Declared resources, or the default resource alone when none are.
    pub fn resource_specs(&self) -> Vec<ResourceSpec> {
        if self.resources.is_empty() {
            vec![ResourceSpec::storage(&self.replication.default_resource)]
        } else {
            self.resources.clone()
        }
    }

    pub fn topology(&self) -> StaticTopology {
        StaticTopology::new(self.resource_specs())
    }

    pub fn access_control(&self) -> StaticAccessControl {
        StaticAccessControl::from_parts(self.access.admins.clone(), self.access.grants.clone())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            default_resource: self.replication.default_resource.clone(),
            checksum_scheme: self.checksum.scheme,
            verify_copy_length: self.replication.verify_copy_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use eddy_catalog::Permission;
    use eddy_storage::ResourceTopology;
    use eddy_types::ResourceClass;

    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[catalog]
data_dir = "/tmp/eddy-test"

[storage]
backend = "file"
vault_dir = "/srv/vault"

[[resources]]
name = "repl"

[[resources]]
name = "ufs0"
parent = "repl"

[[resources]]
name = "archive"
class = "bundle"

[checksum]
scheme = "blake3"

[replication]
default_resource = "repl"
verify_copy_length = false

[access]
user = "alice"
admins = ["rods", "ops"]
grants = [{ user = "bob", path_prefix = "/tempZone/home/alice/", permission = "read" }]

[log]
level = "debug"
"#;

        let config = CliConfig::from_toml(toml).unwrap();
        assert_eq!(config.catalog.data_dir, PathBuf::from("/tmp/eddy-test"));
        assert_eq!(config.catalog_path(), PathBuf::from("/tmp/eddy-test/catalog"));
        assert_eq!(config.vault_dir(), PathBuf::from("/srv/vault"));
        assert_eq!(config.resources.len(), 3);
        assert_eq!(config.resources[1].parent.as_deref(), Some("repl"));
        assert_eq!(config.resources[2].class, ResourceClass::Bundle);
        assert_eq!(config.checksum.scheme, ChecksumScheme::Blake3);
        assert_eq!(config.access.user, "alice");
        assert_eq!(config.access.grants[0].permission, Permission::Read);
        assert_eq!(config.log.level, "debug");

        let engine = config.engine_config();
        assert_eq!(engine.default_resource, "repl");
        assert!(!engine.verify_copy_length);
        assert_eq!(engine.checksum_scheme, ChecksumScheme::Blake3);

        let topology = config.topology();
        let hierarchy = topology.resolve("repl").unwrap();
        assert_eq!(hierarchy.leaf(), "ufs0");
        assert!(topology.is_bundle(&topology.resolve("archive").unwrap()));
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = CliConfig::from_toml("").unwrap();
        let expected_default = dirs::home_dir()
            .map(|h| h.join(".eddy"))
            .unwrap_or_else(|| PathBuf::from(".eddy"));
        assert_eq!(config.catalog.data_dir, expected_default);
        assert_eq!(config.vault_dir(), expected_default.join("vault"));
        assert_eq!(config.storage.backend, "file");
        assert_eq!(config.access.user, "rods");
        assert_eq!(config.engine_config(), EngineConfig::default());
        assert_eq!(
            config.resource_specs(),
            vec![ResourceSpec::storage("demoResc")]
        );
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[storage]
backend = "memory"

[replication]
default_resource = "resc1"
"#;
        let config = CliConfig::from_toml(toml).unwrap();
        assert_eq!(config.storage.backend, "memory");
        assert!(config.replication.verify_copy_length);
        assert_eq!(config.resource_specs(), vec![ResourceSpec::storage("resc1")]);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eddy.toml");
        std::fs::write(
            &path,
            r#"
[catalog]
data_dir = "/tmp/test-eddy"
temporary = true
"#,
        )
        .unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.catalog.data_dir, PathBuf::from("/tmp/test-eddy"));
        assert!(config.catalog.temporary);
    }

    #[test]
    fn test_load_rejects_bad_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eddy.toml");
        std::fs::write(&path, "[checksum]\nscheme = \"md5\"\n").unwrap();
        assert!(CliConfig::load(Some(&path)).is_err());
    }
}
