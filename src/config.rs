//! Manager configuration.
//!
//! ```toml
//! prefix = "app."
//! create_policy = "require-same-size"
//! permissions = 0o640
//! max_segment_size = 67108864
//! ```

use crate::err::{Error, Result};
use crate::ffi::Permissions;
use crate::key::validate_prefix;

use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::Path;

/// What `create` does when the name is already taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreatePolicy {
    /// Map the existing object at whatever size it has and log a warning.
    #[default]
    OpenExisting,
    /// Report `AlreadyExists`.
    FailIfExists,
    /// Map the existing object only if its size equals the request,
    /// otherwise report `SizeMismatch`.
    RequireSameSize,
    /// Unlink the existing object and create a fresh, zeroed one.
    Replace,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    pub prefix: String,
    pub create_policy: CreatePolicy,
    #[serde(deserialize_with = "deserialize_permissions")]
    pub permissions: Permissions,
    pub max_segment_size: usize,
}

fn deserialize_permissions<'de, D>(deserializer: D) -> std::result::Result<Permissions, D::Error>
where
    D: Deserializer<'de>,
{
    let bits = u32::deserialize(deserializer)?;
    Permissions::from_bits(bits).ok_or_else(|| {
        serde::de::Error::custom(format!("unsupported permission bits {:#o}", bits))
    })
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            prefix: String::new(),
            create_policy: CreatePolicy::default(),
            permissions: Permissions::default(),
            max_segment_size: isize::MAX as usize,
        }
    }
}

impl ManagerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: ManagerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).map_err(|source| Error::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s)
    }

    pub fn validate(&self) -> Result<()> {
        validate_prefix(&self.prefix)
    }

    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_create_policy(mut self, policy: CreatePolicy) -> Self {
        self.create_policy = policy;
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_max_segment_size(mut self, size: usize) -> Self {
        self.max_segment_size = size;
        self
    }
}

#[test]
fn test_defaults() {
    let config = ManagerConfig::default();
    assert_eq!(config.prefix, "");
    assert_eq!(config.create_policy, CreatePolicy::OpenExisting);
    assert_eq!(config.permissions, Permissions::OWNER_RW);
    assert_eq!(ManagerConfig::from_toml_str("").unwrap(), config);
}

#[test]
fn test_from_toml() {
    let config = ManagerConfig::from_toml_str(
        r#"
        prefix = "app."
        create_policy = "require-same-size"
        permissions = 0o640
        max_segment_size = 4096
        "#,
    )
    .unwrap();
    assert_eq!(config.prefix, "app.");
    assert_eq!(config.create_policy, CreatePolicy::RequireSameSize);
    assert_eq!(config.permissions.bits(), 0o640);
    assert_eq!(config.max_segment_size, 4096);
}

#[test]
fn test_rejects_bad_toml() {
    assert!(matches!(
        ManagerConfig::from_toml_str("create_policy = \"sometimes\""),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        ManagerConfig::from_toml_str("permissions = 0o1777"),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        ManagerConfig::from_toml_str("colour = \"red\""),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        ManagerConfig::from_toml_str("prefix = \"a/b\""),
        Err(Error::InvalidKey { .. })
    ));
}

#[test]
fn test_load() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "create_policy = \"fail-if-exists\"").unwrap();
    let config = ManagerConfig::load(file.path()).unwrap();
    assert_eq!(config.create_policy, CreatePolicy::FailIfExists);

    let missing = file.path().with_extension("missing");
    assert!(matches!(
        ManagerConfig::load(&missing),
        Err(Error::ConfigIo { .. })
    ));
}
