//! Probe settings and the named login profiles.
//!
//! Settings come from a TOML file; the process level paths and the profile
//! name can be overridden from the command line or the environment. The
//! login configuration is a second TOML file with one table per profile.

use crate::error::ConfigError;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

const DEFAULT_PROFILE: &str = "constrained_delegation";
const DEFAULT_PORT: u16 = 1521;
const DEFAULT_KERBEROS_SERVICE: &str = "oracle";
const DEFAULT_AUTHENTICATION_SERVICE: &str = "KERBEROS5PRE";

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_kerberos_service() -> String {
    DEFAULT_KERBEROS_SERVICE.to_string()
}

fn default_authentication_services() -> Vec<String> {
    vec![DEFAULT_AUTHENTICATION_SERVICE.to_string()]
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// The user to impersonate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct DelegationTarget(String);

impl DelegationTarget {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DelegationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `[delegation]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelegationSettings {
    pub target_user: DelegationTarget,

    /// Service principal (`service@host`) to ask S4U2Proxy for. Defaults to
    /// the downstream service principal.
    #[serde(default)]
    pub service: Option<String>,
}

/// `[downstream]`: the data service reached with the delegated credential.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownstreamTarget {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub service_name: String,

    /// Service part of the database's Kerberos principal.
    #[serde(default = "default_kerberos_service")]
    pub kerberos_service: String,

    /// Authentication adapters the client may negotiate, in order.
    #[serde(default = "default_authentication_services")]
    pub authentication_services: Vec<String>,
}

impl DownstreamTarget {
    /// Host based service name of the database, `oracle@db.example.com`.
    pub fn service_principal(&self) -> String {
        format!("{}@{}", self.kerberos_service, self.host)
    }

    /// Easy connect string.
    pub fn url(&self) -> String {
        format!("//{}:{}/{}", self.host, self.port, self.service_name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    keytab: Option<PathBuf>,
    krb5_conf: Option<PathBuf>,
    login_config: Option<PathBuf>,
    profile: Option<String>,
    #[serde(default)]
    debug: bool,
    delegation: DelegationSettings,
    downstream: DownstreamTarget,
}

/// Values taken from the command line or environment. Anything set here
/// wins over the settings file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub keytab: Option<PathBuf>,
    pub krb5_conf: Option<PathBuf>,
    pub login_config: Option<PathBuf>,
    pub profile: Option<String>,
    pub debug: bool,
}

/// Fully resolved probe settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub keytab: PathBuf,
    pub krb5_conf: PathBuf,
    pub login_config: PathBuf,
    pub profile: String,
    pub debug: bool,
    pub delegation: DelegationSettings,
    pub downstream: DownstreamTarget,
}

impl Settings {
    /// Load settings from a TOML file and apply overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a
    /// required value is missing after overrides.
    pub fn load(path: &Path, overrides: Overrides) -> Result<Self, ConfigError> {
        let content = read(path)?;
        let file: SettingsFile = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::resolve(file, overrides)
    }

    /// Parse settings from a TOML string.
    pub fn from_toml(content: &str, overrides: Overrides) -> Result<Self, ConfigError> {
        let file: SettingsFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<string>"),
            source,
        })?;
        Self::resolve(file, overrides)
    }

    fn resolve(file: SettingsFile, o: Overrides) -> Result<Self, ConfigError> {
        fn required(v: Option<PathBuf>, key: &str) -> Result<PathBuf, ConfigError> {
            v.ok_or_else(|| ConfigError::Validation(format!("{key} is not set")))
        }
        let settings = Settings {
            keytab: required(o.keytab.or(file.keytab), "keytab")?,
            krb5_conf: required(o.krb5_conf.or(file.krb5_conf), "krb5_conf")?,
            login_config: required(o.login_config.or(file.login_config), "login_config")?,
            profile: o
                .profile
                .or(file.profile)
                .unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
            debug: o.debug || file.debug,
            delegation: file.delegation,
            downstream: file.downstream,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let empty = |v: &str, key: &str| {
            if v.trim().is_empty() {
                Err(ConfigError::Validation(format!("{key} must not be empty")))
            } else {
                Ok(())
            }
        };
        empty(&self.profile, "profile")?;
        empty(self.delegation.target_user.as_str(), "delegation.target_user")?;
        empty(&self.downstream.host, "downstream.host")?;
        empty(&self.downstream.service_name, "downstream.service_name")?;
        empty(&self.downstream.kerberos_service, "downstream.kerberos_service")?;
        if self.downstream.authentication_services.is_empty() {
            return Err(ConfigError::Validation(
                "downstream.authentication_services must name at least one service".into(),
            ));
        }
        Ok(())
    }

    /// The service principal the delegated credential is requested for.
    pub fn delegation_service(&self) -> String {
        self.delegation
            .service
            .clone()
            .unwrap_or_else(|| self.downstream.service_principal())
    }
}

/// One named login profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginProfile {
    #[serde(skip)]
    pub name: String,

    /// Principal to log in as, `webapp@EXAMPLE.COM`.
    pub principal: String,

    /// Keytab for this profile; the process level keytab when unset.
    #[serde(default)]
    pub keytab: Option<PathBuf>,

    /// Credential cache for the initial ticket; a private in-memory cache
    /// when unset.
    #[serde(default)]
    pub ccache: Option<String>,
}

impl LoginProfile {
    pub fn validate(&self) -> Result<(), String> {
        if self.principal.trim().is_empty() {
            return Err("principal is empty".into());
        }
        if let Some(kt) = &self.keytab {
            if kt.as_os_str().is_empty() {
                return Err("keytab is empty".into());
            }
        }
        Ok(())
    }
}

/// The login configuration file: profile name to profile.
#[derive(Debug, Clone, Default)]
pub struct LoginConfig {
    pub path: PathBuf,
    profiles: BTreeMap<String, LoginProfile>,
}

impl LoginConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read(path)?;
        let mut config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            e => e,
        })?;
        config.path = path.to_path_buf();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut profiles: BTreeMap<String, LoginProfile> =
            toml::from_str(content).map_err(|source| ConfigError::Parse {
                path: PathBuf::from("<string>"),
                source,
            })?;
        for (name, profile) in profiles.iter_mut() {
            profile.name = name.clone();
        }
        Ok(LoginConfig {
            path: PathBuf::new(),
            profiles,
        })
    }

    pub fn profile(&self, name: &str) -> Option<&LoginProfile> {
        self.profiles.get(name)
    }
}
