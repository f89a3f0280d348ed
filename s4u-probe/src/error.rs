use crate::{gss::GssError, krb5::Krb5Error};
use std::{io, path::PathBuf};

/// Failures coming out of a pluggable collaborator (security subsystem or
/// data client).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading a configuration file.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A required value is missing or makes no sense.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// The service identity could not be established.
#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    #[error("cannot load the login configuration")]
    LoginConfig(#[source] ConfigError),

    #[error("login profile {profile:?} not found in {}", path.display())]
    ProfileNotFound { profile: String, path: PathBuf },

    #[error("login profile {profile:?} is misconfigured: {reason}")]
    Misconfigured { profile: String, reason: String },

    #[error("keytab {} does not exist", .0.display())]
    KeytabMissing(PathBuf),

    #[error("keytab login failed for {principal}")]
    Login {
        principal: String,
        #[source]
        source: BoxError,
    },
}

/// S4U2Self or S4U2Proxy was refused or could not be attempted.
#[derive(Debug, thiserror::Error)]
pub enum DelegationError {
    #[error("invalid delegation target {target:?}")]
    InvalidTarget {
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("S4U2Self for {target} failed")]
    SelfImpersonation {
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid service principal {service:?}")]
    InvalidService {
        service: String,
        #[source]
        source: BoxError,
    },

    #[error("S4U2Proxy to {service} on behalf of {target} failed")]
    Proxy {
        target: String,
        service: String,
        #[source]
        source: BoxError,
    },
}

/// The downstream data service could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("credential is scoped to {granted}, refusing to use it for {requested}")]
    CredentialScope { granted: String, requested: String },

    #[error("cannot stage client configuration")]
    Staging(#[source] io::Error),

    #[error("cannot store the delegated credential")]
    StoreCredential(#[source] BoxError),

    #[error("connection to {url} failed")]
    Connect {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("reading connection metadata failed")]
    Metadata(#[source] BoxError),

    #[error("closing the connection failed")]
    Close(#[source] BoxError),
}

/// A single credential item could not be read for the report. Never fatal.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InspectionError {
    #[error("{0}")]
    Gss(#[from] GssError),

    #[error("{0}")]
    Krb5(#[from] Krb5Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("authentication failed")]
    Authentication(#[from] AuthenticationError),

    #[error("delegation failed")]
    Delegation(#[from] DelegationError),

    #[error("downstream connection failed")]
    Connection(#[from] ConnectionError),

    #[error("cannot write output")]
    Output(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
