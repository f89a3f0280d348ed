//! The three probe steps and the run that chains them.
use crate::{
    config::{DelegationTarget, DownstreamTarget, LoginConfig, Settings},
    downstream::{ConnectionGuard, ConnectionMetadata, DataClient},
    error::{AuthenticationError, ConnectionError, DelegationError, Result},
    report,
    security::{DelegatedCredential, SecuritySubsystem, ServiceIdentity},
};
use std::{io::Write, path::Path};
use tracing::{debug, info};

/// A keytab may be named as a plain path or as an MIT `FILE:` residual.
fn keytab_path(keytab: &Path) -> &Path {
    keytab
        .to_str()
        .and_then(|s| s.strip_prefix("FILE:"))
        .map(Path::new)
        .unwrap_or(keytab)
}

/// Log in with the named profile. The keytab is the profile's own or
/// `default_keytab`; it has to exist before anything is asked of the
/// security subsystem.
pub fn authenticate<S: SecuritySubsystem>(
    security: &S,
    logins: &LoginConfig,
    profile: &str,
    default_keytab: &Path,
) -> Result<S::Identity, AuthenticationError> {
    let login = logins
        .profile(profile)
        .ok_or_else(|| AuthenticationError::ProfileNotFound {
            profile: profile.to_string(),
            path: logins.path.clone(),
        })?;
    login
        .validate()
        .map_err(|reason| AuthenticationError::Misconfigured {
            profile: profile.to_string(),
            reason,
        })?;
    let keytab = keytab_path(login.keytab.as_deref().unwrap_or(default_keytab));
    if !keytab.is_file() {
        return Err(AuthenticationError::KeytabMissing(keytab.to_path_buf()));
    }
    debug!(profile, principal = %login.principal, keytab = %keytab.display(), "logging in");
    security.login(login, keytab)
}

/// Get a credential for `target` that is good for `service` only.
pub fn delegate<S: SecuritySubsystem>(
    security: &S,
    identity: &S::Identity,
    target: &DelegationTarget,
    service: &str,
) -> Result<S::Credential, DelegationError> {
    info!(principal = identity.principal(), user = %target, service, "impersonating");
    security.impersonate(identity, target, service)
}

/// Open a connection with `credential`, read its metadata and close it.
/// The connection is closed exactly once whatever happens after it opened.
pub fn connect<C>(
    client: &C,
    target: &DownstreamTarget,
    credential: C::Credential,
) -> Result<ConnectionMetadata, ConnectionError>
where
    C: DataClient,
    C::Credential: DelegatedCredential,
{
    let requested = target.service_principal();
    if credential.service() != requested {
        return Err(ConnectionError::CredentialScope {
            granted: credential.service().to_string(),
            requested,
        });
    }
    let mut conn = ConnectionGuard::new(client.connect(target, credential)?);
    let metadata = conn.metadata()?;
    conn.close()?;
    Ok(metadata)
}

/// Run every step, writing the progress report to `out`.
pub fn run<S, C, W>(settings: &Settings, security: &S, client: &C, out: &mut W) -> Result<()>
where
    S: SecuritySubsystem,
    C: DataClient<Credential = S::Credential>,
    W: Write,
{
    let target = &settings.delegation.target_user;

    info!(profile = %settings.profile, "step 1: authenticate");
    writeln!(
        out,
        "=== Step 1: Authenticating profile {} via keytab ===",
        settings.profile
    )?;
    let logins =
        LoginConfig::load(&settings.login_config).map_err(AuthenticationError::LoginConfig)?;
    let identity = authenticate(security, &logins, &settings.profile, &settings.keytab)?;
    writeln!(out, "{}", report::render_subject(&identity.subject()))?;

    info!(user = %target, "step 2: delegate");
    writeln!(out, "\n=== Step 2: Impersonating {} ===", target)?;
    let credential = delegate(security, &identity, target, &settings.delegation_service())?;
    writeln!(out, "Impersonated credential: {}", credential.display_name())?;

    info!(host = %settings.downstream.host, "step 3: connect");
    writeln!(
        out,
        "\n=== Step 3: Connecting to {} as {} ===",
        settings.downstream.url(),
        target
    )?;
    let metadata = connect(client, &settings.downstream, credential)?;
    writeln!(out, "{}", report::render_metadata(&metadata))?;

    writeln!(out, "\n=== Constrained delegation test PASSED ===")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keytab_residual_is_stripped() {
        assert_eq!(
            keytab_path(Path::new("FILE:/etc/s4u/webapp.keytab")),
            Path::new("/etc/s4u/webapp.keytab")
        );
        assert_eq!(
            keytab_path(Path::new("/etc/s4u/webapp.keytab")),
            Path::new("/etc/s4u/webapp.keytab")
        );
    }
}
