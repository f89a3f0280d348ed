//! The security subsystem: keytab login and constrained delegation.
//!
//! The workflow only sees the traits. `GssSubsystem` implements them on
//! top of MIT GSS-API; tests substitute their own.
use crate::{
    config::{DelegationTarget, LoginProfile},
    error::{AuthenticationError, DelegationError, InspectionError},
    gss::{
        ClientCtx, Cred, CredStore, CredUsage, CtxFlags, GssError, Name, OidSet,
        GSS_MECH_KRB5, GSS_NT_HOSTBASED_SERVICE, GSS_NT_KRB5_PRINCIPAL, GSS_NT_USER_NAME,
    },
    krb5::{self, CacheEntry},
    subject::{Material, Subject},
};
use std::{
    env,
    path::{Path, PathBuf},
    process,
};
use tracing::{debug, info};

/// An authenticated service principal.
pub trait ServiceIdentity {
    fn principal(&self) -> &str;

    /// Snapshot of everything the identity holds, for the report.
    fn subject(&self) -> Subject<'_>;
}

/// Credential for one user, usable against exactly one service.
pub trait DelegatedCredential {
    fn target(&self) -> &DelegationTarget;

    /// The service principal the credential was obtained for.
    fn service(&self) -> &str;

    fn display_name(&self) -> String;
}

pub trait SecuritySubsystem {
    type Identity: ServiceIdentity;
    type Credential: DelegatedCredential;

    /// Log in as the profile's principal with the keys in `keytab`.
    fn login(
        &self,
        profile: &LoginProfile,
        keytab: &Path,
    ) -> Result<Self::Identity, AuthenticationError>;

    /// S4U2Self for `target`, then S4U2Proxy to `service`, under
    /// `identity`. Either both succeed or nothing is returned.
    fn impersonate(
        &self,
        identity: &Self::Identity,
        target: &DelegationTarget,
        service: &str,
    ) -> Result<Self::Credential, DelegationError>;
}

/// MIT GSS-API backed subsystem.
#[derive(Debug)]
pub struct GssSubsystem {
    krb5_conf: PathBuf,
}

impl GssSubsystem {
    /// Point the Kerberos library at `krb5_conf`, and at stderr for its
    /// trace output when `debug` is set. Must run before the first
    /// Kerberos call in the process.
    pub fn new(krb5_conf: &Path, debug: bool) -> Self {
        env::set_var("KRB5_CONFIG", krb5_conf);
        if debug {
            env::set_var("KRB5_TRACE", "/dev/stderr");
        }
        GssSubsystem {
            krb5_conf: krb5_conf.to_path_buf(),
        }
    }

    pub fn krb5_conf(&self) -> &Path {
        &self.krb5_conf
    }
}

fn boxed(e: GssError) -> crate::error::BoxError {
    Box::new(e)
}

impl SecuritySubsystem for GssSubsystem {
    type Identity = GssIdentity;
    type Credential = GssDelegated;

    fn login(
        &self,
        profile: &LoginProfile,
        keytab: &Path,
    ) -> Result<GssIdentity, AuthenticationError> {
        let ccache = profile
            .ccache
            .clone()
            .unwrap_or_else(|| format!("MEMORY:s4u-probe-{}", process::id()));
        // explicit type prefix, a ':' in the path would otherwise select one
        let keytab_name = format!("FILE:{}", keytab.display());
        debug!(
            principal = %profile.principal,
            keytab = %keytab_name,
            %ccache,
            "acquiring initial credentials"
        );
        let login = || -> Result<Cred, GssError> {
            let store = CredStore::new()
                .with("client_keytab", &keytab_name)?
                .with("ccache", &ccache)?;
            let name = Name::new(profile.principal.as_bytes(), &GSS_NT_KRB5_PRINCIPAL)?;
            let cred = Cred::acquire_from(&name, CredUsage::Initiate, &OidSet::krb5()?, &store)?;
            // the tgt is fetched lazily, asking for the lifetime forces it
            let lifetime = cred.lifetime()?;
            debug!(?lifetime, "initial credentials acquired");
            Ok(cred)
        };
        let cred = login().map_err(|e| AuthenticationError::Login {
            principal: profile.principal.clone(),
            source: boxed(e),
        })?;
        info!(principal = %profile.principal, "logged in from keytab");
        Ok(GssIdentity {
            principal: profile.principal.clone(),
            cred,
            ccache,
            keytab: keytab_name,
        })
    }

    fn impersonate(
        &self,
        identity: &GssIdentity,
        target: &DelegationTarget,
        service: &str,
    ) -> Result<GssDelegated, DelegationError> {
        let user = Name::new(target.as_str().as_bytes(), &GSS_NT_USER_NAME).map_err(|e| {
            DelegationError::InvalidTarget {
                target: target.to_string(),
                source: boxed(e),
            }
        })?;
        let self_err = |e: GssError| DelegationError::SelfImpersonation {
            target: target.to_string(),
            source: boxed(e),
        };
        let mechs = OidSet::krb5().map_err(self_err)?;
        let cred = identity
            .cred
            .impersonate(&user, CredUsage::Initiate, &mechs)
            .map_err(self_err)?;
        debug!(user = %target, "S4U2Self succeeded");
        let service_name = Name::new(service.as_bytes(), &GSS_NT_HOSTBASED_SERVICE).map_err(|e| {
            DelegationError::InvalidService {
                service: service.to_string(),
                source: boxed(e),
            }
        })?;
        {
            let mut ctx = ClientCtx::new(&cred, &service_name, CtxFlags::GSS_C_MUTUAL_FLAG);
            ctx.step(None).map_err(|e| DelegationError::Proxy {
                target: target.to_string(),
                service: service.to_string(),
                source: boxed(e),
            })?;
        }
        info!(user = %target, service, "S4U2Proxy succeeded");
        Ok(GssDelegated {
            cred,
            target: target.clone(),
            service: service.to_string(),
        })
    }
}

/// The logged in service principal. The initial ticket lives in `ccache`.
pub struct GssIdentity {
    principal: String,
    cred: Cred,
    ccache: String,
    keytab: String,
}

impl GssIdentity {
    fn private_credentials(&self) -> Vec<Result<Material<'_>, InspectionError>> {
        let mut items = Vec::new();
        match krb5::Context::new() {
            Err(e) => items.push(Err(e.into())),
            Ok(ctx) => {
                match ctx.tickets(&self.ccache) {
                    Err(e) => items.push(Err(e.into())),
                    Ok(entries) => items.extend(entries.into_iter().map(|e| match e {
                        Ok(CacheEntry::Ticket(t)) => Ok(Material::Ticket(t)),
                        Ok(CacheEntry::Config(server)) => {
                            Ok(Material::Unknown(format!("ccache configuration entry {server}")))
                        }
                        Err(e) => Err(e.into()),
                    })),
                }
                match ctx.keytab_entries(&self.keytab) {
                    Err(e) => items.push(Err(e.into())),
                    Ok(keys) => items.extend(keys.into_iter().filter_map(|k| match k {
                        Ok(k) if k.principal == self.principal => Some(Ok(Material::Key(k))),
                        Ok(_) => None,
                        Err(e) => Some(Err(e.into())),
                    })),
                }
            }
        }
        items.push(Ok(Material::Credential(&self.cred)));
        items
    }
}

impl ServiceIdentity for GssIdentity {
    fn principal(&self) -> &str {
        &self.principal
    }

    fn subject(&self) -> Subject<'_> {
        Subject {
            principals: vec![self.principal.clone()],
            private_credentials: self.private_credentials(),
            public_credentials: vec![
                format!("credential cache {}", self.ccache),
                format!("keytab {}", self.keytab),
            ],
        }
    }
}

/// An impersonated credential holding the S4U2Proxy ticket for `service`.
pub struct GssDelegated {
    cred: Cred,
    target: DelegationTarget,
    service: String,
}

impl GssDelegated {
    /// Copy the tickets into the credential cache `ccache`, e.g.
    /// `FILE:/tmp/x/krb5cc`, replacing what is there.
    pub fn store(&self, ccache: &str) -> Result<(), GssError> {
        let store = CredStore::new().with("ccache", ccache)?;
        self.cred
            .store_into(&store, CredUsage::Initiate, &GSS_MECH_KRB5, true)
    }
}

impl DelegatedCredential for GssDelegated {
    fn target(&self) -> &DelegationTarget {
        &self.target
    }

    fn service(&self) -> &str {
        &self.service
    }

    fn display_name(&self) -> String {
        self.cred
            .name()
            .and_then(|n| n.display_name())
            .unwrap_or_else(|_| self.target.to_string())
    }
}
