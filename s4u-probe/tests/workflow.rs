use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use s4u_probe::config::{DelegationTarget, DownstreamTarget, LoginProfile, Overrides, Settings};
use s4u_probe::downstream::{Connection, ConnectionMetadata, DataClient};
use s4u_probe::error::{
    AuthenticationError, BoxError, ConfigError, ConnectionError, DelegationError, Error,
};
use s4u_probe::security::{DelegatedCredential, SecuritySubsystem, ServiceIdentity};
use s4u_probe::subject::{Material, Subject};
use s4u_probe::workflow;
use tempfile::TempDir;

struct Identity {
    principal: String,
}

impl ServiceIdentity for Identity {
    fn principal(&self) -> &str {
        &self.principal
    }

    fn subject(&self) -> Subject<'_> {
        Subject {
            principals: vec![self.principal.clone()],
            private_credentials: vec![Ok(Material::Unknown("mock ticket".into()))],
            public_credentials: vec![],
        }
    }
}

struct Delegated {
    target: DelegationTarget,
    service: String,
}

impl DelegatedCredential for Delegated {
    fn target(&self) -> &DelegationTarget {
        &self.target
    }

    fn service(&self) -> &str {
        &self.service
    }

    fn display_name(&self) -> String {
        format!("{}@CORP.INTERNAL", self.target)
    }
}

#[derive(Default)]
struct Security {
    deny_delegation: bool,
    calls: RefCell<Vec<&'static str>>,
}

impl SecuritySubsystem for Security {
    type Identity = Identity;
    type Credential = Delegated;

    fn login(&self, profile: &LoginProfile, _keytab: &Path) -> Result<Identity, AuthenticationError> {
        self.calls.borrow_mut().push("login");
        Ok(Identity {
            principal: profile.principal.clone(),
        })
    }

    fn impersonate(
        &self,
        _identity: &Identity,
        target: &DelegationTarget,
        service: &str,
    ) -> Result<Delegated, DelegationError> {
        self.calls.borrow_mut().push("impersonate");
        if self.deny_delegation {
            return Err(DelegationError::Proxy {
                target: target.to_string(),
                service: service.to_string(),
                source: "KDC policy rejects request".into(),
            });
        }
        Ok(Delegated {
            target: target.clone(),
            service: service.to_string(),
        })
    }
}

/// Stands in for whatever a client sets up before the network is touched.
struct Allocation(Rc<Cell<u32>>);

impl Drop for Allocation {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

struct Session {
    user: String,
    metadata_fails: bool,
    closed: Rc<Cell<u32>>,
    _allocation: Allocation,
}

impl Connection for Session {
    fn metadata(&mut self) -> Result<ConnectionMetadata, BoxError> {
        if self.metadata_fails {
            return Err("ORA-03113: end-of-file on communication channel".into());
        }
        Ok(ConnectionMetadata {
            driver_version: "mock 1.0".into(),
            protocol_major: 1,
            protocol_minor: 0,
            product_name: "Oracle".into(),
            product_version: "Oracle Database 23ai Free".into(),
            url: "//oracle.corp.internal:1521/FREEPDB1".into(),
            user: self.user.clone(),
        })
    }

    fn close(self) -> Result<(), BoxError> {
        self.closed.set(self.closed.get() + 1);
        Ok(())
    }
}

#[derive(Default)]
struct Client {
    unreachable: bool,
    metadata_fails: bool,
    connects: Cell<u32>,
    closed: Rc<Cell<u32>>,
    released: Rc<Cell<u32>>,
}

impl DataClient for Client {
    type Credential = Delegated;
    type Connection = Session;

    fn connect(
        &self,
        target: &DownstreamTarget,
        credential: Delegated,
    ) -> Result<Session, ConnectionError> {
        self.connects.set(self.connects.get() + 1);
        let allocation = Allocation(self.released.clone());
        if self.unreachable {
            return Err(ConnectionError::Connect {
                url: target.url(),
                source: "ORA-12541: no listener".into(),
            });
        }
        Ok(Session {
            user: credential.target().as_str().to_uppercase(),
            metadata_fails: self.metadata_fails,
            closed: self.closed.clone(),
            _allocation: allocation,
        })
    }
}

struct Lab {
    _dir: TempDir,
    settings: Settings,
}

fn lab(profile: &str, extra_delegation: &str) -> Lab {
    let dir = TempDir::new().unwrap();
    let keytab = dir.path().join("webapp.keytab");
    fs::write(&keytab, b"\x05\x02").unwrap();
    let login = dir.path().join("login.toml");
    fs::write(
        &login,
        "[constrained_delegation]\nprincipal = \"webappuser@CORP.INTERNAL\"\n\n\
         [broken]\nprincipal = \"\"\n\n\
         [elsewhere]\nprincipal = \"svc@CORP.INTERNAL\"\nkeytab = \"/nonexistent/svc.keytab\"\n",
    )
    .unwrap();
    let toml = format!(
        r#"
        keytab = "{}"
        krb5_conf = "/etc/krb5.conf"
        login_config = "{}"
        profile = "{}"

        [delegation]
        target_user = "winuser"
        {}

        [downstream]
        host = "oracle.corp.internal"
        service_name = "FREEPDB1"
        "#,
        keytab.display(),
        login.display(),
        profile,
        extra_delegation,
    );
    let settings = Settings::from_toml(&toml, Overrides::default()).unwrap();
    Lab {
        _dir: dir,
        settings,
    }
}

fn run(lab: &Lab, security: &Security, client: &Client) -> (Result<(), Error>, String) {
    let mut out = Vec::new();
    let res = workflow::run(&lab.settings, security, client, &mut out);
    (res, String::from_utf8(out).unwrap())
}

#[test]
fn scenario_a_everything_works() {
    let lab = lab("constrained_delegation", "");
    let security = Security::default();
    let client = Client::default();
    let (res, out) = run(&lab, &security, &client);
    assert!(res.is_ok(), "{res:?}");
    assert!(out.contains("=== Step 1: Authenticating profile constrained_delegation via keytab ==="));
    assert!(out.contains("   - webappuser@CORP.INTERNAL"));
    assert!(out.contains("   - mock ticket"));
    assert!(out.contains("Impersonated credential: winuser@CORP.INTERNAL"));
    assert!(out.contains("User               = WINUSER"));
    assert!(out.contains("=== Constrained delegation test PASSED ==="));
    assert_eq!(*security.calls.borrow(), vec!["login", "impersonate"]);
    assert_eq!(client.connects.get(), 1);
    assert_eq!(client.closed.get(), 1);
    assert_eq!(client.released.get(), 1);
}

#[test]
fn scenario_b_missing_profile() {
    let lab = lab("no_such_profile", "");
    let security = Security::default();
    let client = Client::default();
    let (res, out) = run(&lab, &security, &client);
    assert!(matches!(
        res,
        Err(Error::Authentication(AuthenticationError::ProfileNotFound { ref profile, .. }))
            if profile == "no_such_profile"
    ));
    assert!(security.calls.borrow().is_empty());
    assert_eq!(client.connects.get(), 0);
    assert!(!out.contains("PASSED"));
}

#[test]
fn scenario_b_misconfigured_profile() {
    let lab = lab("broken", "");
    let security = Security::default();
    let client = Client::default();
    let (res, _) = run(&lab, &security, &client);
    assert!(matches!(
        res,
        Err(Error::Authentication(AuthenticationError::Misconfigured { .. }))
    ));
    assert!(security.calls.borrow().is_empty());
    assert_eq!(client.connects.get(), 0);
}

#[test]
fn scenario_b_missing_keytab() {
    let lab = lab("elsewhere", "");
    let security = Security::default();
    let client = Client::default();
    let (res, _) = run(&lab, &security, &client);
    assert!(matches!(
        res,
        Err(Error::Authentication(AuthenticationError::KeytabMissing(ref p)))
            if p == Path::new("/nonexistent/svc.keytab")
    ));
    assert!(security.calls.borrow().is_empty());
}

#[test]
fn scenario_c_delegation_denied() {
    let lab = lab("constrained_delegation", "");
    let security = Security {
        deny_delegation: true,
        ..Security::default()
    };
    let client = Client::default();
    let (res, out) = run(&lab, &security, &client);
    assert!(matches!(
        res,
        Err(Error::Delegation(DelegationError::Proxy { ref service, .. }))
            if service == "oracle@oracle.corp.internal"
    ));
    assert_eq!(*security.calls.borrow(), vec!["login", "impersonate"]);
    assert_eq!(client.connects.get(), 0);
    assert!(!out.contains("Impersonated credential"));
}

#[test]
fn scenario_d_unreachable_host() {
    let lab = lab("constrained_delegation", "");
    let security = Security::default();
    let client = Client {
        unreachable: true,
        ..Client::default()
    };
    let (res, out) = run(&lab, &security, &client);
    assert!(matches!(
        res,
        Err(Error::Connection(ConnectionError::Connect { .. }))
    ));
    assert_eq!(client.connects.get(), 1);
    assert_eq!(client.released.get(), 1);
    assert_eq!(client.closed.get(), 0);
    assert!(!out.contains("PASSED"));
}

#[test]
fn scenario_d_metadata_failure_closes_once() {
    let lab = lab("constrained_delegation", "");
    let security = Security::default();
    let client = Client {
        metadata_fails: true,
        ..Client::default()
    };
    let (res, _) = run(&lab, &security, &client);
    assert!(matches!(
        res,
        Err(Error::Connection(ConnectionError::Metadata(_)))
    ));
    assert_eq!(client.closed.get(), 1);
    assert_eq!(client.released.get(), 1);
}

#[test]
fn credential_for_another_service_is_refused() {
    let lab = lab("constrained_delegation", "service = \"HTTP@webapp.corp.internal\"");
    let security = Security::default();
    let client = Client::default();
    let (res, _) = run(&lab, &security, &client);
    match res {
        Err(Error::Connection(ConnectionError::CredentialScope { granted, requested })) => {
            assert_eq!(granted, "HTTP@webapp.corp.internal");
            assert_eq!(requested, "oracle@oracle.corp.internal");
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(client.connects.get(), 0);
}

#[test]
fn missing_login_config_fails_authentication() {
    let mut lab = lab("constrained_delegation", "");
    lab.settings.login_config = lab.settings.login_config.with_file_name("absent.toml");
    let security = Security::default();
    let client = Client::default();
    let (res, out) = run(&lab, &security, &client);
    assert!(matches!(
        res,
        Err(Error::Authentication(AuthenticationError::LoginConfig(ConfigError::Io { .. })))
    ));
    assert!(out.contains("=== Step 1:"));
    assert!(security.calls.borrow().is_empty());
}

#[test]
fn scenario_b_unknown_key_in_profile() {
    let lab = lab("constrained_delegation", "");
    fs::write(
        &lab.settings.login_config,
        "[constrained_delegation]\nprincpal = \"webappuser@CORP.INTERNAL\"\n",
    )
    .unwrap();
    let security = Security::default();
    let client = Client::default();
    let (res, _) = run(&lab, &security, &client);
    assert!(matches!(
        res,
        Err(Error::Authentication(AuthenticationError::LoginConfig(ConfigError::Parse { .. })))
    ));
    assert!(security.calls.borrow().is_empty());
    assert_eq!(client.connects.get(), 0);
}

#[test]
fn keytab_named_with_file_residual() {
    let mut lab = lab("constrained_delegation", "");
    lab.settings.keytab = format!("FILE:{}", lab.settings.keytab.display()).into();
    let security = Security::default();
    let client = Client::default();
    let (res, _) = run(&lab, &security, &client);
    assert!(res.is_ok(), "{res:?}");
    assert_eq!(*security.calls.borrow(), vec!["login", "impersonate"]);
}
