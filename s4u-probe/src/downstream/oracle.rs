//! Oracle Database over the Oracle client libraries, authenticated with
//! Kerberos from a staged credential cache.
use super::{Connection, ConnectionMetadata, DataClient};
use crate::{
    config::DownstreamTarget,
    error::{BoxError, ConnectionError},
    security::{DelegatedCredential, GssDelegated},
};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;
use tracing::{debug, info};

const CCACHE_FILE: &str = "krb5cc";
const SQLNET_ORA: &str = "sqlnet.ora";

/// Client side network configuration making the Oracle client use the
/// ticket cache at `ccache` and nothing else.
pub fn sqlnet_ora(target: &DownstreamTarget, ccache: &Path, krb5_conf: &Path) -> String {
    format!(
        "SQLNET.AUTHENTICATION_SERVICES = ({})\n\
         SQLNET.KERBEROS5_CC_NAME = {}\n\
         SQLNET.KERBEROS5_CONF = {}\n\
         SQLNET.KERBEROS5_CONF_MIT = TRUE\n\
         SQLNET.AUTHENTICATION_KERBEROS5_SERVICE = {}\n",
        target.authentication_services.join(", "),
        ccache.display(),
        krb5_conf.display(),
        target.kerberos_service,
    )
}

pub struct OracleClient {
    krb5_conf: PathBuf,
}

impl OracleClient {
    pub fn new(krb5_conf: &Path) -> Self {
        OracleClient {
            krb5_conf: krb5_conf.to_path_buf(),
        }
    }

    fn stage(
        &self,
        target: &DownstreamTarget,
        credential: &GssDelegated,
    ) -> Result<TempDir, ConnectionError> {
        let dir = tempfile::Builder::new()
            .prefix("s4u-probe-")
            .tempdir()
            .map_err(ConnectionError::Staging)?;
        let ccache = dir.path().join(CCACHE_FILE);
        credential
            .store(&format!("FILE:{}", ccache.display()))
            .map_err(|e| ConnectionError::StoreCredential(Box::new(e)))?;
        fs::write(
            dir.path().join(SQLNET_ORA),
            sqlnet_ora(target, &ccache, &self.krb5_conf),
        )
        .map_err(ConnectionError::Staging)?;
        debug!(dir = %dir.path().display(), "staged client configuration");
        Ok(dir)
    }
}

impl DataClient for OracleClient {
    type Credential = GssDelegated;
    type Connection = OracleSession;

    fn connect(
        &self,
        target: &DownstreamTarget,
        credential: GssDelegated,
    ) -> Result<OracleSession, ConnectionError> {
        // dropping the TempDir on any error below removes the staged files
        let staging = self.stage(target, &credential)?;
        env::set_var("TNS_ADMIN", staging.path());
        env::set_var(
            "KRB5CCNAME",
            format!("FILE:{}", staging.path().join(CCACHE_FILE).display()),
        );
        let url = target.url();
        info!(%url, user = %credential.display_name(), "connecting");
        let conn = ::oracle::Connector::new("", "", url.as_str())
            .external_auth(true)
            .connect()
            .map_err(|e| ConnectionError::Connect {
                url: url.clone(),
                source: Box::new(e),
            })?;
        Ok(OracleSession {
            conn,
            url,
            _staging: staging,
        })
    }
}

pub struct OracleSession {
    conn: ::oracle::Connection,
    url: String,
    _staging: TempDir,
}

impl Connection for OracleSession {
    fn metadata(&mut self) -> Result<ConnectionMetadata, BoxError> {
        let client = ::oracle::Version::client()?;
        let (server, banner) = self.conn.server_version()?;
        let user = self
            .conn
            .query_row_as::<String>("SELECT USER FROM DUAL", &[])?;
        Ok(ConnectionMetadata {
            driver_version: format!("Oracle client {}", client),
            protocol_major: client.major(),
            protocol_minor: client.minor(),
            product_name: "Oracle".to_string(),
            product_version: if banner.is_empty() {
                server.to_string()
            } else {
                banner
            },
            url: self.url.clone(),
            user,
        })
    }

    fn close(self) -> Result<(), BoxError> {
        self.conn.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlnet_ora_lists_configured_adapters() {
        let target = DownstreamTarget {
            host: "oracle.corp.internal".into(),
            port: 1521,
            service_name: "FREEPDB1".into(),
            kerberos_service: "oracle".into(),
            authentication_services: vec!["KERBEROS5PRE".into(), "KERBEROS5".into()],
        };
        let ora = sqlnet_ora(
            &target,
            Path::new("/tmp/s4u-probe-x/krb5cc"),
            Path::new("/etc/krb5.conf"),
        );
        assert!(ora.contains("SQLNET.AUTHENTICATION_SERVICES = (KERBEROS5PRE, KERBEROS5)\n"));
        assert!(ora.contains("SQLNET.KERBEROS5_CC_NAME = /tmp/s4u-probe-x/krb5cc\n"));
        assert!(ora.contains("SQLNET.KERBEROS5_CONF = /etc/krb5.conf\n"));
        assert!(ora.contains("SQLNET.AUTHENTICATION_KERBEROS5_SERVICE = oracle\n"));
    }
}
