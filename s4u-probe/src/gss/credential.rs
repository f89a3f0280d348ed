use super::{
    error::GssError,
    name::Name,
    oid::{Oid, OidSet},
};
use s4u_probe_sys::{
    gss_OID_set, gss_acquire_cred_from, gss_acquire_cred_impersonate_name,
    gss_cred_id_struct, gss_cred_id_t, gss_cred_usage_t, gss_inquire_cred,
    gss_key_value_element_desc, gss_key_value_set_desc, gss_name_struct, gss_name_t,
    gss_release_cred, gss_store_cred_into, OM_uint32, GSS_C_ACCEPT, GSS_C_BOTH,
    GSS_C_INITIATE, GSS_S_COMPLETE,
};
use std::{ffi::CString, fmt, ptr, time::Duration};

/// `GSS_C_INDEFINITE`, both as a request and as a returned lifetime.
pub(super) const INDEFINITE: OM_uint32 = 0xffff_ffff;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredUsage {
    Accept,
    Initiate,
    Both,
}

impl CredUsage {
    fn to_c(self) -> gss_cred_usage_t {
        let usage = match self {
            CredUsage::Both => GSS_C_BOTH,
            CredUsage::Initiate => GSS_C_INITIATE,
            CredUsage::Accept => GSS_C_ACCEPT,
        };
        usage as gss_cred_usage_t
    }
}

/// Key/value pairs handed to the `*_from`/`*_into` credential store
/// extensions, e.g. `client_keytab` and `ccache`.
#[derive(Debug, Default)]
pub struct CredStore(Vec<(CString, CString)>);

impl CredStore {
    pub fn new() -> Self {
        CredStore(Vec::new())
    }

    /// Add an element. Fails if either side contains a NUL byte.
    pub fn with(mut self, key: &str, value: &str) -> Result<Self, GssError> {
        let key = CString::new(key).map_err(|_| GssError::failure())?;
        let value = CString::new(value).map_err(|_| GssError::failure())?;
        self.0.push((key, value));
        Ok(self)
    }

    fn elements(&self) -> Vec<gss_key_value_element_desc> {
        self.0
            .iter()
            .map(|(k, v)| gss_key_value_element_desc {
                key: k.as_ptr(),
                value: v.as_ptr(),
            })
            .collect()
    }
}

/// gssapi credentials.
pub struct Cred(gss_cred_id_t);

impl Drop for Cred {
    fn drop(&mut self) {
        if !self.0.is_null() {
            let mut minor = GSS_S_COMPLETE;
            let _major = unsafe {
                gss_release_cred(&mut minor as *mut OM_uint32, &mut self.0 as *mut gss_cred_id_t)
            };
        }
    }
}

impl fmt::Debug for Cred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Err(e) => write!(f, "Cred(<{}>)", e),
            Ok(name) => write!(f, "Cred({})", name),
        }
    }
}

impl Cred {
    /// Acquire credentials for `name` from an explicit credential store
    /// instead of the process defaults. With `client_keytab` in the store
    /// and an empty `ccache` the library gets initial tickets from the
    /// keytab on first use.
    pub fn acquire_from(
        name: &Name,
        usage: CredUsage,
        desired_mechs: &OidSet,
        store: &CredStore,
    ) -> Result<Cred, GssError> {
        let mut elements = store.elements();
        let store = gss_key_value_set_desc {
            count: elements.len() as OM_uint32,
            elements: elements.as_mut_ptr(),
        };
        let mut minor = GSS_S_COMPLETE;
        let mut cred = ptr::null_mut::<gss_cred_id_struct>();
        let major = unsafe {
            gss_acquire_cred_from(
                &mut minor as *mut OM_uint32,
                name.to_c(),
                INDEFINITE,
                desired_mechs.to_c(),
                usage.to_c(),
                &store,
                &mut cred as *mut gss_cred_id_t,
                ptr::null_mut::<gss_OID_set>(),
                ptr::null_mut::<OM_uint32>(),
            )
        };
        GssError::check(major, minor)?;
        Ok(Cred(cred))
    }

    /// Ask the kdc for a ticket to ourselves on behalf of `name`
    /// (S4U2Self). The returned credential carries our own ticket as
    /// evidence, so it can later be used for S4U2Proxy.
    pub fn impersonate(
        &self,
        name: &Name,
        usage: CredUsage,
        desired_mechs: &OidSet,
    ) -> Result<Cred, GssError> {
        let mut minor = GSS_S_COMPLETE;
        let mut cred = ptr::null_mut::<gss_cred_id_struct>();
        let major = unsafe {
            gss_acquire_cred_impersonate_name(
                &mut minor as *mut OM_uint32,
                self.0,
                name.to_c(),
                INDEFINITE,
                desired_mechs.to_c(),
                usage.to_c(),
                &mut cred as *mut gss_cred_id_t,
                ptr::null_mut::<gss_OID_set>(),
                ptr::null_mut::<OM_uint32>(),
            )
        };
        GssError::check(major, minor)?;
        Ok(Cred(cred))
    }

    /// Write the tickets held by this credential into the store, e.g.
    /// `ccache = FILE:/tmp/x`.
    pub fn store_into(
        &self,
        store: &CredStore,
        usage: CredUsage,
        desired_mech: &Oid,
        overwrite: bool,
    ) -> Result<(), GssError> {
        let mut elements = store.elements();
        let store = gss_key_value_set_desc {
            count: elements.len() as OM_uint32,
            elements: elements.as_mut_ptr(),
        };
        let mut minor = GSS_S_COMPLETE;
        let major = unsafe {
            gss_store_cred_into(
                &mut minor as *mut OM_uint32,
                self.0,
                usage.to_c(),
                desired_mech.to_c(),
                overwrite as OM_uint32,
                0,
                &store,
                ptr::null_mut::<gss_OID_set>(),
                ptr::null_mut::<gss_cred_usage_t>(),
            )
        };
        GssError::check(major, minor)
    }

    pub(crate) unsafe fn to_c(&self) -> gss_cred_id_t {
        self.0
    }

    /// The name associated with this credential.
    pub fn name(&self) -> Result<Name, GssError> {
        let mut minor = GSS_S_COMPLETE;
        let mut name = ptr::null_mut::<gss_name_struct>();
        let major = unsafe {
            gss_inquire_cred(
                &mut minor as *mut OM_uint32,
                self.0,
                &mut name as *mut gss_name_t,
                ptr::null_mut::<OM_uint32>(),
                ptr::null_mut::<gss_cred_usage_t>(),
                ptr::null_mut::<gss_OID_set>(),
            )
        };
        // on failure the library may still have handed us a name
        let name = unsafe { Name::from_c(name) };
        GssError::check(major, minor)?;
        Ok(name)
    }

    /// Remaining lifetime, `None` when the library reports it as
    /// indefinite. For keytab backed credentials this is also the call
    /// that makes the library fetch the initial ticket.
    pub fn lifetime(&self) -> Result<Option<Duration>, GssError> {
        let mut minor = GSS_S_COMPLETE;
        let mut lifetime: OM_uint32 = 0;
        let major = unsafe {
            gss_inquire_cred(
                &mut minor as *mut OM_uint32,
                self.0,
                ptr::null_mut::<gss_name_t>(),
                &mut lifetime as *mut OM_uint32,
                ptr::null_mut::<gss_cred_usage_t>(),
                ptr::null_mut::<gss_OID_set>(),
            )
        };
        GssError::check(major, minor)?;
        Ok(if lifetime == INDEFINITE {
            None
        } else {
            Some(Duration::from_secs(u64::from(lifetime)))
        })
    }

    /// The raw `gss_cred_usage_t`. Left raw so the caller decides how to
    /// present values it does not know.
    pub fn usage(&self) -> Result<i32, GssError> {
        let mut minor = GSS_S_COMPLETE;
        let mut usage: gss_cred_usage_t = 0;
        let major = unsafe {
            gss_inquire_cred(
                &mut minor as *mut OM_uint32,
                self.0,
                ptr::null_mut::<gss_name_t>(),
                ptr::null_mut::<OM_uint32>(),
                &mut usage as *mut gss_cred_usage_t,
                ptr::null_mut::<gss_OID_set>(),
            )
        };
        GssError::check(major, minor)?;
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_constants() {
        assert_eq!(CredUsage::Both.to_c(), 0);
        assert_eq!(CredUsage::Initiate.to_c(), 1);
        assert_eq!(CredUsage::Accept.to_c(), 2);
    }

    #[test]
    fn cred_store_rejects_nul() {
        assert!(CredStore::new().with("ccache", "MEMORY:x").is_ok());
        assert!(CredStore::new().with("ccache", "MEM\0ORY").is_err());
    }
}
