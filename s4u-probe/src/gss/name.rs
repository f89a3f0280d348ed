use super::{
    error::GssError,
    oid::Oid,
    util::{Buf, BufRef},
};
use s4u_probe_sys::{
    gss_OID, gss_OID_desc, gss_display_name, gss_import_name, gss_name_struct, gss_name_t,
    gss_release_name, OM_uint32, GSS_S_COMPLETE,
};
use std::{fmt, ptr};

/// A gssapi internal name.
pub struct Name(gss_name_t);

impl Drop for Name {
    fn drop(&mut self) {
        if !self.0.is_null() {
            let mut minor = GSS_S_COMPLETE;
            let _major = unsafe {
                gss_release_name(&mut minor as *mut OM_uint32, &mut self.0 as *mut gss_name_t)
            };
        }
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.display_name() {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "<name can't be displayed>"),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Name {
    pub(crate) unsafe fn to_c(&self) -> gss_name_t {
        self.0
    }

    pub(crate) unsafe fn from_c(ptr: gss_name_t) -> Self {
        Name(ptr)
    }

    /// Import `s` as a name of type `kind`, e.g. `GSS_NT_USER_NAME` for the
    /// user to impersonate or `GSS_NT_HOSTBASED_SERVICE` for `service@host`.
    pub fn new(s: &[u8], kind: &Oid) -> Result<Self, GssError> {
        let mut buf = BufRef::from(s);
        let mut minor = GSS_S_COMPLETE;
        let mut name = ptr::null_mut::<gss_name_struct>();
        let major = unsafe {
            gss_import_name(
                &mut minor as *mut OM_uint32,
                buf.to_c(),
                kind.to_c(),
                &mut name as *mut gss_name_t,
            )
        };
        GssError::check(major, minor)?;
        Ok(Name(name))
    }

    /// gss_display_name, decoded lossily.
    pub fn display_name(&self) -> Result<String, GssError> {
        let mut out = Buf::empty();
        let mut minor = GSS_S_COMPLETE;
        let mut oid = ptr::null_mut::<gss_OID_desc>();
        let major = unsafe {
            gss_display_name(
                &mut minor as *mut OM_uint32,
                self.to_c(),
                out.to_c(),
                &mut oid as *mut gss_OID,
            )
        };
        GssError::check(major, minor)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}
