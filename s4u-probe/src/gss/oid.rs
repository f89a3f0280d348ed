//! The handful of object identifiers the probe needs. They are BER encoded
//! and defined in RFC 2744 and RFC 1964.
use super::error::GssError;
use s4u_probe_sys::{
    gss_OID, gss_OID_set, gss_OID_set_desc, gss_add_oid_set_member,
    gss_create_empty_oid_set, gss_release_oid_set, OM_uint32, GSS_S_COMPLETE,
};
use std::{fmt, mem, ops::Deref, ptr, slice};

pub static GSS_NT_USER_NAME: Oid = Oid::from_slice(b"\x2a\x86\x48\x86\xf7\x12\x01\x02\x01\x01");

pub static GSS_NT_HOSTBASED_SERVICE: Oid =
    Oid::from_slice(b"\x2a\x86\x48\x86\xf7\x12\x01\x02\x01\x04");

pub static GSS_NT_KRB5_PRINCIPAL: Oid =
    Oid::from_slice(b"\x2a\x86\x48\x86\xf7\x12\x01\x02\x02\x01");

pub static GSS_MECH_KRB5: Oid = Oid::from_slice(b"\x2a\x86\x48\x86\xf7\x12\x01\x02\x02");

// mirrors gss_OID_desc, but with a const pointer, which is what the
// standard says the library will treat it as.
#[repr(C)]
pub struct Oid {
    length: u32,
    elements: *const u8,
}

unsafe impl Sync for Oid {}

impl Deref for Oid {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        unsafe { slice::from_raw_parts(self.elements, self.length as usize) }
    }
}

impl PartialEq for Oid {
    fn eq(&self, other: &Oid) -> bool {
        **self == **other
    }
}

impl Eq for Oid {}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self == &GSS_MECH_KRB5 {
            write!(f, "GSS_MECH_KRB5")
        } else {
            write!(f, "Oid({:02x?})", &**self)
        }
    }
}

impl Oid {
    pub(crate) fn to_c(&self) -> gss_OID {
        unsafe { mem::transmute::<*const Oid, gss_OID>(self as *const Oid) }
    }

    pub const fn from_slice(ber: &'static [u8]) -> Oid {
        Oid {
            length: ber.len() as u32,
            elements: ber.as_ptr(),
        }
    }
}

/// An owned set of mechanism oids.
pub struct OidSet(gss_OID_set);

impl Drop for OidSet {
    fn drop(&mut self) {
        if !self.0.is_null() {
            let mut minor = GSS_S_COMPLETE;
            let _major = unsafe {
                gss_release_oid_set(&mut minor as *mut OM_uint32, &mut self.0 as *mut gss_OID_set)
            };
        }
    }
}

impl OidSet {
    pub fn new() -> Result<OidSet, GssError> {
        let mut minor = GSS_S_COMPLETE;
        let mut out = ptr::null_mut::<gss_OID_set_desc>();
        let major = unsafe {
            gss_create_empty_oid_set(&mut minor as *mut OM_uint32, &mut out as *mut gss_OID_set)
        };
        GssError::check(major, minor)?;
        Ok(OidSet(out))
    }

    /// The set everything in the probe asks for: Kerberos 5 only.
    pub fn krb5() -> Result<OidSet, GssError> {
        let mut s = OidSet::new()?;
        s.add(&GSS_MECH_KRB5)?;
        Ok(s)
    }

    pub fn add(&mut self, id: &Oid) -> Result<(), GssError> {
        let mut minor = GSS_S_COMPLETE;
        let major = unsafe {
            gss_add_oid_set_member(
                &mut minor as *mut OM_uint32,
                id.to_c(),
                &mut self.0 as *mut gss_OID_set,
            )
        };
        GssError::check(major, minor)
    }

    pub(crate) fn to_c(&self) -> gss_OID_set {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn krb5_mechanism_encoding() {
        assert_eq!(
            &*GSS_MECH_KRB5,
            &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x02][..]
        );
        assert_eq!(format!("{:?}", GSS_MECH_KRB5), "GSS_MECH_KRB5");
    }

    #[test]
    fn name_types_are_distinct() {
        assert_ne!(GSS_NT_USER_NAME, GSS_NT_HOSTBASED_SERVICE);
        assert_ne!(GSS_NT_KRB5_PRINCIPAL, GSS_MECH_KRB5);
    }
}
