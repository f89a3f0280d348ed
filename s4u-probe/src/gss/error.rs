use super::util::Buf;
use s4u_probe_sys::{
    gss_OID_desc, gss_display_status, OM_uint32, GSS_C_GSS_CODE, GSS_C_MECH_CODE,
    GSS_S_COMPLETE,
};
use std::{error, fmt, ptr};

/// Calling errors live in the top byte of a major status, routine errors in
/// the next one (RFC 2744 section 3.9.1).
const CALLING_ERROR_MASK: OM_uint32 = 0xff00_0000;
const ROUTINE_ERROR_MASK: OM_uint32 = 0x00ff_0000;
pub(crate) const GSS_S_CONTINUE_NEEDED: OM_uint32 = 1;
pub(crate) const GSS_S_FAILURE: OM_uint32 = 13 << 16;

pub(crate) fn gss_error(major: OM_uint32) -> OM_uint32 {
    major & (CALLING_ERROR_MASK | ROUTINE_ERROR_MASK)
}

/// A failed GSS-API call: the major status word and the mechanism
/// specific minor status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GssError {
    pub major: u32,
    pub minor: u32,
}

impl GssError {
    pub fn new(major: u32, minor: u32) -> Self {
        GssError { major, minor }
    }

    /// `GSS_S_FAILURE` with no minor code, for failures detected on our
    /// side of the api.
    pub fn failure() -> Self {
        GssError::new(GSS_S_FAILURE, 0)
    }

    pub(crate) fn check(major: OM_uint32, minor: OM_uint32) -> Result<(), GssError> {
        if gss_error(major) > 0 {
            Err(GssError::new(major, minor))
        } else {
            Ok(())
        }
    }

    fn messages(code: u32, kind: u32) -> Vec<String> {
        let mut out = Vec::new();
        let mut message_context: OM_uint32 = 0;
        loop {
            let mut minor = GSS_S_COMPLETE;
            let mut buf = Buf::empty();
            let major = unsafe {
                gss_display_status(
                    &mut minor as *mut OM_uint32,
                    code,
                    kind as i32,
                    ptr::null_mut::<gss_OID_desc>(),
                    &mut message_context as *mut OM_uint32,
                    buf.to_c(),
                )
            };
            if major != GSS_S_COMPLETE {
                out.push(format!("unknown status code {}", code));
                break;
            }
            out.push(String::from_utf8_lossy(&buf).into_owned());
            if message_context == 0 {
                break;
            }
        }
        out
    }
}

impl fmt::Display for GssError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let major = GssError::messages(self.major, GSS_C_GSS_CODE);
        write!(f, "gssapi major error: {}", major.join("; "))?;
        if self.minor != 0 {
            let minor = GssError::messages(self.minor, GSS_C_MECH_CODE);
            write!(f, ", minor error: {}", minor.join("; "))?;
        }
        Ok(())
    }
}

impl error::Error for GssError {}
