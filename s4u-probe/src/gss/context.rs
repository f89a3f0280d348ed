use super::{
    credential::{Cred, INDEFINITE},
    error::{GssError, GSS_S_CONTINUE_NEEDED},
    name::Name,
    oid::GSS_MECH_KRB5,
    util::{Buf, BufRef},
};
use bitflags::bitflags;
use s4u_probe_sys::{
    gss_OID, gss_buffer_desc, gss_channel_bindings_struct, gss_ctx_id_struct, gss_ctx_id_t,
    gss_delete_sec_context, gss_init_sec_context, OM_uint32, GSS_C_ANON_FLAG,
    GSS_C_CONF_FLAG, GSS_C_DELEG_FLAG, GSS_C_DELEG_POLICY_FLAG, GSS_C_INTEG_FLAG,
    GSS_C_MUTUAL_FLAG, GSS_C_PROT_READY_FLAG, GSS_C_REPLAY_FLAG, GSS_C_SEQUENCE_FLAG,
    GSS_C_TRANS_FLAG, GSS_S_COMPLETE,
};
use std::ptr;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CtxFlags: u32 {
        const GSS_C_DELEG_FLAG = GSS_C_DELEG_FLAG;
        const GSS_C_MUTUAL_FLAG = GSS_C_MUTUAL_FLAG;
        const GSS_C_REPLAY_FLAG = GSS_C_REPLAY_FLAG;
        const GSS_C_SEQUENCE_FLAG = GSS_C_SEQUENCE_FLAG;
        const GSS_C_CONF_FLAG = GSS_C_CONF_FLAG;
        const GSS_C_INTEG_FLAG = GSS_C_INTEG_FLAG;
        const GSS_C_ANON_FLAG = GSS_C_ANON_FLAG;
        const GSS_C_PROT_READY_FLAG = GSS_C_PROT_READY_FLAG;
        const GSS_C_TRANS_FLAG = GSS_C_TRANS_FLAG;
        const GSS_C_DELEG_POLICY_FLAG = GSS_C_DELEG_POLICY_FLAG;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninit,
    Partial,
    Complete,
}

/// The initiating side of a krb5 security context. The probe never
/// finishes the handshake; the first step is what makes the library fetch
/// a service ticket for `target` with the given credential, which for an
/// impersonated credential is the S4U2Proxy exchange.
pub struct ClientCtx<'a> {
    ctx: gss_ctx_id_t,
    cred: &'a Cred,
    target: &'a Name,
    flags: CtxFlags,
    state: State,
}

impl<'a> Drop for ClientCtx<'a> {
    fn drop(&mut self) {
        if !self.ctx.is_null() {
            let mut minor = GSS_S_COMPLETE;
            let _major = unsafe {
                gss_delete_sec_context(
                    &mut minor as *mut OM_uint32,
                    &mut self.ctx as *mut gss_ctx_id_t,
                    ptr::null_mut::<gss_buffer_desc>(),
                )
            };
        }
    }
}

impl<'a> ClientCtx<'a> {
    pub fn new(cred: &'a Cred, target: &'a Name, flags: CtxFlags) -> ClientCtx<'a> {
        ClientCtx {
            ctx: ptr::null_mut::<gss_ctx_id_struct>(),
            cred,
            target,
            flags,
            state: State::Uninit,
        }
    }

    /// Run one step of the handshake. Returns the token to send to the
    /// acceptor, or `None` once the context is complete.
    pub fn step(&mut self, tok: Option<&[u8]>) -> Result<Option<Buf>, GssError> {
        if self.state == State::Complete {
            return Ok(None);
        }
        let mut minor = GSS_S_COMPLETE;
        let mut tok = tok.map(BufRef::from);
        let mut out_tok = Buf::empty();
        let major = unsafe {
            gss_init_sec_context(
                &mut minor as *mut OM_uint32,
                self.cred.to_c(),
                &mut self.ctx as *mut gss_ctx_id_t,
                self.target.to_c(),
                GSS_MECH_KRB5.to_c(),
                self.flags.bits(),
                INDEFINITE,
                ptr::null_mut::<gss_channel_bindings_struct>(),
                match tok {
                    None => ptr::null_mut::<gss_buffer_desc>(),
                    Some(ref mut tok) => tok.to_c(),
                },
                ptr::null_mut::<gss_OID>(),
                out_tok.to_c(),
                ptr::null_mut::<OM_uint32>(),
                ptr::null_mut::<OM_uint32>(),
            )
        };
        GssError::check(major, minor)?;
        if major & GSS_S_CONTINUE_NEEDED > 0 {
            self.state = State::Partial;
            Ok(Some(out_tok))
        } else {
            self.state = State::Complete;
            if out_tok.is_empty() {
                Ok(None)
            } else {
                Ok(Some(out_tok))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutual_and_delegation_bits() {
        let flags = CtxFlags::GSS_C_MUTUAL_FLAG | CtxFlags::GSS_C_DELEG_FLAG;
        assert_eq!(flags.bits(), 0x2 | 0x1);
        assert!(!flags.contains(CtxFlags::GSS_C_CONF_FLAG));
    }
}
