//! Safe wrappers around the parts of MIT GSS-API the probe calls: names,
//! credentials and their credential store extensions, S4U2Self
//! impersonation and the initiator side of a security context.
mod context;
mod credential;
mod error;
mod name;
mod oid;
mod util;

pub use context::{ClientCtx, CtxFlags};
pub use credential::{Cred, CredStore, CredUsage};
pub use error::GssError;
pub use name::Name;
pub use oid::{
    OidSet, Oid, GSS_MECH_KRB5, GSS_NT_HOSTBASED_SERVICE, GSS_NT_KRB5_PRINCIPAL,
    GSS_NT_USER_NAME,
};
pub use util::Buf;
