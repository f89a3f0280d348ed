//! What a service identity holds, as input to the subject report.
use crate::{
    error::InspectionError,
    gss::Cred,
};
use std::time::Duration;

pub use crate::krb5::{KeyInfo, TicketFlags, TicketInfo};

/// Read access to a GSS-API style credential. Every read may fail on its
/// own.
pub trait CredentialInspect {
    fn type_label(&self) -> &str;
    fn name(&self) -> Result<String, InspectionError>;
    /// `None` for an indefinite lifetime.
    fn remaining_lifetime(&self) -> Result<Option<Duration>, InspectionError>;
    /// The raw usage constant.
    fn usage(&self) -> Result<i32, InspectionError>;
}

impl CredentialInspect for Cred {
    fn type_label(&self) -> &str {
        "GSS-API credential (krb5)"
    }

    fn name(&self) -> Result<String, InspectionError> {
        Ok(Cred::name(self)?.display_name()?)
    }

    fn remaining_lifetime(&self) -> Result<Option<Duration>, InspectionError> {
        Ok(self.lifetime()?)
    }

    fn usage(&self) -> Result<i32, InspectionError> {
        Ok(Cred::usage(self)?)
    }
}

/// One private credential item.
pub enum Material<'a> {
    Ticket(TicketInfo),
    Key(KeyInfo),
    Credential(&'a dyn CredentialInspect),
    /// Something we can only name.
    Unknown(String),
}

impl<'a> Material<'a> {
    pub fn type_label(&self) -> &str {
        match self {
            Material::Ticket(_) => "Kerberos ticket",
            Material::Key(_) => "Kerberos key",
            Material::Credential(c) => c.type_label(),
            Material::Unknown(label) => label.as_str(),
        }
    }
}

/// A snapshot of the identity material held by a service identity.
#[derive(Default)]
pub struct Subject<'a> {
    pub principals: Vec<String>,
    pub private_credentials: Vec<Result<Material<'a>, InspectionError>>,
    pub public_credentials: Vec<String>,
}
