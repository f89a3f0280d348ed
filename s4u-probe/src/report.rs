//! Text rendering of identity material and connection metadata. Nothing in
//! here fails: a field that cannot be read becomes an error line in the
//! output.
use crate::{
    downstream::ConnectionMetadata,
    krb5::{KeyInfo, TicketInfo},
    subject::{CredentialInspect, Material, Subject},
};
use chrono::{DateTime, Utc};
use s4u_probe_sys::{GSS_C_ACCEPT, GSS_C_BOTH, GSS_C_INITIATE};

const NONE: &str = "-";

const INITIATE: i32 = GSS_C_INITIATE as i32;
const ACCEPT: i32 = GSS_C_ACCEPT as i32;
const BOTH: i32 = GSS_C_BOTH as i32;

/// RFC 4120 ticket flag names, indexed by flag number.
pub const TICKET_FLAG_NAMES: [&str; 14] = [
    "RESERVED",
    "FORWARDABLE",
    "FORWARDED",
    "PROXIABLE",
    "PROXY",
    "MAY_POSTDATE",
    "POSTDATED",
    "INVALID",
    "RENEWABLE",
    "INITIAL",
    "PRE_AUTHENT",
    "HW_AUTHENT",
    "TRANSITED_POLICY_CHECKED",
    "OK_AS_DELEGATE",
];

/// Names of the set flags, in order, separated by single spaces. Positions
/// past the end of either slice are ignored.
pub fn decode_flags(flags: &[bool], names: &[&str]) -> String {
    flags
        .iter()
        .zip(names)
        .filter(|(set, _)| **set)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn usage_label(usage: i32) -> &'static str {
    match usage {
        INITIATE => "Initiate Only",
        ACCEPT => "Accept Only",
        BOTH => "Initiate and Accept",
        _ => "Unknown",
    }
}

fn time_to_string(t: &Option<DateTime<Utc>>) -> String {
    match t {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => NONE.to_string(),
    }
}

fn ticket_lines(t: &TicketInfo, out: &mut Vec<String>) {
    out.push("     Kerberos Ticket Info:".into());
    out.push(format!("      - Client Principal: {}", t.client));
    out.push(format!("      - Server Principal: {}", t.server));
    out.push(format!("      - Start Time: {}", time_to_string(&t.start_time)));
    out.push(format!("      - End Time: {}", time_to_string(&t.end_time)));
    out.push(format!("      - Renew Until: {}", time_to_string(&t.renew_till)));
    out.push(format!(
        "      - Flags: {}",
        decode_flags(&t.flags.positions(), &TICKET_FLAG_NAMES)
    ));
}

fn key_lines(k: &KeyInfo, out: &mut Vec<String>) {
    out.push("     Kerberos Key Info:".into());
    out.push(format!("      - Principal: {}", k.principal));
    out.push(format!("      - Algorithm: {}", k.algorithm));
    out.push(format!("      - Key Version: {}", k.version));
}

fn credential_lines(c: &dyn CredentialInspect, out: &mut Vec<String>) {
    out.push("     GSS Credential Info:".into());
    let mut read = || -> Result<(), crate::error::InspectionError> {
        out.push(format!("      - Name: {}", c.name()?));
        let lifetime = match c.remaining_lifetime()? {
            Some(d) => format!("{} s", d.as_secs()),
            None => "indefinite".into(),
        };
        out.push(format!("      - Remaining Lifetime: {}", lifetime));
        out.push(format!("      - Usage: {}", usage_label(c.usage()?)));
        Ok(())
    };
    if let Err(e) = read() {
        out.push(format!("      - Error reading GSS Credential: {}", e));
    }
}

fn material_lines(m: &Material<'_>, out: &mut Vec<String>) {
    out.push(format!("   - {}", m.type_label()));
    match m {
        Material::Ticket(t) => ticket_lines(t, out),
        Material::Key(k) => key_lines(k, out),
        Material::Credential(c) => credential_lines(*c, out),
        Material::Unknown(_) => (),
    }
}

/// The subject dump: principals, then every private credential with its
/// details, then the public credentials.
pub fn render_subject(subject: &Subject<'_>) -> String {
    let mut out = vec![String::new(), "=== SUBJECT DEBUG INFO ===".to_string()];

    out.push(String::new());
    out.push(" Principals:".into());
    for p in &subject.principals {
        out.push(format!("   - {}", p));
    }

    out.push(String::new());
    out.push(" Private Credentials:".into());
    for item in &subject.private_credentials {
        match item {
            Ok(m) => material_lines(m, &mut out),
            Err(e) => out.push(format!("   - Error reading credential: {}", e)),
        }
    }

    out.push(String::new());
    out.push(" Public Credentials:".into());
    for c in &subject.public_credentials {
        out.push(format!("   - {}", c));
    }

    out.push(String::new());
    out.push("=================================".into());
    out.join("\n")
}

pub fn render_metadata(md: &ConnectionMetadata) -> String {
    [
        String::new(),
        "*** DRIVER AND DATABASE INFO ***".to_string(),
        format!("Driver version     = {}", md.driver_version),
        format!("Protocol major     = {}", md.protocol_major),
        format!("Protocol minor     = {}", md.protocol_minor),
        format!("DBMS product name  = {}", md.product_name),
        format!("DBMS product ver   = {}", md.product_version),
        format!("URL                = {}", md.url),
        format!("User               = {}", md.user),
    ]
    .join("\n")
}
