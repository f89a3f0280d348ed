//! Read-only access to the libkrb5 credential cache and keytab the
//! service identity was built from. Only used to feed the subject report.
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use s4u_probe_sys::{
    krb5_cc_close, krb5_cc_cursor, krb5_cc_end_seq_get,
    krb5_cc_next_cred, krb5_cc_resolve, krb5_cc_start_seq_get, krb5_ccache, krb5_context,
    krb5_creds, krb5_enctype, krb5_enctype_to_name, krb5_error_code, krb5_free_context,
    krb5_free_cred_contents, krb5_free_error_message, krb5_free_keytab_entry_contents,
    krb5_free_unparsed_name, krb5_get_error_message, krb5_init_context,
    krb5_is_config_principal, krb5_keytab, krb5_keytab_entry, krb5_kt_close,
    krb5_kt_cursor, krb5_kt_end_seq_get, krb5_kt_next_entry, krb5_kt_resolve,
    krb5_kt_start_seq_get, krb5_principal, krb5_unparse_name,
};
use std::{
    error,
    ffi::{CStr, CString},
    fmt, mem,
    os::raw::c_char,
    ptr,
};

/// End of sequence markers from the krb5 error table.
const KRB5_CC_END: krb5_error_code = -1_765_328_242;
const KRB5_KT_END: krb5_error_code = -1_765_328_202;

bitflags! {
    /// Ticket flags as libkrb5 stores them: RFC 4120 flag `n` is bit
    /// `31 - n` of the word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TicketFlags: u32 {
        const FORWARDABLE = 0x4000_0000;
        const FORWARDED = 0x2000_0000;
        const PROXIABLE = 0x1000_0000;
        const PROXY = 0x0800_0000;
        const MAY_POSTDATE = 0x0400_0000;
        const POSTDATED = 0x0200_0000;
        const INVALID = 0x0100_0000;
        const RENEWABLE = 0x0080_0000;
        const INITIAL = 0x0040_0000;
        const PRE_AUTH = 0x0020_0000;
        const HW_AUTH = 0x0010_0000;
        const TRANSIT_POLICY_CHECKED = 0x0008_0000;
        const OK_AS_DELEGATE = 0x0004_0000;
        const _ = !0;
    }
}

impl TicketFlags {
    /// One boolean per flag position, most significant bit first, so index
    /// `n` is RFC 4120 flag `n`.
    pub fn positions(self) -> Vec<bool> {
        (0..32).map(|i| self.bits() & (0x8000_0000 >> i) != 0).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Krb5Error {
    pub code: i32,
    pub message: String,
}

impl fmt::Display for Krb5Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "krb5 error {}: {}", self.code, self.message)
    }
}

impl error::Error for Krb5Error {}

/// A ticket found in a credential cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketInfo {
    pub client: String,
    pub server: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub renew_till: Option<DateTime<Utc>>,
    pub flags: TicketFlags,
}

/// A key found in a keytab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub principal: String,
    pub algorithm: String,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    Ticket(TicketInfo),
    /// A `krb5_ccache_conf_data` entry; carries the server name.
    Config(String),
}

// krb5 timestamps are unsigned seconds stored in a signed 32 bit int
fn timestamp(t: i32) -> Option<DateTime<Utc>> {
    if t == 0 {
        None
    } else {
        DateTime::from_timestamp(i64::from(t as u32), 0)
    }
}

pub struct Context(krb5_context);

impl Drop for Context {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { krb5_free_context(self.0) }
        }
    }
}

impl Context {
    pub fn new() -> Result<Context, Krb5Error> {
        let mut ctx: krb5_context = ptr::null_mut();
        let code = unsafe { krb5_init_context(&mut ctx as *mut krb5_context) };
        if code != 0 {
            return Err(Krb5Error {
                code,
                message: String::from("cannot initialize krb5 context"),
            });
        }
        Ok(Context(ctx))
    }

    fn error(&self, code: krb5_error_code) -> Krb5Error {
        let message = unsafe {
            let msg = krb5_get_error_message(self.0, code);
            if msg.is_null() {
                format!("unknown error {}", code)
            } else {
                let s = CStr::from_ptr(msg).to_string_lossy().into_owned();
                krb5_free_error_message(self.0, msg);
                s
            }
        };
        Krb5Error { code, message }
    }

    fn check(&self, code: krb5_error_code) -> Result<(), Krb5Error> {
        if code == 0 {
            Ok(())
        } else {
            Err(self.error(code))
        }
    }

    fn cstring(&self, s: &str) -> Result<CString, Krb5Error> {
        CString::new(s).map_err(|_| Krb5Error {
            code: 0,
            message: format!("name contains a nul byte: {:?}", s),
        })
    }

    fn unparse(&self, p: krb5_principal) -> Result<String, Krb5Error> {
        let mut out: *mut c_char = ptr::null_mut();
        self.check(unsafe { krb5_unparse_name(self.0, p, &mut out as *mut *mut c_char) })?;
        let s = unsafe {
            let s = CStr::from_ptr(out).to_string_lossy().into_owned();
            krb5_free_unparsed_name(self.0, out);
            s
        };
        Ok(s)
    }

    fn cache_entry(&self, creds: &krb5_creds) -> Result<CacheEntry, Krb5Error> {
        let server = self.unparse(creds.server)?;
        if unsafe { krb5_is_config_principal(self.0, creds.server) } != 0 {
            return Ok(CacheEntry::Config(server));
        }
        let times = &creds.times;
        let start = if times.starttime != 0 {
            times.starttime
        } else {
            times.authtime
        };
        Ok(CacheEntry::Ticket(TicketInfo {
            client: self.unparse(creds.client)?,
            server,
            start_time: timestamp(start),
            end_time: timestamp(times.endtime),
            renew_till: timestamp(times.renew_till),
            flags: TicketFlags::from_bits_retain(creds.ticket_flags as u32),
        }))
    }

    /// Every entry of the named credential cache. The outer error is for
    /// failing to open or walk the cache, the inner ones for a single entry
    /// that could not be decoded.
    pub fn tickets(&self, name: &str) -> Result<Vec<Result<CacheEntry, Krb5Error>>, Krb5Error> {
        let cname = self.cstring(name)?;
        let mut cc: krb5_ccache = ptr::null_mut();
        self.check(unsafe { krb5_cc_resolve(self.0, cname.as_ptr(), &mut cc) })?;
        let mut cursor: krb5_cc_cursor = ptr::null_mut();
        if let Err(e) = self.check(unsafe { krb5_cc_start_seq_get(self.0, cc, &mut cursor) }) {
            unsafe { krb5_cc_close(self.0, cc) };
            return Err(e);
        }
        let mut out = Vec::new();
        let res = loop {
            let mut creds: krb5_creds = unsafe { mem::zeroed() };
            let code = unsafe { krb5_cc_next_cred(self.0, cc, &mut cursor, &mut creds) };
            if code == KRB5_CC_END {
                break Ok(());
            } else if code != 0 {
                break Err(self.error(code));
            }
            out.push(self.cache_entry(&creds));
            unsafe { krb5_free_cred_contents(self.0, &mut creds) };
        };
        unsafe {
            krb5_cc_end_seq_get(self.0, cc, &mut cursor);
            krb5_cc_close(self.0, cc);
        }
        res.map(|()| out)
    }

    pub fn enctype_name(&self, enctype: krb5_enctype) -> String {
        let mut buf = [0 as c_char; 128];
        let code = unsafe { krb5_enctype_to_name(enctype, 0, buf.as_mut_ptr(), buf.len()) };
        if code != 0 {
            return format!("enctype {}", enctype);
        }
        unsafe { CStr::from_ptr(buf.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    fn key_info(&self, entry: &krb5_keytab_entry) -> Result<KeyInfo, Krb5Error> {
        Ok(KeyInfo {
            principal: self.unparse(entry.principal)?,
            algorithm: self.enctype_name(entry.key.enctype),
            version: entry.vno,
        })
    }

    /// Every key in the named keytab.
    pub fn keytab_entries(&self, name: &str) -> Result<Vec<Result<KeyInfo, Krb5Error>>, Krb5Error> {
        let kname = self.cstring(name)?;
        let mut kt: krb5_keytab = ptr::null_mut();
        self.check(unsafe { krb5_kt_resolve(self.0, kname.as_ptr(), &mut kt) })?;
        let mut cursor: krb5_kt_cursor = ptr::null_mut();
        if let Err(e) = self.check(unsafe { krb5_kt_start_seq_get(self.0, kt, &mut cursor) }) {
            unsafe { krb5_kt_close(self.0, kt) };
            return Err(e);
        }
        let mut out = Vec::new();
        let res = loop {
            let mut entry: krb5_keytab_entry = unsafe { mem::zeroed() };
            let code = unsafe { krb5_kt_next_entry(self.0, kt, &mut entry, &mut cursor) };
            if code == KRB5_KT_END {
                break Ok(());
            } else if code != 0 {
                break Err(self.error(code));
            }
            out.push(self.key_info(&entry));
            unsafe { krb5_free_keytab_entry_contents(self.0, &mut entry) };
        };
        unsafe {
            krb5_kt_end_seq_get(self.0, kt, &mut cursor);
            krb5_kt_close(self.0, kt);
        }
        res.map(|()| out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_positions_follow_rfc_numbering() {
        let flags = TicketFlags::FORWARDABLE | TicketFlags::RENEWABLE | TicketFlags::PRE_AUTH;
        let pos = flags.positions();
        assert_eq!(pos.len(), 32);
        let set: Vec<usize> = pos
            .iter()
            .enumerate()
            .filter(|(_, b)| **b)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(set, vec![1, 8, 10]);
    }

    #[test]
    fn unknown_bits_are_kept() {
        let flags = TicketFlags::from_bits_retain(0x8000_0001);
        let pos = flags.positions();
        assert!(pos[0]);
        assert!(pos[31]);
    }

    #[test]
    fn zero_timestamp_is_unset() {
        assert_eq!(timestamp(0), None);
        let t = timestamp(-1).map(|t| t.timestamp());
        assert_eq!(t, Some(i64::from(u32::MAX)));
    }
}
