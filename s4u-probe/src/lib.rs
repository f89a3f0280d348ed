//! Kerberos constrained delegation probe.
//!
//! Logs a service principal in from a keytab, impersonates a user with
//! S4U2Self and S4U2Proxy, then connects to a database as that user and
//! prints what it got at every step. The security subsystem and the data
//! client sit behind traits so the workflow can be driven without a realm.
pub mod config;
pub mod downstream;
pub mod error;
pub mod gss;
pub mod krb5;
pub mod report;
pub mod security;
pub mod subject;
pub mod workflow;

pub use error::{Error, Result};
