//! TLS material management
//!
//! `manager` ensures per-host TLS secrets exist, either by cloning the
//! system wildcard or by requesting issuance from cert-manager; `x509`
//! supplies the PEM parsing and expiry logic it depends on.

mod manager;
mod x509;

pub use manager::{secret_name_for_host, CertificateManager};
pub use x509::{Clock, SystemClock};
