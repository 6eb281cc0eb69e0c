//! PEM/X.509 parsing for certificate expiry checks

use chrono::{DateTime, Utc};
use openssl::asn1::Asn1Time;
use openssl::x509::X509;

use crate::errors::NetworkingError;

/// Injectable time source so near-expiry checks can be tested without
/// waiting on wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Parse a PEM-encoded certificate and return its `notAfter` timestamp.
///
/// A malformed PEM block surfaces as `BadPem`; a well-formed PEM block that
/// openssl cannot parse as an X.509 certificate surfaces as `BadCertificate`.
pub fn parse_expiry(cert_pem: &[u8]) -> Result<DateTime<Utc>, NetworkingError> {
    let cert = X509::from_pem(cert_pem).map_err(|e| {
        if looks_like_pem(cert_pem) {
            NetworkingError::BadCertificate(e.to_string())
        } else {
            NetworkingError::BadPem(e.to_string())
        }
    })?;

    asn1_time_to_datetime(cert.not_after())
}

fn looks_like_pem(input: &[u8]) -> bool {
    std::str::from_utf8(input)
        .map(|s| s.contains("-----BEGIN"))
        .unwrap_or(false)
}

fn asn1_time_to_datetime(time: &openssl::asn1::Asn1TimeRef) -> Result<DateTime<Utc>, NetworkingError> {
    let epoch = Asn1Time::from_unix(0).map_err(|e| NetworkingError::BadCertificate(e.to_string()))?;
    let diff = epoch
        .diff(time)
        .map_err(|e| NetworkingError::BadCertificate(e.to_string()))?;

    let seconds = diff.days as i64 * 86_400 + diff.secs as i64;
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
        NetworkingError::BadCertificate("certificate notAfter is out of range".to_string())
    })
}

/// `true` when `not_after` is fewer than `renew_before_days` away from
/// `clock.now()`, or already past.
pub fn is_near_expiry(not_after: DateTime<Utc>, renew_before_days: i64, clock: &dyn Clock) -> bool {
    let threshold = clock.now() + chrono::Duration::days(renew_before_days);
    not_after <= threshold
}
