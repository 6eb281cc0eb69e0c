//! Error taxonomy for the networking core
//!
//! One variant per failure kind in the networking core's error table;
//! callers match on these to decide whether to retry, surface to a
//! status subresource, or treat a delete as already-done.

use thiserror::Error;

/// Errors surfaced by the networking core.
///
/// `Conflict` is retried internally a bounded number of times before it
/// ever reaches a caller; `NotFound` collapses to success on delete paths
/// and only surfaces here for update/get paths.
#[derive(Error, Debug)]
pub enum NetworkingError {
    #[error("invalid networking spec: {0}")]
    BadSpec(String),

    #[error("malformed domain '{host}': {reason}")]
    BadFormat { host: String, reason: String },

    #[error("domain '{0}' is reserved")]
    ReservedDomain(String),

    #[error("DNS validation failed for '{host}': {reason}")]
    DnsValidation { host: String, reason: String },

    #[error("custom hosts require TLSConfig")]
    TlsRequired,

    #[error("TLSConfig.SecretName is required")]
    SecretNameRequired,

    #[error("TLSConfig.SecretName '{0}' is not a valid RFC-1123 label")]
    SecretNameInvalid(String),

    #[error("TLSConfig.Hosts is missing custom hosts: {0:?}")]
    HostsMissing(Vec<String>),

    #[error("certificate for host '{0}' is not ready")]
    CertificateNotReady(String),

    #[error("write conflict on {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("cluster error: {0}")]
    ClusterError(String),

    #[error("malformed PEM block: {0}")]
    BadPem(String),

    #[error("unparseable X.509 certificate: {0}")]
    BadCertificate(String),

    #[error("resume unavailable for '{0}': no backed-up routes")]
    ResumeUnavailable(String),

    #[error("certificate rotation unsupported for backend '{0}'")]
    RotationUnsupported(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl NetworkingError {
    /// True when retrying the same operation again, unmodified, might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, NetworkingError::Conflict(_))
    }
}

impl From<kube::Error> for NetworkingError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => {
                NetworkingError::NotFound(resp.message.clone())
            }
            kube::Error::Api(resp) if resp.code == 409 => {
                NetworkingError::Conflict(resp.message.clone())
            }
            _ => NetworkingError::ClusterError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn test_404_classifies_as_not_found() {
        assert!(matches!(NetworkingError::from(api_error(404)), NetworkingError::NotFound(_)));
    }

    #[test]
    fn test_409_classifies_as_conflict() {
        let err = NetworkingError::from(api_error(409));
        assert!(matches!(err, NetworkingError::Conflict(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_403_classifies_as_cluster_error_not_not_found() {
        let err = NetworkingError::from(api_error(403));
        assert!(matches!(err, NetworkingError::ClusterError(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_500_classifies_as_cluster_error() {
        assert!(matches!(NetworkingError::from(api_error(500)), NetworkingError::ClusterError(_)));
    }
}
