//! Deterministic hostname synthesis and custom-domain validation

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::cancel::{cancellable, CancelSignal};
use crate::config::NetworkConfig;
use crate::errors::NetworkingError;

/// Digest source behind the allocator's short hash.
///
/// The source only commits to "same inputs, same output, 128+ bits of
/// entropy" — the specific algorithm is not part of the contract, so this is
/// a seam rather than a fixed function. The default is SHA-256; the hash is
/// always truncated to 6 hex characters by the caller.
pub trait HashSource: Send + Sync {
    fn digest(&self, input: &[u8]) -> Vec<u8>;
}

/// Default `HashSource`, a plain SHA-256.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256HashSource;

impl HashSource for Sha256HashSource {
    fn digest(&self, input: &[u8]) -> Vec<u8> {
        Sha256::digest(input).to_vec()
    }
}

/// DNS resolution seam for custom-domain validation, so format checks stay
/// synchronous and pure while the network call is a separate suspension
/// point a caller can cancel.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<(), NetworkingError>;
}

/// Default resolver, backed by the system resolver via Tokio.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioDnsResolver;

#[async_trait]
impl DnsResolver for TokioDnsResolver {
    async fn resolve(&self, host: &str) -> Result<(), NetworkingError> {
        tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| NetworkingError::DnsValidation {
                host: host.to_string(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| NetworkingError::DnsValidation {
                host: host.to_string(),
                reason: "resolver returned no addresses".to_string(),
            })?;
        Ok(())
    }
}

/// Synthesizes and validates tenant-facing hostnames.
#[derive(Clone)]
pub struct DomainAllocator {
    config: Arc<NetworkConfig>,
    hash_source: Arc<dyn HashSource>,
    resolver: Arc<dyn DnsResolver>,
}

impl DomainAllocator {
    pub fn new(config: Arc<NetworkConfig>) -> Self {
        Self {
            config,
            hash_source: Arc::new(Sha256HashSource),
            resolver: Arc::new(TokioDnsResolver),
        }
    }

    pub fn with_hash_source(mut self, hash_source: Arc<dyn HashSource>) -> Self {
        self.hash_source = hash_source;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn DnsResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Synthesize a hostname for an application category (`app`, `terminal`,
    /// `database`, ...). Falls back to
    /// `{{.AppName}}-{{.Hash}}.{{.TenantID}}.{{.BaseDomain}}` when no
    /// template is configured for the category.
    pub fn allocate(&self, category: &str, tenant_id: &str, app_name: &str) -> String {
        self.allocate_for(category, tenant_id, app_name)
    }

    /// Generic form behind any resource-id naming (Terminal's `TerminalID`,
    /// DBAdmin's `DBName`, ...) — same template substitution contract as
    /// [`Self::allocate`], just without assuming the id is an app name.
    pub fn allocate_for(&self, category: &str, tenant_id: &str, resource_id: &str) -> String {
        const FALLBACK_TEMPLATE: &str = "{{.AppName}}-{{.Hash}}.{{.TenantID}}.{{.BaseDomain}}";

        let template = self
            .config
            .domain_templates
            .get(category)
            .map(String::as_str)
            .unwrap_or(FALLBACK_TEMPLATE);

        let hash = self.short_hash(tenant_id, resource_id);

        let substituted = template
            .replace("{{.AppName}}", &sanitize(resource_id))
            .replace("{{.TenantID}}", &sanitize(tenant_id))
            .replace("{{.Hash}}", &hash)
            .replace("{{.BaseDomain}}", &self.config.base_domain);

        substituted.to_lowercase()
    }

    /// Lowercase hex of the first 6 characters of the digest of
    /// `tenant_id + resource_id`.
    fn short_hash(&self, tenant_id: &str, resource_id: &str) -> String {
        let input = format!("{tenant_id}{resource_id}");
        let digest = self.hash_source.digest(input.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        hex.chars().take(6).collect()
    }

    /// Synchronous, pure format/reservation validation. DNS resolution is a
    /// separate step (`resolve`) so tests can exercise this without network
    /// I/O.
    pub fn validate_custom_domain(&self, domain: &str) -> Result<(), NetworkingError> {
        if domain.is_empty() {
            return Err(NetworkingError::BadFormat {
                host: domain.to_string(),
                reason: "empty".to_string(),
            });
        }
        if domain.len() > 253 {
            return Err(NetworkingError::BadFormat {
                host: domain.to_string(),
                reason: "exceeds 253 characters".to_string(),
            });
        }
        if domain.starts_with('.') || domain.ends_with('.') {
            return Err(NetworkingError::BadFormat {
                host: domain.to_string(),
                reason: "leading or trailing dot".to_string(),
            });
        }
        if domain.contains("..") {
            return Err(NetworkingError::BadFormat {
                host: domain.to_string(),
                reason: "consecutive dots".to_string(),
            });
        }
        if !is_rfc1123_hostname(domain) {
            return Err(NetworkingError::BadFormat {
                host: domain.to_string(),
                reason: "not a valid RFC-1123 label-dot-label hostname".to_string(),
            });
        }

        let lower = domain.to_lowercase();
        for reserved in &self.config.reserved_domains {
            let reserved = reserved.to_lowercase();
            if lower == reserved || lower.ends_with(&format!(".{reserved}")) {
                return Err(NetworkingError::ReservedDomain(domain.to_string()));
            }
        }
        for label in crate::config::BUILTIN_RESERVED_LABELS {
            if lower.split('.').next() == Some(label) {
                return Err(NetworkingError::ReservedDomain(domain.to_string()));
            }
        }

        Ok(())
    }

    /// DNS resolution, the network-bound half of custom-domain validation.
    pub async fn resolve(&self, domain: &str, cancel: &CancelSignal) -> Result<(), NetworkingError> {
        cancellable(self.resolver.resolve(domain), cancel).await
    }

    /// `true` for syntactically valid, non-reserved domains. Cross-tenant
    /// uniqueness is enforced by the webhook collaborator, not here.
    pub fn is_domain_available(&self, domain: &str) -> bool {
        self.validate_custom_domain(domain).is_ok()
    }
}

/// Sanitize one template substring: replace non-`[a-zA-Z0-9-]` with `-`,
/// strip leading/trailing `-`, truncate to 63 characters, lowercase; an
/// empty result becomes `app`.
///
/// Truncation can collide two distinct long names onto the same sanitized
/// substring; the allocator does not detect or guard against that, by
/// design — see the design notes on sanitize-truncation collisions.
pub fn sanitize(input: &str) -> String {
    let replaced: String = input
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let trimmed = replaced.trim_matches('-');
    let truncated: String = trimmed.chars().take(63).collect();
    let truncated = truncated.trim_matches('-');

    if truncated.is_empty() {
        "app".to_string()
    } else {
        truncated.to_lowercase()
    }
}

fn is_rfc1123_hostname(domain: &str) -> bool {
    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Arc<NetworkConfig> {
        Arc::new(
            NetworkConfig::new("cloud.sealos.io", "istio-system/sealos-gateway")
                .with_reserved_domain("internal.cloud.sealos.io"),
        )
    }

    #[test]
    fn test_sanitize_replaces_invalid_chars() {
        assert_eq!(sanitize("My_App!"), "my-app");
        assert_eq!(sanitize("--leading-trailing--"), "leading-trailing");
        assert_eq!(sanitize(""), "app");
        assert_eq!(sanitize("___"), "app");
    }

    #[test]
    fn test_sanitize_truncates_to_63() {
        let long = "a".repeat(100);
        assert_eq!(sanitize(&long).len(), 63);
    }

    #[test]
    fn test_allocate_uses_fallback_template() {
        let allocator = DomainAllocator::new(config());
        let host = allocator.allocate("app", "tenant1", "myapp");
        assert!(host.ends_with(".tenant1.cloud.sealos.io"));
        assert!(host.starts_with("myapp-"));
    }

    #[test]
    fn test_allocate_is_deterministic() {
        let allocator = DomainAllocator::new(config());
        let a = allocator.allocate("app", "tenant1", "myapp");
        let b = allocator.allocate("app", "tenant1", "myapp");
        assert_eq!(a, b);
    }

    #[test]
    fn test_allocate_uses_configured_template() {
        let config = Arc::new(
            NetworkConfig::new("cloud.sealos.io", "istio-system/sealos-gateway")
                .with_domain_template("terminal", "term-{{.Hash}}.{{.BaseDomain}}"),
        );
        let allocator = DomainAllocator::new(config);
        let host = allocator.allocate_for("terminal", "tenant1", "term-1");
        assert!(host.starts_with("term-"));
        assert!(host.ends_with(".cloud.sealos.io"));
    }

    #[test]
    fn test_validate_rejects_reserved_domain() {
        let allocator = DomainAllocator::new(config());
        assert!(matches!(
            allocator.validate_custom_domain("internal.cloud.sealos.io"),
            Err(NetworkingError::ReservedDomain(_))
        ));
    }

    #[test]
    fn test_validate_rejects_builtin_reserved_label() {
        let allocator = DomainAllocator::new(config());
        assert!(matches!(
            allocator.validate_custom_domain("api.example.com"),
            Err(NetworkingError::ReservedDomain(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_format() {
        let allocator = DomainAllocator::new(config());
        assert!(allocator.validate_custom_domain("").is_err());
        assert!(allocator.validate_custom_domain(".leading.com").is_err());
        assert!(allocator.validate_custom_domain("double..dot.com").is_err());
        assert!(allocator.validate_custom_domain("-bad.com").is_err());
    }

    #[test]
    fn test_validate_accepts_well_formed_custom_domain() {
        let allocator = DomainAllocator::new(config());
        assert!(allocator.validate_custom_domain("my-app.example.com").is_ok());
    }

    #[test]
    fn test_is_domain_available() {
        let allocator = DomainAllocator::new(config());
        assert!(allocator.is_domain_available("my-app.example.com"));
        assert!(!allocator.is_domain_available("internal.cloud.sealos.io"));
    }

    struct FakeResolver {
        should_fail: bool,
    }

    #[async_trait]
    impl DnsResolver for FakeResolver {
        async fn resolve(&self, host: &str) -> Result<(), NetworkingError> {
            if self.should_fail {
                Err(NetworkingError::DnsValidation {
                    host: host.to_string(),
                    reason: "simulated failure".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_resolve_uses_injected_resolver() {
        let cancel = CancelSignal::new();
        let allocator = DomainAllocator::new(config())
            .with_resolver(Arc::new(FakeResolver { should_fail: true }));
        assert!(allocator.resolve("unreachable.example.com", &cancel).await.is_err());

        let allocator = DomainAllocator::new(config())
            .with_resolver(Arc::new(FakeResolver { should_fail: false }));
        assert!(allocator.resolve("reachable.example.com", &cancel).await.is_ok());
    }

    #[tokio::test]
    async fn test_resolve_honors_cancellation() {
        let cancel = CancelSignal::new();
        cancel.cancel();
        let allocator = DomainAllocator::new(config())
            .with_resolver(Arc::new(FakeResolver { should_fail: false }));
        assert!(matches!(
            allocator.resolve("reachable.example.com", &cancel).await,
            Err(NetworkingError::Cancelled)
        ));
    }
}
