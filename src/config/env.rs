//! Environment variable overrides for `NetworkConfig`
//!
//! Reads the exact variable names a deploying operator sets: no prefix
//! scheme, each name stands on its own.

use std::env;

use super::NetworkConfig;
use crate::errors::NetworkingError;

impl NetworkConfig {
    /// Build a `NetworkConfig` from environment variables.
    ///
    /// `PUBLIC_DOMAINS` and `PUBLIC_DOMAIN_PATTERNS` are comma-separated
    /// lists, trimmed per entry. Unset booleans fall back to `Default`.
    pub fn from_env() -> Result<Self, NetworkingError> {
        let mut config = Self {
            base_domain: env::var("BASE_DOMAIN").unwrap_or_default(),
            ..Default::default()
        };

        if let Ok(v) = env::var("DEFAULT_GATEWAY") {
            config.default_gateway = v;
        }
        if let Ok(v) = env::var("DEFAULT_TLS_SECRET") {
            config.default_tls_secret = v;
        }
        if let Some(v) = get_env_bool("TLS_ENABLED") {
            config.tls_enabled = v;
        }
        if let Ok(v) = env::var("PUBLIC_DOMAINS") {
            config.public_domains = split_csv(&v).into_iter().collect();
        }
        if let Ok(v) = env::var("PUBLIC_DOMAIN_PATTERNS") {
            config.public_domain_patterns = split_csv(&v);
        }
        if let Some(v) = get_env_bool("AUTO_TLS") {
            config.auto_tls = v;
        }
        // SHARED_GATEWAY_ENABLED toggles whether the default gateway is
        // treated as shared across tenants; absent a dedicated field this
        // only affects the default when unset, so an explicit false clears
        // DefaultGateway rather than leaving a dangling shared reference.
        if let Some(false) = get_env_bool("SHARED_GATEWAY_ENABLED") {
            config.default_gateway.clear();
        }

        config.validate()?;
        Ok(config)
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn get_env_bool(name: &str) -> Option<bool> {
    env::var(name).ok().map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables, useful for testing
/// `NetworkConfig::from_env()` without touching the real process
/// environment permanently.
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.push((key.into(), value.into()));
        self
    }

    pub fn base_domain(self, domain: impl Into<String>) -> Self {
        self.var("BASE_DOMAIN", domain.into())
    }

    pub fn default_gateway(self, gateway: impl Into<String>) -> Self {
        self.var("DEFAULT_GATEWAY", gateway.into())
    }

    pub fn public_domains(self, domains: impl Into<String>) -> Self {
        self.var("PUBLIC_DOMAINS", domains.into())
    }

    pub fn public_domain_patterns(self, patterns: impl Into<String>) -> Self {
        self.var("PUBLIC_DOMAIN_PATTERNS", patterns.into())
    }

    pub fn tls_enabled(self, enabled: bool) -> Self {
        self.var("TLS_ENABLED", enabled.to_string())
    }

    pub fn auto_tls(self, enabled: bool) -> Self {
        self.var("AUTO_TLS", enabled.to_string())
    }

    /// Apply and return a guard that restores the previous values on drop.
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        for (key, value) in &self.vars {
            env::set_var(key, value);
        }

        EnvGuard { previous }
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores environment variables to their pre-test values on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_from_env_minimal() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvBuilder::new()
            .base_domain("cloud.sealos.io")
            .default_gateway("istio-system/sealos-gateway")
            .apply_scoped();

        let config = NetworkConfig::from_env().unwrap();
        assert_eq!(config.base_domain, "cloud.sealos.io");
        assert_eq!(config.default_gateway, "istio-system/sealos-gateway");
    }

    #[test]
    fn test_from_env_lists_are_trimmed() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvBuilder::new()
            .default_gateway("istio-system/sealos-gateway")
            .public_domains(" a.example.com ,b.example.com")
            .public_domain_patterns("*.example.com, *.example.net ")
            .apply_scoped();

        let config = NetworkConfig::from_env().unwrap();
        assert!(config.public_domains.contains("a.example.com"));
        assert!(config.public_domains.contains("b.example.com"));
        assert_eq!(
            config.public_domain_patterns,
            vec!["*.example.com".to_string(), "*.example.net".to_string()]
        );
    }

    #[test]
    fn test_from_env_missing_domain_source_fails() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvBuilder::new()
            .default_gateway("istio-system/sealos-gateway")
            .apply_scoped();
        env::remove_var("BASE_DOMAIN");
        env::remove_var("PUBLIC_DOMAINS");
        env::remove_var("PUBLIC_DOMAIN_PATTERNS");

        assert!(NetworkConfig::from_env().is_err());
    }
}
