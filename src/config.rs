//! The single environment boundary.
//!
//! All environment lookups happen here, once, producing validated typed
//! configuration values that are passed explicitly to every component.
//! Missing required variables are collected and reported together so an
//! operator fixes one shell, not one variable per run.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::stack::CidrBlock;

/// Default remote query endpoint for the demonstration clients.
pub const DEFAULT_ENDPOINT: &str = "https://countries.trevorblades.com/graphql";

const DEFAULT_NETWORK_CIDR: &str = "172.31.0.0/16";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingVars(Vec<String>),

    #[error("Invalid value '{value}' for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

/// Environment-sourced parameters for the stack assembler.
#[derive(Debug, Clone)]
pub struct StackParams {
    /// Qualifier prefixed onto every logical resource id.
    pub qualifier: String,
    pub account_id: String,
    pub region: String,
    /// The operator's own address, the only administrative ingress allowed.
    pub operator_ipv4: Ipv4Addr,
    pub db_user: String,
    /// Qualifier and bucket for the provisioning engine's own bootstrap.
    pub deploy_qualifier: String,
    pub deploy_bucket: String,
    pub network_cidr: CidrBlock,
}

impl StackParams {
    /// Resolve from the process environment. Fails fast before any graph
    /// construction when a required variable is absent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let mut required = |name: &str| -> String {
            match get(name) {
                Some(v) if !v.trim().is_empty() => v,
                _ => {
                    missing.push(name.to_string());
                    String::new()
                }
            }
        };

        let qualifier = required("STACK_QUALIFIER");
        let account_id = required("ACCOUNT_ID");
        let region = required("REGION");
        let operator = required("OPERATOR_IPV4");
        let db_user = required("DB_USER");
        let deploy_qualifier = required("DEPLOY_QUALIFIER");
        let deploy_bucket = required("DEPLOY_BUCKET");

        if !missing.is_empty() {
            return Err(ConfigError::MissingVars(missing));
        }

        let operator_ipv4: Ipv4Addr =
            operator.parse().map_err(|_| ConfigError::InvalidValue {
                name: "OPERATOR_IPV4".into(),
                value: operator.clone(),
                reason: "not an IPv4 address".into(),
            })?;

        let network_cidr = get("NETWORK_CIDR").unwrap_or_else(|| DEFAULT_NETWORK_CIDR.into());
        let network_cidr =
            CidrBlock::parse(&network_cidr).map_err(|e| ConfigError::InvalidValue {
                name: "NETWORK_CIDR".into(),
                value: network_cidr.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            qualifier,
            account_id,
            region,
            operator_ipv4,
            db_user,
            deploy_qualifier,
            deploy_bucket,
            network_cidr,
        })
    }
}

/// How the transport treats the server certificate. Precedence: an explicit
/// certificate bundle wins over the disable flag, which wins over the
/// default verify-on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMode {
    /// Verify against the given PEM bundle.
    VerifyWithBundle(PathBuf),
    /// Accept any certificate.
    Insecure,
    /// Verify against the system roots.
    Default,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub no_proxy: Option<String>,
}

/// Fixed limits for the synchronous transport. The asynchronous variant
/// uses [`crate::client::RetryPolicy`] ceilings instead of a single timeout.
#[derive(Debug, Clone)]
pub struct TransportLimits {
    pub request_timeout: Duration,
    pub max_attempts: u32,
}

impl Default for TransportLimits {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            max_attempts: 5,
        }
    }
}

/// Transport configuration for the query clients, resolved once.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub bearer_token: Option<String>,
    pub tls: TlsMode,
    pub proxy: Option<ProxyConfig>,
    pub limits: TransportLimits,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let endpoint = get("GRAPHQL_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Url::parse(&endpoint).map_err(|e| ConfigError::InvalidValue {
            name: "GRAPHQL_ENDPOINT".into(),
            value: endpoint.clone(),
            reason: e.to_string(),
        })?;
        let bearer_token = get("GRAPHQL_TOKEN").filter(|t| !t.is_empty());

        let tls = match get("CERTIFICATE") {
            None => TlsMode::Default,
            Some(v) if v.eq_ignore_ascii_case("false") => TlsMode::Insecure,
            Some(path) => TlsMode::VerifyWithBundle(PathBuf::from(path)),
        };

        let proxy = get("SET_PROXY").map(|url| ProxyConfig {
            url,
            username: get("USR"),
            password: get("PSW"),
            no_proxy: get("no_proxy").or_else(|| get("NO_PROXY")),
        });

        Ok(Self {
            endpoint,
            bearer_token,
            tls,
            proxy,
            limits: TransportLimits::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    const FULL_STACK_ENV: &[(&str, &str)] = &[
        ("STACK_QUALIFIER", "wp"),
        ("ACCOUNT_ID", "123456789012"),
        ("REGION", "eu-west-1"),
        ("OPERATOR_IPV4", "203.0.113.7"),
        ("DB_USER", "admin"),
        ("DEPLOY_QUALIFIER", "boot"),
        ("DEPLOY_BUCKET", "boot-assets"),
    ];

    #[test]
    fn stack_params_resolve_from_a_complete_environment() {
        let params = StackParams::from_lookup(env(FULL_STACK_ENV)).unwrap();
        assert_eq!(params.qualifier, "wp");
        assert_eq!(params.operator_ipv4, Ipv4Addr::new(203, 0, 113, 7));
        assert_eq!(params.network_cidr.to_string(), "172.31.0.0/16");
    }

    #[test]
    fn all_missing_variables_are_reported_together() {
        let err = StackParams::from_lookup(env(&[("STACK_QUALIFIER", "wp")])).unwrap_err();
        match err {
            ConfigError::MissingVars(names) => {
                assert_eq!(names.len(), 6);
                assert!(names.contains(&"REGION".to_string()));
                assert!(names.contains(&"DB_USER".to_string()));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut pairs = FULL_STACK_ENV.to_vec();
        pairs[2] = ("REGION", "  ");
        let err = StackParams::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVars(names) if names == ["REGION"]));
    }

    #[test]
    fn bad_operator_address_is_rejected() {
        let mut pairs = FULL_STACK_ENV.to_vec();
        pairs[3] = ("OPERATOR_IPV4", "not-an-ip");
        assert!(matches!(
            StackParams::from_lookup(env(&pairs)),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn tls_defaults_to_verification() {
        let config = ClientConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(config.tls, TlsMode::Default);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert!(config.bearer_token.is_none());
    }

    #[test]
    fn tls_disable_flag_is_case_insensitive() {
        for flag in ["false", "False", "FALSE"] {
            let config = ClientConfig::from_lookup(env(&[("CERTIFICATE", flag)])).unwrap();
            assert_eq!(config.tls, TlsMode::Insecure);
        }
    }

    #[test]
    fn tls_certificate_path_wins_over_default() {
        let config =
            ClientConfig::from_lookup(env(&[("CERTIFICATE", "/etc/ssl/corp.pem")])).unwrap();
        assert_eq!(
            config.tls,
            TlsMode::VerifyWithBundle(PathBuf::from("/etc/ssl/corp.pem"))
        );
    }

    #[test]
    fn malformed_endpoint_is_rejected() {
        assert!(matches!(
            ClientConfig::from_lookup(env(&[("GRAPHQL_ENDPOINT", "not a url")])),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn proxy_is_only_configured_when_set() {
        let config = ClientConfig::from_lookup(env(&[])).unwrap();
        assert!(config.proxy.is_none());

        let config = ClientConfig::from_lookup(env(&[
            ("SET_PROXY", "http://proxy.internal:3128"),
            ("USR", "alice"),
            ("PSW", "hunter2"),
            ("no_proxy", "localhost,.internal"),
        ]))
        .unwrap();
        let proxy = config.proxy.unwrap();
        assert_eq!(proxy.url, "http://proxy.internal:3128");
        assert_eq!(proxy.username.as_deref(), Some("alice"));
        assert_eq!(proxy.no_proxy.as_deref(), Some("localhost,.internal"));
    }
}
