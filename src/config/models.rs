//! Configuration data structures for Strato.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files.
//! They are intentionally serde-friendly and include defaults so that minimal
//! configs remain concise. Durations are written as humantime strings
//! ("250ms", "2s", "1m").
use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::core::{
    admission::{AdmissionControl, OpenAdmission, TokenBucketAdmission},
    origin::{DispatchPolicy, Origin, OriginManager, SelectionKind, Server},
};

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_timeout() -> String {
    "2s".to_string()
}

fn default_admission_capacity() -> u32 {
    100
}

fn default_refill_period() -> String {
    "100ms".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One logical origin: its candidate servers and dispatch policy.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OriginConfig {
    /// Candidate servers as "host:port" strings
    pub servers: Vec<String>,
    /// Server selection strategy
    #[serde(default)]
    pub strategy: SelectionKind,
    /// Bound on backend call attempts per request
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Per-attempt deadline as a humantime string
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout: String,
}

impl OriginConfig {
    pub fn policy(&self) -> Result<DispatchPolicy, String> {
        let attempt_timeout = parse_duration(&self.attempt_timeout)
            .map_err(|e| format!("invalid attempt_timeout '{}': {e}", self.attempt_timeout))?;
        Ok(DispatchPolicy {
            max_attempts: self.max_attempts,
            attempt_timeout,
        })
    }
}

/// Binds a path prefix to an origin route name.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RouteBindingConfig {
    pub prefix: String,
    pub origin: String,
}

/// Token-bucket admission control settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AdmissionConfig {
    pub enabled: bool,
    /// Bucket capacity per client identity
    pub capacity: u32,
    /// One token restored per period, as a humantime string
    pub refill_period: String,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: default_admission_capacity(),
            refill_period: default_refill_period(),
        }
    }
}

/// Logging output settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: true,
        }
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GatewayConfig {
    /// Origins keyed by route name
    #[serde(default)]
    pub origins: HashMap<String, OriginConfig>,
    /// Path-prefix route bindings, longest prefix wins
    #[serde(default)]
    pub routes: Vec<RouteBindingConfig>,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Materialize the origin manager from configuration.
    pub fn build_origins(&self) -> Result<Arc<OriginManager>, String> {
        let mut origins = Vec::with_capacity(self.origins.len());
        for (name, origin) in &self.origins {
            let servers = origin
                .servers
                .iter()
                .map(|s| s.parse::<Server>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("origin '{name}': {e}"))?;
            origins.push(Origin::new(
                name.clone(),
                servers,
                origin.strategy,
                origin.policy().map_err(|e| format!("origin '{name}': {e}"))?,
            ));
        }
        Ok(Arc::new(OriginManager::new(origins)))
    }

    /// Materialize the admission controller from configuration.
    pub fn build_admission(&self) -> Result<Arc<dyn AdmissionControl>, String> {
        if !self.admission.enabled {
            return Ok(Arc::new(OpenAdmission));
        }
        let refill = parse_duration(&self.admission.refill_period).map_err(|e| {
            format!(
                "invalid admission refill_period '{}': {e}",
                self.admission.refill_period
            )
        })?;
        Ok(Arc::new(TokenBucketAdmission::new(
            self.admission.capacity,
            refill,
        )?))
    }

    /// Route bindings as (prefix, origin) pairs for the route-binding filter.
    pub fn route_bindings(&self) -> Vec<(String, String)> {
        self.routes
            .iter()
            .map(|r| (r.prefix.clone(), r.origin.clone()))
            .collect()
    }
}

pub(crate) fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> GatewayConfig {
        let toml = r#"
[origins.users]
servers = ["10.0.0.1:8080", "10.0.0.2:8080"]

[[routes]]
prefix = "/api/users"
origin = "users"
"#;
        toml::from_str(toml).expect("valid config")
    }

    #[test]
    fn test_defaults_applied() {
        let config = minimal_config();
        let users = &config.origins["users"];
        assert_eq!(users.max_attempts, 3);
        assert_eq!(users.attempt_timeout, "2s");
        assert_eq!(users.strategy, SelectionKind::RoundRobin);
        assert!(!config.admission.enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_build_origins() {
        let config = minimal_config();
        let origins = config.build_origins().expect("origins build");
        assert_eq!(origins.route_names(), vec!["users"]);
        let origin = origins.get("users").expect("origin present");
        assert_eq!(origin.servers().len(), 2);
        assert_eq!(origin.policy().attempt_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_bad_server_address_rejected() {
        let mut config = minimal_config();
        config
            .origins
            .get_mut("users")
            .expect("origin present")
            .servers = vec!["not-an-address".to_string()];
        assert!(config.build_origins().is_err());
    }

    #[test]
    fn test_bad_duration_rejected() {
        let mut config = minimal_config();
        config
            .origins
            .get_mut("users")
            .expect("origin present")
            .attempt_timeout = "soon".to_string();
        assert!(config.build_origins().is_err());
    }

    #[test]
    fn test_admission_disabled_yields_open_controller() {
        let config = minimal_config();
        let admission = config.build_admission().expect("admission builds");
        assert!(admission.try_acquire("anyone"));
    }

    #[test]
    fn test_admission_enabled_enforces_capacity() {
        let mut config = minimal_config();
        config.admission = AdmissionConfig {
            enabled: true,
            capacity: 2,
            refill_period: "1m".to_string(),
        };
        let admission = config.build_admission().expect("admission builds");
        assert!(admission.try_acquire("c"));
        assert!(admission.try_acquire("c"));
        assert!(!admission.try_acquire("c"));
    }
}
