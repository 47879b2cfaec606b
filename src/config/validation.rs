use std::collections::HashSet;

use crate::config::models::{GatewayConfig, OriginConfig, parse_duration};
use crate::core::origin::Server;

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Route conflict detected: {message}")]
    RouteConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if config.origins.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "origins".to_string(),
            });
        }
        for (name, origin) in &config.origins {
            Self::validate_origin(name, origin, &mut errors);
        }

        if config.routes.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes".to_string(),
            });
        }
        let mut seen_prefixes = HashSet::new();
        for route in &config.routes {
            if !route.prefix.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: format!("routes.{}", route.prefix),
                    message: "prefix must start with '/'".to_string(),
                });
            }
            if !config.origins.contains_key(&route.origin) {
                errors.push(ValidationError::InvalidField {
                    field: format!("routes.{}", route.prefix),
                    message: format!("references unknown origin '{}'", route.origin),
                });
            }
            if !seen_prefixes.insert(route.prefix.clone()) {
                errors.push(ValidationError::RouteConflict {
                    message: format!("prefix '{}' is bound more than once", route.prefix),
                });
            }
        }

        if config.admission.enabled {
            if config.admission.capacity == 0 {
                errors.push(ValidationError::InvalidField {
                    field: "admission.capacity".to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
            if let Err(e) = parse_duration(&config.admission.refill_period) {
                errors.push(ValidationError::InvalidField {
                    field: "admission.refill_period".to_string(),
                    message: e.to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_origin(name: &str, origin: &OriginConfig, errors: &mut Vec<ValidationError>) {
        if origin.servers.is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("origins.{name}.servers"),
            });
        }
        for server in &origin.servers {
            if server.parse::<Server>().is_err() {
                errors.push(ValidationError::InvalidField {
                    field: format!("origins.{name}.servers"),
                    message: format!("'{server}' is not a valid host:port address"),
                });
            }
        }
        if origin.max_attempts == 0 {
            errors.push(ValidationError::InvalidField {
                field: format!("origins.{name}.max_attempts"),
                message: "must be greater than 0".to_string(),
            });
        }
        if let Err(e) = parse_duration(&origin.attempt_timeout) {
            errors.push(ValidationError::InvalidField {
                field: format!("origins.{name}.attempt_timeout"),
                message: e.to_string(),
            });
        }
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
