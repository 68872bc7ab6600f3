//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate provider URLs and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: CoreConfig → Result<(), Vec<ValidationError>>

use std::fmt;

use url::Url;

use crate::config::schema::{CoreConfig, ProvidersConfig};

/// A single semantic problem found in a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a parsed configuration.
pub fn validate_config(config: &CoreConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.network.request_timeout_secs == 0 {
        errors.push(ValidationError::new("network.request_timeout_secs", "must be > 0"));
    }
    if config.network.unhealthy_threshold == 0 {
        errors.push(ValidationError::new("network.unhealthy_threshold", "must be > 0"));
    }
    if config.network.healthy_threshold == 0 {
        errors.push(ValidationError::new("network.healthy_threshold", "must be > 0"));
    }

    if config.resilience.base_delay_ms > config.resilience.max_delay_ms {
        errors.push(ValidationError::new(
            "resilience.base_delay_ms",
            "must not exceed resilience.max_delay_ms",
        ));
    }

    validate_providers("cosmos", &config.cosmos, &mut errors);
    validate_providers("solana", &config.solana, &mut errors);
    validate_providers("xrp", &config.xrp, &mut errors);

    if config.card.tag_reconnect_timeout_ms == 0 {
        errors.push(ValidationError::new("card.tag_reconnect_timeout_ms", "must be > 0"));
    }
    if config.card.default_pin1.is_empty() {
        errors.push(ValidationError::new("card.default_pin1", "must not be empty"));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_providers(section: &str, providers: &ProvidersConfig, errors: &mut Vec<ValidationError>) {
    for (i, raw) in providers.providers.iter().enumerate() {
        let field = format!("{section}.providers[{i}]");
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ValidationError::new(
                field,
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {e}"))),
        }
    }
}
