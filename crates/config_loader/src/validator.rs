//! Configuration validation
//!
//! Rules:
//! - derived field ranges (`validator`): non-empty prefix and log level,
//!   positive poll interval, stability samples, attempts and history length
//! - max_sample_attempts >= stability_samples and >= initial_stability_samples
//! - settle_loop_sleep_ms <= settle_window_ms

use contracts::{CatalogConfig, ContractError, SigflowConfig};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Validate a parsed configuration
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &SigflowConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_sampling(&config.catalog)?;
    validate_settle_window(&config.catalog)?;
    Ok(())
}

fn validate_fields(config: &SigflowConfig) -> Result<(), ContractError> {
    let Err(errors) = config.validate() else {
        return Ok(());
    };
    let (field, message) = first_error("", &errors)
        .unwrap_or_else(|| ("config".to_string(), errors.to_string()));
    Err(ContractError::config_validation(field, message))
}

/// First failing field as (dotted path, message), visiting fields in name order
fn first_error(prefix: &str, errors: &ValidationErrors) -> Option<(String, String)> {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in fields {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        let found = match kind {
            ValidationErrorsKind::Field(list) => list.first().map(|error| {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("failed '{}' check", error.code));
                (path.clone(), message)
            }),
            ValidationErrorsKind::Struct(inner) => first_error(&path, inner),
            ValidationErrorsKind::List(items) => items
                .iter()
                .find_map(|(idx, inner)| first_error(&format!("{path}[{idx}]"), inner)),
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn validate_sampling(catalog: &CatalogConfig) -> Result<(), ContractError> {
    let required = catalog
        .stability_samples
        .max(catalog.initial_stability_samples);
    if catalog.max_sample_attempts < required {
        return Err(ContractError::config_validation(
            "catalog.max_sample_attempts",
            format!(
                "max_sample_attempts ({}) must be >= stability samples ({})",
                catalog.max_sample_attempts, required
            ),
        ));
    }
    Ok(())
}

fn validate_settle_window(catalog: &CatalogConfig) -> Result<(), ContractError> {
    if catalog.settle_loop_sleep_ms > catalog.settle_window_ms {
        return Err(ContractError::config_validation(
            "catalog.settle_loop_sleep_ms / catalog.settle_window_ms",
            format!(
                "settle_loop_sleep_ms ({}) must be <= settle_window_ms ({})",
                catalog.settle_loop_sleep_ms, catalog.settle_window_ms
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: Result<(), ContractError>) -> String {
        match result {
            Err(ContractError::ConfigValidation { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&SigflowConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_max_history() {
        let mut config = SigflowConfig::default();
        config.extraction.max_history = 0;
        assert_eq!(field_of(validate(&config)), "extraction.max_history");
    }

    #[test]
    fn test_zero_stability_samples() {
        let mut config = SigflowConfig::default();
        config.catalog.stability_samples = 0;
        assert_eq!(field_of(validate(&config)), "catalog.stability_samples");
    }

    #[test]
    fn test_empty_namespace_prefix() {
        let mut config = SigflowConfig::default();
        config.catalog.namespace_prefix.clear();
        assert_eq!(field_of(validate(&config)), "catalog.namespace_prefix");
    }

    #[test]
    fn test_attempts_below_stability_samples() {
        let mut config = SigflowConfig::default();
        config.catalog.stability_samples = 30;
        config.catalog.max_sample_attempts = 10;
        assert_eq!(field_of(validate(&config)), "catalog.max_sample_attempts");
    }

    #[test]
    fn test_settle_sleep_longer_than_window() {
        let mut config = SigflowConfig::default();
        config.catalog.settle_window_ms = 10;
        config.catalog.settle_loop_sleep_ms = 20;
        assert!(field_of(validate(&config)).contains("settle_loop_sleep_ms"));
    }
}
