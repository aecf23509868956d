//! Configuration validation errors and semantic validation.

use std::collections::HashSet;
use thiserror::Error;

use crate::settings::{ChannelKind, MlrConfig, NotifyConfig, RatioAdjustments, SourceConfig};
use crate::thresholds::ThresholdBands;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 10,
            ValidationError::SemanticError(_) => 10,
            ValidationError::MissingField(_) => 10,
            ValidationError::InvalidValue { field, .. } if field.starts_with("thresholds") => 11,
            ValidationError::InvalidValue { .. } => 10,
        }
    }
}

/// Validate a full configuration semantically.
pub fn validate_config(config: &MlrConfig) -> ValidationResult<()> {
    validate_bands(&config.thresholds)?;
    validate_ratio(&config.ratio)?;
    validate_notify(&config.notify)?;
    validate_source(&config.source)?;
    Ok(())
}

/// Validate threshold bands: non-empty, finite non-negative bounds, unique
/// bounds and labels.
pub fn validate_bands(bands: &ThresholdBands) -> ValidationResult<()> {
    if bands.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "thresholds.bands".to_string(),
            message: "at least one band is required".to_string(),
        });
    }

    let mut labels = HashSet::new();
    let mut bounds: Vec<f64> = Vec::with_capacity(bands.len());

    for (idx, band) in bands.bands.iter().enumerate() {
        if !band.lower_bound.is_finite() || band.lower_bound < 0.0 {
            return Err(ValidationError::InvalidValue {
                field: format!("thresholds.bands[{}].lower_bound", idx),
                message: format!("Must be finite and non-negative, got {}", band.lower_bound),
            });
        }

        let label = band.label.trim();
        if label.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: format!("thresholds.bands[{}].label", idx),
                message: "Must not be empty".to_string(),
            });
        }
        if !labels.insert(label.to_string()) {
            return Err(ValidationError::InvalidValue {
                field: format!("thresholds.bands[{}].label", idx),
                message: format!("Duplicate label {:?}", label),
            });
        }

        if bounds.iter().any(|b| *b == band.lower_bound) {
            return Err(ValidationError::InvalidValue {
                field: format!("thresholds.bands[{}].lower_bound", idx),
                message: format!("Duplicate bound {}", band.lower_bound),
            });
        }
        bounds.push(band.lower_bound);
    }

    Ok(())
}

fn validate_ratio(ratio: &RatioAdjustments) -> ValidationResult<()> {
    if !ratio.pa_cost_multiplier.is_finite() || ratio.pa_cost_multiplier <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: "ratio.pa_cost_multiplier".to_string(),
            message: format!("Must be positive, got {}", ratio.pa_cost_multiplier),
        });
    }

    if !(0.0..1.0).contains(&ratio.commission_rate) {
        return Err(ValidationError::InvalidValue {
            field: "ratio.commission_rate".to_string(),
            message: format!("Must be in [0, 1), got {}", ratio.commission_rate),
        });
    }

    Ok(())
}

fn validate_notify(notify: &NotifyConfig) -> ValidationResult<()> {
    if notify.timeout_secs == 0 {
        return Err(ValidationError::InvalidValue {
            field: "notify.timeout_secs".to_string(),
            message: "Must be > 0".to_string(),
        });
    }

    if !notify.enabled {
        return Ok(());
    }

    if notify.recipients.iter().all(|r| r.trim().is_empty()) {
        return Err(ValidationError::MissingField(
            "notify.recipients (required when notifications are enabled)".to_string(),
        ));
    }

    match notify.channel {
        ChannelKind::Log => {}
        ChannelKind::Outbox => {
            if notify.outbox_path.is_none() {
                return Err(ValidationError::MissingField(
                    "notify.outbox_path (required for the outbox channel)".to_string(),
                ));
            }
        }
        ChannelKind::Webhook => {
            let url = notify.webhook_url.as_deref().unwrap_or("");
            if url.is_empty() {
                return Err(ValidationError::MissingField(
                    "notify.webhook_url (required for the webhook channel)".to_string(),
                ));
            }
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ValidationError::InvalidValue {
                    field: "notify.webhook_url".to_string(),
                    message: format!("Must be an http(s) URL, got {}", url),
                });
            }
        }
    }

    Ok(())
}

fn validate_source(source: &SourceConfig) -> ValidationResult<()> {
    if let (Some(from), Some(to)) = (source.from, source.to) {
        if from > to {
            return Err(ValidationError::SemanticError(format!(
                "source.from ({}) is after source.to ({})",
                from, to
            )));
        }
    }
    Ok(())
}
