//! Filter-form validation for generation requests.
//!
//! Two layers:
//!
//! ## Schema (raw JSON)
//! Request bodies arriving over HTTP are checked against the embedded
//! `schemas/generation-request.json` (JSON Schema Draft 7) before
//! deserialization, so clients get every structural problem at once.
//!
//! ## Rules (typed request)
//! - `niche`, `city`, `country` are required and non-blank
//! - `quantity` lies in [`MIN_QUANTITY`]..=[`MAX_QUANTITY`]
//! - `ageRange.min <= ageRange.max`
//!
//! An empty `fields` selection is accepted.
//!
//! # Example
//!
//! ```rust,ignore
//! use leadgen::{validate_request, GenerationRequest};
//!
//! let request = GenerationRequest::new("medicina", "Porto", "Portugal", 100);
//! assert!(validate_request(&request).is_ok());
//! ```

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::{ValidationError, ValidationResult};
use crate::models::GenerationRequest;

/// Smallest quantity the form accepts.
pub const MIN_QUANTITY: u32 = 10;

/// Largest quantity the form accepts.
pub const MAX_QUANTITY: u32 = 10_000;

static REQUEST_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/generation-request.json"))
        .expect("Invalid embedded schema")
});

/// Validate a JSON value against a JSON schema.
///
/// Returns every violation as a readable string.
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check a raw request body against the request schema.
pub fn validate_request_json(data: &Value) -> ValidationResult<()> {
    validate(&REQUEST_SCHEMA, data).map_err(ValidationError::Schema)
}

/// Apply the filter-form rules to a typed request.
///
/// Stops at the first violation, in form order.
pub fn validate_request(request: &GenerationRequest) -> ValidationResult<()> {
    require_text("niche", &request.niche)?;
    require_text("city", &request.city)?;
    require_text("country", &request.country)?;

    if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&request.quantity) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".into(),
            min: i64::from(MIN_QUANTITY),
            max: i64::from(MAX_QUANTITY),
            value: i64::from(request.quantity),
        });
    }

    if let Some(range) = request.age_range {
        if range.min > range.max {
            return Err(ValidationError::InvalidValue {
                field: "ageRange".into(),
                message: format!("min ({}) is greater than max ({})", range.min, range.max),
            });
        }
    }

    Ok(())
}

/// Schema check, deserialization and rules in one step.
pub fn parse_request(data: Value) -> ValidationResult<GenerationRequest> {
    validate_request_json(&data)?;
    let request: GenerationRequest = serde_json::from_value(data)
        .map_err(|e| ValidationError::Schema(vec![e.to_string()]))?;
    validate_request(&request)?;
    Ok(request)
}

fn require_text(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field.to_string()))
    } else {
        Ok(())
    }
}
