use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::dto::EventFormDto;
use crate::errors::ApiError;
use crate::models::{FieldSpec, FieldType};

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Checks a submission against an event's declared form and returns the
/// normalized mapping (numeric strings coerced to numbers). Unknown keys are
/// rejected rather than dropped, so a submission never silently loses data.
/// The first violation wins and names the offending field key.
pub fn validate_registration_data(
    fields: &[FieldSpec],
    data: &Map<String, Value>,
) -> Result<Map<String, Value>, ApiError> {
    for key in data.keys() {
        if !fields.iter().any(|f| &f.key == key) {
            return Err(ApiError::validation(key, "is not a declared field"));
        }
    }

    let mut normalized = Map::new();
    for field in fields {
        let value = data.get(&field.key);
        if is_blank(value) {
            if field.required {
                return Err(ApiError::validation(&field.key, "is required"));
            }
            continue;
        }
        let value = value.cloned().unwrap_or(Value::Null);

        match field.field_type {
            FieldType::Number => match value {
                Value::Number(n) => {
                    normalized.insert(field.key.clone(), Value::Number(n));
                }
                Value::String(s) => {
                    let trimmed = s.trim();
                    let number = trimmed
                        .parse::<i64>()
                        .map(serde_json::Number::from)
                        .ok()
                        .or_else(|| {
                            trimmed.parse::<f64>().ok().and_then(serde_json::Number::from_f64)
                        });
                    match number {
                        Some(n) => {
                            normalized.insert(field.key.clone(), Value::Number(n));
                        }
                        None => {
                            return Err(ApiError::validation(&field.key, "must be a number"));
                        }
                    }
                }
                _ => return Err(ApiError::validation(&field.key, "must be a number")),
            },
            FieldType::Select => {
                let options = field.options.as_deref().unwrap_or(&[]);
                match value {
                    Value::String(s) if options.iter().any(|o| o == &s) => {
                        normalized.insert(field.key.clone(), Value::String(s));
                    }
                    _ => {
                        return Err(ApiError::validation(
                            &field.key,
                            "is not one of the allowed options",
                        ));
                    }
                }
            }
            _ => match value {
                Value::String(s) => {
                    normalized.insert(field.key.clone(), Value::String(s));
                }
                _ => return Err(ApiError::validation(&field.key, "must be a string")),
            },
        }
    }

    Ok(normalized)
}

/// Organizer-side check of a declared form: keys unique and non-blank,
/// options present exactly on select fields.
pub fn validate_field_specs(fields: &[FieldSpec]) -> Result<(), ApiError> {
    for (index, field) in fields.iter().enumerate() {
        if field.key.trim().is_empty() {
            return Err(ApiError::validation(
                "registration_fields",
                format!("field #{} has an empty key", index + 1),
            ));
        }
        if field.label.trim().is_empty() {
            return Err(ApiError::validation(&field.key, "has an empty label"));
        }
        if fields.iter().take(index).any(|other| other.key == field.key) {
            return Err(ApiError::validation(&field.key, "is declared twice"));
        }
        match field.field_type {
            FieldType::Select => {
                let has_options = field
                    .options
                    .as_ref()
                    .map(|options| !options.is_empty())
                    .unwrap_or(false);
                if !has_options {
                    return Err(ApiError::validation(&field.key, "select field needs options"));
                }
            }
            _ => {
                if field.options.is_some() {
                    return Err(ApiError::validation(
                        &field.key,
                        "options are only valid on select fields",
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Event-form checks matching the organizer-side rules: a positive capacity,
/// a non-negative fee, complete bank details when present, and a valid field
/// schema.
pub fn validate_event_form(form: &EventFormDto) -> Result<(), ApiError> {
    if form.title.trim().is_empty() {
        return Err(ApiError::validation("title", "is required"));
    }
    if form.max_attendees < 1 {
        return Err(ApiError::validation("max_attendees", "must be positive"));
    }
    if let Some(fee) = form.registration_fee {
        if fee < Decimal::ZERO {
            return Err(ApiError::validation("registration_fee", "must be non-negative"));
        }
    }
    if let Some(bank) = &form.bank_details {
        let required = [
            ("account_holder", &bank.account_holder),
            ("account_number", &bank.account_number),
            ("ifsc_code", &bank.ifsc_code),
            ("bank_name", &bank.bank_name),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ApiError::validation(name, "is required in bank_details"));
            }
        }
    }
    validate_field_specs(&form.registration_fields)
}
