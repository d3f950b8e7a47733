//! Request validation against declared field specs.

use crate::config::{EntitySpec, FieldSpec, ValueType};
use crate::error::AppError;
use serde_json::Value;
use std::collections::HashMap;

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a create body: required fields present, known keys only, values of the declared type.
    pub fn validate(entity: &EntitySpec, body: &HashMap<String, Value>) -> Result<(), AppError> {
        for f in &entity.fields {
            let val = body.get(f.name());
            if !f.may_be_omitted() && val.map_or(true, Value::is_null) {
                return Err(AppError::Validation(format!("{} is required", f.name())));
            }
        }
        Self::validate_partial(entity, body)
    }

    /// Validate only the keys present in body (for updates). Required is not enforced.
    pub fn validate_partial(entity: &EntitySpec, body: &HashMap<String, Value>) -> Result<(), AppError> {
        for (key, v) in body {
            if let Some(f) = entity.field(key) {
                validate_field(f, v)?;
            } else if let Some(fk) = entity.fk(key) {
                if !v.is_null() {
                    check_type(key, fk.references.value_type(), v)?;
                }
            } else {
                return Err(AppError::Validation(format!("unknown field {}", key)));
            }
        }
        Ok(())
    }
}

fn validate_field(f: &FieldSpec, v: &Value) -> Result<(), AppError> {
    if v.is_null() {
        return if f.is_optional() {
            Ok(())
        } else {
            Err(AppError::Validation(format!("{} must not be null", f.name())))
        };
    }
    check_type(f.name(), f.value_type(), v)
}

fn check_type(col: &str, ty: ValueType, v: &Value) -> Result<(), AppError> {
    let ok = match ty {
        ValueType::Uuid => v.as_str().is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
        ValueType::String => v.is_string(),
        ValueType::Int => v.as_i64().is_some_and(|n| i32::try_from(n).is_ok()),
        ValueType::BigInt => v.is_i64(),
        ValueType::Float => v.is_number(),
        ValueType::Bool => v.is_boolean(),
        ValueType::DateTime => v
            .as_str()
            .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
        ValueType::Json => true,
    };
    if ok {
        Ok(())
    } else {
        Err(AppError::Validation(format!("{} must be of type {:?}", col, ty)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DefaultFactory, FkDescriptor, ForeignKeys, StorageType};
    use serde_json::json;

    fn entity() -> EntitySpec {
        let id = FieldSpec::new("id", ValueType::Uuid, StorageType::Uuid)
            .primary_key()
            .default_factory(DefaultFactory::NewUuid);
        let mut sentence = EntitySpec {
            name: "Sentence".into(),
            title: None,
            fields: vec![
                id.clone(),
                FieldSpec::new("text", ValueType::String, StorageType::Text),
                FieldSpec::new("index", ValueType::Int, StorageType::Integer).default_value(json!(0)),
                FieldSpec::new("note", ValueType::String, StorageType::Text).optional(),
            ],
            relationships: Vec::new(),
            fk: ForeignKeys::default(),
        };
        sentence
            .fk
            .insert(
                "Sentence",
                "__fk__video_id".into(),
                FkDescriptor {
                    references: id,
                    owner: "Video".into(),
                },
            )
            .unwrap();
        sentence
    }

    fn body(v: Value) -> HashMap<String, Value> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn create_requires_fields_without_default() {
        let e = entity();
        assert!(RequestValidator::validate(&e, &body(json!({ "text": "hi" }))).is_ok());
        let err = RequestValidator::validate(&e, &body(json!({ "index": 1 }))).unwrap_err();
        assert_eq!(err.to_string(), "validation: text is required");
    }

    #[test]
    fn type_and_key_checks() {
        let e = entity();
        assert!(RequestValidator::validate_partial(&e, &body(json!({ "index": "one" }))).is_err());
        assert!(RequestValidator::validate_partial(&e, &body(json!({ "nope": 1 }))).is_err());
        assert!(RequestValidator::validate_partial(&e, &body(json!({ "__fk__video_id": "not-a-uuid" }))).is_err());
        assert!(RequestValidator::validate_partial(&e, &body(json!({ "__fk__video_id": null, "note": null }))).is_ok());
        assert!(RequestValidator::validate_partial(&e, &body(json!({ "text": null }))).is_err());
    }
}
