use serde_json::Value;
use slotcore::ExecutionError;

/// Validates a backend payload against the JSON-schema subset widgets
/// declare: `type`, `const`, `enum`, `required`, `properties`,
/// `additionalProperties: false` and `items`.
pub fn validate_against_schema(value: &Value, schema: &Value) -> Result<(), ExecutionError> {
    validate_value(value, schema, "$").map_err(ExecutionError::ResponseValidation)
}

fn validate_value(value: &Value, schema: &Value, path: &str) -> Result<(), String> {
    let schema_obj = schema
        .as_object()
        .ok_or_else(|| format!("schema at '{}' must be an object", path))?;

    if let Some(type_spec) = schema_obj.get("type") {
        validate_type(value, type_spec, path)?;
    }

    if let Some(constant) = schema_obj.get("const") {
        if value != constant {
            return Err(format!("{} expected const {}", path, constant));
        }
    }

    if let Some(variants) = schema_obj.get("enum").and_then(|v| v.as_array()) {
        if !variants.iter().any(|candidate| candidate == value) {
            return Err(format!("{} is not one of the allowed enum values", path));
        }
    }

    if let Some(required) = schema_obj.get("required").and_then(|v| v.as_array()) {
        let object = value
            .as_object()
            .ok_or_else(|| format!("{} must be an object", path))?;
        for key in required.iter().filter_map(|v| v.as_str()) {
            if !object.contains_key(key) {
                return Err(format!("{} missing required field '{}'", path, key));
            }
        }
    }

    if let Some(properties) = schema_obj.get("properties").and_then(|v| v.as_object()) {
        let object = value
            .as_object()
            .ok_or_else(|| format!("{} must be an object", path))?;
        for (key, property_schema) in properties {
            if let Some(child) = object.get(key) {
                let child_path = format!("{}.{}", path, key);
                validate_value(child, property_schema, &child_path)?;
            }
        }

        if schema_obj.get("additionalProperties").and_then(|v| v.as_bool()) == Some(false) {
            for key in object.keys() {
                if !properties.contains_key(key) {
                    return Err(format!("{} contains unknown field '{}'", path, key));
                }
            }
        }
    }

    if let Some(item_schema) = schema_obj.get("items") {
        let array = value
            .as_array()
            .ok_or_else(|| format!("{} must be an array", path))?;
        for (idx, item) in array.iter().enumerate() {
            let item_path = format!("{}[{}]", path, idx);
            validate_value(item, item_schema, &item_path)?;
        }
    }

    Ok(())
}

fn validate_type(value: &Value, type_spec: &Value, path: &str) -> Result<(), String> {
    let matches = |name: &str, v: &Value| match name {
        "object" => v.is_object(),
        "array" => v.is_array(),
        "string" => v.is_string(),
        "number" => v.is_number(),
        "integer" => v.as_i64().is_some() || v.as_u64().is_some(),
        "boolean" => v.is_boolean(),
        "null" => v.is_null(),
        _ => false,
    };

    match type_spec {
        Value::String(name) => {
            if matches(name, value) {
                Ok(())
            } else {
                Err(format!("{} expected type '{}'", path, name))
            }
        }
        Value::Array(names) => {
            if names
                .iter()
                .filter_map(|n| n.as_str())
                .any(|name| matches(name, value))
            {
                Ok(())
            } else {
                Err(format!("{} matches none of the allowed types", path))
            }
        }
        _ => Err(format!("{} has an invalid type specifier", path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary_schema() -> Value {
        json!({
            "type": "object",
            "properties": { "summary": { "type": "string" } },
            "required": ["summary"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_valid_object_passes() {
        let value = json!({"summary": "short"});
        assert!(validate_against_schema(&value, &summary_schema()).is_ok());
    }

    #[test]
    fn test_missing_required_field_fails() {
        let value = json!({"headline": "short"});
        let err = validate_against_schema(&value, &summary_schema()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("summary"), "unexpected message: {}", message);
    }

    #[test]
    fn test_wrong_type_fails() {
        let value = json!({"summary": 12});
        assert!(validate_against_schema(&value, &summary_schema()).is_err());
    }

    #[test]
    fn test_additional_properties_rejected() {
        let value = json!({"summary": "short", "extra": true});
        let err = validate_against_schema(&value, &summary_schema()).unwrap_err();
        assert!(err.to_string().contains("extra"));
    }

    #[test]
    fn test_items_validated_per_element() {
        let schema = json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "question": { "type": "string" },
                    "answer": { "type": "string" }
                },
                "required": ["question", "answer"]
            }
        });
        let good = json!([{"question": "Q", "answer": "A"}]);
        assert!(validate_against_schema(&good, &schema).is_ok());

        let bad = json!([{"question": "Q"}]);
        let err = validate_against_schema(&bad, &schema).unwrap_err();
        assert!(err.to_string().contains("[0]"));
    }

    #[test]
    fn test_type_arrays_and_enum() {
        let schema = json!({"type": ["string", "null"]});
        assert!(validate_against_schema(&json!("x"), &schema).is_ok());
        assert!(validate_against_schema(&json!(null), &schema).is_ok());
        assert!(validate_against_schema(&json!(1), &schema).is_err());

        let schema = json!({"enum": ["short", "long"]});
        assert!(validate_against_schema(&json!("short"), &schema).is_ok());
        assert!(validate_against_schema(&json!("medium"), &schema).is_err());
    }
}
