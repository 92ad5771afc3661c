use jsonschema::JSONSchema;
use serde_json::Value;

const MAX_REPORTED_ERRORS: usize = 3;

/// Checks tool arguments against the JSON schema of a tool.
///
/// The first few violations are joined into the returned message. A schema
/// that fails to compile accepts every argument, since typed deserialization
/// still guards the tool input.
pub fn validate_arguments(
    schema: &Value,
    arguments: &Value,
) -> Result<(), String> {
    if !schema.is_object() {
        return Ok(());
    }
    let compiled = match JSONSchema::compile(schema) {
        Ok(compiled) => compiled,
        Err(err) => {
            warn!("invalid tool schema: {}", err);
            return Ok(());
        }
    };

    let Err(errors) = compiled.validate(arguments) else {
        return Ok(());
    };
    let messages = errors
        .take(MAX_REPORTED_ERRORS)
        .map(|err| format!("{} at `{}`", err, err.instance_path))
        .collect::<Vec<_>>();
    Err(format!(
        "Arguments failed schema validation: {}",
        messages.join("; ")
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_name": { "type": "string" },
                "limit": { "type": ["integer", "null"] },
                "patterns": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["project_name"]
        })
    }

    fn read_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "mode": { "enum": ["read", "list"] },
                "start_line": { "type": "integer", "minimum": 1 }
            },
            "additionalProperties": false
        })
    }

    #[test]
    fn test_valid_arguments() {
        let args = json!({ "project_name": "aimee" });
        assert!(validate_arguments(&schema(), &args).is_ok());
        assert!(
            validate_arguments(
                &schema(),
                &json!({
                    "project_name": "aimee",
                    "limit": null,
                    "patterns": ["*.json"],
                    "extra": true
                })
            )
            .is_ok()
        );

        let args = json!({ "mode": "list", "start_line": 1 });
        assert!(validate_arguments(&read_schema(), &args).is_ok());
    }

    #[test]
    fn test_invalid_arguments() {
        let err = validate_arguments(&schema(), &json!({})).unwrap_err();
        assert!(err.contains("project_name"), "{err}");

        let args = json!({ "project_name": 3 });
        let err = validate_arguments(&schema(), &args).unwrap_err();
        assert!(err.contains("`/project_name`"), "{err}");

        let args = json!({ "project_name": "aimee", "limit": 1.5 });
        let err = validate_arguments(&schema(), &args).unwrap_err();
        assert!(err.contains("`/limit`"), "{err}");

        let args = json!({ "project_name": "aimee", "patterns": ["a", 1] });
        let err = validate_arguments(&schema(), &args).unwrap_err();
        assert!(err.contains("`/patterns/1`"), "{err}");

        assert!(validate_arguments(&schema(), &json!("aimee")).is_err());
    }

    #[test]
    fn test_value_constraints() {
        let args = json!({ "mode": "drop" });
        let err = validate_arguments(&read_schema(), &args).unwrap_err();
        assert!(err.contains("`/mode`"), "{err}");

        let args = json!({ "start_line": -5 });
        let err = validate_arguments(&read_schema(), &args).unwrap_err();
        assert!(err.contains("`/start_line`"), "{err}");

        let args = json!({ "bogus": 1 });
        assert!(validate_arguments(&read_schema(), &args).is_err());

        let args = json!({ "mode": "drop", "start_line": -5, "bogus": 1 });
        let err = validate_arguments(&read_schema(), &args).unwrap_err();
        assert!(err.starts_with("Arguments failed schema validation"));
        assert_eq!(err.matches(" at `").count(), 3, "{err}");
    }

    #[test]
    fn test_permissive_schema() {
        assert!(validate_arguments(&json!({}), &json!({ "a": 1 })).is_ok());
        assert!(validate_arguments(&json!(true), &json!(null)).is_ok());
    }
}
