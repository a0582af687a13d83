//! Template evaluation
//!
//! A template is an arbitrary JSON value. Mapping keys ending in `.=` carry
//! expression source as their value; the expression is evaluated against the
//! name map and emitted under the key with the suffix stripped. All other
//! mapping and list values recurse. Errors accumulate across the whole
//! template so a caller sees every failing entry at once.

use serde_json::{Map, Value};

use crate::{eval_expression, ExpressionError};

const EXPRESSION_KEY_SUFFIX: &str = ".=";

/// Evaluate a JSON template against a name map.
///
/// A template with no `.=` keys comes back unchanged.
pub fn eval_template(
    template: &Value,
    names: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    let mut errors = Vec::new();
    let result = walk(template, names, &mut errors);
    if errors.is_empty() {
        Ok(result)
    } else {
        Err(ExpressionError::Template(errors.join(";")))
    }
}

fn walk(value: &Value, names: &Map<String, Value>, errors: &mut Vec<String>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, entry) in map {
                if let Some(short_key) = key.strip_suffix(EXPRESSION_KEY_SUFFIX) {
                    match entry.as_str() {
                        Some(src) => match eval_expression(src, names) {
                            Ok(result) => {
                                out.insert(short_key.to_string(), result);
                            }
                            Err(e) => {
                                errors.push(format!(
                                    "{} when evaluating expression ({}) for parameter {}",
                                    e, src, key
                                ));
                            }
                        },
                        None => {
                            errors.push(format!(
                                "expression for parameter {} must be a string",
                                key
                            ));
                        }
                    }
                } else {
                    out.insert(key.clone(), walk(entry, names, errors));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| walk(item, names, errors)).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_expression_keys_evaluated() {
        let n = names(&[("body", json!({"n": 42}))]);
        let template = json!({"x.=": "body.n", "label": "fixed"});
        let result = eval_template(&template, &n).unwrap();
        assert_eq!(result, json!({"x": 42, "label": "fixed"}));
    }

    #[test]
    fn test_nested_objects_and_lists_recurse() {
        let n = names(&[("event_count", json!(7))]);
        let template = json!({
            "outer": {
                "count.=": "event_count + 1",
                "items": [{"inner.=": "event_count"}, "plain"]
            }
        });
        let result = eval_template(&template, &n).unwrap();
        assert_eq!(
            result,
            json!({"outer": {"count": 8, "items": [{"inner": 7}, "plain"]}})
        );
    }

    #[test]
    fn test_template_without_expressions_is_identity() {
        let n = names(&[]);
        let template = json!({
            "a": 1,
            "b": [true, null, {"c": "text"}],
            "d": {"e": 2.5}
        });
        let result = eval_template(&template, &n).unwrap();
        assert_eq!(result, template);
    }

    #[test]
    fn test_errors_accumulate() {
        let n = names(&[]);
        let template = json!({"y.=": "1/0", "z.=": "missing"});
        let err = eval_template(&template, &n).unwrap_err();
        match err {
            ExpressionError::Template(msg) => {
                assert!(msg.contains("division by zero"));
                assert!(msg.contains("not defined"));
                assert!(msg.contains(";"));
            }
            other => panic!("expected template error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_string_expression_value_rejected() {
        let n = names(&[]);
        let template = json!({"x.=": 5});
        assert!(eval_template(&template, &n).is_err());
    }

    #[test]
    fn test_scalar_template_passes_through() {
        let n = names(&[]);
        assert_eq!(eval_template(&json!("hello"), &n).unwrap(), json!("hello"));
        assert_eq!(eval_template(&json!(3), &n).unwrap(), json!(3));
    }
}
