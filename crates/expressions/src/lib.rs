//! Restricted expression evaluation for trigger filters and templates
//!
//! Expressions are evaluated over a caller-supplied name map and support
//! arithmetic, boolean logic, comparisons, membership tests, indexing,
//! mapping-key member access, and list/tuple/dict literals. There are no
//! function calls, no definitions, no attribute access on anything but
//! mappings, and no name resolution outside the provided map.
//!
//! Evaluation fails closed: syntax errors carry the source position, and
//! runtime failures (unknown names, bad operands, division by zero, budget
//! overruns) are reported as type or invalid-expression errors.

mod eval;
mod lexer;
mod parser;
mod template;

use serde_json::{Map, Value};
use thiserror::Error;

pub use template::eval_template;

/// Maximum accepted expression source length in bytes
pub const MAX_EXPRESSION_LEN: usize = 4096;

/// Errors produced by expression or template evaluation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    /// The expression could not be lexed or parsed
    #[error("Invalid syntax at position {position}: {message}")]
    Syntax { position: usize, message: String },

    /// An operator was applied to operands of the wrong type
    #[error("Type error: {0}")]
    Type(String),

    /// The expression is well-formed but cannot be evaluated
    #[error("Invalid expression: {0}")]
    Invalid(String),

    /// One or more template entries failed to evaluate
    #[error("Template evaluation failed: {0}")]
    Template(String),
}

impl ExpressionError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }
}

/// Evaluate a single expression against a name map.
///
/// The name map is the only source of identifiers; an unknown name is an
/// error, not a silent `null`.
pub fn eval_expression(src: &str, names: &Map<String, Value>) -> Result<Value, ExpressionError> {
    if src.len() > MAX_EXPRESSION_LEN {
        return Err(ExpressionError::Invalid(format!(
            "expression exceeds {} bytes",
            MAX_EXPRESSION_LEN
        )));
    }
    let tokens = lexer::tokenize(src)?;
    let expr = parser::parse(src, &tokens)?;
    eval::Evaluator::new(names).eval(&expr)
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
    fn test_arithmetic() {
        let n = names(&[]);
        assert_eq!(eval_expression("1 + 2 * 3", &n).unwrap(), json!(7));
        assert_eq!(eval_expression("(1 + 2) * 3", &n).unwrap(), json!(9));
        assert_eq!(eval_expression("7 % 3", &n).unwrap(), json!(1));
        assert_eq!(eval_expression("-7 % 3", &n).unwrap(), json!(2));
        assert_eq!(eval_expression("2 ** 10", &n).unwrap(), json!(1024));
        assert_eq!(eval_expression("1.5 + 0.5", &n).unwrap(), json!(2.0));
    }

    #[test]
    fn test_true_division() {
        let n = names(&[]);
        assert_eq!(eval_expression("1 / 2", &n).unwrap(), json!(0.5));
        assert_eq!(eval_expression("4 / 2", &n).unwrap(), json!(2.0));
    }

    #[test]
    fn test_division_by_zero_fails() {
        let n = names(&[]);
        assert!(matches!(
            eval_expression("1 / 0", &n).unwrap_err(),
            ExpressionError::Invalid(_)
        ));
        assert!(eval_expression("1 % 0", &n).is_err());
    }

    #[test]
    fn test_comparisons() {
        let n = names(&[("event_count", json!(3))]);
        assert_eq!(eval_expression("event_count > 5", &n).unwrap(), json!(false));
        assert_eq!(eval_expression("event_count >= 1", &n).unwrap(), json!(true));
        assert_eq!(eval_expression("event_count == 3.0", &n).unwrap(), json!(true));
        assert_eq!(eval_expression("'abc' < 'abd'", &n).unwrap(), json!(true));
    }

    #[test]
    fn test_boolean_operators_return_operands() {
        let n = names(&[]);
        assert_eq!(eval_expression("0 or 5", &n).unwrap(), json!(5));
        assert_eq!(eval_expression("3 and 7", &n).unwrap(), json!(7));
        assert_eq!(eval_expression("not 0", &n).unwrap(), json!(true));
        assert_eq!(eval_expression("True and False", &n).unwrap(), json!(false));
    }

    #[test]
    fn test_membership() {
        let n = names(&[("tags", json!(["a", "b"]))]);
        assert_eq!(eval_expression("'a' in tags", &n).unwrap(), json!(true));
        assert_eq!(eval_expression("'c' not in tags", &n).unwrap(), json!(true));
        assert_eq!(eval_expression("'ell' in 'hello'", &n).unwrap(), json!(true));
        assert_eq!(
            eval_expression("'k' in {'k': 1}", &n).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_indexing_and_member_access() {
        let n = names(&[("body", json!({"n": 42, "items": [1, 2, 3]}))]);
        assert_eq!(eval_expression("body.n", &n).unwrap(), json!(42));
        assert_eq!(eval_expression("body['n']", &n).unwrap(), json!(42));
        assert_eq!(eval_expression("body.items[0]", &n).unwrap(), json!(1));
        assert_eq!(eval_expression("body.items[-1]", &n).unwrap(), json!(3));
    }

    #[test]
    fn test_member_access_rejected_on_non_mapping() {
        let n = names(&[("xs", json!([1, 2]))]);
        assert!(matches!(
            eval_expression("xs.len", &n).unwrap_err(),
            ExpressionError::Type(_)
        ));
    }

    #[test]
    fn test_literals() {
        let n = names(&[]);
        assert_eq!(
            eval_expression("[1, 'two', 3.0]", &n).unwrap(),
            json!([1, "two", 3.0])
        );
        assert_eq!(eval_expression("(1, 2)", &n).unwrap(), json!([1, 2]));
        assert_eq!(
            eval_expression("{'a': 1, 'b': [2]}", &n).unwrap(),
            json!({"a": 1, "b": [2]})
        );
        assert_eq!(eval_expression("None", &n).unwrap(), Value::Null);
    }

    #[test]
    fn test_unknown_name_fails() {
        let n = names(&[]);
        assert!(matches!(
            eval_expression("missing + 1", &n).unwrap_err(),
            ExpressionError::Invalid(_)
        ));
    }

    #[test]
    fn test_syntax_error_carries_position() {
        let n = names(&[]);
        match eval_expression("1 + ", &n).unwrap_err() {
            ExpressionError::Syntax { position, .. } => assert_eq!(position, 4),
            other => panic!("expected syntax error, got {:?}", other),
        }
        match eval_expression("1 @ 2", &n).unwrap_err() {
            ExpressionError::Syntax { position, .. } => assert_eq!(position, 2),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_power_budget() {
        let n = names(&[]);
        assert!(eval_expression("2 ** 10000", &n).is_err());
    }

    #[test]
    fn test_string_repetition_capped() {
        let n = names(&[]);
        assert_eq!(eval_expression("'ab' * 3", &n).unwrap(), json!("ababab"));
        assert!(eval_expression("'a' * 10000000", &n).is_err());
    }

    #[test]
    fn test_no_call_syntax() {
        let n = names(&[("f", json!(1))]);
        assert!(eval_expression("f(1)", &n).is_err());
    }

    #[test]
    fn test_chained_comparison_rejected() {
        let n = names(&[]);
        assert!(matches!(
            eval_expression("1 < 2 < 3", &n).unwrap_err(),
            ExpressionError::Syntax { .. }
        ));
    }
}
