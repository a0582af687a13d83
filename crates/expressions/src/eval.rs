//! Evaluator for parsed expressions
//!
//! Walks the AST against a name map, producing JSON values. Semantics are
//! Python-flavoured: `and`/`or` return their deciding operand, `/` is true
//! division, `%` follows the sign of the divisor, and membership works on
//! lists, strings, and mapping keys.

use serde_json::{Map, Number, Value};

use crate::parser::{BinOp, CmpOp, Expr, UnaryOp};
use crate::ExpressionError;

/// Maximum number of AST nodes evaluated per expression
const MAX_EVAL_OPS: usize = 10_000;

/// Maximum absolute exponent accepted by `**`
const MAX_POW_EXPONENT: f64 = 100.0;

/// Maximum length of a string produced by `+` or `*`
const MAX_STRING_LEN: usize = 100_000;

pub struct Evaluator<'a> {
    names: &'a Map<String, Value>,
    ops: usize,
}

enum Num {
    Int(i64),
    Float(f64),
}

fn as_num(v: &Value) -> Option<Num> {
    if let Some(i) = v.as_i64() {
        Some(Num::Int(i))
    } else {
        v.as_f64().map(Num::Float)
    }
}

fn float_value(f: f64) -> Result<Value, ExpressionError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ExpressionError::Invalid("arithmetic produced a non-finite number".into()))
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// Python-style truthiness: empty containers, empty strings, zero, null and
/// false are all falsy.
fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Equality that treats 1 and 1.0 as equal, like the source language does.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if !a.is_boolean() && !b.is_boolean() => x == y,
        _ => a == b,
    }
}

impl<'a> Evaluator<'a> {
    pub fn new(names: &'a Map<String, Value>) -> Self {
        Self { names, ops: 0 }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, ExpressionError> {
        self.ops += 1;
        if self.ops > MAX_EVAL_OPS {
            return Err(ExpressionError::Invalid(
                "expression evaluation budget exceeded".into(),
            ));
        }

        match expr {
            Expr::Int(v) => Ok(Value::from(*v)),
            Expr::Float(v) => float_value(*v),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Name(name) => self
                .names
                .get(name)
                .cloned()
                .ok_or_else(|| ExpressionError::Invalid(format!("name '{}' is not defined", name))),
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?);
                }
                Ok(Value::Array(out))
            }
            Expr::Dict(entries) => {
                let mut out = Map::new();
                for (key_expr, value_expr) in entries {
                    let key = match self.eval(key_expr)? {
                        Value::String(s) => s,
                        other => {
                            return Err(ExpressionError::Type(format!(
                                "dict keys must be strings, not {}",
                                type_name(&other)
                            )));
                        }
                    };
                    let value = self.eval(value_expr)?;
                    out.insert(key, value);
                }
                Ok(Value::Object(out))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                self.eval_unary(*op, value)
            }
            Expr::Binary(BinOp::And, left, right) => {
                let l = self.eval(left)?;
                if truthy(&l) {
                    self.eval(right)
                } else {
                    Ok(l)
                }
            }
            Expr::Binary(BinOp::Or, left, right) => {
                let l = self.eval(left)?;
                if truthy(&l) {
                    Ok(l)
                } else {
                    self.eval(right)
                }
            }
            Expr::Binary(op, left, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                self.eval_binary(*op, l, r)
            }
            Expr::Compare(op, left, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                self.eval_compare(*op, l, r)
            }
            Expr::Index(target, index) => {
                let t = self.eval(target)?;
                let i = self.eval(index)?;
                eval_index(t, i)
            }
            Expr::Member(target, name) => match self.eval(target)? {
                Value::Object(map) => map.get(name).cloned().ok_or_else(|| {
                    ExpressionError::Invalid(format!("no member '{}' in mapping", name))
                }),
                other => Err(ExpressionError::Type(format!(
                    "member access is only supported on mappings, not {}",
                    type_name(&other)
                ))),
            },
        }
    }

    fn eval_unary(&self, op: UnaryOp, value: Value) -> Result<Value, ExpressionError> {
        match op {
            UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
            UnaryOp::Neg => match as_num(&value) {
                Some(Num::Int(i)) => i
                    .checked_neg()
                    .map(Value::from)
                    .ok_or_else(|| ExpressionError::Invalid("integer overflow".into())),
                Some(Num::Float(f)) => float_value(-f),
                None => Err(ExpressionError::Type(format!(
                    "cannot negate {}",
                    type_name(&value)
                ))),
            },
            UnaryOp::Pos => match as_num(&value) {
                Some(_) => Ok(value),
                None => Err(ExpressionError::Type(format!(
                    "unary '+' requires a number, not {}",
                    type_name(&value)
                ))),
            },
        }
    }

    fn eval_binary(&self, op: BinOp, l: Value, r: Value) -> Result<Value, ExpressionError> {
        match op {
            BinOp::Add => eval_add(l, r),
            BinOp::Mul => eval_mul(l, r),
            BinOp::Sub => numeric_op(op, l, r),
            BinOp::Div => numeric_op(op, l, r),
            BinOp::Mod => numeric_op(op, l, r),
            BinOp::Pow => numeric_op(op, l, r),
            // short-circuit operators are handled in eval()
            BinOp::And | BinOp::Or => unreachable!("boolean operators are short-circuited"),
        }
    }

    fn eval_compare(&self, op: CmpOp, l: Value, r: Value) -> Result<Value, ExpressionError> {
        let result = match op {
            CmpOp::Eq => values_equal(&l, &r),
            CmpOp::Ne => !values_equal(&l, &r),
            CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
                let ordering = compare_order(&l, &r)?;
                match op {
                    CmpOp::Lt => ordering == std::cmp::Ordering::Less,
                    CmpOp::Le => ordering != std::cmp::Ordering::Greater,
                    CmpOp::Gt => ordering == std::cmp::Ordering::Greater,
                    CmpOp::Ge => ordering != std::cmp::Ordering::Less,
                    _ => unreachable!(),
                }
            }
            CmpOp::In => eval_membership(&l, &r)?,
            CmpOp::NotIn => !eval_membership(&l, &r)?,
        };
        Ok(Value::Bool(result))
    }
}

fn eval_add(l: Value, r: Value) -> Result<Value, ExpressionError> {
    match (&l, &r) {
        (Value::String(a), Value::String(b)) => {
            if a.len() + b.len() > MAX_STRING_LEN {
                return Err(ExpressionError::Invalid("string result too long".into()));
            }
            Ok(Value::String(format!("{}{}", a, b)))
        }
        (Value::Array(a), Value::Array(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::Array(out))
        }
        _ => numeric_op(BinOp::Add, l, r),
    }
}

fn eval_mul(l: Value, r: Value) -> Result<Value, ExpressionError> {
    let repeat = |s: &str, n: i64| -> Result<Value, ExpressionError> {
        let n = n.max(0) as usize;
        if s.len().saturating_mul(n) > MAX_STRING_LEN {
            return Err(ExpressionError::Invalid("string result too long".into()));
        }
        Ok(Value::String(s.repeat(n)))
    };
    match (&l, &r) {
        (Value::String(s), Value::Number(n)) if n.as_i64().is_some() => {
            repeat(s, n.as_i64().unwrap_or(0))
        }
        (Value::Number(n), Value::String(s)) if n.as_i64().is_some() => {
            repeat(s, n.as_i64().unwrap_or(0))
        }
        _ => numeric_op(BinOp::Mul, l, r),
    }
}

fn numeric_op(op: BinOp, l: Value, r: Value) -> Result<Value, ExpressionError> {
    let op_symbol = match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
        BinOp::And | BinOp::Or => unreachable!(),
    };
    let (Some(a), Some(b)) = (as_num(&l), as_num(&r)) else {
        return Err(ExpressionError::Type(format!(
            "unsupported operands for '{}': {} and {}",
            op_symbol,
            type_name(&l),
            type_name(&r)
        )));
    };

    match op {
        BinOp::Div => {
            // true division, always a float
            let (x, y) = (to_f64(&a), to_f64(&b));
            if y == 0.0 {
                return Err(ExpressionError::Invalid("division by zero".into()));
            }
            float_value(x / y)
        }
        BinOp::Mod => match (a, b) {
            (Num::Int(x), Num::Int(y)) => {
                if y == 0 {
                    return Err(ExpressionError::Invalid("modulo by zero".into()));
                }
                Ok(Value::from(((x % y) + y) % y))
            }
            (a, b) => {
                let (x, y) = (to_f64(&a), to_f64(&b));
                if y == 0.0 {
                    return Err(ExpressionError::Invalid("modulo by zero".into()));
                }
                float_value(x - y * (x / y).floor())
            }
        },
        BinOp::Pow => {
            let exp = to_f64(&b);
            if exp.abs() > MAX_POW_EXPONENT {
                return Err(ExpressionError::Invalid("exponent too large".into()));
            }
            match (a, b) {
                (Num::Int(x), Num::Int(y)) if y >= 0 => x
                    .checked_pow(y as u32)
                    .map(Value::from)
                    .ok_or_else(|| ExpressionError::Invalid("integer overflow".into())),
                (a, _) => float_value(to_f64(&a).powf(exp)),
            }
        }
        _ => match (a, b) {
            (Num::Int(x), Num::Int(y)) => {
                let result = match op {
                    BinOp::Add => x.checked_add(y),
                    BinOp::Sub => x.checked_sub(y),
                    BinOp::Mul => x.checked_mul(y),
                    _ => unreachable!(),
                };
                result
                    .map(Value::from)
                    .ok_or_else(|| ExpressionError::Invalid("integer overflow".into()))
            }
            (a, b) => {
                let (x, y) = (to_f64(&a), to_f64(&b));
                let result = match op {
                    BinOp::Add => x + y,
                    BinOp::Sub => x - y,
                    BinOp::Mul => x * y,
                    _ => unreachable!(),
                };
                float_value(result)
            }
        },
    }
}

fn to_f64(n: &Num) -> f64 {
    match n {
        Num::Int(i) => *i as f64,
        Num::Float(f) => *f,
    }
}

fn compare_order(l: &Value, r: &Value) -> Result<std::cmp::Ordering, ExpressionError> {
    if let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) {
        return a.partial_cmp(&b).ok_or_else(|| {
            ExpressionError::Type("cannot order non-finite numbers".into())
        });
    }
    if let (Value::String(a), Value::String(b)) = (l, r) {
        return Ok(a.cmp(b));
    }
    Err(ExpressionError::Type(format!(
        "cannot order {} and {}",
        type_name(l),
        type_name(r)
    )))
}

fn eval_membership(needle: &Value, haystack: &Value) -> Result<bool, ExpressionError> {
    match haystack {
        Value::Array(items) => Ok(items.iter().any(|item| values_equal(needle, item))),
        Value::String(s) => match needle {
            Value::String(sub) => Ok(s.contains(sub.as_str())),
            other => Err(ExpressionError::Type(format!(
                "'in <string>' requires a string, not {}",
                type_name(other)
            ))),
        },
        Value::Object(map) => match needle {
            Value::String(key) => Ok(map.contains_key(key)),
            other => Err(ExpressionError::Type(format!(
                "'in <mapping>' requires a string key, not {}",
                type_name(other)
            ))),
        },
        other => Err(ExpressionError::Type(format!(
            "'in' is not supported on {}",
            type_name(other)
        ))),
    }
}

fn eval_index(target: Value, index: Value) -> Result<Value, ExpressionError> {
    match &target {
        Value::Array(items) => {
            let i = index.as_i64().ok_or_else(|| {
                ExpressionError::Type(format!(
                    "list indices must be integers, not {}",
                    type_name(&index)
                ))
            })?;
            let len = items.len() as i64;
            let resolved = if i < 0 { len + i } else { i };
            if resolved < 0 || resolved >= len {
                return Err(ExpressionError::Invalid("list index out of range".into()));
            }
            Ok(items[resolved as usize].clone())
        }
        Value::String(s) => {
            let i = index.as_i64().ok_or_else(|| {
                ExpressionError::Type(format!(
                    "string indices must be integers, not {}",
                    type_name(&index)
                ))
            })?;
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let resolved = if i < 0 { len + i } else { i };
            if resolved < 0 || resolved >= len {
                return Err(ExpressionError::Invalid("string index out of range".into()));
            }
            Ok(Value::String(chars[resolved as usize].to_string()))
        }
        Value::Object(map) => match &index {
            Value::String(key) => map
                .get(key)
                .cloned()
                .ok_or_else(|| ExpressionError::Invalid(format!("key '{}' not found", key))),
            other => Err(ExpressionError::Type(format!(
                "mapping keys must be strings, not {}",
                type_name(other)
            ))),
        },
        other => Err(ExpressionError::Type(format!(
            "{} is not indexable",
            type_name(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!([])));
        assert!(!truthy(&json!({})));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!("x")));
        assert!(truthy(&json!([0])));
    }

    #[test]
    fn test_numeric_equality_across_kinds() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!(true)));
        assert!(values_equal(&json!("a"), &json!("a")));
    }

    #[test]
    fn test_negative_string_index() {
        assert_eq!(eval_index(json!("abc"), json!(-1)).unwrap(), json!("c"));
        assert!(eval_index(json!("abc"), json!(3)).is_err());
    }

    #[test]
    fn test_python_modulo_sign() {
        assert_eq!(
            numeric_op(BinOp::Mod, json!(7), json!(-3)).unwrap(),
            json!(-2)
        );
        assert_eq!(
            numeric_op(BinOp::Mod, json!(-7), json!(3)).unwrap(),
            json!(2)
        );
    }
}
