//! Expression evaluation.
//!
//! Arithmetic and comparison follow loose scripting rules: strings that
//! look like numbers take part in arithmetic as numbers, `+` with a string
//! operand concatenates, and `/` always yields a float.

use std::cmp::Ordering;

use kwdsl_core::{ArithOp, CompareOp, Expr, Literal, LogicOp, ParamItem};

use crate::error::ExecError;
use crate::executor::Executor;
use crate::value::{integer_text, numeric_text, Value};

impl Executor {
    pub fn eval_expr(&mut self, expr: &Expr) -> Result<Value, ExecError> {
        match expr {
            Expr::Literal { value } => Ok(self.eval_literal(value)),
            Expr::Placeholder { text } => Ok(self.replacer().replace_in_string(text)),
            Expr::Var { name } => Ok(self
                .replacer()
                .lookup(name)
                .unwrap_or_else(|| Value::Str(name.clone()))),
            Expr::List { items } => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_expr(item)?);
                }
                Ok(Value::List(out))
            }
            Expr::Dict { items } => {
                let mut out = std::collections::BTreeMap::new();
                for (k, v) in items {
                    let key = match self.eval_expr(k)? {
                        Value::Str(s) => s,
                        other => other.to_string(),
                    };
                    out.insert(key, self.eval_expr(v)?);
                }
                Ok(Value::Map(out))
            }
            Expr::Neg { operand } => negate(self.eval_expr(operand)?),
            Expr::Not { operand } => Ok(Value::Bool(!self.eval_expr(operand)?.is_truthy())),
            Expr::Logic { op, left, right } => {
                let l = self.eval_expr(left)?.is_truthy();
                let result = match op {
                    LogicOp::And => l && self.eval_expr(right)?.is_truthy(),
                    LogicOp::Or => l || self.eval_expr(right)?.is_truthy(),
                };
                Ok(Value::Bool(result))
            }
            Expr::Arith { op, left, right } => {
                let l = self.eval_expr(left)?;
                let r = self.eval_expr(right)?;
                arith(*op, l, r)
            }
            Expr::Compare { op, left, right } => {
                let l = self.eval_expr(left)?;
                let r = self.eval_expr(right)?;
                compare(*op, l, r).map(Value::Bool)
            }
            Expr::Call { call } => {
                let args = self.eval_args(&call.args)?;
                let raw = self.invoke_keyword(&call.name, args, call.line)?;
                self.absorb(raw)
            }
            Expr::RemoteCall { call } => {
                let args = self.eval_args(&call.args)?;
                let raw = self.call_remote(call, args)?;
                self.absorb(raw)
            }
        }
    }

    /// Parse and evaluate a standalone condition such as
    /// `${result.code} == 200`.
    pub fn eval_condition(&mut self, source: &str) -> Result<bool, ExecError> {
        let expr = kwdsl_core::parse_expression(source)?;
        Ok(self.eval_expr(&expr)?.is_truthy())
    }

    pub(crate) fn eval_args(
        &mut self,
        args: &[ParamItem],
    ) -> Result<Vec<(String, Value)>, ExecError> {
        let mut out = Vec::with_capacity(args.len());
        for item in args {
            out.push((item.name.clone(), self.eval_expr(&item.value)?));
        }
        Ok(out)
    }

    fn eval_literal(&self, lit: &Literal) -> Value {
        match lit {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(n) => Value::Int(*n),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => self.replacer().replace_in_string(s),
            Literal::Date(d) => Value::Str(d.clone()),
        }
    }
}

// ──────────────────────────────────────────────
// Operators
// ──────────────────────────────────────────────

fn negate(v: Value) -> Result<Value, ExecError> {
    match to_number(v) {
        Value::Int(n) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| ExecError::type_error("integer overflow in negation")),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(ExecError::type_error(format!(
            "bad operand type for unary -: {}",
            other.type_name()
        ))),
    }
}

/// Numeric-looking strings and booleans become numbers; everything else
/// is returned unchanged.
fn to_number(v: Value) -> Value {
    match v {
        Value::Str(s) => numeric_text(&s).unwrap_or(Value::Str(s)),
        Value::Bool(b) => Value::Int(i64::from(b)),
        other => other,
    }
}

fn arith(op: ArithOp, l: Value, r: Value) -> Result<Value, ExecError> {
    let l = to_number(l);
    let r = to_number(r);

    match (op, &l, &r) {
        (ArithOp::Add, Value::Str(_), _) | (ArithOp::Add, _, Value::Str(_)) => {
            return Ok(Value::Str(format!("{}{}", l, r)));
        }
        (ArithOp::Add, Value::List(a), Value::List(b)) => {
            return Ok(Value::List(a.iter().chain(b).cloned().collect()));
        }
        (ArithOp::Mul, Value::Str(s), Value::Int(n)) | (ArithOp::Mul, Value::Int(n), Value::Str(s)) => {
            return Ok(Value::Str(s.repeat((*n).max(0) as usize)));
        }
        _ => {}
    }

    let unsupported = || {
        ExecError::type_error(format!(
            "unsupported operand types for {}: {} and {}",
            op.symbol(),
            l.type_name(),
            r.type_name()
        ))
    };
    let overflow = || ExecError::type_error(format!("integer overflow in {}", op.symbol()));

    match (&l, &r) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            match op {
                ArithOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
                ArithOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
                ArithOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
                ArithOp::Div => {
                    if b == 0 {
                        Err(ExecError::DivisionByZero { op: "division" })
                    } else {
                        Ok(Value::Float(a as f64 / b as f64))
                    }
                }
                ArithOp::Mod => {
                    if b == 0 {
                        return Err(ExecError::DivisionByZero { op: "modulo" });
                    }
                    let m = a.checked_rem(b).ok_or_else(overflow)?;
                    Ok(Value::Int(if m != 0 && (m < 0) != (b < 0) { m + b } else { m }))
                }
            }
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = (l.as_f64().unwrap_or(0.0), r.as_f64().unwrap_or(0.0));
            match op {
                ArithOp::Add => Ok(Value::Float(a + b)),
                ArithOp::Sub => Ok(Value::Float(a - b)),
                ArithOp::Mul => Ok(Value::Float(a * b)),
                ArithOp::Div => {
                    if b == 0.0 {
                        Err(ExecError::DivisionByZero { op: "division" })
                    } else {
                        Ok(Value::Float(a / b))
                    }
                }
                ArithOp::Mod => {
                    if b == 0.0 {
                        return Err(ExecError::DivisionByZero { op: "modulo" });
                    }
                    let m = a % b;
                    Ok(Value::Float(if m != 0.0 && (m < 0.0) != (b < 0.0) { m + b } else { m }))
                }
            }
        }
        _ => Err(unsupported()),
    }
}

/// Digit-only strings compare as integers.
fn compare_operand(v: Value) -> Value {
    match v {
        Value::Str(s) => match integer_text(&s) {
            Some(n) => Value::Int(n),
            None => Value::Str(s),
        },
        other => other,
    }
}

pub(crate) fn compare(op: CompareOp, l: Value, r: Value) -> Result<bool, ExecError> {
    let l = compare_operand(l);
    let r = compare_operand(r);

    let ordering = match (&l, &r) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = (l.as_f64().unwrap_or(0.0), r.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b)
        }
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    };

    let equal = ordering.map_or(l == r, |o| o == Ordering::Equal);
    let ordered = |test: fn(Ordering) -> bool| {
        ordering.map(test).ok_or_else(|| {
            ExecError::type_error(format!(
                "'{}' not supported between {} and {}",
                op.symbol(),
                l.type_name(),
                r.type_name()
            ))
        })
    };
    match op {
        CompareOp::Eq => Ok(equal),
        CompareOp::Neq => Ok(!equal),
        CompareOp::Lt => ordered(Ordering::is_lt),
        CompareOp::Lte => ordered(Ordering::is_le),
        CompareOp::Gt => ordered(Ordering::is_gt),
        CompareOp::Gte => ordered(Ordering::is_ge),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_strings_join_arithmetic() {
        assert_eq!(arith(ArithOp::Add, "3".into(), Value::Int(4)).unwrap(), Value::Int(7));
        assert_eq!(
            arith(ArithOp::Add, "1.5".into(), Value::Int(1)).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            arith(ArithOp::Add, "id-".into(), Value::Int(4)).unwrap(),
            Value::from("id-4")
        );
        assert_eq!(
            arith(ArithOp::Mul, "ab".into(), Value::Int(3)).unwrap(),
            Value::from("ababab")
        );
    }

    #[test]
    fn division_is_float_and_modulo_follows_divisor_sign() {
        assert_eq!(arith(ArithOp::Div, Value::Int(7), Value::Int(2)).unwrap(), Value::Float(3.5));
        assert_eq!(arith(ArithOp::Div, Value::Int(4), Value::Int(2)).unwrap(), Value::Float(2.0));
        assert_eq!(arith(ArithOp::Mod, Value::Int(-7), Value::Int(3)).unwrap(), Value::Int(2));
        assert_eq!(arith(ArithOp::Mod, Value::Int(7), Value::Int(-3)).unwrap(), Value::Int(-2));
        assert!(matches!(
            arith(ArithOp::Div, Value::Int(1), Value::Int(0)),
            Err(ExecError::DivisionByZero { op: "division" })
        ));
        assert!(matches!(
            arith(ArithOp::Mod, Value::Float(1.0), Value::Float(0.0)),
            Err(ExecError::DivisionByZero { op: "modulo" })
        ));
    }

    #[test]
    fn unsupported_operands_are_type_errors() {
        let err = arith(ArithOp::Sub, Value::from("a"), Value::Int(1)).unwrap_err();
        assert!(err.to_string().contains("unsupported operand types for -: string and int"));
        assert!(negate(Value::Null).is_err());
        assert_eq!(negate("5".into()).unwrap(), Value::Int(-5));
    }

    #[test]
    fn comparisons_coerce_digit_strings_only() {
        assert!(compare(CompareOp::Eq, "200".into(), Value::Int(200)).unwrap());
        assert!(!compare(CompareOp::Eq, "2.0".into(), Value::Float(2.0)).unwrap());
        assert!(compare(CompareOp::Lt, Value::Int(1), Value::Float(1.5)).unwrap());
        assert!(compare(CompareOp::Gte, "b".into(), "a".into()).unwrap());
        assert!(compare(CompareOp::Neq, Value::Null, Value::Int(0)).unwrap());
        assert!(compare(CompareOp::Lt, Value::from("x"), Value::Int(1)).is_err());
    }
}
