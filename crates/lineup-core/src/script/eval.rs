//! Tree-walking evaluator for parsed scripts.

use std::collections::HashMap;

use crate::error::EvalError;

use super::ast::{BinaryOp, Expr, UnaryOp};

/// A runtime value: a number or a list of numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    List(Vec<f64>),
}

impl Value {
    /// The numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::List(_) => None,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::List(_) => true,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Vec<f64>> for Value {
    fn from(list: Vec<f64>) -> Self {
        Value::List(list)
    }
}

/// Variables visible to a script.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value`, returning `self` for chaining.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Evaluate `expr` against `scope`.
pub fn evaluate(expr: &Expr, scope: &Scope) -> EvalResult<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Variable(name) => scope
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownIdentifier(name.clone())),
        Expr::Array(items) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                list.push(number(evaluate(item, scope)?, "array element")?);
            }
            Ok(Value::List(list))
        }
        Expr::Length(target) => match evaluate(target, scope)? {
            Value::List(list) => Ok(Value::Number(list.len() as f64)),
            Value::Number(_) => Err(EvalError::TypeMismatch("length of a number".into())),
        },
        Expr::Index { target, index } => {
            let list = match evaluate(target, scope)? {
                Value::List(list) => list,
                Value::Number(_) => return Err(EvalError::TypeMismatch("indexing a number".into())),
            };
            let i = number(evaluate(index, scope)?, "index")?;
            let value = if i >= 0.0 && i.fract() == 0.0 {
                list.get(i as usize).copied().unwrap_or(f64::NAN)
            } else {
                f64::NAN
            };
            Ok(Value::Number(value))
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, scope)?;
            match op {
                UnaryOp::Not => Ok(bool_value(!value.truthy())),
                UnaryOp::Negate => Ok(Value::Number(-number(value, "negation")?)),
                UnaryOp::Plus => Ok(Value::Number(number(value, "unary plus")?)),
            }
        }
        Expr::Binary { op, left, right } => binary(*op, left, right, scope),
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => {
            if evaluate(condition, scope)?.truthy() {
                evaluate(then, scope)
            } else {
                evaluate(otherwise, scope)
            }
        }
        Expr::Call { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate(arg, scope)?);
            }
            call(name, values)
        }
    }
}

fn bool_value(b: bool) -> Value {
    Value::Number(if b { 1.0 } else { 0.0 })
}

fn number(value: Value, context: &str) -> EvalResult<f64> {
    value
        .as_number()
        .ok_or_else(|| EvalError::TypeMismatch(format!("expected a number in {context}")))
}

fn binary(op: BinaryOp, left: &Expr, right: &Expr, scope: &Scope) -> EvalResult<Value> {
    // Logical operators short-circuit and yield one of their operands.
    match op {
        BinaryOp::And => {
            let l = evaluate(left, scope)?;
            return if l.truthy() { evaluate(right, scope) } else { Ok(l) };
        }
        BinaryOp::Or => {
            let l = evaluate(left, scope)?;
            return if l.truthy() { Ok(l) } else { evaluate(right, scope) };
        }
        _ => {}
    }

    let l = number(evaluate(left, scope)?, "binary operation")?;
    let r = number(evaluate(right, scope)?, "binary operation")?;
    Ok(match op {
        BinaryOp::Add => Value::Number(l + r),
        BinaryOp::Subtract => Value::Number(l - r),
        BinaryOp::Multiply => Value::Number(l * r),
        BinaryOp::Divide => Value::Number(l / r),
        BinaryOp::Remainder => Value::Number(l % r),
        BinaryOp::Power => Value::Number(l.powf(r)),
        BinaryOp::Equal => bool_value(l == r),
        BinaryOp::NotEqual => bool_value(l != r),
        BinaryOp::Less => bool_value(l < r),
        BinaryOp::Greater => bool_value(l > r),
        BinaryOp::LessEqual => bool_value(l <= r),
        BinaryOp::GreaterEqual => bool_value(l >= r),
        BinaryOp::And => bool_value(l != 0.0 && r != 0.0),
        BinaryOp::Or => bool_value(l != 0.0 || r != 0.0),
    })
}

/// Flatten numbers and lists into one vector, dropping NaN.
fn collect(values: Vec<Value>) -> Vec<f64> {
    let mut out = Vec::new();
    for value in values {
        match value {
            Value::Number(n) => out.push(n),
            Value::List(list) => out.extend(list),
        }
    }
    out.retain(|v| !v.is_nan());
    out
}

fn unary_fn(name: &str, values: Vec<Value>, f: fn(f64) -> f64) -> EvalResult<Value> {
    match values.as_slice() {
        [Value::Number(n)] => Ok(Value::Number(f(*n))),
        _ => Err(EvalError::invalid_arguments(name, "expected one number")),
    }
}

fn numbers<const N: usize>(name: &str, values: &[Value]) -> EvalResult<[f64; N]> {
    if values.len() != N {
        return Err(EvalError::invalid_arguments(
            name,
            format!("expected {N} arguments, got {}", values.len()),
        ));
    }
    let mut out = [0.0; N];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = value
            .as_number()
            .ok_or_else(|| EvalError::invalid_arguments(name, "expected numbers"))?;
    }
    Ok(out)
}

fn call(name: &str, values: Vec<Value>) -> EvalResult<Value> {
    let result = match name {
        "linear" => {
            let [v, min, max] = numbers::<3>(name, &values)?;
            (v - min) / (max - min)
        }
        "pow" => {
            let [base, exp] = numbers::<2>(name, &values)?;
            base.powf(exp)
        }
        "clamp" => {
            let [v, lo, hi] = numbers::<3>(name, &values)?;
            v.max(lo).min(hi)
        }
        "abs" => return unary_fn(name, values, f64::abs),
        "sqrt" => return unary_fn(name, values, f64::sqrt),
        "log" => return unary_fn(name, values, f64::ln),
        "log10" => return unary_fn(name, values, f64::log10),
        "exp" => return unary_fn(name, values, f64::exp),
        "floor" => return unary_fn(name, values, f64::floor),
        "ceil" => return unary_fn(name, values, f64::ceil),
        "round" => return unary_fn(name, values, |v| (v + 0.5).floor()),
        "min" => collect(values).into_iter().reduce(f64::min).unwrap_or(f64::NAN),
        "max" => collect(values).into_iter().reduce(f64::max).unwrap_or(f64::NAN),
        "sum" => collect(values).into_iter().sum(),
        "mean" => {
            let all = collect(values);
            if all.is_empty() {
                f64::NAN
            } else {
                all.iter().sum::<f64>() / all.len() as f64
            }
        }
        "median" => {
            let mut all = collect(values);
            if all.is_empty() {
                f64::NAN
            } else {
                all.sort_by(f64::total_cmp);
                let mid = all.len() / 2;
                if all.len() % 2 == 0 {
                    (all[mid - 1] + all[mid]) / 2.0
                } else {
                    all[mid]
                }
            }
        }
        _ => return Err(EvalError::UnknownIdentifier(name.to_string())),
    };
    Ok(Value::Number(result))
}
