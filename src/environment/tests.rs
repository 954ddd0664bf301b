//! The built-in test catalogue, invoked via `is`.

use std::rc::Rc;

use super::{Arguments, Environment};
use crate::value::{values_equal, Value};

pub fn register_builtins(env: &mut Environment) {
    env.register_test("defined", Rc::new(|v, _| Ok(!v.is_undefined())));
    env.register_test("undefined", Rc::new(|v, _| Ok(v.is_undefined())));
    env.register_test("none", Rc::new(|v, _| Ok(v.is_none())));
    env.register_test("boolean", Rc::new(|v, _| Ok(matches!(v, Value::Bool(_)))));
    env.register_test("string", Rc::new(|v, _| Ok(matches!(v, Value::String(_) | Value::SafeString(_)))));
    env.register_test("number", Rc::new(|v, _| Ok(matches!(v, Value::Int64(_) | Value::Float64(_)))));
    env.register_test("mapping", Rc::new(|v, _| Ok(matches!(v, Value::Dict(_) | Value::StringDict(_)))));
    env.register_test("iterable", Rc::new(|v, _| Ok(v.iter_values().is_some())));
    env.register_test("odd", Rc::new(|v, _| Ok(v.as_i64().map(|i| i % 2 != 0).unwrap_or(false))));
    env.register_test("even", Rc::new(|v, _| Ok(v.as_i64().map(|i| i % 2 == 0).unwrap_or(false))));
    env.register_test("divisibleby", Rc::new(divisibleby_test));
    env.register_test("eq", Rc::new(eq_test));
    env.register_test("==", Rc::new(eq_test));
    env.register_test("sameas", Rc::new(sameas_test));
}

fn divisibleby_test(v: Value, args: Arguments) -> Result<bool, String> {
    let divisor = args
        .get(0, "num")
        .and_then(|a| a.as_i64())
        .ok_or_else(|| "'divisibleby' requires a numeric argument".to_string())?;
    let value = v.as_i64().ok_or_else(|| "'divisibleby' requires a numeric value".to_string())?;
    if divisor == 0 {
        return Err("division by zero in 'divisibleby'".to_string());
    }
    Ok(value % divisor == 0)
}

fn eq_test(v: Value, args: Arguments) -> Result<bool, String> {
    let other = args.get(0, "other").ok_or_else(|| "'eq' requires an argument".to_string())?;
    Ok(values_equal(&v, &other))
}

fn sameas_test(v: Value, args: Arguments) -> Result<bool, String> {
    let other = args.get(0, "other").ok_or_else(|| "'sameas' requires an argument".to_string())?;
    Ok(match (&v, &other) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => values_equal(&v, &other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_test_uses_value_equality() {
        let result = eq_test(Value::Int64(2), Arguments::new(vec![Value::Float64(2.0)], Default::default()));
        assert_eq!(result, Ok(true));
    }

    #[test]
    fn divisibleby_rejects_zero_divisor() {
        let result = divisibleby_test(Value::Int64(4), Arguments::new(vec![Value::Int64(0)], Default::default()));
        assert!(result.is_err());
    }
}
