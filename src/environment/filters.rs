//! The built-in filter catalogue.
//!
//! Each filter is a plain `Fn(Value, Arguments) -> Result<Value, String>`
//! registered into the environment. This is a representative catalogue, not
//! parity with any specific Jinja implementation.

use std::rc::Rc;

use super::{Arguments, Environment};
use crate::value::{values_compare, Value};

pub fn register_builtins(env: &mut Environment) {
    env.register_filter("upper", Rc::new(|v, _| Ok(Value::string(v.finalize().to_uppercase()))));
    env.register_filter("lower", Rc::new(|v, _| Ok(Value::string(v.finalize().to_lowercase()))));
    env.register_filter("trim", Rc::new(|v, _| Ok(Value::string(v.finalize().trim().to_string()))));
    env.register_filter("length", Rc::new(length_filter));
    env.register_filter("count", Rc::new(length_filter));
    env.register_filter("join", Rc::new(join_filter));
    env.register_filter("default", Rc::new(default_filter));
    env.register_filter("d", Rc::new(default_filter));
    env.register_filter("first", Rc::new(first_filter));
    env.register_filter("last", Rc::new(last_filter));
    env.register_filter("reverse", Rc::new(reverse_filter));
    env.register_filter("sort", Rc::new(sort_filter));
    env.register_filter("map", Rc::new(map_filter));
    env.register_filter("select", Rc::new(select_filter(false)));
    env.register_filter("reject", Rc::new(select_filter(true)));
    env.register_filter("round", Rc::new(round_filter));
    env.register_filter("int", Rc::new(|v, _| Ok(Value::Int64(v.as_i64().unwrap_or(0)))));
    env.register_filter("float", Rc::new(|v, _| Ok(Value::Float64(v.as_f64().unwrap_or(0.0)))));
    env.register_filter("string", Rc::new(|v, _| Ok(Value::string(v.finalize()))));
    env.register_filter("list", Rc::new(|v, _| Ok(Value::array(v.iter_values().unwrap_or_default()))));
    env.register_filter("safe", Rc::new(|v, _| Ok(Value::safe(v.finalize()))));
    env.register_filter("escape", Rc::new(escape_filter));
    env.register_filter("e", Rc::new(escape_filter));
    env.register_filter("replace", Rc::new(replace_filter));
    env.register_filter("title", Rc::new(title_filter));
    env.register_filter("capitalize", Rc::new(capitalize_filter));
    env.register_filter("truncate", Rc::new(truncate_filter));
    env.register_filter("wordcount", Rc::new(|v, _| {
        Ok(Value::Int64(v.finalize().split_whitespace().count() as i64))
    }));
    env.register_filter("indent", Rc::new(indent_filter));
    env.register_filter("tojson", Rc::new(tojson_filter));
}

fn length_filter(v: Value, _args: Arguments) -> Result<Value, String> {
    v.length()
        .map(|n| Value::Int64(n as i64))
        .ok_or_else(|| format!("object of type '{}' has no length", v.type_name()))
}

fn join_filter(v: Value, args: Arguments) -> Result<Value, String> {
    let sep = args.get_or(0, "d", Value::string("")).finalize();
    let items = v.iter_values().ok_or_else(|| "'join' requires an iterable".to_string())?;
    Ok(Value::string(
        items.iter().map(|i| i.finalize()).collect::<Vec<_>>().join(&sep),
    ))
}

fn default_filter(v: Value, args: Arguments) -> Result<Value, String> {
    let fallback = args.get_or(0, "default_value", Value::string(""));
    let use_for_falsy = args.get_or(1, "boolean", Value::Bool(false)).is_truthy();
    if v.is_undefined() || (use_for_falsy && !v.is_truthy()) {
        Ok(fallback)
    } else {
        Ok(v)
    }
}

fn first_filter(v: Value, _args: Arguments) -> Result<Value, String> {
    Ok(v.iter_values()
        .and_then(|items| items.into_iter().next())
        .unwrap_or_else(|| Value::undefined("first")))
}

fn last_filter(v: Value, _args: Arguments) -> Result<Value, String> {
    Ok(v.iter_values()
        .and_then(|items| items.into_iter().last())
        .unwrap_or_else(|| Value::undefined("last")))
}

fn reverse_filter(v: Value, _args: Arguments) -> Result<Value, String> {
    let mut items = v.iter_values().ok_or_else(|| "'reverse' requires an iterable".to_string())?;
    items.reverse();
    Ok(Value::array(items))
}

fn sort_filter(v: Value, args: Arguments) -> Result<Value, String> {
    let reverse = args.get_or(0, "reverse", Value::Bool(false)).is_truthy();
    let mut items = v.iter_values().ok_or_else(|| "'sort' requires an iterable".to_string())?;
    items.sort_by(|a, b| values_compare(a, b).unwrap_or(std::cmp::Ordering::Equal));
    if reverse {
        items.reverse();
    }
    Ok(Value::array(items))
}

fn map_filter(v: Value, args: Arguments) -> Result<Value, String> {
    let attr = args
        .get(0, "attribute")
        .and_then(|a| a.as_str())
        .ok_or_else(|| "'map' requires an 'attribute' argument".to_string())?;
    let items = v.iter_values().ok_or_else(|| "'map' requires an iterable".to_string())?;
    Ok(Value::array(items.into_iter().map(|i| i.get_attr(&attr)).collect()))
}

fn select_filter(negate: bool) -> impl Fn(Value, Arguments) -> Result<Value, String> {
    move |v: Value, args: Arguments| {
        let items = v.iter_values().ok_or_else(|| "requires an iterable".to_string())?;
        let kept = items
            .into_iter()
            .filter(|item| {
                let truthy = item.is_truthy();
                truthy != negate
            })
            .collect();
        let _ = &args;
        Ok(Value::array(kept))
    }
}

fn round_filter(v: Value, args: Arguments) -> Result<Value, String> {
    let precision = args.get_or(0, "precision", Value::Int64(0)).as_i64().unwrap_or(0);
    let x = v.as_f64().ok_or_else(|| "'round' requires a number".to_string())?;
    let factor = 10f64.powi(precision as i32);
    Ok(Value::Float64((x * factor).round() / factor))
}

fn escape_filter(v: Value, _args: Arguments) -> Result<Value, String> {
    Ok(Value::safe(crate::value::html_escape(&v.finalize())))
}

fn replace_filter(v: Value, args: Arguments) -> Result<Value, String> {
    let from = args.get(0, "old").map(|v| v.finalize()).unwrap_or_default();
    let to = args.get(1, "new").map(|v| v.finalize()).unwrap_or_default();
    Ok(Value::string(v.finalize().replace(&from, &to)))
}

fn title_filter(v: Value, _args: Arguments) -> Result<Value, String> {
    let s = v.finalize();
    let titled: String = s
        .split_inclusive(char::is_whitespace)
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    Ok(Value::string(titled))
}

fn capitalize_filter(v: Value, _args: Arguments) -> Result<Value, String> {
    let s = v.finalize();
    let mut chars = s.chars();
    let out = match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    };
    Ok(Value::string(out))
}

fn truncate_filter(v: Value, args: Arguments) -> Result<Value, String> {
    let length = args.get_or(0, "length", Value::Int64(255)).as_i64().unwrap_or(255) as usize;
    let s = v.finalize();
    if s.chars().count() <= length {
        return Ok(Value::string(s));
    }
    let truncated: String = s.chars().take(length.saturating_sub(3)).collect();
    Ok(Value::string(format!("{truncated}...")))
}

fn indent_filter(v: Value, args: Arguments) -> Result<Value, String> {
    let width = args.get_or(0, "width", Value::Int64(4)).as_i64().unwrap_or(4).max(0) as usize;
    let first_line = args.get_or(1, "first", Value::Bool(false)).is_truthy();
    let pad = " ".repeat(width);
    let s = v.finalize();
    let lines: Vec<&str> = s.split('\n').collect();
    let out = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 && !first_line {
                line.to_string()
            } else if line.is_empty() {
                line.to_string()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Value::string(out))
}

fn tojson_filter(v: Value, _args: Arguments) -> Result<Value, String> {
    Ok(Value::safe(value_to_json_string(&v)))
}

fn value_to_json_string(v: &Value) -> String {
    match v {
        Value::None | Value::Undefined { .. } => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Float64(f) => f.to_string(),
        Value::String(s) | Value::SafeString(s) => serde_json::to_string(s.as_ref()).unwrap_or_default(),
        Value::Array(a) => {
            let items: Vec<String> = a.borrow().iter().map(value_to_json_string).collect();
            format!("[{}]", items.join(","))
        }
        Value::Dict(d) => {
            let items: Vec<String> = d
                .borrow()
                .iter()
                .map(|(k, v)| format!("{}:{}", value_to_json_string(k), value_to_json_string(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::StringDict(d) => {
            let items: Vec<String> = d
                .borrow()
                .iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), value_to_json_string(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Macro(_) | Value::Object(_) => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_filter_concatenates_with_separator() {
        let v = Value::array(vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]);
        let args = Arguments::new(vec![Value::string("-")], Default::default());
        assert_eq!(join_filter(v, args).unwrap().finalize(), "1-2-3");
    }

    #[test]
    fn default_filter_only_applies_to_undefined_by_default() {
        let result = default_filter(Value::undefined("x"), Arguments::new(vec![Value::string("fallback")], Default::default())).unwrap();
        assert_eq!(result.finalize(), "fallback");
        let result = default_filter(Value::Int64(0), Arguments::new(vec![Value::string("fallback")], Default::default())).unwrap();
        assert_eq!(result.finalize(), "0");
    }
}
