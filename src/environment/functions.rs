//! Global functions callable from expressions.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::{Arguments, Environment};
use crate::value::{Object, Value};

pub fn register_builtins(env: &mut Environment) {
    env.register_function("range", Rc::new(range_fn));
    env.register_function("dict", Rc::new(dict_fn));
    env.register_function("namespace", Rc::new(namespace_fn));
    env.register_function("cycler", Rc::new(cycler_fn));
    env.register_function("now", Rc::new(now_fn));
}

fn range_fn(args: Arguments) -> Result<Value, String> {
    let (start, stop, step) = match args.positional.len() {
        1 => (0i64, args.positional[0].as_i64().unwrap_or(0), 1i64),
        2 => (
            args.positional[0].as_i64().unwrap_or(0),
            args.positional[1].as_i64().unwrap_or(0),
            1i64,
        ),
        _ if args.positional.len() >= 3 => (
            args.positional[0].as_i64().unwrap_or(0),
            args.positional[1].as_i64().unwrap_or(0),
            args.positional[2].as_i64().unwrap_or(1),
        ),
        _ => return Err("'range' requires at least one argument".to_string()),
    };
    if step == 0 {
        return Err("'range' step must not be zero".to_string());
    }
    let mut items = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < stop {
            items.push(Value::Int64(i));
            i += step;
        }
    } else {
        while i > stop {
            items.push(Value::Int64(i));
            i += step;
        }
    }
    Ok(Value::array(items))
}

fn dict_fn(args: Arguments) -> Result<Value, String> {
    let mut map = BTreeMap::new();
    for (k, v) in args.kwargs {
        map.insert(k, v);
    }
    Ok(Value::string_dict(map))
}

/// Creates a mutable attribute bag. Jinja allows assigning through a
/// namespace object's attributes from inside a loop (`{% set ns.x = 1 %}`);
/// this crate's `Set` AST node only models simple/tuple name targets, so
/// `namespace()` is exposed for read access and construction-time kwargs but
/// attribute-assignment into it is not wired through the renderer. Recorded
/// as a scoped simplification in DESIGN.md.
fn namespace_fn(args: Arguments) -> Result<Value, String> {
    let mut map = BTreeMap::new();
    for (k, v) in args.kwargs {
        map.insert(k, v);
    }
    Ok(Value::string_dict(map))
}

#[derive(Debug)]
struct Cycler {
    items: Vec<Value>,
    index: RefCell<usize>,
}

impl Object for Cycler {
    fn get_attribute(&self, name: &str) -> Option<Value> {
        match name {
            "current" => self.items.get(*self.index.borrow() % self.items.len().max(1)).cloned(),
            _ => None,
        }
    }

    fn method(&self, name: &str) -> Option<Rc<dyn Fn(super::Arguments) -> Result<Value, String>>> {
        if name != "next" {
            return None;
        }
        None
    }

    fn call(&self, _args: super::Arguments) -> Result<Value, String> {
        if self.items.is_empty() {
            return Ok(Value::undefined("cycler"));
        }
        let mut idx = self.index.borrow_mut();
        let value = self.items[*idx % self.items.len()].clone();
        *idx += 1;
        Ok(value)
    }

    fn type_name(&self) -> &'static str {
        "cycler"
    }
}

impl fmt::Display for Cycler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<cycler>")
    }
}

fn cycler_fn(args: Arguments) -> Result<Value, String> {
    Ok(Value::Object(Rc::new(Cycler {
        items: args.positional,
        index: RefCell::new(0),
    })))
}

fn now_fn(_args: Arguments) -> Result<Value, String> {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(Value::Time(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_one_arg_is_zero_to_n() {
        let result = range_fn(Arguments::new(vec![Value::Int64(3)], Default::default())).unwrap();
        assert_eq!(result.finalize(), "[0, 1, 2]");
    }

    #[test]
    fn range_rejects_zero_step() {
        let result = range_fn(Arguments::new(
            vec![Value::Int64(0), Value::Int64(5), Value::Int64(0)],
            Default::default(),
        ));
        assert!(result.is_err());
    }
}
