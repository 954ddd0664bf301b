//! The `loop` object exposed inside `for` bodies.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::environment::Arguments;
use crate::value::{values_equal, Object, Value};

#[derive(Debug, Clone)]
pub struct LoopState {
    pub index0: usize,
    pub length: usize,
    pub depth: usize,
    pub previtem: Value,
    pub nextitem: Value,
    changed_state: Rc<RefCell<Option<Vec<Value>>>>,
}

impl LoopState {
    pub fn new(index0: usize, length: usize, depth: usize, previtem: Value, nextitem: Value) -> Self {
        LoopState {
            index0,
            length,
            depth,
            previtem,
            nextitem,
            changed_state: Rc::new(RefCell::new(None)),
        }
    }

    /// Carries the `changed()` memory across iterations of the same loop.
    pub fn share_changed_state(&mut self, other: &LoopState) {
        self.changed_state = other.changed_state.clone();
    }
}

impl Object for LoopState {
    fn get_attribute(&self, name: &str) -> Option<Value> {
        match name {
            "index" => Some(Value::Int64(self.index0 as i64 + 1)),
            "index0" => Some(Value::Int64(self.index0 as i64)),
            "revindex" => Some(Value::Int64((self.length - self.index0) as i64)),
            "revindex0" => Some(Value::Int64((self.length - self.index0 - 1) as i64)),
            "first" => Some(Value::Bool(self.index0 == 0)),
            "last" => Some(Value::Bool(self.index0 + 1 == self.length)),
            "length" => Some(Value::Int64(self.length as i64)),
            "depth" => Some(Value::Int64(self.depth as i64 + 1)),
            "depth0" => Some(Value::Int64(self.depth as i64)),
            "previtem" => Some(self.previtem.clone()),
            "nextitem" => Some(self.nextitem.clone()),
            _ => None,
        }
    }

    fn method(&self, name: &str) -> Option<Rc<dyn Fn(Arguments) -> Result<Value, String>>> {
        match name {
            "cycle" => {
                let index0 = self.index0;
                Some(Rc::new(move |args: Arguments| {
                    if args.positional.is_empty() {
                        return Err("'loop.cycle' requires at least one argument".to_string());
                    }
                    Ok(args.positional[index0 % args.positional.len()].clone())
                }))
            }
            "changed" => {
                let state = self.changed_state.clone();
                Some(Rc::new(move |args: Arguments| {
                    let mut prev = state.borrow_mut();
                    let same = prev
                        .as_ref()
                        .map(|p| {
                            p.len() == args.positional.len()
                                && p.iter().zip(&args.positional).all(|(a, b)| values_equal(a, b))
                        })
                        .unwrap_or(false);
                    *prev = Some(args.positional);
                    Ok(Value::Bool(!same))
                }))
            }
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        "loop"
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<loop index={}>", self.index0 + 1)
    }
}
