//! Macro closures, capturing the defining scope by value.

use crate::ast::{MacroParam, Node};
use crate::render::context::Scope;

pub struct Macro {
    pub name: String,
    pub params: Vec<MacroParam>,
    pub body: Vec<Node>,
    /// The scope stack visible at the point of definition, captured by
    /// value (by `Rc` clone) so the macro may be invoked after its
    /// defining block has exited.
    pub closure: Vec<Scope>,
}
