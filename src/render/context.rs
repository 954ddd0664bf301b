//! The render context: scope stack, output buffer, and per-render state.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Expr, Node};
use crate::value::Value;

pub type Scope = Rc<RefCell<HashMap<String, Value>>>;

/// The chain search-list for one block name, built once at `extends`
/// resolution time: index 0 is the ancestor closest to (but not including)
/// the root, the last index is the most-derived override. See
/// `crate::render::inherit`.
pub struct BlockChain {
    pub bodies: Vec<Rc<Vec<Node>>>,
}

/// What a `super()` call resolves to from inside one level of a block's
/// override chain.
#[derive(Clone)]
pub enum SuperTarget {
    /// Render `bodies[index]`, itself good for further `super()` calls;
    /// `root_fallback` is carried along for when `index` reaches 0.
    ChainIndex {
        bodies: Vec<Rc<Vec<Node>>>,
        index: usize,
        root_fallback: Rc<Vec<Node>>,
    },
    /// Render the root template's own literal block body — the final rung.
    RootBody(Rc<Vec<Node>>),
    /// No parent remains; `super()` renders nothing.
    Exhausted,
}

/// State captured for a single recursive `{% for %}` loop so that a nested
/// `loop(iterable)` call can re-enter it.
pub struct RecursiveFrame {
    pub target: Vec<String>,
    pub body: Rc<Vec<Node>>,
    pub filter: Option<Rc<Expr>>,
}

pub struct Context {
    scopes: Vec<Scope>,
    pub output: String,
    pub block_chains: HashMap<String, BlockChain>,
    pub visited_templates: Vec<String>,
    pub super_stack: Vec<SuperTarget>,
    pub auto_escape_stack: Vec<bool>,
    pub recursive_for_stack: Vec<RecursiveFrame>,
    pub for_depth: usize,
}

impl Context {
    pub fn new() -> Self {
        Context {
            scopes: vec![Rc::new(RefCell::new(HashMap::new()))],
            output: String::new(),
            block_chains: HashMap::new(),
            visited_templates: Vec::new(),
            super_stack: Vec::new(),
            auto_escape_stack: vec![true],
            recursive_for_stack: Vec::new(),
            for_depth: 0,
        }
    }

    pub fn with_globals(globals: HashMap<String, Value>) -> Self {
        let mut ctx = Context::new();
        for (k, v) in globals {
            ctx.scopes[0].borrow_mut().insert(k, v);
        }
        ctx
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Rc::new(RefCell::new(HashMap::new())));
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn current_scope(&self) -> Scope {
        self.scopes.last().unwrap().clone()
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.borrow().get(name) {
                return Some(v.clone());
            }
        }
        None
    }

    pub fn assign(&mut self, name: impl Into<String>, value: Value) {
        self.scopes
            .last()
            .unwrap()
            .borrow_mut()
            .insert(name.into(), value);
    }

    pub fn snapshot_scopes(&self) -> Vec<Scope> {
        self.scopes.clone()
    }

    /// Swaps in an entirely different scope stack (used to enter a macro's
    /// or imported module's lexical closure) and returns the previous one
    /// so the caller can restore it.
    pub fn swap_scopes(&mut self, new_scopes: Vec<Scope>) -> Vec<Scope> {
        std::mem::replace(&mut self.scopes, new_scopes)
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}
