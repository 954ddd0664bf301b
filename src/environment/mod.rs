//! The registry for filters, tests, functions, globals, and the template
//! loader.

pub mod filters;
pub mod functions;
pub mod loader;
pub mod tests;

use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, trace};

use crate::value::Value;

pub use loader::{FsLoader, Loader, MemoryLoader};

/// The arguments bundle passed to filters, tests, functions, and macro/
/// object calls.
#[derive(Debug, Clone)]
pub struct Arguments {
    pub positional: Vec<Value>,
    pub kwargs: HashMap<String, Value>,
}

impl Arguments {
    pub fn new(positional: Vec<Value>, kwargs: HashMap<String, Value>) -> Self {
        Arguments { positional, kwargs }
    }

    pub fn empty() -> Self {
        Arguments {
            positional: Vec::new(),
            kwargs: HashMap::new(),
        }
    }

    pub fn get(&self, index: usize, name: &str) -> Option<Value> {
        self.positional
            .get(index)
            .cloned()
            .or_else(|| self.kwargs.get(name).cloned())
    }

    pub fn get_or(&self, index: usize, name: &str, default: Value) -> Value {
        self.get(index, name).unwrap_or(default)
    }
}

pub type FilterFn = Rc<dyn Fn(Value, Arguments) -> Result<Value, String>>;
pub type TestFn = Rc<dyn Fn(Value, Arguments) -> Result<bool, String>>;
pub type FunctionFn = Rc<dyn Fn(Arguments) -> Result<Value, String>>;

/// Undefined-value policy selected by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndefinedPolicy {
    /// Default: renders empty, compares by name, yields empty on iteration.
    Lenient,
    /// Any coercion/comparison/attribute access raises `InvalidOperand`.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoEscapePolicy {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct Delimiters {
    pub variable_start: String,
    pub variable_end: String,
    pub block_start: String,
    pub block_end: String,
    pub comment_start: String,
    pub comment_end: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Delimiters {
            variable_start: "{{".into(),
            variable_end: "}}".into(),
            block_start: "{%".into(),
            block_end: "%}".into(),
            comment_start: "{#".into(),
            comment_end: "#}".into(),
        }
    }
}

/// The environment: a read-mostly registry, frozen after construction.
pub struct Environment {
    filters: HashMap<String, FilterFn>,
    tests: HashMap<String, TestFn>,
    functions: HashMap<String, FunctionFn>,
    globals: HashMap<String, Value>,
    loader: Option<Rc<dyn Loader>>,
    pub undefined_policy: UndefinedPolicy,
    pub auto_escape_policy: AutoEscapePolicy,
    pub delimiters: Delimiters,
    frozen: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl Environment {
    /// `create → register built-ins → freeze → use`.
    pub fn new() -> Self {
        let mut env = Environment {
            filters: HashMap::new(),
            tests: HashMap::new(),
            functions: HashMap::new(),
            globals: HashMap::new(),
            loader: None,
            undefined_policy: UndefinedPolicy::Lenient,
            auto_escape_policy: AutoEscapePolicy::Enabled,
            delimiters: Delimiters::default(),
            frozen: false,
        };
        filters::register_builtins(&mut env);
        tests::register_builtins(&mut env);
        functions::register_builtins(&mut env);
        env.globals.insert("true".into(), Value::Bool(true));
        env.globals.insert("false".into(), Value::Bool(false));
        env.globals.insert("none".into(), Value::None);
        env.freeze();
        debug!("environment initialized with {} filters, {} tests, {} functions", env.filters.len(), env.tests.len(), env.functions.len());
        env
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Some(Rc::new(loader));
        self
    }

    pub fn with_undefined_policy(mut self, policy: UndefinedPolicy) -> Self {
        self.undefined_policy = policy;
        self
    }

    pub fn with_auto_escape_policy(mut self, policy: AutoEscapePolicy) -> Self {
        self.auto_escape_policy = policy;
        self
    }

    pub fn loader(&self) -> Option<&Rc<dyn Loader>> {
        self.loader.as_ref()
    }

    pub fn register_filter(&mut self, name: impl Into<String>, f: FilterFn) {
        assert!(!self.frozen, "cannot register a filter after the environment is frozen");
        self.filters.insert(name.into(), f);
    }

    pub fn register_test(&mut self, name: impl Into<String>, f: TestFn) {
        assert!(!self.frozen, "cannot register a test after the environment is frozen");
        self.tests.insert(name.into(), f);
    }

    pub fn register_function(&mut self, name: impl Into<String>, f: FunctionFn) {
        assert!(!self.frozen, "cannot register a function after the environment is frozen");
        self.functions.insert(name.into(), f);
    }

    pub fn register_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn filter(&self, name: &str) -> Option<FilterFn> {
        let found = self.filters.get(name).cloned();
        trace_lookup("filter", name, found.is_some());
        found
    }

    pub fn test(&self, name: &str) -> Option<TestFn> {
        let found = self.tests.get(name).cloned();
        trace_lookup("test", name, found.is_some());
        found
    }

    pub fn function(&self, name: &str) -> Option<FunctionFn> {
        let found = self.functions.get(name).cloned();
        trace_lookup("function", name, found.is_some());
        found
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn has_test(&self, name: &str) -> bool {
        self.tests.contains_key(name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

fn trace_lookup(kind: &str, name: &str, found: bool) {
    trace!("environment: lookup {kind} `{name}` -> {}", if found { "hit" } else { "miss" });
}
