//! Best-effort type inference for schema-aware lint rules: a lint aid, not
//! the renderer's own evaluator, so an inconclusive trace returns `Any`
//! rather than failing.

use std::collections::HashMap;

use crate::ast::{BinOp, Expr, ExprKind, Node, NodeKind};

/// A traced type reference: a name (`"Any"`, `"Number"`, or a user-chosen
/// tag) plus optional type arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub name: String,
    pub args: Vec<TypeRef>,
}

impl TypeRef {
    pub fn any() -> Self {
        TypeRef { name: "Any".to_string(), args: Vec::new() }
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeRef { name: name.into(), args: Vec::new() }
    }

    /// `Any`/`Value` matches anything; `Number` matches `Int64|Float64|Number`;
    /// otherwise name-equality.
    pub fn compatible_with(&self, other: &TypeRef) -> bool {
        if self.name == "Any" || self.name == "Value" || other.name == "Any" || other.name == "Value" {
            return true;
        }
        if self.name == "Number" || other.name == "Number" {
            let is_numberish = |t: &str| matches!(t, "Number" | "Int64" | "Float64" | "int" | "float");
            return is_numberish(&self.name) && is_numberish(&other.name);
        }
        self.name == other.name
    }
}

/// A scope mapping names to the type traced for their defining `Set` or
/// macro parameter. One `Typer` per top-level template; nested scopes
/// (`for`, `with`, macro bodies) push/pop like the renderer's own `Context`.
pub struct Typer {
    scopes: Vec<HashMap<String, TypeRef>>,
}

impl Typer {
    pub fn new() -> Self {
        Typer { scopes: vec![HashMap::new()] }
    }

    /// Walks `body`, recording the inferred type of every `Set` target and
    /// macro parameter so later `infer_expr` calls on `Name` references can
    /// resolve them. Never raises; unresolvable bindings are simply omitted.
    pub fn trace_body(&mut self, body: &[Node]) {
        for node in body {
            self.trace_node(node);
        }
    }

    fn trace_node(&mut self, node: &Node) {
        match &node.kind {
            NodeKind::Set { target, value } => {
                let ty = self.infer_expr(value);
                if let Some(name) = target.first() {
                    self.bind(name.clone(), ty);
                }
            }
            NodeKind::SetBlock { target, .. } => {
                self.bind(target.clone(), TypeRef::named("string"));
            }
            NodeKind::Macro { params, body, .. } => {
                self.push_scope();
                for param in params {
                    let ty = param
                        .default
                        .as_ref()
                        .map(|d| self.infer_expr(d))
                        .unwrap_or_else(TypeRef::any);
                    self.bind(param.name.clone(), ty);
                }
                self.trace_body(body);
                self.pop_scope();
            }
            NodeKind::For { target, body, else_body, .. } => {
                self.push_scope();
                for name in target {
                    self.bind(name.clone(), TypeRef::any());
                }
                self.trace_body(body);
                self.pop_scope();
                self.trace_body(else_body);
            }
            NodeKind::If { branches, else_body } => {
                for (_, b) in branches {
                    self.trace_body(b);
                }
                self.trace_body(else_body);
            }
            NodeKind::With { assignments, body } => {
                self.push_scope();
                for (name, expr) in assignments {
                    let ty = self.infer_expr(expr);
                    self.bind(name.clone(), ty);
                }
                self.trace_body(body);
                self.pop_scope();
            }
            NodeKind::FilterBlock { body, .. }
            | NodeKind::CallBlock { body, .. }
            | NodeKind::Block { body, .. }
            | NodeKind::AutoEscape { body, .. } => self.trace_body(body),
            _ => {}
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    fn bind(&mut self, name: String, ty: TypeRef) {
        self.scopes.last_mut().unwrap().insert(name, ty);
    }

    fn lookup(&self, name: &str) -> Option<TypeRef> {
        for scope in self.scopes.iter().rev() {
            if let Some(ty) = scope.get(name) {
                return Some(ty.clone());
            }
        }
        None
    }

    /// Infers `expr`'s type, tracing `Name` references back to their
    /// defining `Set`/parameter. Returns `Any` rather than failing when the
    /// trace is inconclusive.
    pub fn infer_expr(&self, expr: &Expr) -> TypeRef {
        match &expr.kind {
            ExprKind::Literal(lit) => TypeRef::named(match lit {
                crate::ast::Literal::None => "none",
                crate::ast::Literal::Bool(_) => "bool",
                crate::ast::Literal::Int(_) => "Int64",
                crate::ast::Literal::Float(_) => "Float64",
                crate::ast::Literal::Str(_) => "string",
            }),
            ExprKind::Name(name) => self.lookup(name).unwrap_or_else(TypeRef::any),
            ExprKind::ListLiteral(_) | ExprKind::TupleLiteral(_) => TypeRef::named("array"),
            ExprKind::DictLiteral(_) => TypeRef::named("dict"),
            ExprKind::Group(inner) => self.infer_expr(inner),
            ExprKind::Binary(op, lhs, rhs) => self.infer_binary(*op, lhs, rhs),
            ExprKind::Unary(crate::ast::UnaryOp::Not, _) => TypeRef::named("bool"),
            ExprKind::Unary(_, inner) => self.infer_expr(inner),
            ExprKind::Ternary { then_expr, else_expr, .. } => {
                let then_ty = self.infer_expr(then_expr);
                let else_ty = self.infer_expr(else_expr);
                if then_ty == else_ty {
                    then_ty
                } else {
                    TypeRef::any()
                }
            }
            ExprKind::Concat(_) => TypeRef::named("string"),
            ExprKind::Test { .. } => TypeRef::named("bool"),
            _ => TypeRef::any(),
        }
    }

    /// Mirrors the renderer's coercion rules: `+`/`-`/`*` stay `Number`
    /// unless either side is a known `Float64`, `/` always yields `Float64`,
    /// comparisons and boolean connectives yield `bool`.
    fn infer_binary(&self, op: BinOp, lhs: &Expr, rhs: &Expr) -> TypeRef {
        use BinOp::*;
        match op {
            Eq | Ne | Lt | Gt | Le | Ge | And | Or | In | NotIn => TypeRef::named("bool"),
            Concat => TypeRef::named("string"),
            Div => TypeRef::named("Float64"),
            Add | Sub | Mul | FloorDiv | Mod | Pow => {
                let l = self.infer_expr(lhs);
                let r = self.infer_expr(rhs);
                if l.name == "Float64" || r.name == "Float64" {
                    TypeRef::named("Float64")
                } else if l.name == "Int64" && r.name == "Int64" {
                    TypeRef::named("Int64")
                } else {
                    TypeRef::named("Number")
                }
            }
        }
    }
}

impl Default for Typer {
    fn default() -> Self {
        Typer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Position, Span};
    use crate::lexer;
    use crate::parser;

    fn parse(src: &str) -> Vec<Node> {
        let (tokens, _) = lexer::lex(src);
        let (template, _) = parser::parse(tokens);
        template.body
    }

    #[test]
    fn traces_set_binding_type() {
        let body = parse("{% set n = 3 %}");
        let mut typer = Typer::new();
        typer.trace_body(&body);
        assert_eq!(typer.lookup("n"), Some(TypeRef::named("Int64")));
    }

    #[test]
    fn unknown_name_is_any() {
        let typer = Typer::new();
        let expr = Expr::new(ExprKind::Name("mystery".into()), Span::point(Position::start()));
        assert_eq!(typer.infer_expr(&expr), TypeRef::any());
    }

    #[test]
    fn division_is_always_float() {
        let typer = Typer::new();
        let span = Span::point(Position::start());
        let lhs = Expr::new(ExprKind::Literal(crate::ast::Literal::Int(4)), span);
        let rhs = Expr::new(ExprKind::Literal(crate::ast::Literal::Int(2)), span);
        let expr = Expr::new(ExprKind::Binary(BinOp::Div, Box::new(lhs), Box::new(rhs)), span);
        assert_eq!(typer.infer_expr(&expr), TypeRef::named("Float64"));
    }

    #[test]
    fn any_is_compatible_with_everything() {
        assert!(TypeRef::any().compatible_with(&TypeRef::named("string")));
        assert!(!TypeRef::named("string").compatible_with(&TypeRef::named("Int64")));
        assert!(TypeRef::named("Number").compatible_with(&TypeRef::named("Int64")));
    }
}
