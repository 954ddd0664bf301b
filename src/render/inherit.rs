//! Template resolution and `extends`/block-override bookkeeping.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Node, NodeKind, Template};
use crate::diagnostics::{Diagnostic, DiagnosticType, Diagnostics};
use crate::environment::Environment;
use crate::lexer;
use crate::parser;
use crate::render::context::BlockChain;

/// Parses `name` via the environment's loader, or returns `None` (caller
/// decides whether that's `TemplateNotFound` or ignorable).
pub fn load_and_parse(
    env: &Environment,
    name: &str,
    diagnostics: &mut Diagnostics,
) -> Option<Template> {
    let loader = env.loader()?;
    let (source, _filename) = loader.get_source(name)?;
    let (tokens, lex_diags) = lexer::lex(&source);
    diagnostics.extend(lex_diags);
    let (template, parse_diags) = parser::parse(tokens);
    diagnostics.extend(parse_diags);
    Some(template)
}

/// Finds a leading `Extends` node, if the template's first significant node
/// is one; reporting `ExtendsNotFirst`/`MultipleExtends`-style diagnostics is
/// left to the linter — the renderer just needs the target.
pub fn find_extends(body: &[Node]) -> Option<&Node> {
    body.iter().find(|n| matches!(n.kind, NodeKind::Extends { .. }))
}

/// Recursively collects every `Block` node in `body` (regardless of nesting
/// inside `if`/`for`/etc.) into `out`, in source order.
pub fn collect_blocks(body: &[Node], out: &mut HashMap<String, Vec<Rc<Vec<Node>>>>) {
    for node in body {
        match &node.kind {
            NodeKind::Block { name, body, .. } => {
                out.entry(name.clone())
                    .or_default()
                    .push(Rc::new(body.clone()));
                collect_blocks(body, out);
            }
            NodeKind::If { branches, else_body } => {
                for (_, b) in branches {
                    collect_blocks(b, out);
                }
                collect_blocks(else_body, out);
            }
            NodeKind::For { body, else_body, .. } => {
                collect_blocks(body, out);
                collect_blocks(else_body, out);
            }
            NodeKind::With { body, .. }
            | NodeKind::FilterBlock { body, .. }
            | NodeKind::SetBlock { body, .. }
            | NodeKind::CallBlock { body, .. }
            | NodeKind::Macro { body, .. }
            | NodeKind::AutoEscape { body, .. } => collect_blocks(body, out),
            _ => {}
        }
    }
}

/// Resolves the full `extends` chain starting at `body`/`template_name`,
/// returning the root ancestor's body plus the merged block-override map.
/// Runs in two phases: walk up collecting each ancestor's blocks, then walk
/// back down building the override chain per block name.
pub fn resolve_chain(
    body: Vec<Node>,
    template_name: &str,
    env: &Environment,
    diagnostics: &mut Diagnostics,
) -> (Vec<Node>, HashMap<String, BlockChain>) {
    let mut descendants: Vec<Vec<Node>> = vec![body];
    let mut current_name = template_name.to_string();
    let root_body = loop {
        let current = descendants.last().unwrap();
        match find_extends(current) {
            Some(extends_node) => {
                let NodeKind::Extends { expr } = &extends_node.kind else {
                    unreachable!()
                };
                let parent_name = match &expr.kind {
                    crate::ast::ExprKind::Literal(crate::ast::Literal::Str(s)) => s.clone(),
                    _ => {
                        diagnostics.push(Diagnostic::new(
                            DiagnosticType::TemplateNotFound,
                            "`extends` target must be a string literal".to_string(),
                            extends_node.span,
                        ));
                        break descendants.pop().unwrap();
                    }
                };
                if descendants.len() > 64 {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticType::TemplateCycle,
                        format!("extends cycle detected while resolving `{parent_name}`"),
                        extends_node.span,
                    ));
                    break descendants.pop().unwrap();
                }
                match load_and_parse(env, &parent_name, diagnostics) {
                    Some(parent_template) => {
                        current_name = parent_name;
                        descendants.push(parent_template.body);
                    }
                    None => {
                        diagnostics.push(Diagnostic::new(
                            DiagnosticType::TemplateNotFound,
                            format!("template `{parent_name}` not found"),
                            extends_node.span,
                        ));
                        break descendants.pop().unwrap();
                    }
                }
            }
            None => break descendants.pop().unwrap(),
        }
    };
    let _ = current_name;

    // `descendants` now holds every ancestor strictly between the root and
    // the originally requested template, ordered root-adjacent..leaf.
    let mut per_name: HashMap<String, Vec<Rc<Vec<Node>>>> = HashMap::new();
    for descendant_body in &descendants {
        collect_blocks(descendant_body, &mut per_name);
    }
    // Collection order above is leaf-first (most derived); reverse so
    // `bodies.last()` is the most-derived override and `bodies[0]` is the
    // one closest to (but not including) the root, matching the depth
    // walk in `render::exec_block`.
    let chains = per_name
        .into_iter()
        .map(|(name, mut bodies)| {
            bodies.reverse();
            (name, BlockChain { bodies })
        })
        .collect();
    (root_body, chains)
}
