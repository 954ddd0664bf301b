//! `extends`/`block`/`super()` chains across multiple templates, resolved
//! through a `MemoryLoader`.

use std::collections::HashMap;

use jinja::environment::MemoryLoader;
use jinja::{render::render, Diagnostics, Environment, Severity};

fn render_named(loader: MemoryLoader, entry: &str) -> (String, Diagnostics) {
    let env = Environment::new().with_loader(loader);
    let source = env.loader().unwrap().get_source(entry).unwrap().0;
    render(&source, entry, &env, HashMap::new())
}

#[test]
fn child_block_overrides_base_literal() {
    let loader = MemoryLoader::new()
        .with("base.html", "Start-{% block body %}Base{% endblock %}-End")
        .with("child.html", "{% extends 'base.html' %}{% block body %}Child{% endblock %}");
    let (out, diags) = render_named(loader, "child.html");
    assert_eq!(out, "Start-Child-End");
    assert!(!diags.has_errors());
}

#[test]
fn super_splices_in_the_parent_blocks_content() {
    let loader = MemoryLoader::new()
        .with("base.html", "{% block body %}Base{% endblock %}")
        .with(
            "child.html",
            "{% extends 'base.html' %}{% block body %}{{ super() }}+Child{% endblock %}",
        );
    let (out, _) = render_named(loader, "child.html");
    assert_eq!(out, "Base+Child");
}

#[test]
fn three_level_chain_resolves_super_at_every_level() {
    let loader = MemoryLoader::new()
        .with("base.html", "{% block body %}Base{% endblock %}")
        .with(
            "mid.html",
            "{% extends 'base.html' %}{% block body %}{{ super() }}-Mid{% endblock %}",
        )
        .with(
            "leaf.html",
            "{% extends 'mid.html' %}{% block body %}{{ super() }}-Leaf{% endblock %}",
        );
    let (out, _) = render_named(loader, "leaf.html");
    assert_eq!(out, "Base-Mid-Leaf");
}

#[test]
fn block_without_override_falls_back_to_its_own_body() {
    let loader = MemoryLoader::new()
        .with("base.html", "{% block body %}Base{% endblock %}")
        .with("child.html", "{% extends 'base.html' %}");
    let (out, _) = render_named(loader, "child.html");
    assert_eq!(out, "Base");
}

#[test]
fn missing_extends_target_reports_template_not_found() {
    let loader = MemoryLoader::new().with("child.html", "{% extends 'missing.html' %}hi");
    let (out, diags) = render_named(loader, "child.html");
    assert_eq!(out, "hi");
    assert!(diags.iter().any(|d| d.id == "Renderer/TemplateNotFound" && d.severity == Severity::Error));
}

#[test]
fn required_block_without_override_is_flagged() {
    let loader = MemoryLoader::new()
        .with("base.html", "{% block body required %}{% endblock %}")
        .with("child.html", "{% extends 'base.html' %}");
    let (_, diags) = render_named(loader, "child.html");
    assert!(diags.has_errors() || diags.iter().any(|d| d.message.contains("required")));
}
