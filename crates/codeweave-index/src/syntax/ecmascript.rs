//! Lowering for JavaScript, TypeScript and TSX trees.

use tree_sitter::Node;

use super::{CallSite, ExportDecl, ImportDecl, ImportKind, SyntaxNode, TypeRef, line, string_value};
use crate::chunker::{named_children, node_text};

pub(super) fn lower(node: Node<'_>, source: &str, out: &mut Vec<SyntaxNode>) {
    match node.kind() {
        "import_statement" => lower_import(node, source, out),
        "export_statement" => lower_export(node, source, out),
        "call_expression" => lower_call(node, source, out),
        "new_expression" => {
            if let Some(ctor) = node.child_by_field_name("constructor")
                && ctor.kind() == "identifier"
            {
                out.push(SyntaxNode::Call(CallSite {
                    callee: node_text(ctor, source).to_owned(),
                    line: line(node),
                }));
            }
        }
        "type_identifier" if !is_declared_name(node) => {
            out.push(SyntaxNode::TypeRef(TypeRef {
                name: node_text(node, source).to_owned(),
                line: line(node),
            }));
        }
        "identifier"
            if node
                .parent()
                .is_some_and(|p| matches!(p.kind(), "class_heritage" | "extends_clause")) =>
        {
            out.push(SyntaxNode::TypeRef(TypeRef {
                name: node_text(node, source).to_owned(),
                line: line(node),
            }));
        }
        _ => {}
    }
}

fn lower_import(node: Node<'_>, source: &str, out: &mut Vec<SyntaxNode>) {
    let mut specifiers = Vec::new();
    for child in named_children(node) {
        match child.kind() {
            "import_clause" => collect_import_clause(child, source, &mut specifiers),
            // `import x = require("y")`
            "import_require_clause" => {
                if let Some(spec) = child
                    .child_by_field_name("source")
                    .and_then(|s| string_value(s, source))
                {
                    out.push(SyntaxNode::Import(ImportDecl {
                        source: spec,
                        specifiers: vec!["default".to_owned()],
                        kind: ImportKind::Require,
                        line: line(node),
                    }));
                }
                return;
            }
            _ => {}
        }
    }

    let Some(spec) = node
        .child_by_field_name("source")
        .and_then(|s| string_value(s, source))
    else {
        return;
    };
    out.push(SyntaxNode::Import(ImportDecl {
        source: spec,
        specifiers,
        kind: ImportKind::Static,
        line: line(node),
    }));
}

fn collect_import_clause(clause: Node<'_>, source: &str, specifiers: &mut Vec<String>) {
    for part in named_children(clause) {
        match part.kind() {
            "identifier" => specifiers.push("default".to_owned()),
            "namespace_import" => specifiers.push("*".to_owned()),
            "named_imports" => {
                for spec in named_children(part) {
                    if spec.kind() != "import_specifier" {
                        continue;
                    }
                    if let Some(name) = spec.child_by_field_name("name") {
                        specifiers.push(node_text(name, source).to_owned());
                    }
                }
            }
            _ => {}
        }
    }
}

fn lower_export(node: Node<'_>, source: &str, out: &mut Vec<SyntaxNode>) {
    let line = line(node);
    let clause = named_children(node)
        .into_iter()
        .find(|c| c.kind() == "export_clause");

    if let Some(from) = node
        .child_by_field_name("source")
        .and_then(|s| string_value(s, source))
    {
        let specifiers = clause.map_or_else(
            || vec!["*".to_owned()],
            |c| {
                export_specifiers(c, source)
                    .into_iter()
                    .map(|(name, _)| name)
                    .collect()
            },
        );
        out.push(SyntaxNode::Import(ImportDecl {
            source: from,
            specifiers,
            kind: ImportKind::ReExport,
            line,
        }));
    }

    let mut names = Vec::new();
    if let Some(clause) = clause {
        names.extend(
            export_specifiers(clause, source)
                .into_iter()
                .map(|(name, alias)| alias.unwrap_or(name)),
        );
    }
    if let Some(decl) = node
        .child_by_field_name("declaration")
        .or_else(|| node.child_by_field_name("value"))
    {
        names.extend(declared_names(decl, source));
    }
    let mut cursor = node.walk();
    if node.children(&mut cursor).any(|c| c.kind() == "default") {
        names.push("default".to_owned());
    }

    if !names.is_empty() {
        out.push(SyntaxNode::Export(ExportDecl { names, line }));
    }
}

/// `(name, alias)` pairs of an `export { a, b as c }` clause.
fn export_specifiers(clause: Node<'_>, source: &str) -> Vec<(String, Option<String>)> {
    named_children(clause)
        .into_iter()
        .filter(|s| s.kind() == "export_specifier")
        .filter_map(|s| {
            let name = node_text(s.child_by_field_name("name")?, source).to_owned();
            let alias = s
                .child_by_field_name("alias")
                .map(|a| node_text(a, source).to_owned());
            Some((name, alias))
        })
        .collect()
}

fn declared_names(decl: Node<'_>, source: &str) -> Vec<String> {
    match decl.kind() {
        "lexical_declaration" | "variable_declaration" => named_children(decl)
            .into_iter()
            .filter(|c| c.kind() == "variable_declarator")
            .filter_map(|c| c.child_by_field_name("name"))
            .filter(|n| n.kind() == "identifier")
            .map(|n| node_text(n, source).to_owned())
            .collect(),
        _ => decl
            .child_by_field_name("name")
            .map(|n| vec![node_text(n, source).to_owned()])
            .unwrap_or_default(),
    }
}

fn lower_call(node: Node<'_>, source: &str, out: &mut Vec<SyntaxNode>) {
    let Some(function) = node.child_by_field_name("function") else {
        return;
    };
    let line = line(node);
    let first_string_arg = || {
        node.child_by_field_name("arguments")
            .and_then(|args| args.named_child(0))
            .filter(|arg| arg.kind() == "string")
            .and_then(|arg| string_value(arg, source))
    };

    match function.kind() {
        "import" => {
            if let Some(spec) = first_string_arg() {
                out.push(SyntaxNode::Import(ImportDecl {
                    source: spec,
                    specifiers: vec!["*".to_owned()],
                    kind: ImportKind::Dynamic,
                    line,
                }));
            }
        }
        "identifier" => {
            let callee = node_text(function, source);
            if callee == "require" {
                if let Some(spec) = first_string_arg() {
                    out.push(SyntaxNode::Import(ImportDecl {
                        source: spec,
                        specifiers: Vec::new(),
                        kind: ImportKind::Require,
                        line,
                    }));
                }
                return;
            }
            out.push(SyntaxNode::Call(CallSite {
                callee: callee.to_owned(),
                line,
            }));
        }
        "member_expression" => {
            if let Some(property) = function.child_by_field_name("property") {
                out.push(SyntaxNode::Call(CallSite {
                    callee: node_text(property, source).to_owned(),
                    line,
                }));
            }
        }
        _ => {}
    }
}

/// Declaration names (`class Foo`, `type Id<T>`) are not references.
fn is_declared_name(node: Node<'_>) -> bool {
    node.parent()
        .and_then(|p| p.child_by_field_name("name"))
        .is_some_and(|n| n.id() == node.id())
}
