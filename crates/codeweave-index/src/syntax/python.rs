//! Lowering for Python trees.

use tree_sitter::Node;

use super::{CallSite, ExportDecl, ImportDecl, ImportKind, SyntaxNode, TypeRef, line};
use crate::chunker::{named_children, node_text};

pub(super) fn lower(node: Node<'_>, source: &str, out: &mut Vec<SyntaxNode>) {
    match node.kind() {
        "import_statement" => {
            for name in named_children(node) {
                if let Some(module) = imported_module(name, source) {
                    out.push(SyntaxNode::Import(ImportDecl {
                        source: module,
                        specifiers: Vec::new(),
                        kind: ImportKind::Static,
                        line: line(node),
                    }));
                }
            }
        }
        "import_from_statement" => lower_from_import(node, source, out),
        "call" => {
            let Some(function) = node.child_by_field_name("function") else {
                return;
            };
            let callee = match function.kind() {
                "identifier" => Some(function),
                "attribute" => function.child_by_field_name("attribute"),
                _ => None,
            };
            if let Some(callee) = callee {
                out.push(SyntaxNode::Call(CallSite {
                    callee: node_text(callee, source).to_owned(),
                    line: line(node),
                }));
            }
        }
        "type" => collect_identifiers(node, source, out),
        "class_definition" => {
            if let Some(bases) = node.child_by_field_name("superclasses") {
                for base in named_children(bases) {
                    let name = match base.kind() {
                        "identifier" => Some(base),
                        "attribute" => base.child_by_field_name("attribute"),
                        _ => None,
                    };
                    if let Some(name) = name {
                        out.push(SyntaxNode::TypeRef(TypeRef {
                            name: node_text(name, source).to_owned(),
                            line: line(base),
                        }));
                    }
                }
            }
            lower_module_export(node, source, out);
        }
        "function_definition" => lower_module_export(node, source, out),
        _ => {}
    }
}

/// `a.b` or `a.b as c` inside `import ...`.
fn imported_module(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "dotted_name" => Some(node_text(node, source).to_owned()),
        "aliased_import" => node
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_owned()),
        _ => None,
    }
}

fn lower_from_import(node: Node<'_>, source: &str, out: &mut Vec<SyntaxNode>) {
    let Some(module) = node.child_by_field_name("module_name") else {
        return;
    };
    let module = match module.kind() {
        "relative_import" => relative_specifier(node_text(module, source)),
        _ => node_text(module, source).to_owned(),
    };

    let mut specifiers: Vec<String> = Vec::new();
    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        if let Some(imported) = imported_module(name, source) {
            specifiers.push(imported);
        }
    }
    if named_children(node)
        .iter()
        .any(|c| c.kind() == "wildcard_import")
    {
        specifiers.push("*".to_owned());
    }

    out.push(SyntaxNode::Import(ImportDecl {
        source: module,
        specifiers,
        kind: ImportKind::Static,
        line: line(node),
    }));
}

/// `.util` → `./util`, `..pkg.mod` → `../pkg/mod`, `.` → `.`.
pub(crate) fn relative_specifier(raw: &str) -> String {
    let dots = raw.chars().take_while(|c| *c == '.').count();
    let rest = raw[dots..].replace('.', "/");
    let prefix = if dots <= 1 {
        ".".to_owned()
    } else {
        vec![".."; dots - 1].join("/")
    };
    if rest.is_empty() {
        prefix
    } else {
        format!("{prefix}/{rest}")
    }
}

/// Module-level functions and classes are importable names.
fn lower_module_export(node: Node<'_>, source: &str, out: &mut Vec<SyntaxNode>) {
    let mut parent = node.parent();
    if parent.is_some_and(|p| p.kind() == "decorated_definition") {
        parent = parent.and_then(|p| p.parent());
    }
    if !parent.is_some_and(|p| p.kind() == "module") {
        return;
    }
    if let Some(name) = node.child_by_field_name("name") {
        out.push(SyntaxNode::Export(ExportDecl {
            names: vec![node_text(name, source).to_owned()],
            line: line(node),
        }));
    }
}

fn collect_identifiers(node: Node<'_>, source: &str, out: &mut Vec<SyntaxNode>) {
    if node.kind() == "identifier" {
        out.push(SyntaxNode::TypeRef(TypeRef {
            name: node_text(node, source).to_owned(),
            line: line(node),
        }));
        return;
    }
    for child in named_children(node) {
        // Nested `type` nodes are lowered on their own visit.
        if child.kind() != "type" {
            collect_identifiers(child, source, out);
        }
    }
}
