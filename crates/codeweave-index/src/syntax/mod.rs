//! Typed view over tree-sitter trees for relationship extraction.
//!
//! Each language family lowers raw nodes into [`SyntaxNode`] values once;
//! everything downstream matches on the enum through a [`Visitor`] and
//! never inspects node kind strings.

mod ecmascript;
mod python;

use tree_sitter::{Node, Tree};

use crate::languages::{Lang, LangFamily};

/// How an import reached the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import ... from "x"` / `from x import y`.
    Static,
    /// CommonJS `require("x")`.
    Require,
    /// `import("x")`.
    Dynamic,
    /// `export ... from "x"`.
    ReExport,
}

impl ImportKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Require => "require",
            Self::Dynamic => "dynamic",
            Self::ReExport => "re_export",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    /// Module specifier as written, or the normalized path form for Python
    /// relative imports.
    pub source: String,
    /// Names imported from the module. `default` for default imports, `*`
    /// for namespace and wildcard imports.
    pub specifiers: Vec<String>,
    pub kind: ImportKind,
    /// 1-based.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDecl {
    pub names: Vec<String>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Callee name; `obj.method()` is recorded as `method`.
    pub callee: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub name: String,
    pub line: usize,
}

/// Language-neutral syntax node produced by a family lowering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxNode {
    Import(ImportDecl),
    Export(ExportDecl),
    Call(CallSite),
    TypeRef(TypeRef),
}

impl SyntaxNode {
    pub fn accept(&self, visitor: &mut dyn Visitor) {
        match self {
            Self::Import(import) => visitor.visit_import(import),
            Self::Export(export) => visitor.visit_export(export),
            Self::Call(call) => visitor.visit_call(call),
            Self::TypeRef(type_ref) => visitor.visit_type_ref(type_ref),
        }
    }
}

/// Receives lowered nodes in document order. Every method defaults to a no-op.
pub trait Visitor {
    fn visit_import(&mut self, _import: &ImportDecl) {}
    fn visit_export(&mut self, _export: &ExportDecl) {}
    fn visit_call(&mut self, _call: &CallSite) {}
    fn visit_type_ref(&mut self, _type_ref: &TypeRef) {}
}

/// Lower every node of `tree` in one pre-order walk and feed the results to
/// `visitor`. Languages without a lowering produce nothing.
pub fn walk(tree: &Tree, source: &str, lang: Lang, visitor: &mut dyn Visitor) {
    let lower: fn(Node<'_>, &str, &mut Vec<SyntaxNode>) = match lang.family() {
        LangFamily::EcmaScript => ecmascript::lower,
        LangFamily::Python => python::lower,
        LangFamily::Other => return,
    };

    let mut lowered = Vec::new();
    let mut cursor = tree.walk();
    loop {
        lower(cursor.node(), source, &mut lowered);
        for node in lowered.drain(..) {
            node.accept(visitor);
        }

        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}

/// Collects every lowered node into a flat list.
#[derive(Debug, Default)]
pub struct NodeCollector {
    pub nodes: Vec<SyntaxNode>,
}

impl Visitor for NodeCollector {
    fn visit_import(&mut self, import: &ImportDecl) {
        self.nodes.push(SyntaxNode::Import(import.clone()));
    }

    fn visit_export(&mut self, export: &ExportDecl) {
        self.nodes.push(SyntaxNode::Export(export.clone()));
    }

    fn visit_call(&mut self, call: &CallSite) {
        self.nodes.push(SyntaxNode::Call(call.clone()));
    }

    fn visit_type_ref(&mut self, type_ref: &TypeRef) {
        self.nodes.push(SyntaxNode::TypeRef(type_ref.clone()));
    }
}

fn line(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

/// Contents of a string literal node without its quotes.
fn string_value(node: Node<'_>, source: &str) -> Option<String> {
    let text = source.get(node.byte_range())?;
    let trimmed = text
        .trim_start_matches(|c| matches!(c, 'r' | 'b' | 'u' | 'f' | 'R' | 'B' | 'U' | 'F'))
        .trim_matches(|c| matches!(c, '"' | '\'' | '`'));
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_owned())
}

#[cfg(test)]
pub(crate) fn lower_source(path: &str, source: &str) -> Vec<SyntaxNode> {
    let lang = crate::languages::detect_language(std::path::Path::new(path)).unwrap();
    let tree = crate::chunker::parse_source(source, lang).unwrap();
    let mut collector = NodeCollector::default();
    walk(&tree, source, lang, &mut collector);
    collector.nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        imports: usize,
        calls: usize,
    }

    impl Visitor for Counter {
        fn visit_import(&mut self, _import: &ImportDecl) {
            self.imports += 1;
        }

        fn visit_call(&mut self, _call: &CallSite) {
            self.calls += 1;
        }
    }

    #[test]
    fn visitor_defaults_ignore_other_nodes() {
        let source = "import { a } from './a';\nexport function f() { return a(); }\n";
        let tree = crate::chunker::parse_source(source, Lang::TypeScript).unwrap();
        let mut counter = Counter::default();
        walk(&tree, source, Lang::TypeScript, &mut counter);
        assert_eq!(counter.imports, 1);
        assert_eq!(counter.calls, 1);
    }

    #[test]
    fn languages_without_lowering_produce_nothing() {
        let source = "use std::io;\nfn main() { run(); }\n";
        assert!(lower_source("main.rs", source).is_empty());
    }

    #[test]
    fn string_value_strips_quotes() {
        let source = "import x from \"react\";";
        let tree = crate::chunker::parse_source(source, Lang::JavaScript).unwrap();
        let stmt = tree.root_node().named_child(0).unwrap();
        let src = stmt.child_by_field_name("source").unwrap();
        assert_eq!(string_value(src, source).as_deref(), Some("react"));
    }
}
