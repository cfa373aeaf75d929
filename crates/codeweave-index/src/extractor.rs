//! Relationship extraction: imports, exports, calls and type references
//! become graph edges.
//!
//! The first pass runs per file while it is indexed and needs nothing but
//! the file itself: `REFERENCES` between its own chunks and `IMPORTS_PKG`
//! to external packages. The cross-file pass runs after a scan has settled
//! and resolves relative imports against the set of known files.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use codeweave_store::{DocumentChunk, GraphRelationship, RelationshipType, package_node_id};

use crate::chunker::parse_source;
use crate::error::{IndexError, Result};
use crate::languages::{Lang, detect_language};
use crate::resolver::{PackageResolution, PackageResolver, is_external};
use crate::syntax::{self, CallSite, ExportDecl, ImportDecl, ImportKind, TypeRef, Visitor};

/// Suffixes tried, in order, when resolving a relative import to a file.
const RESOLVE_SUFFIXES: &[&str] = &[
    "",
    ".ts",
    ".tsx",
    ".d.ts",
    ".js",
    ".jsx",
    ".mjs",
    ".cjs",
    ".py",
    "/index.ts",
    "/index.tsx",
    "/index.js",
    "/index.jsx",
    "/index.mjs",
    "/__init__.py",
];

/// An import as seen by the graph layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportInfo {
    pub source: String,
    pub specifiers: Vec<String>,
    pub kind: ImportKind,
    pub is_external: bool,
    pub resolution: Option<PackageResolution>,
    pub line: usize,
}

/// Everything the relationship passes need to know about one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileFacts {
    pub imports: Vec<ImportInfo>,
    pub exports: Vec<String>,
    pub calls: Vec<CallSite>,
    pub type_refs: Vec<TypeRef>,
}

impl FileFacts {
    #[must_use]
    pub fn exports_name(&self, name: &str) -> bool {
        self.exports.iter().any(|e| e == name)
    }
}

#[derive(Default)]
struct FactsCollector {
    facts: FileFacts,
}

impl Visitor for FactsCollector {
    fn visit_import(&mut self, import: &ImportDecl) {
        self.facts.imports.push(ImportInfo {
            source: import.source.clone(),
            specifiers: import.specifiers.clone(),
            kind: import.kind,
            is_external: is_external(&import.source),
            resolution: None,
            line: import.line,
        });
    }

    fn visit_export(&mut self, export: &ExportDecl) {
        self.facts.exports.extend(export.names.iter().cloned());
    }

    fn visit_call(&mut self, call: &CallSite) {
        self.facts.calls.push(call.clone());
    }

    fn visit_type_ref(&mut self, type_ref: &TypeRef) {
        self.facts.type_refs.push(type_ref.clone());
    }
}

/// Facts plus the first-pass edges for one file.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub facts: FileFacts,
    pub relationships: Vec<GraphRelationship>,
}

pub struct RelationshipExtractor {
    resolver: Arc<PackageResolver>,
}

impl RelationshipExtractor {
    #[must_use]
    pub fn new(resolver: Arc<PackageResolver>) -> Self {
        Self { resolver }
    }

    #[must_use]
    pub fn resolver(&self) -> &PackageResolver {
        &self.resolver
    }

    /// Parse `content` and collect its imports, exports, calls and type
    /// references. Languages without relationship support yield empty facts.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Parse`] if the file cannot be parsed.
    pub fn collect_facts(&self, path: &str, content: &str) -> Result<FileFacts> {
        let lang = detect_language(Path::new(path))
            .ok_or_else(|| IndexError::UnsupportedLanguage(path.to_owned()))?;
        if !lang.extracts_relationships() {
            return Ok(FileFacts::default());
        }
        let tree = parse_source(content, lang)?;
        let mut collector = FactsCollector::default();
        syntax::walk(&tree, content, lang, &mut collector);
        Ok(collector.facts)
    }

    /// First-pass extraction. A parse failure is logged and yields nothing
    /// for this file only.
    #[must_use]
    pub fn extract(&self, path: &str, content: &str, chunks: &[DocumentChunk]) -> Extraction {
        let mut facts = match self.collect_facts(path, content) {
            Ok(facts) => facts,
            Err(e) => {
                tracing::warn!(path, "relationship extraction skipped: {e}");
                return Extraction::default();
            }
        };

        let lang = detect_language(Path::new(path));
        let importing_file = self.resolver.root().join(path);
        let mut relationships = Vec::new();

        for import in facts.imports.iter_mut().filter(|i| i.is_external) {
            let specifier = package_specifier(&import.source, lang);
            let resolution = self.resolver.resolve(&specifier, &importing_file);
            relationships.push(package_edge(path, import, &resolution));
            import.resolution = Some(resolution);
        }
        relationships.extend(reference_edges(path, &facts, chunks));
        dedup_relationships(&mut relationships);

        tracing::debug!(
            path,
            imports = facts.imports.len(),
            edges = relationships.len(),
            "extracted relationships"
        );
        Extraction {
            facts,
            relationships,
        }
    }
}

/// Python imports are dotted module paths; the package is the first segment.
fn package_specifier(source: &str, lang: Option<Lang>) -> String {
    if lang == Some(Lang::Python) {
        source.replace('.', "/")
    } else {
        source.to_owned()
    }
}

fn package_edge(path: &str, import: &ImportInfo, resolution: &PackageResolution) -> GraphRelationship {
    let mut edge = GraphRelationship::new(
        path,
        package_node_id(&resolution.name, resolution.version_label()),
        RelationshipType::ImportsPkg,
    );
    edge.properties = resolution.to_properties();
    edge.with_property("specifier", import.source.as_str())
        .with_property("specifiers", import.specifiers.clone())
}

/// `REFERENCES` edges from the chunk enclosing each call or type reference
/// to the chunk defining the referenced name in the same file.
#[must_use]
pub fn reference_edges(
    path: &str,
    facts: &FileFacts,
    chunks: &[DocumentChunk],
) -> Vec<GraphRelationship> {
    let mut symbols: HashMap<&str, &DocumentChunk> = HashMap::new();
    for chunk in chunks {
        if chunk.metadata.chunk_type.is_symbol()
            && let Some(name) = chunk.symbol_name()
        {
            symbols.entry(name).or_insert(chunk);
        }
    }
    if symbols.is_empty() {
        return Vec::new();
    }

    let sites = facts
        .calls
        .iter()
        .map(|c| (c.callee.as_str(), c.line, "call"))
        .chain(facts.type_refs.iter().map(|t| (t.name.as_str(), t.line, "type")));

    let mut edges = Vec::new();
    for (name, line, kind) in sites {
        let Some(target) = symbols.get(name) else {
            continue;
        };
        let from = enclosing_chunk(chunks, line).map_or(path, |c| c.id.as_str());
        if from == target.id {
            continue;
        }
        edges.push(
            GraphRelationship::new(from, target.id.as_str(), RelationshipType::References)
                .with_property("kind", kind)
                .with_property("line", line),
        );
    }
    edges
}

/// Smallest non-doc chunk whose line range contains `line`.
fn enclosing_chunk(chunks: &[DocumentChunk], line: usize) -> Option<&DocumentChunk> {
    chunks
        .iter()
        .filter(|c| c.metadata.chunk_type != codeweave_store::ChunkType::Doc && c.contains_line(line))
        .min_by_key(|c| c.line_span())
}

/// Keep the first edge for each `(from, to, kind)`. When duplicates carry
/// different `kind` properties (a name both called and used as a type), the
/// survivor lists all of them under `kinds`.
pub fn dedup_relationships(edges: &mut Vec<GraphRelationship>) {
    let mut index: HashMap<(String, String, RelationshipType), usize> = HashMap::new();
    let mut kept: Vec<GraphRelationship> = Vec::with_capacity(edges.len());
    for edge in edges.drain(..) {
        let key = (edge.from.clone(), edge.to.clone(), edge.kind);
        if let Some(&i) = index.get(&key) {
            merge_kind(&mut kept[i], &edge);
        } else {
            index.insert(key, kept.len());
            kept.push(edge);
        }
    }
    *edges = kept;
}

fn merge_kind(kept: &mut GraphRelationship, duplicate: &GraphRelationship) {
    let Some(kind) = duplicate.properties.get("kind").and_then(serde_json::Value::as_str) else {
        return;
    };
    let mut kinds: Vec<String> = match kept.properties.get("kinds") {
        Some(serde_json::Value::Array(values)) => values
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        _ => kept
            .properties
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .map(|k| vec![k.to_owned()])
            .unwrap_or_default(),
    };
    if !kinds.iter().any(|k| k == kind) {
        kinds.push(kind.to_owned());
        kept.properties.insert("kinds".to_owned(), kinds.into());
    }
}

/// Lexically normalize a `/`-separated relative path. `None` if it climbs
/// above the workspace root.
#[must_use]
pub fn normalize_path(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Resolve a relative import written in `importing_file` to one of
/// `known_files`, trying the bare path and then each suffix in order.
#[must_use]
pub fn resolve_relative_import(
    importing_file: &str,
    specifier: &str,
    known_files: &HashSet<String>,
) -> Option<String> {
    let joined = if let Some(abs) = specifier.strip_prefix('/') {
        abs.to_owned()
    } else {
        match importing_file.rfind('/') {
            Some(pos) => format!("{}/{specifier}", &importing_file[..pos]),
            None => specifier.to_owned(),
        }
    };
    let base = normalize_path(&joined)?;

    for suffix in RESOLVE_SUFFIXES {
        let candidate = format!("{base}{suffix}");
        let candidate = candidate.trim_start_matches('/');
        if !candidate.is_empty() && known_files.contains(candidate) {
            return Some(candidate.to_owned());
        }
    }

    // ESM TypeScript imports name the emitted `.js` file.
    for (emitted, sources) in [
        (".js", &[".ts", ".tsx"][..]),
        (".jsx", &[".tsx"][..]),
        (".mjs", &[".mts"][..]),
    ] {
        if let Some(stem) = base.strip_suffix(emitted) {
            for ext in sources {
                let candidate = format!("{stem}{ext}");
                if known_files.contains(&candidate) {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

/// Relative imports of `path` resolved to known files, one per target.
#[must_use]
pub fn import_targets<'f>(
    path: &str,
    facts: &'f FileFacts,
    known_files: &HashSet<String>,
) -> Vec<(&'f ImportInfo, String)> {
    let mut seen = HashSet::new();
    facts
        .imports
        .iter()
        .filter(|i| !i.is_external)
        .filter_map(|import| {
            let target = resolve_relative_import(path, &import.source, known_files)?;
            (target != path).then_some((import, target))
        })
        .filter(|(import, target)| seen.insert((target.clone(), import.line)))
        .collect()
}

/// `IMPORTS_SYMBOL` edges for the names `import` pulls from `target_chunks`.
///
/// The source is each chunk of the importing file that mentions the name, or
/// the importing file itself when none does. Names the target is known not
/// to export are skipped.
#[must_use]
pub fn symbol_edges(
    path: &str,
    import: &ImportInfo,
    own_chunks: &[DocumentChunk],
    target_chunks: &[DocumentChunk],
    target_facts: Option<&FileFacts>,
) -> Vec<GraphRelationship> {
    let mut edges = Vec::new();
    for name in &import.specifiers {
        if name == "*" || name == "default" {
            continue;
        }
        if let Some(facts) = target_facts
            && !facts.exports.is_empty()
            && !facts.exports_name(name)
        {
            continue;
        }
        let Some(target) = target_chunks.iter().find(|c| {
            c.metadata.chunk_type.is_symbol() && c.symbol_name() == Some(name.as_str())
        }) else {
            continue;
        };

        let users: Vec<&DocumentChunk> = own_chunks
            .iter()
            .filter(|c| c.metadata.chunk_type != codeweave_store::ChunkType::Doc)
            .filter(|c| mentions(&c.content, name))
            .collect();
        if users.is_empty() {
            edges.push(symbol_edge(path, &target.id, import, name));
        } else {
            edges.extend(users.into_iter().map(|c| symbol_edge(&c.id, &target.id, import, name)));
        }
    }
    edges
}

fn symbol_edge(from: &str, to: &str, import: &ImportInfo, name: &str) -> GraphRelationship {
    GraphRelationship::new(from, to, RelationshipType::ImportsSymbol)
        .with_property("symbol", name)
        .with_property("specifier", import.source.as_str())
}

/// Whole-word occurrence of `name` in `text`.
fn mentions(text: &str, name: &str) -> bool {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
    text.match_indices(name).any(|(i, _)| {
        let before = text[..i].chars().next_back();
        let after = text[i + name.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

#[cfg(test)]
mod tests {
    use codeweave_store::ChunkType;

    use super::*;
    use crate::chunker::{ChunkParser, TreeSitterChunker};

    fn extractor(root: &Path) -> RelationshipExtractor {
        RelationshipExtractor::new(Arc::new(PackageResolver::new(root)))
    }

    fn chunks(path: &str, source: &str) -> Vec<DocumentChunk> {
        TreeSitterChunker::default().parse_file(path, source).unwrap()
    }

    fn known(paths: &[&str]) -> HashSet<String> {
        paths.iter().map(|p| (*p).to_owned()).collect()
    }

    #[test]
    fn references_link_caller_to_callee() {
        let dir = tempfile::tempdir().unwrap();
        let source = r"
function helper(x: Input) {
  return x.value * 2;
}

interface Input {
  value: number;
}

export function run(input: Input) {
  return helper(input);
}
";
        let chunks = chunks("run.ts", source);
        let extraction = extractor(dir.path()).extract("run.ts", source, &chunks);
        let id_of = |name: &str| {
            chunks
                .iter()
                .find(|c| c.symbol_name() == Some(name))
                .unwrap()
                .id
                .clone()
        };

        let refs: Vec<_> = extraction
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipType::References)
            .collect();
        assert!(refs.iter().any(|r| r.from == id_of("run")
            && r.to == id_of("helper")
            && r.properties["kind"] == "call"));
        assert!(refs.iter().any(|r| r.from == id_of("helper")
            && r.to == id_of("Input")
            && r.properties["kind"] == "type"));
        assert!(refs.iter().all(|r| r.from != r.to));
    }

    #[test]
    fn external_imports_become_package_edges() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies":{"react":"^18.2.0"}}"#,
        )
        .unwrap();
        let source = "import { useState } from 'react';\nimport { add } from './util';\nexport const x = useState(0);\n";
        let chunks = chunks("src/a.ts", source);
        let extraction = extractor(dir.path()).extract("src/a.ts", source, &chunks);

        let pkg: Vec<_> = extraction
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipType::ImportsPkg)
            .collect();
        assert_eq!(pkg.len(), 1);
        assert_eq!(pkg[0].from, "src/a.ts");
        assert_eq!(pkg[0].to, "pkg:react@^18.2.0");
        assert_eq!(pkg[0].properties["source"], "manifest");
        assert_eq!(pkg[0].properties["specifier"], "react");

        let react = &extraction.facts.imports[0];
        assert!(react.is_external);
        assert!(react.resolution.is_some());
        assert!(!extraction.facts.imports[1].is_external);
        assert!(extraction.facts.imports[1].resolution.is_none());
    }

    #[test]
    fn python_package_uses_top_level_module() {
        let dir = tempfile::tempdir().unwrap();
        let source = "import numpy.linalg\n\ndef f():\n    return numpy.linalg.norm([1])\n";
        let chunks = chunks("m.py", source);
        let extraction = extractor(dir.path()).extract("m.py", source, &chunks);
        let pkg = extraction
            .relationships
            .iter()
            .find(|r| r.kind == RelationshipType::ImportsPkg)
            .unwrap();
        assert_eq!(pkg.to, "pkg:numpy@unknown");
        assert_eq!(pkg.properties["subpath"], "linalg");
    }

    #[test]
    fn parse_failure_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let extraction = extractor(dir.path()).extract("notes.txt", "whatever", &[]);
        assert!(extraction.relationships.is_empty());
        assert_eq!(extraction.facts, FileFacts::default());
    }

    #[test]
    fn rust_files_have_no_relationship_facts() {
        let dir = tempfile::tempdir().unwrap();
        let facts = extractor(dir.path())
            .collect_facts("src/lib.rs", "use serde::Serialize;\nfn a() { b(); }\n")
            .unwrap();
        assert_eq!(facts, FileFacts::default());
    }

    #[test]
    fn relative_resolution_tries_suffixes() {
        let files = known(&[
            "src/util.ts",
            "src/components/index.tsx",
            "lib/helpers.js",
            "pkg/__init__.py",
            "pkg/models.py",
            "src/esm.ts",
        ]);
        assert_eq!(
            resolve_relative_import("src/a.ts", "./util", &files).as_deref(),
            Some("src/util.ts")
        );
        assert_eq!(
            resolve_relative_import("src/a.ts", "./components", &files).as_deref(),
            Some("src/components/index.tsx")
        );
        assert_eq!(
            resolve_relative_import("src/deep/b.ts", "../../lib/helpers", &files).as_deref(),
            Some("lib/helpers.js")
        );
        assert_eq!(
            resolve_relative_import("pkg/views.py", ".", &files).as_deref(),
            Some("pkg/__init__.py")
        );
        assert_eq!(
            resolve_relative_import("pkg/views.py", "./models", &files).as_deref(),
            Some("pkg/models.py")
        );
        assert_eq!(
            resolve_relative_import("src/a.ts", "./esm.js", &files).as_deref(),
            Some("src/esm.ts")
        );
        assert_eq!(resolve_relative_import("src/a.ts", "./missing", &files), None);
        assert_eq!(resolve_relative_import("a.ts", "../../x", &files), None);
    }

    #[test]
    fn normalize_handles_dots() {
        assert_eq!(normalize_path("src/./a/../b").as_deref(), Some("src/b"));
        assert_eq!(normalize_path("../x"), None);
    }

    #[test]
    fn symbol_edges_from_using_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let util_src = "export function add(a: number, b: number) {\n  return a + b;\n}\n";
        let a_src = "import { add, missing } from './util';\n\nexport function total(xs: number[]) {\n  return xs.reduce((s, x) => add(s, x), 0);\n}\n";
        let util_chunks = chunks("src/util.ts", util_src);
        let a_chunks = chunks("src/a.ts", a_src);
        let ex = extractor(dir.path());
        let util_facts = ex.collect_facts("src/util.ts", util_src).unwrap();
        let a_facts = ex.collect_facts("src/a.ts", a_src).unwrap();

        let targets = import_targets("src/a.ts", &a_facts, &known(&["src/a.ts", "src/util.ts"]));
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].1, "src/util.ts");

        let edges = symbol_edges(
            "src/a.ts",
            targets[0].0,
            &a_chunks,
            &util_chunks,
            Some(&util_facts),
        );
        assert_eq!(edges.len(), 1);
        let total = a_chunks.iter().find(|c| c.symbol_name() == Some("total")).unwrap();
        let add = util_chunks
            .iter()
            .find(|c| c.metadata.chunk_type == ChunkType::Function)
            .unwrap();
        assert_eq!(edges[0].from, total.id);
        assert_eq!(edges[0].to, add.id);
        assert_eq!(edges[0].kind, RelationshipType::ImportsSymbol);
    }

    #[test]
    fn mentions_matches_whole_words() {
        assert!(mentions("return add(1, 2)", "add"));
        assert!(!mentions("return address", "add"));
        assert!(!mentions("readd()", "add"));
    }

    #[test]
    fn dedup_keeps_first() {
        let mut edges = vec![
            GraphRelationship::new("a", "b", RelationshipType::Imports).with_property("n", 1),
            GraphRelationship::new("a", "b", RelationshipType::Imports).with_property("n", 2),
            GraphRelationship::new("a", "b", RelationshipType::ImportsSymbol),
        ];
        dedup_relationships(&mut edges);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].properties["n"], 1);
        assert!(!edges[0].properties.contains_key("kinds"));
    }

    #[test]
    fn dedup_merges_reference_kinds() {
        let reference = |kind: &str| {
            GraphRelationship::new("run", "Input", RelationshipType::References)
                .with_property("kind", kind)
        };
        let mut edges = vec![reference("call"), reference("type"), reference("call")];
        dedup_relationships(&mut edges);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].properties["kind"], "call");
        assert_eq!(edges[0].properties["kinds"], serde_json::json!(["call", "type"]));
    }

    #[test]
    fn called_and_typed_name_keeps_both_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let source = "class Point {\n  x = 0;\n}\n\nexport function origin(): Point {\n  return new Point();\n}\n";
        let chunks = chunks("geo.ts", source);
        let extraction = extractor(dir.path()).extract("geo.ts", source, &chunks);
        let point = chunks
            .iter()
            .find(|c| c.symbol_name() == Some("Point"))
            .unwrap();
        let refs: Vec<_> = extraction
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipType::References && r.to == point.id)
            .collect();
        assert_eq!(refs.len(), 1);
        let kinds = refs[0].properties.get("kinds").unwrap();
        assert!(kinds.as_array().unwrap().iter().any(|k| k == "type"), "{kinds}");
        assert_eq!(kinds.as_array().unwrap().len(), 2, "{kinds}");
    }
}
