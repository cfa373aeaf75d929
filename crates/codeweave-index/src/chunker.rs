//! AST-based chunking via tree-sitter: one chunk per named entity, its
//! methods and its doc comment, with leftover statements grouped into blocks.

use std::path::Path;

use codeweave_store::{ChunkMetadata, ChunkType, DocumentChunk};
use tree_sitter::{Node, Parser, Tree};

use crate::error::{IndexError, Result};
use crate::languages::{Lang, LangFamily, detect_language};

/// Splits a source file into ordered [`DocumentChunk`]s.
pub trait ChunkParser: Send + Sync {
    fn is_supported(&self, path: &str) -> bool;

    /// # Errors
    ///
    /// Returns an error if the language is unsupported or the parser fails.
    fn parse_file(&self, path: &str, content: &str) -> Result<Vec<DocumentChunk>>;
}

/// Chunker configuration.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Statement runs with fewer non-whitespace characters are dropped (default: 40).
    pub min_block_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { min_block_size: 40 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TreeSitterChunker {
    config: ChunkerConfig,
}

impl TreeSitterChunker {
    #[must_use]
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }
}

impl ChunkParser for TreeSitterChunker {
    fn is_supported(&self, path: &str) -> bool {
        crate::languages::is_indexable(Path::new(path))
    }

    fn parse_file(&self, path: &str, content: &str) -> Result<Vec<DocumentChunk>> {
        let lang = detect_language(Path::new(path))
            .ok_or_else(|| IndexError::UnsupportedLanguage(path.to_owned()))?;
        let tree = parse_source(content, lang)?;

        let ctx = ChunkCtx {
            source: content,
            file_path: path,
            lang,
            config: &self.config,
        };
        let mut chunks = Vec::new();
        chunk_scope(&ctx, &named_children(tree.root_node()), &mut chunks);

        // Files with nothing chunkable still get a single whole-file chunk.
        if chunks.is_empty() && non_ws_len(content) > 0 {
            let lines = content.lines().count().max(1);
            chunks.push(make_chunk(content, path, 1, lines, ChunkType::File, None, None));
        }

        chunks.sort_by_key(|c| {
            (
                c.metadata.line_start,
                std::cmp::Reverse(c.metadata.line_end),
            )
        });
        Ok(chunks)
    }
}

/// Parse `source` with the grammar for `lang`.
///
/// # Errors
///
/// Returns error if no grammar is available or tree-sitter gives up.
pub(crate) fn parse_source(source: &str, lang: Lang) -> Result<Tree> {
    let grammar = lang
        .grammar()
        .ok_or_else(|| IndexError::Parse(format!("no grammar for {}", lang.id())))?;

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| IndexError::Parse(format!("set_language failed: {e}")))?;

    parser
        .parse(source, None)
        .ok_or_else(|| IndexError::Parse(format!("{} parser returned no tree", lang.id())))
}

pub(crate) fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

pub(crate) fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

struct ChunkCtx<'a> {
    source: &'a str,
    file_path: &'a str,
    lang: Lang,
    config: &'a ChunkerConfig,
}

/// A named declaration. `outer` includes export keywords, decorators and
/// attributes; `inner` is the declaration itself.
struct Entity<'t> {
    outer: Node<'t>,
    inner: Node<'t>,
    chunk_type: ChunkType,
    name: String,
}

/// Chunk one list of sibling statements (a file, or a class body).
fn chunk_scope(ctx: &ChunkCtx<'_>, children: &[Node<'_>], out: &mut Vec<DocumentChunk>) {
    let mut block: Vec<Node> = Vec::new();
    let mut pending: Vec<Node> = Vec::new();

    for &child in children {
        if is_comment(child) || is_attribute(child) {
            pending.push(child);
            continue;
        }

        let attached = attached_run(&pending, child);
        let detached = pending.len() - attached;

        if ctx.lang.import_node_kinds().contains(&child.kind()) {
            block.append(&mut pending);
            flush_block(ctx, &mut block, out);
            continue;
        }

        let Some(entity) = classify(child, ctx.lang, ctx.source) else {
            block.append(&mut pending);
            block.push(child);
            continue;
        };

        block.extend(pending.drain(..detached));
        flush_block(ctx, &mut block, out);

        let decorations: Vec<Node> = std::mem::take(&mut pending);
        emit_entity(ctx, &entity, &decorations, ChunkKind::TopLevel, out);
    }

    block.append(&mut pending);
    flush_block(ctx, &mut block, out);
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ChunkKind {
    TopLevel,
    Member,
}

fn emit_entity(
    ctx: &ChunkCtx<'_>,
    entity: &Entity<'_>,
    decorations: &[Node<'_>],
    kind: ChunkKind,
    out: &mut Vec<DocumentChunk>,
) {
    let comments: Vec<Node> = decorations
        .iter()
        .copied()
        .filter(|n| is_comment(*n))
        .collect();
    if let (Some(first), Some(last)) = (comments.first(), comments.last()) {
        out.push(span_chunk(
            ctx,
            first.start_byte(),
            last.end_byte(),
            ChunkType::Doc,
            Some(&entity.name),
            Some("doc_comment"),
        ));
    }

    let start = decorations
        .iter()
        .filter(|n| is_attribute(**n))
        .map(Node::start_byte)
        .min()
        .unwrap_or(entity.outer.start_byte())
        .min(entity.outer.start_byte());

    let chunk_type = if kind == ChunkKind::Member {
        ChunkType::Method
    } else {
        entity.chunk_type
    };
    out.push(span_chunk(
        ctx,
        start,
        entity.outer.end_byte(),
        chunk_type,
        Some(&entity.name),
        Some(entity.inner.kind()),
    ));

    if let Some(doc) = python_docstring(ctx, entity.inner) {
        out.push(span_chunk(
            ctx,
            doc.start_byte(),
            doc.end_byte(),
            ChunkType::Doc,
            Some(&entity.name),
            Some("docstring"),
        ));
    }

    if kind == ChunkKind::TopLevel {
        emit_members(ctx, entity.inner, out);
    }
}

/// Methods of classes, impls and traits become chunks of their own.
fn emit_members(ctx: &ChunkCtx<'_>, container: Node<'_>, out: &mut Vec<DocumentChunk>) {
    let Some(body) = container.child_by_field_name("body") else {
        return;
    };
    let mut pending: Vec<Node> = Vec::new();
    for child in named_children(body) {
        if is_comment(child) || is_attribute(child) {
            pending.push(child);
            continue;
        }
        let attached = attached_run(&pending, child);
        let decorations = pending.split_off(pending.len() - attached);
        pending.clear();

        if let Some(member) = classify_member(child, ctx.lang, ctx.source) {
            emit_entity(ctx, &member, &decorations, ChunkKind::Member, out);
        }
    }
}

fn flush_block(ctx: &ChunkCtx<'_>, block: &mut Vec<Node<'_>>, out: &mut Vec<DocumentChunk>) {
    let (Some(first), Some(last)) = (block.first(), block.last()) else {
        return;
    };
    let code = &ctx.source[first.start_byte()..last.end_byte()];
    if non_ws_len(code) >= ctx.config.min_block_size {
        out.push(span_chunk(
            ctx,
            first.start_byte(),
            last.end_byte(),
            ChunkType::Block,
            None,
            None,
        ));
    }
    block.clear();
}

/// Number of trailing `pending` nodes that sit directly above `next`
/// with no blank line between them.
fn attached_run(pending: &[Node<'_>], next: Node<'_>) -> usize {
    let mut row = next.start_position().row;
    let mut count = 0;
    for node in pending.iter().rev() {
        if node.end_position().row + 1 < row {
            break;
        }
        row = node.start_position().row;
        count += 1;
    }
    count
}

fn is_comment(node: Node<'_>) -> bool {
    matches!(node.kind(), "comment" | "line_comment" | "block_comment")
}

fn is_attribute(node: Node<'_>) -> bool {
    node.kind() == "attribute_item"
}

fn field_text(node: Node<'_>, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| node_text(n, source).to_owned())
}

fn classify<'t>(node: Node<'t>, lang: Lang, source: &str) -> Option<Entity<'t>> {
    match lang.family() {
        LangFamily::EcmaScript => classify_ecmascript(node, node, source),
        LangFamily::Python => classify_python(node, node, source),
        LangFamily::Other if lang == Lang::Rust => classify_rust(node, source),
        LangFamily::Other => classify_go(node, source),
    }
}

fn classify_member<'t>(node: Node<'t>, lang: Lang, source: &str) -> Option<Entity<'t>> {
    let (inner, outer) = match (lang.family(), node.kind()) {
        (LangFamily::Python, "decorated_definition") => {
            (node.child_by_field_name("definition")?, node)
        }
        _ => (node, node),
    };
    let is_method = matches!(
        inner.kind(),
        "method_definition"
            | "abstract_method_signature"
            | "function_definition"
            | "function_item"
            | "function_signature_item"
    );
    if !is_method {
        return None;
    }
    Some(Entity {
        outer,
        inner,
        chunk_type: ChunkType::Method,
        name: field_text(inner, "name", source)?,
    })
}

fn classify_ecmascript<'t>(outer: Node<'t>, node: Node<'t>, source: &str) -> Option<Entity<'t>> {
    let chunk_type = match node.kind() {
        "export_statement" => {
            if let Some(decl) = node.child_by_field_name("declaration") {
                return classify_ecmascript(outer, decl, source);
            }
            let value = node.child_by_field_name("value")?;
            let chunk_type = match value.kind() {
                "function_expression" | "function" | "arrow_function" => ChunkType::Function,
                "class" => ChunkType::Class,
                _ => return None,
            };
            return Some(Entity {
                outer,
                inner: value,
                chunk_type,
                name: "default".to_owned(),
            });
        }
        "function_declaration" | "generator_function_declaration" | "function_signature" => {
            ChunkType::Function
        }
        "class_declaration" | "abstract_class_declaration" => ChunkType::Class,
        "interface_declaration" => ChunkType::Interface,
        "type_alias_declaration" => ChunkType::TypeAlias,
        "enum_declaration" => ChunkType::Enum,
        "internal_module" | "module" => ChunkType::Module,
        "lexical_declaration" | "variable_declaration" => {
            let declarator = named_children(node)
                .into_iter()
                .find(|c| c.kind() == "variable_declarator")?;
            let name = declarator.child_by_field_name("name")?;
            if name.kind() != "identifier" {
                return None;
            }
            let chunk_type = match declarator.child_by_field_name("value").map(|v| v.kind()) {
                Some(
                    "arrow_function" | "function_expression" | "function" | "generator_function",
                ) => ChunkType::Function,
                Some("class") => ChunkType::Class,
                _ => ChunkType::Variable,
            };
            return Some(Entity {
                outer,
                inner: node,
                chunk_type,
                name: node_text(name, source).to_owned(),
            });
        }
        _ => return None,
    };
    Some(Entity {
        outer,
        inner: node,
        chunk_type,
        name: field_text(node, "name", source)?,
    })
}

fn classify_python<'t>(outer: Node<'t>, node: Node<'t>, source: &str) -> Option<Entity<'t>> {
    let chunk_type = match node.kind() {
        "decorated_definition" => {
            return classify_python(outer, node.child_by_field_name("definition")?, source);
        }
        "function_definition" => ChunkType::Function,
        "class_definition" => ChunkType::Class,
        "expression_statement" => {
            let assignment = node.named_child(0)?;
            if assignment.kind() != "assignment" {
                return None;
            }
            let left = assignment.child_by_field_name("left")?;
            if left.kind() != "identifier" {
                return None;
            }
            return Some(Entity {
                outer,
                inner: assignment,
                chunk_type: ChunkType::Variable,
                name: node_text(left, source).to_owned(),
            });
        }
        _ => return None,
    };
    Some(Entity {
        outer,
        inner: node,
        chunk_type,
        name: field_text(node, "name", source)?,
    })
}

fn classify_rust<'t>(node: Node<'t>, source: &str) -> Option<Entity<'t>> {
    let chunk_type = match node.kind() {
        "function_item" | "macro_definition" => ChunkType::Function,
        "struct_item" | "union_item" | "impl_item" => ChunkType::Class,
        "enum_item" => ChunkType::Enum,
        "trait_item" => ChunkType::Interface,
        "type_item" => ChunkType::TypeAlias,
        "const_item" | "static_item" => ChunkType::Variable,
        "mod_item" => ChunkType::Module,
        _ => return None,
    };
    // tree-sitter-rust: impl_item uses "type" field, most others use "name"
    let name = field_text(node, "name", source).or_else(|| field_text(node, "type", source))?;
    Some(Entity {
        outer: node,
        inner: node,
        chunk_type,
        name,
    })
}

fn classify_go<'t>(node: Node<'t>, source: &str) -> Option<Entity<'t>> {
    let (chunk_type, name) = match node.kind() {
        "function_declaration" => (ChunkType::Function, field_text(node, "name", source)?),
        "method_declaration" => (ChunkType::Method, field_text(node, "name", source)?),
        "type_declaration" => {
            let spec = named_children(node)
                .into_iter()
                .find(|c| matches!(c.kind(), "type_spec" | "type_alias"))?;
            let chunk_type = match spec.child_by_field_name("type").map(|t| t.kind()) {
                Some("struct_type") => ChunkType::Class,
                Some("interface_type") => ChunkType::Interface,
                _ => ChunkType::TypeAlias,
            };
            (chunk_type, field_text(spec, "name", source)?)
        }
        "const_declaration" | "var_declaration" => {
            let spec = named_children(node)
                .into_iter()
                .find(|c| matches!(c.kind(), "const_spec" | "var_spec"))?;
            (ChunkType::Variable, field_text(spec, "name", source)?)
        }
        _ => return None,
    };
    Some(Entity {
        outer: node,
        inner: node,
        chunk_type,
        name,
    })
}

fn python_docstring<'t>(ctx: &ChunkCtx<'_>, node: Node<'t>) -> Option<Node<'t>> {
    if ctx.lang != Lang::Python {
        return None;
    }
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    first
        .named_child(0)
        .filter(|s| s.kind() == "string")
        .map(|_| first)
}

fn span_chunk(
    ctx: &ChunkCtx<'_>,
    start_byte: usize,
    end_byte: usize,
    chunk_type: ChunkType,
    symbol_name: Option<&str>,
    symbol_kind: Option<&str>,
) -> DocumentChunk {
    let line_start = line_of(ctx.source, start_byte);
    let line_end = line_of(ctx.source, end_byte.saturating_sub(1).max(start_byte));
    make_chunk(
        &ctx.source[start_byte..end_byte],
        ctx.file_path,
        line_start,
        line_end,
        chunk_type,
        symbol_name,
        symbol_kind,
    )
}

fn make_chunk(
    code: &str,
    file_path: &str,
    line_start: usize,
    line_end: usize,
    chunk_type: ChunkType,
    symbol_name: Option<&str>,
    symbol_kind: Option<&str>,
) -> DocumentChunk {
    DocumentChunk::new(
        code.to_owned(),
        ChunkMetadata {
            file_path: file_path.to_owned(),
            line_start,
            line_end,
            chunk_type,
            symbol_name: symbol_name.map(str::to_owned),
            symbol_kind: symbol_kind.map(str::to_owned),
        },
    )
}

/// 1-based line containing `byte`.
fn line_of(source: &str, byte: usize) -> usize {
    source.as_bytes()[..byte.min(source.len())]
        .iter()
        .filter(|b| **b == b'\n')
        .count()
        + 1
}

fn non_ws_len(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}
