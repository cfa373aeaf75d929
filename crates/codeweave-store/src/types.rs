//! Chunk and relationship records shared by every storage port.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for deterministic chunk ids.
const CHUNK_NAMESPACE: Uuid = Uuid::from_u128(0x6c0d_e3a1_9b7e_4f52_a1c4_5d2e_8f90_b317);

/// Kind of semantic unit a chunk represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Function,
    Method,
    Class,
    Interface,
    TypeAlias,
    Enum,
    Variable,
    Module,
    Doc,
    Block,
    File,
}

impl ChunkType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::TypeAlias => "type_alias",
            Self::Enum => "enum",
            Self::Variable => "variable",
            Self::Module => "module",
            Self::Doc => "doc",
            Self::Block => "block",
            Self::File => "file",
        }
    }

    #[must_use]
    pub fn from_str_kind(s: &str) -> Self {
        match s {
            "function" => Self::Function,
            "method" => Self::Method,
            "class" => Self::Class,
            "interface" => Self::Interface,
            "type_alias" => Self::TypeAlias,
            "enum" => Self::Enum,
            "variable" => Self::Variable,
            "module" => Self::Module,
            "doc" => Self::Doc,
            "file" => Self::File,
            _ => Self::Block,
        }
    }

    /// Whether chunks of this type name a symbol other chunks can reference.
    #[must_use]
    pub fn is_symbol(self) -> bool {
        !matches!(self, Self::Doc | Self::Block | Self::File)
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_path: String,
    pub line_start: usize,
    pub line_end: usize,
    pub chunk_type: ChunkType,
    pub symbol_name: Option<String>,
    pub symbol_kind: Option<String>,
}

/// A semantic unit of a parsed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub metadata: ChunkMetadata,
}

impl DocumentChunk {
    /// Build a chunk whose id is derived from its file, symbol and line range.
    #[must_use]
    pub fn new(content: String, metadata: ChunkMetadata) -> Self {
        let id = chunk_id(
            &metadata.file_path,
            metadata
                .symbol_name
                .as_deref()
                .unwrap_or(metadata.chunk_type.as_str()),
            metadata.chunk_type,
            metadata.line_start,
            metadata.line_end,
        );
        Self {
            id,
            content,
            embedding: None,
            metadata,
        }
    }

    #[must_use]
    pub fn file_path(&self) -> &str {
        &self.metadata.file_path
    }

    #[must_use]
    pub fn symbol_name(&self) -> Option<&str> {
        self.metadata.symbol_name.as_deref()
    }

    #[must_use]
    pub fn contains_line(&self, line: usize) -> bool {
        self.metadata.line_start <= line && line <= self.metadata.line_end
    }

    #[must_use]
    pub fn line_span(&self) -> usize {
        self.metadata.line_end.saturating_sub(self.metadata.line_start)
    }
}

/// Deterministic chunk id (UUIDv5) for a file + symbol + line range.
///
/// The same inputs always yield the same id, so re-indexing an unchanged
/// symbol upserts instead of duplicating. The output is also a valid Qdrant
/// point id.
#[must_use]
pub fn chunk_id(
    file_path: &str,
    symbol: &str,
    chunk_type: ChunkType,
    line_start: usize,
    line_end: usize,
) -> String {
    let key = format!(
        "{file_path}\u{0}{symbol}\u{0}{}\u{0}{line_start}-{line_end}",
        chunk_type.as_str()
    );
    Uuid::new_v5(&CHUNK_NAMESPACE, key.as_bytes()).to_string()
}

/// Graph node id for an external package.
#[must_use]
pub fn package_node_id(name: &str, version: Option<&str>) -> String {
    format!("pkg:{name}@{}", version.unwrap_or("unknown"))
}

#[must_use]
pub fn is_package_node(id: &str) -> bool {
    id.starts_with("pkg:")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Contains,
    Documents,
    References,
    Imports,
    ImportsSymbol,
    ImportsPkg,
}

impl RelationshipType {
    pub const ALL: [Self; 6] = [
        Self::Contains,
        Self::Documents,
        Self::References,
        Self::Imports,
        Self::ImportsSymbol,
        Self::ImportsPkg,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contains => "CONTAINS",
            Self::Documents => "DOCUMENTS",
            Self::References => "REFERENCES",
            Self::Imports => "IMPORTS",
            Self::ImportsSymbol => "IMPORTS_SYMBOL",
            Self::ImportsPkg => "IMPORTS_PKG",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed, typed edge between chunk ids, file paths or package ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub from: String,
    pub to: String,
    pub kind: RelationshipType,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl GraphRelationship {
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>, kind: RelationshipType) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            properties: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn touches(&self, id: &str) -> bool {
        self.from == id || self.to == id
    }
}
