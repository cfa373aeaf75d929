//! Source languages the indexer can parse, keyed by file extension.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
}

/// Languages that share one syntax lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LangFamily {
    /// JavaScript, TypeScript and TSX.
    EcmaScript,
    Python,
    /// Chunked, but no relationship extraction.
    Other,
}

const EXTENSIONS: &[(&str, Lang)] = &[
    ("ts", Lang::TypeScript),
    ("mts", Lang::TypeScript),
    ("cts", Lang::TypeScript),
    ("tsx", Lang::Tsx),
    ("js", Lang::JavaScript),
    ("jsx", Lang::JavaScript),
    ("mjs", Lang::JavaScript),
    ("cjs", Lang::JavaScript),
    ("py", Lang::Python),
    ("pyi", Lang::Python),
    ("rs", Lang::Rust),
    ("go", Lang::Go),
];

impl Lang {
    pub const ALL: [Self; 6] = [
        Self::TypeScript,
        Self::Tsx,
        Self::JavaScript,
        Self::Python,
        Self::Rust,
        Self::Go,
    ];

    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        EXTENSIONS
            .iter()
            .find(|(candidate, _)| *candidate == ext)
            .map(|&(_, lang)| lang)
    }

    /// Name stored on file nodes and in chunk payloads.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Rust => "rust",
            Self::Go => "go",
        }
    }

    #[must_use]
    pub fn family(self) -> LangFamily {
        match self {
            Self::JavaScript | Self::TypeScript | Self::Tsx => LangFamily::EcmaScript,
            Self::Python => LangFamily::Python,
            Self::Rust | Self::Go => LangFamily::Other,
        }
    }

    #[must_use]
    pub fn extracts_relationships(self) -> bool {
        !matches!(self.family(), LangFamily::Other)
    }

    /// `None` when the grammar's cargo feature is off.
    #[must_use]
    pub fn grammar(self) -> Option<tree_sitter::Language> {
        let language: tree_sitter::Language = match self {
            #[cfg(feature = "lang-js")]
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            #[cfg(feature = "lang-js")]
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            #[cfg(feature = "lang-js")]
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            #[cfg(feature = "lang-python")]
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            #[cfg(feature = "lang-rust")]
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            #[cfg(feature = "lang-go")]
            Self::Go => tree_sitter_go::LANGUAGE.into(),
            #[allow(unreachable_patterns)]
            _ => return None,
        };
        Some(language)
    }

    /// Top-level statements that only bring names into scope. Block chunks
    /// leave them out.
    #[must_use]
    pub fn import_node_kinds(self) -> &'static [&'static str] {
        match self {
            Self::JavaScript | Self::TypeScript | Self::Tsx => &["import_statement"],
            Self::Python => &[
                "import_statement",
                "import_from_statement",
                "future_import_statement",
            ],
            Self::Rust => &["use_declaration", "extern_crate_declaration"],
            Self::Go => &["import_declaration", "package_clause"],
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(Lang::from_extension)
}

/// True when the extension is known and its grammar is compiled in.
#[must_use]
pub fn is_indexable(path: &Path) -> bool {
    detect_language(path).and_then(Lang::grammar).is_some()
}
