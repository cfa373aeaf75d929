//! Embedding text and display headers for chunks.
//!
//! Raw code alone embeds poorly for conceptual queries; the file path,
//! language and symbol give the vector something to anchor on.

use codeweave_store::DocumentChunk;

use crate::languages::Lang;

/// Text sent to the embedder for `chunk` (not shown to users).
#[must_use]
pub fn contextualize_for_embedding(chunk: &DocumentChunk, lang: Option<Lang>) -> String {
    let mut text = String::with_capacity(chunk.content.len() + 128);

    text.push_str("# ");
    text.push_str(chunk.file_path());
    text.push('\n');

    if let Some(name) = chunk.symbol_name() {
        text.push_str("# Symbol: ");
        text.push_str(chunk.metadata.chunk_type.as_str());
        text.push(' ');
        text.push_str(name);
        text.push('\n');
    }

    if let Some(lang) = lang {
        text.push_str("# Language: ");
        text.push_str(lang.id());
        text.push('\n');
    }

    text.push_str(&chunk.content);
    text
}

/// Short header for a retrieved chunk.
#[must_use]
pub fn chunk_display_header(chunk: &DocumentChunk) -> String {
    let name = chunk
        .symbol_name()
        .unwrap_or(chunk.metadata.chunk_type.as_str());
    format!(
        "{} :: {} (lines {}-{})",
        chunk.file_path(),
        name,
        chunk.metadata.line_start,
        chunk.metadata.line_end
    )
}

#[cfg(test)]
mod tests {
    use codeweave_store::{ChunkMetadata, ChunkType};

    use super::*;

    fn sample_chunk() -> DocumentChunk {
        DocumentChunk::new(
            "export function add(a: number, b: number) { return a + b; }".into(),
            ChunkMetadata {
                file_path: "src/math.ts".into(),
                line_start: 3,
                line_end: 5,
                chunk_type: ChunkType::Function,
                symbol_name: Some("add".into()),
                symbol_kind: Some("function_declaration".into()),
            },
        )
    }

    #[test]
    fn contextualize_prefixes_path_symbol_and_language() {
        let text = contextualize_for_embedding(&sample_chunk(), Some(Lang::TypeScript));
        let lines: Vec<&str> = text.lines().take(3).collect();
        assert_eq!(
            lines,
            vec!["# src/math.ts", "# Symbol: function add", "# Language: typescript"]
        );
        assert!(text.ends_with("return a + b; }"));
    }

    #[test]
    fn contextualize_omits_missing_parts() {
        let mut chunk = sample_chunk();
        chunk.metadata.symbol_name = None;
        let text = contextualize_for_embedding(&chunk, None);
        assert!(!text.contains("Symbol:"));
        assert!(!text.contains("Language:"));
    }

    #[test]
    fn display_header_with_symbol() {
        assert_eq!(
            chunk_display_header(&sample_chunk()),
            "src/math.ts :: add (lines 3-5)"
        );
    }

    #[test]
    fn display_header_falls_back_to_chunk_type() {
        let mut chunk = sample_chunk();
        chunk.metadata.symbol_name = None;
        chunk.metadata.chunk_type = ChunkType::Block;
        assert_eq!(chunk_display_header(&chunk), "src/math.ts :: block (lines 3-5)");
    }
}
