//! Sliding-window chunker over extracted document text.
//!
//! Windows are measured in characters (Unicode scalar values), so a chunk never splits a UTF-8
//! sequence. Each window starts `max_chars - overlap_chars` characters after the previous one
//! and the final window may be shorter. The output is a pure function of the text and settings.

use super::types::{Chunk, ChunkingError, Document};

/// Validated window and overlap sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerSettings {
    max_chars: usize,
    overlap_chars: usize,
}

impl ChunkerSettings {
    /// Validate `max_chars > 0` and `overlap_chars < max_chars`.
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self, ChunkingError> {
        if max_chars == 0 || overlap_chars >= max_chars {
            return Err(ChunkingError::InvalidConfig {
                max_chars,
                overlap_chars,
            });
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }

    /// Window size in characters.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Overlap between adjacent windows in characters.
    pub fn overlap_chars(&self) -> usize {
        self.overlap_chars
    }

    fn step(&self) -> usize {
        self.max_chars - self.overlap_chars
    }
}

/// Passage produced by the chunker, positioned in characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Zero-based position in the sequence.
    pub chunk_index: usize,
    /// Passage text.
    pub text: String,
    /// Inclusive start offset.
    pub char_start: usize,
    /// Exclusive end offset.
    pub char_end: usize,
}

/// Split `text` into overlapping windows, validating the sizing first.
pub fn chunk(
    text: &str,
    max_chars: usize,
    overlap_chars: usize,
) -> Result<Vec<TextChunk>, ChunkingError> {
    let settings = ChunkerSettings::new(max_chars, overlap_chars)?;
    Ok(chunk_with(text, &settings))
}

/// Split `text` using already-validated settings.
pub fn chunk_with(text: &str, settings: &ChunkerSettings) -> Vec<TextChunk> {
    // Byte offset of every char boundary, including the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < total_chars {
        let end = (start + settings.max_chars).min(total_chars);
        chunks.push(TextChunk {
            chunk_index: chunks.len(),
            text: text[boundaries[start]..boundaries[end]].to_string(),
            char_start: start,
            char_end: end,
        });
        if end == total_chars {
            break;
        }
        start += settings.step();
    }
    chunks
}

/// Chunk a document's extracted text and attach its identifiers.
pub fn chunk_document(
    document: &Document,
    loan_id: &str,
    text: &str,
    settings: &ChunkerSettings,
) -> Vec<Chunk> {
    chunk_with(text, settings)
        .into_iter()
        .map(|piece| Chunk {
            document_id: document.id.clone(),
            loan_id: loan_id.to_string(),
            chunk_index: piece.chunk_index,
            text: piece.text,
            char_start: piece.char_start,
            char_end: piece.char_end,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(chunks: &[TextChunk]) -> String {
        let mut output = String::new();
        let mut covered = 0;
        for piece in chunks {
            let skip = covered - piece.char_start;
            output.extend(piece.text.chars().skip(skip));
            covered = piece.char_end;
        }
        output
    }

    #[test]
    fn rejects_invalid_sizing() {
        assert!(matches!(
            chunk("abc", 0, 0),
            Err(ChunkingError::InvalidConfig { max_chars: 0, .. })
        ));
        assert!(chunk("abc", 5, 5).is_err());
        assert!(chunk("abc", 5, 7).is_err());
        assert!(chunk("abc", 5, 4).is_ok());
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk("", 10, 2).expect("chunk").is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk("short", 10, 2).expect("chunk");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short");
        assert_eq!((chunks[0].char_start, chunks[0].char_end), (0, 5));
    }

    #[test]
    fn windows_overlap_and_cover_the_text() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunk(text, 10, 3).expect("chunk");
        let spans: Vec<(usize, usize)> = chunks.iter().map(|c| (c.char_start, c.char_end)).collect();
        assert_eq!(spans, vec![(0, 10), (7, 17), (14, 24), (21, 26)]);
        for pair in chunks.windows(2) {
            assert!(pair[1].char_start <= pair[0].char_end);
            assert_eq!(pair[1].chunk_index, pair[0].chunk_index + 1);
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn chunk_count_matches_formula() {
        for (len, max, overlap) in [(100, 10, 0), (101, 10, 3), (4001, 4000, 200), (57, 8, 7)] {
            let text = "x".repeat(len);
            let chunks = chunk(&text, max, overlap).expect("chunk");
            let step = max - overlap;
            let expected = (len - overlap).div_ceil(step);
            assert_eq!(chunks.len(), expected, "len={len} max={max} overlap={overlap}");
            assert_eq!(reconstruct(&chunks), text);
        }
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "préstamo hipotecário ✓ garantía";
        let chunks = chunk(text, 7, 2).expect("chunk");
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 7));
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "The borrower shall repay the principal in monthly installments.";
        assert_eq!(chunk(text, 16, 4).expect("chunk"), chunk(text, 16, 4).expect("chunk"));
    }

    #[test]
    fn document_chunks_carry_identifiers() {
        let document = Document {
            id: "doc-9".into(),
            loan_id: "loan-3".into(),
            filename: None,
            doc_type: None,
            category: None,
            text_content: String::new(),
            file_type: None,
        };
        let settings = ChunkerSettings::new(4, 1).expect("settings");
        let chunks = chunk_document(&document, "loan-3", "abcdefg", &settings);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.document_id == "doc-9" && c.loan_id == "loan-3"));
    }
}
