//! Fixed-window chunking with overlap.
//!
//! Sizes are counted in Unicode scalar values (`char`), never bytes, so a
//! window can't split a code point. Windows never cross page boundaries.

use crate::error::RagError;
use crate::models::{Chunk, CleanPage, IngestionOptions};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig::from(&IngestionOptions::default())
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        if self.max_chars == 0 {
            return Err(RagError::InvalidArgument(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(RagError::InvalidArgument(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.max_chars - self.overlap_chars
    }
}

/// Splits one text into windows of at most `max_chars`, each starting
/// `max_chars - overlap_chars` after the previous one.
pub fn split_with_overlap(text: &str, config: ChunkingConfig) -> Result<Vec<String>, RagError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let mut windows = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.max_chars).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += config.stride();
    }

    Ok(windows)
}

pub fn chunk_pages(pages: &[CleanPage], config: ChunkingConfig) -> Result<Vec<Chunk>, RagError> {
    config.validate()?;

    let mut chunks = Vec::new();
    for page in pages {
        let windows = split_with_overlap(&page.text, config)?;
        chunks.extend(
            windows
                .into_iter()
                .enumerate()
                .map(|(sequence_index, text)| Chunk {
                    text,
                    source_page: page.page_number,
                    sequence_index,
                }),
        );
    }

    Ok(chunks)
}

/// Stable record id for a chunk within a namespace, so re-ingesting a
/// document overwrites its previous vectors instead of duplicating them.
/// Stores that share one id space across namespaces still keep a copy per
/// namespace.
pub fn record_id(namespace: &str, document_id: &str, chunk: &Chunk) -> String {
    let mut hasher = Sha256::new();
    hasher.update((namespace.len() as u64).to_le_bytes());
    hasher.update(namespace.as_bytes());
    hasher.update(document_id.as_bytes());
    hasher.update(chunk.source_page.to_le_bytes());
    hasher.update((chunk.sequence_index as u64).to_le_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(page_number: u32, text: &str) -> CleanPage {
        CleanPage {
            page_number,
            text: text.to_string(),
        }
    }

    fn config(max_chars: usize, overlap_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chars,
            overlap_chars,
        }
    }

    fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
        let mut text = String::new();
        for chunk in chunks {
            if chunk.sequence_index == 0 {
                text.push_str(&chunk.text);
            } else {
                text.extend(chunk.text.chars().skip(overlap));
            }
        }
        text
    }

    #[test]
    fn long_and_short_pages_chunk_as_expected() -> Result<(), RagError> {
        let long = "a".repeat(4_000);
        let short = "b".repeat(100);
        let chunks = chunk_pages(&[page(0, &long), page(1, &short)], config(1_000, 200))?;

        assert_eq!(chunks.len(), 6);
        let first_page = chunks.iter().filter(|c| c.source_page == 0).collect::<Vec<_>>();
        assert_eq!(first_page.len(), 5);
        assert_eq!(
            first_page.iter().map(|c| c.sequence_index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
        assert!(first_page.iter().all(|c| c.text.chars().count() <= 1_000));
        assert_eq!(chunks[5].source_page, 1);
        assert_eq!(chunks[5].sequence_index, 0);
        assert_eq!(chunks[5].text, short);
        Ok(())
    }

    #[test]
    fn empty_page_produces_no_chunks() -> Result<(), RagError> {
        let chunks = chunk_pages(&[page(0, ""), page(1, "text")], config(10, 2))?;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source_page, 1);
        Ok(())
    }

    #[test]
    fn page_at_exact_limit_is_one_chunk() -> Result<(), RagError> {
        let text = "x".repeat(10);
        let chunks = chunk_pages(&[page(3, &text)], config(10, 4))?;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        Ok(())
    }

    #[test]
    fn chunks_reconstruct_the_page_losslessly() -> Result<(), RagError> {
        let text = (0..437)
            .map(|n| char::from(b'a' + (n % 26) as u8))
            .collect::<String>();
        for (max_chars, overlap) in [(50, 10), (64, 63), (7, 0), (1, 0), (500, 20)] {
            let chunks = chunk_pages(&[page(0, &text)], config(max_chars, overlap))?;
            assert_eq!(reconstruct(&chunks, overlap), text, "max={max_chars} overlap={overlap}");
        }
        Ok(())
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() -> Result<(), RagError> {
        let text = "größe über ähnliche maße ".repeat(8);
        let chunks = chunk_pages(&[page(0, &text)], config(30, 5))?;
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 30));
        assert_eq!(reconstruct(&chunks, 5), text);
        Ok(())
    }

    #[test]
    fn chunking_is_deterministic() -> Result<(), RagError> {
        let pages = vec![page(0, &"lorem ipsum ".repeat(300)), page(1, "tail")];
        let first = chunk_pages(&pages, config(256, 32))?;
        let second = chunk_pages(&pages, config(256, 32))?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(matches!(
            chunk_pages(&[page(0, "text")], config(10, 10)),
            Err(RagError::InvalidArgument(_))
        ));
        assert!(matches!(
            split_with_overlap("text", config(0, 0)),
            Err(RagError::InvalidArgument(_))
        ));
    }

    #[test]
    fn record_ids_are_stable_and_distinct() {
        let chunk = Chunk {
            text: "alpha".to_string(),
            source_page: 2,
            sequence_index: 1,
        };
        let next = Chunk {
            sequence_index: 2,
            ..chunk.clone()
        };

        assert_eq!(record_id("ns", "doc", &chunk), record_id("ns", "doc", &chunk));
        assert_ne!(record_id("ns", "doc", &chunk), record_id("ns", "doc", &next));
        assert_ne!(record_id("ns", "doc", &chunk), record_id("ns", "other", &chunk));
        assert_ne!(record_id("tenant-a", "doc", &chunk), record_id("tenant-b", "doc", &chunk));
        assert_ne!(record_id("ab", "cdoc", &chunk), record_id("abc", "doc", &chunk));
        assert!(Uuid::parse_str(&record_id("ns", "doc", &chunk)).is_ok());
    }
}
