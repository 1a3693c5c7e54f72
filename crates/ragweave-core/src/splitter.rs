//! Boundary-aware text splitter.
//!
//! Splits a [`TextDocument`] into overlapping windows of at most
//! `chunk_size` characters, preferring to cut just after a sentence
//! terminator, then at whitespace, and only as a last resort mid-word.
//!
//! # Algorithm
//!
//! 1. Content no longer than `chunk_size` becomes a single chunk.
//! 2. Otherwise take the window `[start, start + chunk_size)`.
//! 3. If the window does not reach the end of the text, look back up to
//!    100 characters for `.`, `!`, `?` or `\n` and cut just after it; failing
//!    that, look back up to 50 characters for whitespace and cut there.
//! 4. The next window starts `chunk_overlap` characters before the cut.
//! 5. Windows that are blank after trimming are dropped.
//!
//! Offsets are counted in chars, so multi-byte text is never cut inside
//! a UTF-8 sequence.
//!
//! # Example
//!
//! ```rust
//! use ragweave_core::models::TextDocument;
//! use ragweave_core::splitter::TextSplitter;
//!
//! let splitter = TextSplitter::new(1000, 200);
//! let chunks = splitter.split(&TextDocument::new("Hello world."));
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].metadata_i64("chunk_index"), Some(0));
//! ```

use crate::models::TextDocument;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;

const SENTENCE_LOOKBACK: usize = 100;
const WHITESPACE_LOOKBACK: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE as i64, 0)
    }
}

impl TextSplitter {
    /// Create a splitter, normalising out-of-range settings.
    ///
    /// - `chunk_size <= 0` becomes 1000.
    /// - Negative `chunk_overlap` becomes 0.
    /// - `chunk_overlap >= chunk_size` becomes `chunk_size / 4`.
    pub fn new(chunk_size: i64, chunk_overlap: i64) -> Self {
        let chunk_size = if chunk_size <= 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size as usize
        };
        let mut chunk_overlap = chunk_overlap.max(0) as usize;
        if chunk_overlap >= chunk_size {
            chunk_overlap = chunk_size / 4;
        }
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split one document.
    ///
    /// Every output carries the source metadata plus `chunk_index`
    /// (position in the output, from 0) and `chunk_size` (char count).
    /// Empty content yields an empty vec.
    pub fn split(&self, doc: &TextDocument) -> Vec<TextDocument> {
        if doc.content.is_empty() {
            return Vec::new();
        }

        let mut out: Vec<TextDocument> = Vec::new();
        for window in self.split_text(&doc.content) {
            if window.trim().is_empty() {
                continue;
            }
            let mut metadata = doc.metadata.clone();
            metadata.insert("chunk_index".into(), (out.len() as i64).into());
            metadata.insert("chunk_size".into(), (window.chars().count() as i64).into());
            out.push(TextDocument {
                content: window,
                metadata,
            });
        }
        out
    }

    /// Split several documents and concatenate the results.
    ///
    /// `chunk_index` restarts at 0 for each source document.
    pub fn split_all(&self, docs: &[TextDocument]) -> Vec<TextDocument> {
        docs.iter().flat_map(|d| self.split(d)).collect()
    }

    fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        if len <= self.chunk_size {
            return vec![text.trim().to_string()];
        }

        let mut windows = Vec::new();
        let mut start = 0;
        while start < len {
            let mut end = (start + self.chunk_size).min(len);
            if end < len {
                end = snap_end(&chars, start, end);
            }

            windows.push(chars[start..end].iter().collect());

            if end >= len {
                break;
            }
            let next = end.saturating_sub(self.chunk_overlap);
            start = if next > start { next } else { end };
        }
        windows
    }
}

/// Pick the cut position for the window `[start, end)`.
fn snap_end(chars: &[char], start: usize, end: usize) -> usize {
    let floor = end.saturating_sub(SENTENCE_LOOKBACK).max(start + 1);
    for i in (floor..end).rev() {
        if matches!(chars[i], '.' | '!' | '?' | '\n') {
            return i + 1;
        }
    }

    let floor = end.saturating_sub(WHITESPACE_LOOKBACK).max(start + 1);
    for i in (floor..end).rev() {
        if chars[i].is_whitespace() {
            return i;
        }
    }

    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn sentences(n: usize) -> String {
        (0..n)
            .map(|i| format!("Sentence number {} ends right here.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn blob(len: usize) -> String {
        sentences(len / 20).chars().take(len).collect()
    }

    #[test]
    fn test_normalises_settings() {
        let s = TextSplitter::new(0, -5);
        assert_eq!(s.chunk_size(), 1000);
        assert_eq!(s.chunk_overlap(), 0);

        let s = TextSplitter::new(100, 100);
        assert_eq!(s.chunk_overlap(), 25);

        let s = TextSplitter::new(100, 250);
        assert_eq!(s.chunk_overlap(), 25);
    }

    #[test]
    fn test_empty_content_yields_nothing() {
        let s = TextSplitter::new(100, 10);
        assert!(s.split(&TextDocument::new("")).is_empty());
        assert!(s.split(&TextDocument::new("   \n  ")).is_empty());
    }

    #[test]
    fn test_short_content_single_trimmed_chunk() {
        let s = TextSplitter::new(100, 10);
        let chunks = s.split(&TextDocument::new("  short text here \n"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "short text here");
        assert_eq!(chunks[0].metadata_i64("chunk_index"), Some(0));
        assert_eq!(chunks[0].metadata_i64("chunk_size"), Some(15));
    }

    #[test]
    fn test_exact_size_is_one_chunk() {
        let text = blob(1000);
        let chunks = TextSplitter::new(1000, 0).split(&TextDocument::new(text.trim()));
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_thousand_chars_at_400_with_50_overlap() {
        let text = blob(1000);
        let chunks = TextSplitter::new(400, 50).split(&TextDocument::new(text.clone()));
        assert!(chunks.len() >= 3, "got {} chunks", chunks.len());
        for c in &chunks {
            assert!(c.content.chars().count() <= 400);
        }
        for pair in chunks.windows(2) {
            let a = &pair[0].content;
            let b = &pair[1].content;
            let shared = (0..=a.len().min(b.len()))
                .rev()
                .find(|&n| a.ends_with(&b[..n]))
                .unwrap_or(0);
            assert!(shared <= 50, "adjacent chunks share {} chars", shared);
        }
    }

    #[test]
    fn test_cuts_after_sentence_terminator() {
        let text = sentences(40);
        let chunks = TextSplitter::new(200, 0).split(&TextDocument::new(text));
        assert!(chunks.len() > 1);
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.content.ends_with('.'), "chunk does not end on a sentence: {:?}", c.content);
        }
    }

    #[test]
    fn test_falls_back_to_whitespace() {
        let text = "word ".repeat(100);
        let chunks = TextSplitter::new(42, 0).split(&TextDocument::new(text));
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.content.ends_with("word"), "{:?}", c.content);
        }
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let text = "x".repeat(250);
        let chunks = TextSplitter::new(100, 0).split(&TextDocument::new(text));
        let lens: Vec<usize> = chunks.iter().map(|c| c.content.len()).collect();
        assert_eq!(lens, vec![100, 100, 50]);
    }

    #[test]
    fn test_windows_cover_whole_text() {
        let text = sentences(60);
        let overlap = 30;
        let chunks = TextSplitter::new(150, overlap as i64).split(&TextDocument::new(text.clone()));

        let mut covered = 0usize;
        for c in &chunks {
            let from = covered.saturating_sub(overlap);
            let pos = text[from..].find(&c.content).expect("chunk not found in source") + from;
            assert!(pos <= covered, "gap before offset {}", pos);
            covered = covered.max(pos + c.content.len());
        }
        assert_eq!(covered, text.len());
    }

    #[test]
    fn test_indices_contiguous_from_zero() {
        let chunks = TextSplitter::new(120, 20).split(&TextDocument::new(sentences(50)));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.metadata_i64("chunk_index"), Some(i as i64));
        }
    }

    #[test]
    fn test_copies_source_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), "notes.txt".into());
        let doc = TextDocument {
            content: sentences(30),
            metadata,
        };
        let chunks = TextSplitter::new(100, 10).split(&doc);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert_eq!(c.metadata["source"], "notes.txt");
            let size = c.metadata_i64("chunk_size").unwrap();
            assert_eq!(size as usize, c.content.chars().count());
        }
    }

    #[test]
    fn test_multibyte_text() {
        let text = "知识图谱与检索增强生成".repeat(20);
        let chunks = TextSplitter::new(30, 5).split(&TextDocument::new(text));
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.content.chars().count() <= 30);
        }
    }

    #[test]
    fn test_large_overlap_still_terminates() {
        let text = "a.".repeat(200);
        let chunks = TextSplitter::new(10, 9).split(&TextDocument::new(text));
        assert!(!chunks.is_empty());
        assert!(chunks.len() < 400);
    }

    #[test]
    fn test_split_all_restarts_indices() {
        let s = TextSplitter::new(80, 0);
        let docs = vec![TextDocument::new(sentences(10)), TextDocument::new(sentences(10))];
        let chunks = s.split_all(&docs);
        let zeros = chunks
            .iter()
            .filter(|c| c.metadata_i64("chunk_index") == Some(0))
            .count();
        assert_eq!(zeros, 2);
    }
}
