//! Splitting long text into provider-sized chunks.
//!
//! Paragraphs (runs of text between blank lines) are packed greedily into
//! chunks of at most `max_chunk_size` characters. A paragraph that alone is
//! over the limit is cut at fixed character offsets instead, so the bound
//! always holds. Lengths are counted in `char`s, not bytes. No chunk of a
//! multi-chunk plan is blank.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 1-based position in the planned sequence.
    pub index: usize,
    pub content: String,
    /// Length of `content` in characters.
    pub length: usize,
}

impl Chunk {
    fn new(index: usize, content: String) -> Self {
        let length = content.chars().count();
        Self {
            index,
            content,
            length,
        }
    }
}

/// Plan the chunks for `text`.
///
/// Empty input yields no chunks. Input that fits the limit yields exactly one
/// chunk equal to the input.
pub fn plan(text: &str, max_chunk_size: usize) -> Vec<Chunk> {
    let max = max_chunk_size.max(1);

    if text.is_empty() {
        return Vec::new();
    }
    if text.chars().count() <= max {
        return vec![Chunk::new(1, text.to_string())];
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in split_paragraphs(text) {
        let paragraph_len = paragraph.chars().count();

        if paragraph_len > max {
            flush(&mut pieces, &mut current);
            current_len = 0;
            pieces.extend(hard_split(paragraph.trim_end(), max));
            continue;
        }

        if current_len + paragraph_len > max {
            flush(&mut pieces, &mut current);
            current_len = 0;
        }
        current.push_str(paragraph);
        current_len += paragraph_len;
    }
    flush(&mut pieces, &mut current);

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, content)| Chunk::new(i + 1, content))
        .collect()
}

/// Split into paragraphs, each carrying its own trailing blank lines.
fn split_paragraphs(text: &str) -> Vec<&str> {
    let mut paragraphs = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    let mut has_content = false;
    let mut in_separator = false;

    for line in text.split_inclusive('\n') {
        let blank = line.trim().is_empty();
        if !blank && in_separator {
            paragraphs.push(&text[start..offset]);
            start = offset;
            in_separator = false;
        }
        if blank && has_content {
            in_separator = true;
        }
        if !blank {
            has_content = true;
        }
        offset += line.len();
    }
    if start < text.len() {
        paragraphs.push(&text[start..]);
    }

    paragraphs
}

fn flush(pieces: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim_end();
    if !trimmed.is_empty() {
        pieces.push(trimmed.to_string());
    }
    current.clear();
}

/// Cut at fixed character offsets. Pieces holding only whitespace are dropped,
/// since message endpoints reject blank content.
fn hard_split(paragraph: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    chars
        .chunks(max)
        .map(|piece| piece.iter().collect::<String>())
        .filter(|piece| !piece.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn without_whitespace(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = plan("short text", 2000);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 1);
        assert_eq!(chunks[0].content, "short text");
        assert_eq!(chunks[0].length, 10);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(plan("", 2000).is_empty());
    }

    #[test]
    fn oversized_paragraph_is_hard_split() {
        let text = "x".repeat(5000);
        let chunks = plan(&text, 2000);

        let lengths: Vec<usize> = chunks.iter().map(|c| c.length).collect();
        assert_eq!(lengths, vec![2000, 2000, 1000]);
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(
            chunks.iter().map(|c| c.content.as_str()).collect::<String>(),
            text
        );
    }

    #[test]
    fn paragraphs_are_packed_until_the_limit() {
        let text = format!("{}\n\n{}\n\n{}", "a".repeat(8), "b".repeat(8), "c".repeat(8));
        let chunks = plan(&text, 20);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, format!("{}\n\n{}", "a".repeat(8), "b".repeat(8)));
        assert_eq!(chunks[1].content, "c".repeat(8));
    }

    #[test]
    fn single_newlines_do_not_break_a_paragraph() {
        let text = format!("{}\n{}\n\n{}", "a".repeat(6), "b".repeat(6), "c".repeat(6));
        let chunks = plan(&text, 16);

        assert_eq!(chunks[0].content, format!("{}\n{}", "a".repeat(6), "b".repeat(6)));
        assert_eq!(chunks[1].content, "c".repeat(6));
    }

    #[test]
    fn pending_chunk_is_emitted_before_a_hard_split() {
        let text = format!("intro\n\n{}\n\noutro", "z".repeat(25));
        let chunks = plan(&text, 10);

        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["intro", "zzzzzzzzzz", "zzzzzzzzzz", "zzzzz", "outro"]
        );
    }

    #[test]
    fn blank_pieces_of_a_hard_split_are_dropped() {
        let text = format!("{}{}x", "a".repeat(10), " ".repeat(10));
        let chunks = plan(&text, 10);

        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["aaaaaaaaaa", "x"]);
        assert_eq!(chunks[1].index, 2);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "가".repeat(7);
        let chunks = plan(&text, 3);

        assert_eq!(
            chunks.iter().map(|c| c.length).collect::<Vec<_>>(),
            vec![3, 3, 1]
        );
    }

    proptest! {
        #[test]
        fn chunks_respect_limit_and_preserve_text(
            paragraphs in proptest::collection::vec("[a-z ]{0,60}", 0..12),
            limit in 1usize..80,
        ) {
            let text = paragraphs.join("\n\n");
            let chunks = plan(&text, limit);

            for chunk in &chunks {
                prop_assert!(chunk.length <= limit);
                prop_assert_eq!(chunk.length, chunk.content.chars().count());
                if chunks.len() > 1 {
                    prop_assert!(!chunk.content.trim().is_empty());
                }
            }
            let joined: String = chunks.iter().map(|c| c.content.as_str()).collect();
            prop_assert_eq!(without_whitespace(&joined), without_whitespace(&text));
        }

        #[test]
        fn planning_is_deterministic(text in "[a-z\n ]{0,300}", limit in 1usize..50) {
            prop_assert_eq!(plan(&text, limit), plan(&text, limit));
        }
    }
}
