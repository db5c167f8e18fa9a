//! Overlapping text chunker.
//!
//! Splits extracted document text into [`Chunk`]s of at most `size`
//! characters, each sharing `overlap` characters with its predecessor.
//! Split points prefer semantic boundaries: paragraph breaks first, then
//! sentence breaks, then whitespace, then a hard character cut.
//!
//! Extracted PDF text carries `---- Page N ----` marker lines; the chunker
//! records the page in effect at each chunk's midpoint so answers can cite
//! page numbers. The midpoint attributes a chunk to the page holding the
//! bulk of its content; the start would often fall in the previous page's
//! overlap tail.
//!
//! Each chunk receives a UUID plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Split text into overlapping chunks of at most `size` characters.
/// Returns chunks with contiguous indices starting at 0; `overlap` must be
/// smaller than `size` (enforced at config load).
///
/// Whitespace-only input yields no chunks; trailing pure whitespace after
/// the last split point is dropped.
pub fn chunk_text(document_id: &str, text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    debug_assert!(overlap < size);

    if text.trim().is_empty() {
        return Vec::new();
    }

    // Byte offset of every char, plus a sentinel at the end, so cuts in
    // char space map back to valid byte positions.
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    offsets.push(text.len());
    let n_chars = offsets.len() - 1;

    let pages = scan_page_markers(text);

    let mut chunks = Vec::new();
    let mut start: usize = 0; // char index
    let mut chunk_index: i64 = 0;

    while start < n_chars {
        let window_end = (start + size).min(n_chars);

        let cut = if window_end < n_chars {
            // Look for a boundary in the latter half of the window so a
            // break near the start cannot produce a degenerate chunk.
            let search_from = start + size / 2;
            find_split(text, &offsets, search_from, window_end).unwrap_or(window_end)
        } else {
            n_chars
        };

        let piece = &text[offsets[start]..offsets[cut]];
        let midpoint = (offsets[start] + offsets[cut]) / 2;
        chunks.push(make_chunk(
            document_id,
            chunk_index,
            piece,
            page_at(&pages, midpoint),
        ));
        chunk_index += 1;

        if cut == n_chars {
            break;
        }

        // The remainder may be pure whitespace; it carries no content.
        if text[offsets[cut]..].trim().is_empty() {
            break;
        }

        start = (cut.saturating_sub(overlap)).max(start + 1);
    }

    chunks
}

/// Best split point in `(search_from, window_end]`, in char-index space.
///
/// Preference order: paragraph break, sentence break, whitespace. Returns
/// `None` when the window contains none of them (caller hard-cuts).
fn find_split(
    text: &str,
    offsets: &[usize],
    search_from: usize,
    window_end: usize,
) -> Option<usize> {
    let win_start = offsets[search_from];
    let win_end = offsets[window_end];
    let window = &text[win_start..win_end];

    // Paragraph break: cut after the blank line.
    if let Some(pos) = window.rfind("\n\n") {
        return Some(byte_to_char(offsets, win_start + pos + 2));
    }

    // Sentence break: cut after the terminator and its trailing space,
    // or after a lone newline.
    let sentence = [". ", "! ", "? "]
        .iter()
        .filter_map(|pat| window.rfind(pat).map(|pos| pos + pat.len()))
        .chain(window.rfind('\n').map(|pos| pos + 1))
        .max();
    if let Some(pos) = sentence {
        return Some(byte_to_char(offsets, win_start + pos));
    }

    // Any whitespace: cut after it.
    if let Some(pos) = window.rfind(char::is_whitespace) {
        let ws_len = window[pos..].chars().next().map_or(1, |c| c.len_utf8());
        return Some(byte_to_char(offsets, win_start + pos + ws_len));
    }

    None
}

fn byte_to_char(offsets: &[usize], byte_pos: usize) -> usize {
    // offsets is sorted and contains byte_pos: cuts always land on a
    // pattern boundary, which is a char boundary.
    offsets.binary_search(&byte_pos).unwrap_or_else(|i| i)
}

/// Page markers emitted by the external PDF extractor, one per line:
/// `---- Page N ----`. Returns (byte offset, page) pairs in order.
fn scan_page_markers(text: &str) -> Vec<(usize, i64)> {
    let mut markers = Vec::new();
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        if let Some(page) = parse_page_marker(line.trim_end()) {
            markers.push((offset, page));
        }
        offset += line.len();
    }
    markers
}

fn parse_page_marker(line: &str) -> Option<i64> {
    let inner = line.strip_prefix("---- Page ")?.strip_suffix(" ----")?;
    inner.parse().ok()
}

/// Page in effect at a byte offset: the last marker at or before it.
fn page_at(markers: &[(usize, i64)], byte_offset: usize) -> Option<i64> {
    markers
        .iter()
        .take_while(|(off, _)| *off <= byte_offset)
        .last()
        .map(|(_, page)| *page)
}

fn make_chunk(document_id: &str, index: i64, text: &str, page: Option<i64>) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        page,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Merge chunks back together by eating each successor's overlap
    /// prefix. Equality with the input proves gap-free coverage. Only
    /// meaningful for non-repetitive text, where the longest suffix-prefix
    /// match is the real overlap.
    fn reconstruct(chunks: &[Chunk]) -> String {
        let mut acc = String::new();
        for chunk in chunks {
            let overlap = (1..=chunk.text.len().min(acc.len()))
                .rev()
                .filter(|&k| chunk.text.is_char_boundary(k))
                .find(|&k| acc.ends_with(&chunk.text[..k]))
                .unwrap_or(0);
            acc.push_str(&chunk.text[overlap..]);
        }
        acc
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].page, None);
    }

    #[test]
    fn test_whitespace_only_yields_nothing() {
        assert!(chunk_text("doc1", "   \n\n  ", 1000, 200).is_empty());
        assert!(chunk_text("doc1", "", 1000, 200).is_empty());
    }

    #[test]
    fn test_indices_contiguous_and_sizes_bounded() {
        let text = (0..60)
            .map(|i| format!("Sentence number {} in a longer running document.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text("doc1", &text, 200, 40);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "index mismatch at {}", i);
            assert!(
                c.text.chars().count() <= 200,
                "chunk {} exceeds size: {}",
                i,
                c.text.len()
            );
            assert!(!c.text.trim().is_empty(), "chunk {} is empty", i);
        }
    }

    #[test]
    fn test_coverage_no_gaps() {
        let text = (0..40)
            .map(|i| format!("Paragraph {} talks about topic {}.", i, i % 7))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("doc1", &text, 180, 30);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_successors_carry_overlap() {
        let text = "word ".repeat(400);
        let chunks = chunk_text("doc1", &text, 100, 20);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let shared = (1..=pair[1].text.len().min(pair[0].text.len()))
                .rev()
                .filter(|&k| pair[1].text.is_char_boundary(k))
                .find(|&k| pair[0].text.ends_with(&pair[1].text[..k]))
                .unwrap_or(0);
            assert!(shared > 0, "consecutive chunks share no text");
        }
    }

    #[test]
    fn test_prefers_paragraph_break() {
        // A paragraph break sits inside the latter half of the window; the
        // first chunk must end right after it rather than mid-sentence.
        let first = "a".repeat(70);
        let text = format!("{}\n\n{}", first, "b".repeat(100));
        let chunks = chunk_text("doc1", &text, 100, 10);
        assert!(chunks[0].text.ends_with("\n\n"));
        assert_eq!(chunks[0].text.trim_end(), first);
    }

    #[test]
    fn test_prefers_sentence_over_plain_whitespace() {
        let text = format!("One two three four. {}", "five six seven eight nine ten ".repeat(10));
        let chunks = chunk_text("doc1", &text, 30, 5);
        assert!(chunks[0].text.ends_with(". "));
    }

    #[test]
    fn test_hard_cut_without_any_boundary() {
        // No whitespace anywhere: stride is exactly size - overlap.
        let text = "x".repeat(250);
        let chunks = chunk_text("doc1", &text, 100, 20);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.len(), 100);
        assert_eq!(chunks[1].text.len(), 100);
        assert_eq!(chunks[2].text.len(), 90);
    }

    #[test]
    fn test_multibyte_text_cuts_on_char_boundaries() {
        let text: String = (0..80).map(|i| format!("wörd{} ü ", i)).collect();
        let chunks = chunk_text("doc1", &text, 50, 10);
        // Slicing would have panicked on a bad boundary; also verify coverage.
        let merged = reconstruct(&chunks);
        assert!(merged == text || merged == text.trim_end());
    }

    #[test]
    fn test_page_markers_recovered() {
        let text = format!(
            "---- Page 1 ----\n{}\n---- Page 2 ----\n{}",
            "alpha ".repeat(30),
            "beta ".repeat(30)
        );
        let chunks = chunk_text("doc1", &text, 120, 20);
        assert_eq!(chunks.first().unwrap().page, Some(1));
        assert_eq!(chunks.last().unwrap().page, Some(2));
    }

    #[test]
    fn test_no_markers_no_page() {
        let chunks = chunk_text("doc1", "Plain text without any markers.", 1000, 200);
        assert_eq!(chunks[0].page, None);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma. ".repeat(50);
        let c1 = chunk_text("doc1", &text, 100, 20);
        let c2 = chunk_text("doc1", &text, 100, 20);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.page, b.page);
        }
    }
}
