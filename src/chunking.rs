//! Fixed-window overlapping chunker for cleaned page text.

/// Collapses all whitespace runs to single spaces and trims the ends.
///
/// Page text must pass through here before chunking so window lengths are
/// measured against stable, extractor-independent text.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One chunk window: its byte offset into the cleaned page text and the text
/// itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextWindow {
    pub offset: usize,
    pub text: String,
}

/// Splits `text` into overlapping windows of `max_len` characters with
/// `overlap` characters shared between neighbours.
///
/// Windows are measured in characters but sliced on char boundaries, so
/// multi-byte text never panics. Chunk `i + 1` starts `max_len - overlap`
/// characters after chunk `i`; the final window ends exactly at the text end
/// and the stride stops once the end is reached. Input shorter than `max_len`
/// yields a single window equal to the whole input. Callers must guarantee
/// `overlap < max_len`.
pub fn chunk_text(text: &str, max_len: usize, overlap: usize) -> Vec<TextWindow> {
    debug_assert!(overlap < max_len, "overlap must be smaller than window");
    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of every char boundary, plus the end of the text.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    bounds.push(text.len());
    let char_count = bounds.len() - 1;

    let stride = max_len - overlap;
    let mut windows = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + max_len).min(char_count);
        windows.push(TextWindow {
            offset: bounds[start],
            text: text[bounds[start]..bounds[end]].to_string(),
        });
        if end == char_count {
            break;
        }
        start += stride;
    }
    windows
}
