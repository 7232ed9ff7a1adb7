/// Split `text` into consecutive pieces of at most `max_chars` characters.
///
/// Pieces are cut on `char` boundaries, never overlap, and concatenate back to
/// `text` exactly. Empty input yields no pieces. A `max_chars` of zero means
/// "no limit" and yields the whole text as one piece.
pub fn chunk(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if max_chars == 0 {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::with_capacity(text.len() / max_chars + 1);
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        if count == max_chars {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    chunks.push(current);

    chunks
}
