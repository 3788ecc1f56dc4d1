//! Boundary-aware text chunking for the documentation corpus.

/// Split `text` into overlapping chunks of at most `chunk_size` characters.
///
/// Windows prefer to end just after the last sentence terminator (`.`) found
/// past the window midpoint, then at the last paragraph break (`\n\n`) past the
/// midpoint, and otherwise cut at exactly `chunk_size`. Consecutive windows
/// overlap by `overlap` characters. Chunks are trimmed and empty ones dropped.
/// Inputs no longer than `chunk_size` are returned unchanged as a single chunk.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    if total <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let end = start + chunk_size;

        if end >= total {
            // Final window: emit the tail and stop.
            push_trimmed(&mut chunks, &chars[start..total]);
            break;
        }

        let midpoint = start + chunk_size / 2;
        let mut cut = end;

        if let Some(sentence_end) = rfind_char(&chars, start, end, '.') {
            if sentence_end > midpoint {
                cut = sentence_end + 1;
            } else if let Some(para_break) = rfind_paragraph_break(&chars, start, end) {
                if para_break > midpoint {
                    cut = para_break;
                }
            }
        } else if let Some(para_break) = rfind_paragraph_break(&chars, start, end) {
            if para_break > midpoint {
                cut = para_break;
            }
        }

        push_trimmed(&mut chunks, &chars[start..cut]);

        // The window advance must make progress even when overlap is
        // misconfigured or a boundary lands right at the window start.
        let next = cut.saturating_sub(overlap);
        start = if next > start { next } else { start + 1 };
    }

    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, window: &[char]) {
    let chunk: String = window.iter().collect();
    let chunk = chunk.trim();
    if !chunk.is_empty() {
        chunks.push(chunk.to_string());
    }
}

/// Index of the last occurrence of `needle` in `chars[start..end]`.
fn rfind_char(chars: &[char], start: usize, end: usize, needle: char) -> Option<usize> {
    chars[start..end]
        .iter()
        .rposition(|&c| c == needle)
        .map(|pos| start + pos)
}

/// Index of the last `\n\n` pair fully contained in `chars[start..end]`.
fn rfind_paragraph_break(chars: &[char], start: usize, end: usize) -> Option<usize> {
    if end - start < 2 {
        return None;
    }
    (start..end - 1)
        .rev()
        .find(|&i| chars[i] == '\n' && chars[i + 1] == '\n')
}
