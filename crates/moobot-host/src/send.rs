//! Outbound message splitting.
//!
//! Messenger platforms cap message length (bot APIs at 4096 characters;
//! we use 4000 for safety, which the linked-device protocol tolerates
//! too). Replies are split on line boundaries; when a split falls inside a
//! fenced code block the fence is closed before the chunk boundary and
//! reopened at the start of the next chunk.

/// Conservative per-message character cap shared by all transports.
pub const CHUNK_MAX: usize = 4000;

pub fn split_outbound(text: &str) -> Vec<String> {
    split_with_limit(text, CHUNK_MAX)
}

pub fn split_with_limit(text: &str, max: usize) -> Vec<String> {
    if text.len() <= max {
        return vec![text.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut fence_lang: Option<String> = None;

    for line in text.split('\n') {
        let cost = if current.is_empty() {
            line.len()
        } else {
            1 + line.len()
        };

        if !current.is_empty() && current.len() + cost > max {
            // Close any open fence before ending the chunk.
            if fence_lang.is_some() {
                current.push_str("\n```");
            }
            chunks.push(std::mem::take(&mut current));
            // Reopen the fence in the new chunk.
            if let Some(ref lang) = fence_lang {
                current.push_str("```");
                current.push_str(lang);
                current.push('\n');
            }
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);

        // Update fence tracking after appending.
        let trimmed = line.trim_start();
        if let Some(after_fence) = trimmed.strip_prefix("```") {
            fence_lang = match fence_lang {
                Some(_) => None,
                None => Some(after_fence.trim().to_string()),
            };
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    // Safety net: a single line longer than the cap still needs a hard
    // split, on a space where possible and on a char boundary always.
    let mut result = Vec::new();
    for chunk in chunks {
        if chunk.len() <= max {
            result.push(chunk);
            continue;
        }
        let mut remaining = chunk.as_str();
        while remaining.len() > max {
            let bound = floor_char_boundary(remaining, max);
            let cut = match remaining[..bound].rfind(' ') {
                Some(0) | None => bound,
                Some(at) => at,
            };
            result.push(remaining[..cut].to_string());
            remaining = remaining[cut..].trim_start();
        }
        if !remaining.is_empty() {
            result.push(remaining.to_string());
        }
    }

    result
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_with_limit("hello", 100), vec!["hello"]);
    }

    #[test]
    fn splits_respect_the_cap() {
        let text = (0..50).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = split_with_limit(&text, 60);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 60));
        // Nothing lost: joining the chunks restores every line.
        let joined = chunks.join("\n");
        for i in 0..50 {
            assert!(joined.contains(&format!("line {i}")));
        }
    }

    #[test]
    fn code_fence_is_closed_and_reopened() {
        let mut text = String::from("```rust\n");
        for _ in 0..30 {
            text.push_str("let x = 1;\n");
        }
        text.push_str("```");
        let chunks = split_with_limit(&text, 120);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            // Balanced fences in every chunk.
            assert_eq!(chunk.matches("```").count() % 2, 0, "unbalanced: {chunk}");
        }
        assert!(chunks[1].starts_with("```rust\n"));
    }

    #[test]
    fn giant_single_line_is_hard_split() {
        let text = "word ".repeat(200);
        let chunks = split_with_limit(text.trim_end(), 50);
        assert!(chunks.iter().all(|c| c.len() <= 50));
        assert!(chunks.len() >= 19);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "ü".repeat(100);
        let chunks = split_with_limit(&text, 31);
        assert!(chunks.iter().all(|c| c.len() <= 31));
        assert_eq!(chunks.concat(), text);
    }
}
