//! Line-based chunker with token-budget targets and overlap.
//!
//! Token counts are estimated at four characters per token, close enough
//! for budgeting, and it keeps the chunker free of any tokenizer
//! dependency.

/// Safe bands for the chunking knobs.
const MIN_TARGET_TOKENS: usize = 100;
const MAX_TARGET_TOKENS: usize = 2000;
const MAX_OVERLAP_TOKENS: usize = 100;

#[derive(Debug, Clone)]
pub struct Chunker {
    target_tokens: usize,
    overlap_tokens: usize,
}

/// One chunk with 1-based inclusive line coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

impl Chunker {
    /// Clamp the configured knobs into the safe band.
    pub fn new(target_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            target_tokens: target_tokens.clamp(MIN_TARGET_TOKENS, MAX_TARGET_TOKENS),
            overlap_tokens: overlap_tokens.min(MAX_OVERLAP_TOKENS),
        }
    }

    /// Split `lines` into chunks of roughly `target_tokens`, with the tail
    /// of each chunk repeated at the head of the next for context overlap.
    /// `first_line` offsets the reported coordinates (tail-indexing).
    pub fn chunk_lines(&self, lines: &[&str], first_line: usize) -> Vec<ChunkSpan> {
        let mut spans = Vec::new();
        let mut start = 0usize;

        while start < lines.len() {
            let mut tokens = 0usize;
            let mut end = start;
            while end < lines.len() {
                let line_tokens = estimate_tokens(lines[end]).max(1);
                if tokens > 0 && tokens + line_tokens > self.target_tokens {
                    break;
                }
                tokens += line_tokens;
                end += 1;
            }

            let text = lines[start..end].join("\n");
            if !text.trim().is_empty() {
                spans.push(ChunkSpan {
                    start_line: first_line + start,
                    end_line: first_line + end - 1,
                    text,
                });
            }

            if end >= lines.len() {
                break;
            }

            // Walk back until the overlap budget is covered.
            let mut overlap = 0usize;
            let mut next_start = end;
            while next_start > start + 1 && overlap < self.overlap_tokens {
                next_start -= 1;
                overlap += estimate_tokens(lines[next_start]).max(1);
            }
            start = next_start.max(start + 1);
        }

        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_input_is_one_chunk() {
        let chunker = Chunker::new(512, 32);
        let lines = vec!["User prefers dark mode."];
        let spans = chunker.chunk_lines(&lines, 1);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start_line, 1);
        assert_eq!(spans[0].end_line, 1);
    }

    #[test]
    fn long_input_splits_with_overlap() {
        let chunker = Chunker::new(100, 20);
        let line = "x".repeat(120); // 30 tokens per line
        let lines: Vec<&str> = (0..20).map(|_| line.as_str()).collect();
        let spans = chunker.chunk_lines(&lines, 1);
        assert!(spans.len() > 1);
        // Successive chunks overlap.
        for pair in spans.windows(2) {
            assert!(pair[1].start_line <= pair[0].end_line);
            assert!(pair[1].start_line > pair[0].start_line);
        }
        // Every line is covered.
        assert_eq!(spans.first().unwrap().start_line, 1);
        assert_eq!(spans.last().unwrap().end_line, 20);
    }

    #[test]
    fn knobs_are_clamped() {
        let chunker = Chunker::new(10, 500);
        assert_eq!(chunker.target_tokens, 100);
        assert_eq!(chunker.overlap_tokens, 100);
    }

    #[test]
    fn blank_only_chunks_are_dropped() {
        let chunker = Chunker::new(512, 0);
        let lines = vec!["", "  ", ""];
        assert!(chunker.chunk_lines(&lines, 1).is_empty());
    }
}
