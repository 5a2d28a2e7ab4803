//! Re-chunking of finished text into stream frames.
//!
//! The backend is not an incremental generator: the full text exists before
//! the first chunk goes out. Each chunk is one word plus the whitespace run
//! that follows it; the first chunk also carries any leading whitespace, so
//! concatenating the chunks gives back the text byte for byte.

/// Lazy, non-restartable sequence of word chunks over an owned text.
#[derive(Debug, Clone)]
pub struct TokenChunks {
    text: String,
    pos: usize,
}

impl TokenChunks {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pos: 0,
        }
    }

    /// The finished text the chunks are cut from
    pub fn source(&self) -> &str {
        &self.text
    }
}

impl Iterator for TokenChunks {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let rest = &self.text[self.pos..];
        if rest.is_empty() {
            return None;
        }

        // Leading whitespace only appears before the first word
        let word_start = rest.find(|c: char| !c.is_whitespace()).unwrap_or(rest.len());
        let after_word = &rest[word_start..];
        let word_end = word_start + after_word.find(char::is_whitespace).unwrap_or(after_word.len());
        let after_gap = &rest[word_end..];
        let end = word_end + after_gap.find(|c: char| !c.is_whitespace()).unwrap_or(after_gap.len());

        self.pos += end;
        Some(rest[..end].to_string())
    }
}
