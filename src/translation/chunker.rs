//! Sentence-aware splitting of long texts into pieces the engine accepts.
//!
//! Sentences are approximated by the literal `". "` delimiter. Abbreviations
//! and non-Latin punctuation are mis-segmented; that is accepted behaviour.

const SENTENCE_DELIMITER: &str = ". ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    /// A single sentence longer than the limit, passed through whole.
    pub oversized: bool,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    max_len: usize,
}

impl TextChunker {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Texts at or above the limit go through [`split`]; shorter ones are sent whole.
    pub fn needs_chunking(&self, text: &str) -> bool {
        text.chars().count() >= self.max_len
    }

    pub fn split(&self, text: &str) -> Vec<Chunk> {
        split(text, self.max_len)
    }

    pub fn join(&self, translated: &[String]) -> String {
        join(translated)
    }
}

fn sentences(text: &str) -> Vec<String> {
    let pieces: Vec<&str> = text.split(SENTENCE_DELIMITER).collect();
    let last = pieces.len().saturating_sub(1);

    pieces
        .iter()
        .enumerate()
        .filter_map(|(i, piece)| {
            let sentence = if i < last {
                format!("{}.", piece)
            } else {
                piece.to_string()
            };
            let trimmed = sentence.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect()
}

/// Greedily packs sentences into chunks of at most `max_len - 1` characters.
pub fn split(text: &str, max_len: usize) -> Vec<Chunk> {
    let budget = max_len.max(1) - 1;
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_len = 0usize;

    let mut emit = |buffer: &mut String, buffer_len: &mut usize| {
        if !buffer.is_empty() {
            chunks.push(Chunk {
                text: std::mem::take(buffer),
                oversized: *buffer_len > budget,
            });
            *buffer_len = 0;
        }
    };

    for sentence in sentences(text) {
        let sentence_len = sentence.chars().count();
        let candidate = if buffer.is_empty() {
            sentence_len
        } else {
            buffer_len + 1 + sentence_len
        };

        if !buffer.is_empty() && candidate > budget {
            emit(&mut buffer, &mut buffer_len);
        }

        if !buffer.is_empty() {
            buffer.push(' ');
            buffer_len += 1;
        }
        buffer.push_str(&sentence);
        buffer_len += sentence_len;
    }

    emit(&mut buffer, &mut buffer_len);
    chunks
}

pub fn join(translated: &[String]) -> String {
    translated.join(" ")
}
