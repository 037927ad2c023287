use crate::error::ExtractionError;
use crate::models::{ChatOptions, DocumentFingerprint, TextChunk};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig::from(&ChatOptions::default())
    }
}

impl From<&ChatOptions> for ChunkingConfig {
    fn from(value: &ChatOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ExtractionError> {
        if self.max_chars == 0 {
            return Err(ExtractionError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(ExtractionError::InvalidChunkConfig(format!(
                "overlap_chars {} must be smaller than max_chars {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// A chunk together with the character offset it starts at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start: usize,
    pub text: String,
}

// Cut preference, higher wins. A cut at position `p` ends the chunk right
// before the character at index `p`.
const CUT_NONE: u8 = 0;
const CUT_WORD: u8 = 1;
const CUT_SENTENCE: u8 = 2;
const CUT_LINE: u8 = 3;
const CUT_PARAGRAPH: u8 = 4;

fn sentence_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[.!?]+["')\]]*\s"#).expect("sentence regex is valid"))
}

fn paragraph_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\n").expect("paragraph regex is valid"))
}

fn cut_ranks(text: &str, char_count: usize) -> Vec<u8> {
    let mut ranks = vec![CUT_NONE; char_count + 1];
    let byte_offsets = text.char_indices().map(|(offset, _)| offset).collect::<Vec<_>>();
    let char_position = |byte_end: usize| {
        byte_offsets
            .binary_search(&byte_end)
            .unwrap_or_else(|insert_at| insert_at)
    };

    for (index, ch) in text.chars().enumerate() {
        if ch == '\n' {
            ranks[index + 1] = CUT_LINE;
        } else if ch.is_whitespace() {
            ranks[index + 1] = CUT_WORD;
        }
    }

    for found in sentence_end_re().find_iter(text) {
        let position = char_position(found.end());
        ranks[position] = ranks[position].max(CUT_SENTENCE);
    }

    for found in paragraph_break_re().find_iter(text) {
        ranks[char_position(found.end())] = CUT_PARAGRAPH;
    }

    ranks
}

fn best_cut(ranks: &[u8], floor: usize, ceiling: usize) -> Option<usize> {
    let mut best: Option<(u8, usize)> = None;
    for position in floor..=ceiling {
        let rank = ranks[position];
        if rank == CUT_NONE {
            continue;
        }
        if best.map_or(true, |(best_rank, _)| rank >= best_rank) {
            best = Some((rank, position));
        }
    }
    best.map(|(_, position)| position)
}

/// Splits `text` into windows of at most `max_chars` characters where every
/// window repeats the last `overlap_chars` characters of its predecessor.
///
/// Each window ends at the strongest natural boundary found in the back half
/// of the window (paragraph, line, sentence, word) and is hard-cut at
/// `max_chars` when there is none.
pub fn split_spans(text: &str, config: ChunkingConfig) -> Result<Vec<ChunkSpan>, ExtractionError> {
    config.validate()?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars = text.chars().collect::<Vec<_>>();
    let ranks = cut_ranks(text, chars.len());
    let min_window = (config.max_chars / 2).max(config.overlap_chars + 1);

    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        if chars.len() - start <= config.max_chars {
            spans.push(ChunkSpan {
                start,
                text: chars[start..].iter().collect(),
            });
            break;
        }

        let ceiling = start + config.max_chars;
        let end = best_cut(&ranks, start + min_window, ceiling).unwrap_or(ceiling);
        spans.push(ChunkSpan {
            start,
            text: chars[start..end].iter().collect(),
        });
        start = end - config.overlap_chars;
    }

    Ok(spans)
}

pub fn split_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, ExtractionError> {
    Ok(split_spans(text, config)?
        .into_iter()
        .map(|span| span.text)
        .collect())
}

pub fn build_chunks(
    document: &DocumentFingerprint,
    text: &str,
    config: ChunkingConfig,
) -> Result<Vec<TextChunk>, ExtractionError> {
    let chunks = split_spans(text, config)?
        .into_iter()
        .enumerate()
        .map(|(index, span)| TextChunk {
            chunk_id: make_chunk_id(&document.document_id, index as u64, &span.text),
            document_id: document.document_id.clone(),
            chunk_index: index as u64,
            start_char: span.start,
            text: span.text,
        })
        .collect();

    Ok(chunks)
}

fn make_chunk_id(document_id: &str, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
