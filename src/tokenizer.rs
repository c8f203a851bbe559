//! One-pass tokenization of normalized chapter text.
//!
//! The scanner walks the text exactly once over `char_indices`; there is no
//! regex and no backtracking. Words are maximal runs of non-whitespace.
//! Offsets are character offsets into the normalized source so renderers can
//! address the char sequence directly; the sequence keeps the source string
//! and hands out word text as slices.

/// Pause classification derived from a word's trailing punctuation and the
/// whitespace that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseClass {
    None,
    Comma,
    SentenceEnd,
    ParagraphEnd,
}

/// One addressable word. Immutable after tokenization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordUnit {
    /// Character offset of the first char, into the normalized source.
    pub start_offset: usize,
    /// Character offset one past the last char.
    pub end_offset: usize,
    /// Dense 0-based position in the whole-book sequence.
    pub global_index: usize,
    pub trailing_pause: PauseClass,
    byte_start: usize,
    byte_end: usize,
}

impl WordUnit {
    /// Word length in characters.
    pub fn char_len(&self) -> usize {
        self.end_offset - self.start_offset
    }
}

/// The ordered word sequence for one loaded book. Built once per book open,
/// read-only afterwards.
#[derive(Debug, Default)]
pub struct TokenSequence {
    source: String,
    words: Vec<WordUnit>,
}

impl TokenSequence {
    /// Single linear pass over the source. A line break discovered in the
    /// whitespace after a word retroactively promotes that word to
    /// `ParagraphEnd`, since the break is only seen after the word closed.
    pub fn tokenize(source: String) -> Self {
        let mut words: Vec<WordUnit> = Vec::new();
        let mut open: Option<(usize, usize)> = None; // (char offset, byte offset)
        let mut last_char = ' ';

        for (char_idx, (byte_idx, ch)) in source.char_indices().enumerate() {
            if ch.is_whitespace() {
                if let Some((char_start, byte_start)) = open.take() {
                    words.push(WordUnit {
                        start_offset: char_start,
                        end_offset: char_idx,
                        global_index: words.len(),
                        trailing_pause: classify(last_char),
                        byte_start,
                        byte_end: byte_idx,
                    });
                }
                if ch == '\n' {
                    if let Some(last) = words.last_mut() {
                        last.trailing_pause = PauseClass::ParagraphEnd;
                    }
                }
            } else {
                if open.is_none() {
                    open = Some((char_idx, byte_idx));
                }
                last_char = ch;
            }
        }

        if let Some((char_start, byte_start)) = open {
            let char_count = source.chars().count();
            words.push(WordUnit {
                start_offset: char_start,
                end_offset: char_count,
                global_index: words.len(),
                trailing_pause: classify(last_char),
                byte_start,
                byte_end: source.len(),
            });
        }

        TokenSequence { source, words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WordUnit> {
        self.words.get(index)
    }

    pub fn words(&self) -> &[WordUnit] {
        &self.words
    }

    /// The word's text as a slice of the normalized source.
    pub fn text(&self, index: usize) -> Option<&str> {
        self.words
            .get(index)
            .map(|w| &self.source[w.byte_start..w.byte_end])
    }
}

fn classify(last_char: char) -> PauseClass {
    match last_char {
        '.' | '!' | '?' => PauseClass::SentenceEnd,
        ',' | ';' | ':' | '\u{2014}' | '\u{2013}' => PauseClass::Comma,
        _ => PauseClass::None,
    }
}
