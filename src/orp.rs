//! Optimal Recognition Point (pivot) selection for the rapid display mode.
//!
//! The pivot is the character a word is visually anchored on while flashed
//! one word at a time. Short words anchor near the front; longer words anchor
//! left of center, nudged off visually thin glyphs when a sturdier neighbor
//! is close by. The choice depends only on the word text.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Glyphs that make poor anchors: narrow or easily confused.
static THIN_GLYPHS: Lazy<HashSet<char>> = Lazy::new(|| {
    ['i', 'l', 'j', '1', '!', '.', ',', '\'', '|']
        .into_iter()
        .collect()
});

/// How far from the geometric anchor we search for a sturdier glyph.
const SEARCH_RADIUS: usize = 2;

/// Pivot char index for a word. Always within `0..word.chars().count()`
/// (0 for the empty string).
pub fn pivot_index(word: &str) -> usize {
    let chars: Vec<char> = word.chars().collect();
    match chars.len() {
        0 | 1 => 0,
        2 | 3 => chars
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, ch)| is_consonant(**ch))
            .map(|(idx, _)| idx)
            .unwrap_or(1),
        len => {
            // Slightly left of center reads best; keep off the word edges.
            let anchor = ((len as f32) * 0.35).floor() as usize;
            let anchor = anchor.clamp(1, len - 2);
            if !is_thin(chars[anchor]) {
                return anchor;
            }
            for delta in 1..=SEARCH_RADIUS {
                if anchor >= delta + 1 && !is_thin(chars[anchor - delta]) {
                    return anchor - delta;
                }
                let right = anchor + delta;
                if right <= len - 2 && !is_thin(chars[right]) {
                    return right;
                }
            }
            anchor
        }
    }
}

fn is_consonant(ch: char) -> bool {
    ch.is_ascii_alphabetic() && !matches!(ch.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

fn is_thin(ch: char) -> bool {
    THIN_GLYPHS.contains(&ch)
}

/// Memoized pivot lookup keyed by word text. The pivot for a given word never
/// changes, so repeated words across a book resolve once.
#[derive(Debug, Default)]
pub struct PivotCache {
    cached: HashMap<String, usize>,
}

impl PivotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pivot(&mut self, word: &str) -> usize {
        if let Some(&idx) = self.cached.get(word) {
            return idx;
        }
        let idx = pivot_index(word);
        self.cached.insert(word.to_string(), idx);
        idx
    }

    pub fn len(&self) -> usize {
        self.cached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cached.is_empty()
    }
}
