//! Chapter text normalization ahead of tokenization.
//!
//! Upstream producers hand us de-tagged plain text per chapter. Before the
//! tokenizer sees it we compose to NFC, unify line endings, fold exotic
//! horizontal whitespace into plain spaces, and collapse runs of blank lines
//! so paragraph breaks are exactly one empty line.

use unicode_normalization::UnicodeNormalization;

/// Join chapter blocks into one normalized text blob with a paragraph break
/// between chapters. Empty chapters are skipped.
pub fn normalize_chapters(chapters: &[String]) -> String {
    let mut out = String::new();
    for chapter in chapters {
        let cleaned = normalize_block(chapter);
        if cleaned.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&cleaned);
    }
    out
}

/// Normalize a single text block. Character offsets produced by the tokenizer
/// refer to this normalized form, not the raw input.
pub fn normalize_block(text: &str) -> String {
    let composed: String = text.nfc().collect();
    let unified = composed.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut pending_newlines = 0usize;
    for ch in unified.chars() {
        match ch {
            '\n' => pending_newlines += 1,
            _ => {
                if pending_newlines > 0 {
                    out.push('\n');
                    if pending_newlines > 1 {
                        out.push('\n');
                    }
                    pending_newlines = 0;
                }
                if ch == '\u{00A0}' || ch == '\t' {
                    out.push(' ');
                } else {
                    out.push(ch);
                }
            }
        }
    }

    out.trim().to_string()
}
