//! Sentence detection for document text.
//!
//! Sentences are found with the Unicode sentence boundary rules (UAX #29) from
//! the `unicode-segmentation` crate. Every range returned by this module is a
//! byte range into the original text with surrounding whitespace trimmed, so
//! slicing the source with it always yields non-empty, non-blank text.
//!
//! Boundary detection can produce useless results on text that has no real
//! sentence structure (minified data, long runs without punctuation or line
//! breaks). When any detected sentence is longer than the configured limit,
//! [`segment`] falls back to a fixed-width character split and marks the
//! result as degraded.
//!
//! ```
//! use nearfile_context::sentence::segment;
//!
//! let text = "First one. Second one!  Third?";
//! let seg = segment(text, 2000, 800);
//! assert!(!seg.degraded);
//! let sentences: Vec<&str> = seg.ranges.iter().map(|r| &text[r.clone()]).collect();
//! assert_eq!(sentences, vec!["First one.", "Second one!", "Third?"]);
//! ```

use std::ops::Range;
use unicode_segmentation::UnicodeSegmentation;

/// Result of segmenting one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmentation {
    /// Trimmed byte ranges of each unit, in document order.
    pub ranges: Vec<Range<usize>>,
    /// True when boundary detection was abandoned for the fixed-width split.
    pub degraded: bool,
}

/// Segment `text` into sentences, falling back to fixed-width pieces of
/// `fallback_chars` characters when a sentence exceeds `max_sentence_chars`.
pub fn segment(text: &str, max_sentence_chars: usize, fallback_chars: usize) -> Segmentation {
    let ranges = sentence_ranges(text);
    let oversized = ranges
        .iter()
        .any(|r| text[r.clone()].chars().count() > max_sentence_chars);

    if oversized {
        Segmentation {
            ranges: fixed_width_ranges(text, fallback_chars),
            degraded: true,
        }
    } else {
        Segmentation {
            ranges,
            degraded: false,
        }
    }
}

/// Byte ranges of the sentences in `text`. Blank spans are dropped, so empty
/// or whitespace-only input yields no ranges.
pub fn sentence_ranges(text: &str) -> Vec<Range<usize>> {
    text.split_sentence_bound_indices()
        .filter_map(|(start, piece)| trimmed_range(start, piece))
        .collect()
}

/// Split `text` into pieces of at most `width` characters, cutting at the last
/// whitespace in the second half of a window when there is one.
pub fn fixed_width_ranges(text: &str, width: usize) -> Vec<Range<usize>> {
    let width = width.max(1);
    let mut ranges = Vec::new();
    let mut cursor = 0;

    while cursor < text.len() {
        let rest = &text[cursor..];
        let window_end = rest
            .char_indices()
            .nth(width)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());

        let mut cut = window_end;
        if window_end < rest.len() {
            if let Some(space) = rest[..window_end].rfind(char::is_whitespace) {
                if space > window_end / 2 {
                    cut = space;
                }
            }
        }

        if let Some(range) = trimmed_range(cursor, &rest[..cut]) {
            ranges.push(range);
        }
        cursor += cut;
    }

    ranges
}

fn trimmed_range(start: usize, piece: &str) -> Option<Range<usize>> {
    let trimmed = piece.trim();
    if trimmed.is_empty() {
        return None;
    }
    let leading = piece.len() - piece.trim_start().len();
    let begin = start + leading;
    Some(begin..begin + trimmed.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slices<'a>(text: &'a str, ranges: &[Range<usize>]) -> Vec<&'a str> {
        ranges.iter().map(|r| &text[r.clone()]).collect()
    }

    #[test]
    fn test_sentence_ranges_basic() {
        let text = "The cat sat. The dog ran! Did the bird fly? Yes.";
        let ranges = sentence_ranges(text);
        assert_eq!(
            slices(text, &ranges),
            vec!["The cat sat.", "The dog ran!", "Did the bird fly?", "Yes."]
        );
    }

    #[test]
    fn test_sentence_ranges_blank_input() {
        assert!(sentence_ranges("").is_empty());
        assert!(sentence_ranges("   \n\t  \n").is_empty());
    }

    #[test]
    fn test_line_breaks_end_sentences() {
        let text = "# Heading\n\nA paragraph without a period\nAnother line.";
        let ranges = sentence_ranges(text);
        assert_eq!(
            slices(text, &ranges),
            vec!["# Heading", "A paragraph without a period", "Another line."]
        );
    }

    #[test]
    fn test_fixed_width_prefers_whitespace() {
        let text = "aaaa bbbb cccc dddd";
        let ranges = fixed_width_ranges(text, 10);
        assert_eq!(slices(text, &ranges), vec!["aaaa bbbb", "cccc dddd"]);
    }

    #[test]
    fn test_fixed_width_respects_char_boundaries() {
        let text = "ééééééééééééééé";
        let ranges = fixed_width_ranges(text, 4);
        let pieces = slices(text, &ranges);
        assert_eq!(pieces.len(), 4);
        assert!(pieces.iter().all(|p| p.chars().count() <= 4));
        assert_eq!(pieces.concat(), text);
    }

    #[test]
    fn test_segment_degrades_on_oversized_sentence() {
        let text = "x".repeat(50);
        let seg = segment(&text, 20, 10);
        assert!(seg.degraded);
        assert_eq!(seg.ranges.len(), 5);
    }

    #[test]
    fn test_segment_normal_text_not_degraded() {
        let seg = segment("One. Two. Three.", 2000, 800);
        assert!(!seg.degraded);
        assert_eq!(seg.ranges.len(), 3);
    }
}
