//! Splitting of the free-text `Reviews` cell into individual review rows.
//!
//! The cell is a loose concatenation of press quotes. The heuristic keys on
//! typographic quotes; straight-quoted text falls through to line and period
//! splitting and may be over- or under-segmented.

const LEFT_QUOTE: char = '\u{201C}';
const RIGHT_QUOTE: char = '\u{201D}';
const PERIOD_RIGHT_QUOTE: &str = ".\u{201D}";

fn segments(text: &str, delimiter: &str) -> Vec<String> {
    text.split(delimiter)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a reviews cell into review texts. Duplicate segments are kept.
pub fn split_reviews(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if text.contains(LEFT_QUOTE) && text.contains(RIGHT_QUOTE) {
        return text
            .split(RIGHT_QUOTE)
            .filter_map(|piece| piece.rsplit_once(LEFT_QUOTE))
            .map(|(_, quoted)| quoted.trim())
            .filter(|quoted| !quoted.is_empty())
            .map(str::to_string)
            .collect();
    }

    let by_line = segments(text, "\n");
    if by_line.len() > 1 {
        return by_line;
    }
    let by_closing_quote = segments(text, PERIOD_RIGHT_QUOTE);
    if by_closing_quote.len() > 1 {
        return by_closing_quote;
    }
    segments(text, ".")
}
