//! Source-position helpers for diagnostics.
//!
//! Errors in this crate carry byte offsets; renderers turn them into line/column pairs and a short
//! excerpt of what was found at that position.

/// Longest excerpt returned by [`tail`], in bytes.
pub const TAIL_LIMIT: usize = 96;

/// 1-based `(line, column)` of a byte offset. Columns count characters, not bytes.
///
/// Offsets past the end clamp to the end of the source.
pub fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = floor_char_boundary(source, offset.min(source.len()));
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = source[line_start..offset].chars().count() + 1;
    (line, column)
}

/// The rest of the line starting at `offset`, cut to at most [`TAIL_LIMIT`] bytes.
pub fn tail(source: &str, offset: usize) -> &str {
    let offset = floor_char_boundary(source, offset.min(source.len()));
    let rest = &source[offset..];
    let line = rest.split(['\n', '\r']).next().unwrap_or_default();
    &line[..floor_char_boundary(line, TAIL_LIMIT.min(line.len()))]
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_column() {
        let source = "<?php\n// Test\necho 1;\n";
        assert_eq!(line_column(source, 0), (1, 1));
        assert_eq!(line_column(source, 6), (2, 1));
        assert_eq!(line_column(source, 17), (3, 4));
        assert_eq!(line_column(source, 1000), (4, 1));
    }

    #[test]
    fn test_tail_stops_at_line_end_and_limit() {
        assert_eq!(tail("abc\ndef", 1), "bc");
        let long = "x".repeat(200);
        assert_eq!(tail(&long, 0).len(), TAIL_LIMIT);
        assert_eq!(tail("abc", 10), "");
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        let source = "é".repeat(60);
        let excerpt = tail(&source, 0);
        assert!(excerpt.len() <= TAIL_LIMIT);
        assert_eq!(excerpt.chars().count(), TAIL_LIMIT / 2);
    }
}
