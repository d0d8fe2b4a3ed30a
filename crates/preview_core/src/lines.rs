/// Attribute the annotate transform adds to every start tag.
pub const LINE_NUMBER_ATTRIBUTE: &str = "data-lnum";

/// Sorted, de-duplicated source line markers found in annotated markup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineIndex {
    lines: Vec<u32>,
}

impl LineIndex {
    pub fn from_annotated(markup: &[u8]) -> Self {
        let needle = format!("{LINE_NUMBER_ATTRIBUTE}=");
        let needle = needle.as_bytes();
        let mut lines = Vec::new();
        let mut pos = 0;
        while let Some(offset) = find(&markup[pos..], needle) {
            pos += offset + needle.len();
            let rest = &markup[pos..];
            let value = match rest.first() {
                Some(&quote) if quote == b'"' || quote == b'\'' => {
                    let body = &rest[1..];
                    let end = body.iter().position(|&b| b == quote).unwrap_or(body.len());
                    &body[..end]
                }
                _ => {
                    let end = rest
                        .iter()
                        .position(|b| !b.is_ascii_digit())
                        .unwrap_or(rest.len());
                    &rest[..end]
                }
            };
            if let Some(line) = std::str::from_utf8(value)
                .ok()
                .and_then(|v| v.trim().parse::<u32>().ok())
            {
                lines.push(line);
            }
        }
        Self::from_lines(lines)
    }

    pub fn from_lines(mut lines: Vec<u32>) -> Self {
        lines.sort_unstable();
        lines.dedup();
        Self { lines }
    }

    pub fn lines(&self) -> &[u32] {
        &self.lines
    }

    /// Rightmost marker at or before `line`; the first marker when `line`
    /// precedes all of them.
    pub fn find(&self, line: u32) -> Option<u32> {
        let idx = self.lines.partition_point(|&l| l <= line);
        if idx == 0 {
            self.lines.first().copied()
        } else {
            Some(self.lines[idx - 1])
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::LineIndex;

    #[test]
    fn collects_sorted_unique_markers() {
        let markup = br#"<p data-lnum="3">a</p><b data-lnum="1"></b><i data-lnum="3"></i>"#;
        assert_eq!(LineIndex::from_annotated(markup).lines(), &[1, 3]);
    }

    #[test]
    fn ignores_malformed_values() {
        let markup = br#"<p data-lnum="x">a</p><b data-lnum='7'></b><i data-lnum=9></i>"#;
        assert_eq!(LineIndex::from_annotated(markup).lines(), &[7, 9]);
    }

    #[test]
    fn find_picks_rightmost_at_or_before() {
        let index = LineIndex::from_lines(vec![2, 5, 9]);
        assert_eq!(index.find(5), Some(5));
        assert_eq!(index.find(7), Some(5));
        assert_eq!(index.find(100), Some(9));
        assert_eq!(index.find(1), Some(2));
    }

    #[test]
    fn find_on_empty_index() {
        assert_eq!(LineIndex::default().find(3), None);
    }
}
