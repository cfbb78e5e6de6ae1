//! Bracket-balanced tag scanner.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagKind {
    Action,
    Suggestion,
    Context,
}

const PREFIXES: [(&str, TagKind); 3] = [
    ("[ACTION:", TagKind::Action),
    ("[SUGGESTION:", TagKind::Suggestion),
    ("[CONTEXT:", TagKind::Context),
];

/// One complete tag. `start..end` spans the brackets; `body` excludes the
/// prefix and the closing bracket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawTag<'a> {
    pub kind: TagKind,
    pub body: &'a str,
    pub start: usize,
    pub end: usize,
}

fn match_prefix(text: &str, at: usize) -> Option<(TagKind, usize)> {
    PREFIXES.iter().find_map(|(prefix, kind)| {
        let candidate = text.get(at..at + prefix.len())?;
        candidate
            .eq_ignore_ascii_case(prefix)
            .then_some((*kind, prefix.len()))
    })
}

/// Finds the closing bracket of a tag whose body starts at `from`,
/// honoring nested brackets inside the body.
fn find_close(text: &str, from: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (offset, ch) in text[from..].char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(from + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Scans `text` left to right for complete tags. Unclosed tags are skipped.
pub(crate) fn scan_tags(text: &str) -> Vec<RawTag<'_>> {
    let mut tags = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find('[') {
        let start = cursor + offset;
        match match_prefix(text, start) {
            Some((kind, prefix_len)) => {
                let body_start = start + prefix_len;
                match find_close(text, body_start) {
                    Some(close) => {
                        tags.push(RawTag {
                            kind,
                            body: &text[body_start..close],
                            start,
                            end: close + 1,
                        });
                        cursor = close + 1;
                    }
                    None => cursor = start + 1,
                }
            }
            None => cursor = start + 1,
        }
    }

    tags
}
