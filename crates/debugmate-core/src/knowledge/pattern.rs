use once_cell::sync::Lazy;
use regex::Regex;

const MAX_PATTERN_CHARS: usize = 120;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s'`]+").expect("url regex"));
static QUOTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""[^"]*"|'[^']*'|`[^`]*`"#).expect("quoted regex"));
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number regex"));
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("space regex"));

/// Normalizes an error message into a knowledge-base pattern.
///
/// URLs become `<url>`, quoted literals `<str>` and numbers `<n>`, so two
/// failures of the same kind on different selectors or ports share a key.
pub fn extract_error_pattern(message: &str) -> String {
    let lowered = message.to_lowercase();
    let text = URL_RE.replace_all(&lowered, "<url>");
    let text = QUOTED_RE.replace_all(&text, "<str>");
    let text = NUMBER_RE.replace_all(&text, "<n>");
    let text = SPACE_RE.replace_all(text.trim(), " ");

    text.chars().take(MAX_PATTERN_CHARS).collect::<String>().trim_end().to_string()
}
