//! Near-duplicate detection between error patterns.

use std::collections::HashSet;

/// Tokens up to this many characters are "short" and never fuzzy-matched.
pub const SHORT_TOKEN_MAX_LEN: usize = 3;

const MIN_WORD_OVERLAP: f64 = 0.75;
const MIN_CONTAINMENT_RATIO: f64 = 0.85;

fn normalize(pattern: &str) -> String {
    pattern
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn words(normalized: &str) -> Vec<&str> {
    normalized
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Overlap of two word sets relative to the smaller set, in `[0, 1]`.
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let (na, nb) = (normalize(a), normalize(b));
    let set_a: HashSet<&str> = words(&na).into_iter().collect();
    let set_b: HashSet<&str> = words(&nb).into_iter().collect();
    let smaller = set_a.len().min(set_b.len());
    if smaller == 0 {
        return 0.0;
    }
    set_a.intersection(&set_b).count() as f64 / smaller as f64
}

/// Decides whether two patterns describe the same failure.
///
/// Rules, in order:
/// 1. Patterns made only of short tokens match only when identical.
/// 2. Two single-word patterns (word longer than three characters) match
///    only when the words are identical.
/// 3. Multi-word patterns match when their word overlap reaches 0.75.
/// 4. Otherwise one must contain the other and be at least 85% its length.
pub fn is_similar(a: &str, b: &str) -> bool {
    let (na, nb) = (normalize(a), normalize(b));
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    if na == nb {
        return true;
    }

    let (wa, wb) = (words(&na), words(&nb));
    let all_short = |ws: &[&str]| ws.iter().all(|w| char_len(w) <= SHORT_TOKEN_MAX_LEN);

    if all_short(&wa) && all_short(&wb) {
        return false;
    }

    let single_long = |ws: &[&str]| ws.len() == 1 && char_len(ws[0]) > SHORT_TOKEN_MAX_LEN;
    if single_long(&wa) && single_long(&wb) {
        return wa[0] == wb[0];
    }

    if wa.len() > 1 && wb.len() > 1 && word_overlap(&na, &nb) >= MIN_WORD_OVERLAP {
        return true;
    }

    let (shorter, longer) = if char_len(&na) <= char_len(&nb) {
        (&na, &nb)
    } else {
        (&nb, &na)
    };
    longer.contains(shorter.as_str())
        && char_len(shorter) as f64 >= MIN_CONTAINMENT_RATIO * char_len(longer) as f64
}
