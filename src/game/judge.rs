//! Answer Judging
//!
//! Tolerant comparison of a submitted answer against the canonical one.
//! Both strings go through [`normalize`] first, then the rules below are
//! tried in order; any match accepts the answer:
//!
//! 1. exact equality
//! 2. one string contains the other
//! 3. edit distance ≤ `max(1, ⌊0.3 · len(canonical)⌋)`
//! 4. for multi-word canonicals, at least 60% of canonical tokens have a
//!    submitted token within edit distance 1

/// Edit budget as a fraction of the canonical length.
const DISTANCE_RATIO: f64 = 0.3;

/// Share of canonical tokens that must be matched for rule 4.
const TOKEN_OVERLAP_THRESHOLD: f64 = 0.6;

/// Per-token edit budget for rule 4.
const TOKEN_DISTANCE: usize = 1;

const TATWEEL: char = '\u{0640}';
const BARE_ALEF: char = '\u{0627}';
const TA_MARBUTA: char = '\u{0629}';
const HA: char = '\u{0647}';
const ALEF_MAKSURA: char = '\u{0649}';
const YA: char = '\u{064A}';

/// Arabic harakat, Quranic annotation marks and generic combining marks.
fn is_diacritic(c: char) -> bool {
    matches!(c,
        '\u{064B}'..='\u{065F}'
        | '\u{0670}'
        | '\u{06D6}'..='\u{06ED}'
        | '\u{0610}'..='\u{061A}'
        | '\u{0300}'..='\u{036F}'
    )
}

/// Alef with hamza above/below, madda, wasla and wavy hamza forms.
fn is_alef_variant(c: char) -> bool {
    matches!(c, '\u{0622}' | '\u{0623}' | '\u{0625}' | '\u{0671}' | '\u{0672}' | '\u{0673}')
}

/// Canonical form used for every comparison.
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(input: &str) -> String {
    // Lowercase first: some case mappings emit combining marks
    let folded: String = input
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|&c| !is_diacritic(c) && c != TATWEEL)
        .map(|c| match c {
            c if is_alef_variant(c) => BARE_ALEF,
            TA_MARBUTA => HA,
            ALEF_MAKSURA => YA,
            c => c,
        })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether `submitted` should be accepted for `canonical`.
pub fn is_correct(submitted: &str, canonical: &str) -> bool {
    let given = normalize(submitted);
    let expected = normalize(canonical);

    if given.is_empty() || expected.is_empty() {
        return false;
    }

    if given == expected {
        return true;
    }

    if given.contains(expected.as_str()) || expected.contains(given.as_str()) {
        return true;
    }

    if levenshtein(&given, &expected) <= edit_budget(&expected) {
        return true;
    }

    token_overlap(&given, &expected) >= TOKEN_OVERLAP_THRESHOLD
}

/// Allowed edit distance for a normalized canonical answer.
pub fn edit_budget(canonical: &str) -> usize {
    let len = canonical.chars().count();
    ((len as f64 * DISTANCE_RATIO).floor() as usize).max(1)
}

/// Share of canonical tokens matched by some submitted token.
///
/// Zero for single-word canonicals, which rule 3 already covers.
fn token_overlap(given: &str, expected: &str) -> f64 {
    let expected_tokens: Vec<&str> = expected.split(' ').collect();
    if expected_tokens.len() < 2 {
        return 0.0;
    }
    let given_tokens: Vec<&str> = given.split(' ').collect();

    let matched = expected_tokens
        .iter()
        .filter(|want| {
            given_tokens
                .iter()
                .any(|got| got == *want || levenshtein(got, want) <= TOKEN_DISTANCE)
        })
        .count();

    matched as f64 / expected_tokens.len() as f64
}

/// Character-level Levenshtein distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

// =============================================================================
// TESTS
// =============================================================================
