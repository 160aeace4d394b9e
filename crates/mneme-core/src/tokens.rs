//! Shared tokenization for keywords, vocabulary, and vector encoding.
//!
//! One pattern everywhere: a stored chunk and an incoming query must tokenize
//! identically, or their vectors stop being comparable.

use std::sync::OnceLock;

use regex::Regex;

/// Script-aware token pattern: CJK runs of two or more characters, Latin runs
/// of three or more. Shorter runs are noise in both scripts.
const TOKEN_PATTERN: &str = r"[\p{Hangul}\p{Han}\p{Hiragana}\p{Katakana}]{2,}|[A-Za-z]{3,}";

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(TOKEN_PATTERN).expect("token pattern is valid"))
}

/// Stop words filtered by the keyword extractor. Korean particles and fillers
/// plus common English words.
const STOP_WORDS: &[&str] = &[
    // Korean
    "그리고", "그러나", "하지만", "그래서", "또한", "또는", "및", "등", "이런", "그런",
    "저런", "이것", "그것", "저것", "여기", "거기", "저기", "있는", "없는", "하는",
    "되는", "있다", "없다", "한다", "했다", "된다", "됐다", "대한", "위한", "통해",
    "부터", "까지", "에서", "에게", "으로", "처럼", "보다", "때문", "경우", "정도",
    "모든", "어떤", "무슨", "아주", "매우", "조금", "많이", "바로", "가장", "다시",
    // English
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "this", "that", "with", "from", "they", "been",
    "were", "will", "would", "could", "should", "there", "their", "what", "when", "which",
    "into", "about", "than", "then", "them", "these", "those", "some", "such", "only",
    "also", "more", "most", "other", "over", "very",
];

/// Splits text into tokens using the shared pattern. Latin tokens are
/// lowercased so "Rust" and "rust" share a dimension.
pub fn tokenize(text: &str) -> Vec<String> {
    token_re()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// True if the token is in the fixed stop-word set.
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}
