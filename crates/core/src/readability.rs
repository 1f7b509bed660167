//! Readability scoring and tokenization.
//!
//! Used by both the auditor and the writing-feedback path. All functions are
//! pure; a readability score that cannot be computed is reported as `None`
//! rather than panicking or erroring.

use std::collections::BTreeMap;

/// Word count as the auditor defines it: whitespace-separated chunks.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Lowercase, alphabetic-only tokens. Punctuation is stripped, and chunks
/// that contain no letters at all (numbers, bare dashes) are dropped.
pub fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphabetic())
                .flat_map(|c| c.to_lowercase())
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

/// Unique-token count divided by token count. `None` for empty input.
pub fn lexical_diversity(tokens: &[String]) -> Option<f64> {
    if tokens.is_empty() {
        return None;
    }
    let unique: std::collections::BTreeSet<&str> =
        tokens.iter().map(|t| t.as_str()).collect();
    Some(unique.len() as f64 / tokens.len() as f64)
}

/// The single most frequent token and its occurrence count.
/// Ties break toward the alphabetically first token, keeping the result
/// deterministic for identical input.
pub fn most_frequent(tokens: &[String]) -> Option<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(token, count)| (token.to_string(), count))
}

/// Syllable estimate for one word: vowel groups, minus a silent trailing 'e',
/// never below one.
fn syllables(word: &str) -> usize {
    let lower: Vec<char> = word
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(|c| c.to_lowercase())
        .collect();
    if lower.is_empty() {
        return 0;
    }

    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut count = 0;
    let mut prev_was_vowel = false;
    for &c in &lower {
        let vowel = is_vowel(c);
        if vowel && !prev_was_vowel {
            count += 1;
        }
        prev_was_vowel = vowel;
    }

    if count > 1 && lower.last() == Some(&'e') && lower.get(lower.len() - 2) != Some(&'l') {
        count -= 1;
    }
    count.max(1)
}

fn sentence_count(text: &str) -> usize {
    let mut count = 0;
    let mut in_terminator = false;
    for c in text.chars() {
        let terminator = matches!(c, '.' | '!' | '?');
        if terminator && !in_terminator {
            count += 1;
        }
        in_terminator = terminator;
    }
    count.max(1)
}

/// Flesch reading ease: higher means simpler text. `None` when the text has
/// no words to score.
pub fn flesch_reading_ease(text: &str) -> Option<f64> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    let total_syllables: usize = words.iter().map(|w| syllables(w)).sum();
    if total_syllables == 0 {
        return None;
    }
    let word_count = words.len() as f64;
    let sentence_count = sentence_count(text) as f64;

    Some(206.835 - 1.015 * (word_count / sentence_count) - 84.6 * (total_syllables as f64 / word_count))
}

/// Evidence bundle for the writing-feedback prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct TextAnalysis {
    pub reading_ease: Option<f64>,
    pub word_count: usize,
    /// Sentence-initial words appearing more than twice, with their counts.
    pub repeated_starters: BTreeMap<String, usize>,
}

/// Deterministic local analysis of a student essay.
pub fn analyze_text(text: &str) -> TextAnalysis {
    let mut starter_counts: BTreeMap<String, usize> = BTreeMap::new();
    for sentence in text.split(['.', '!', '?']) {
        if let Some(first) = tokens(sentence).into_iter().next() {
            *starter_counts.entry(first).or_insert(0) += 1;
        }
    }
    starter_counts.retain(|_, count| *count > 2);

    TextAnalysis {
        reading_ease: flesch_reading_ease(text),
        word_count: word_count(text),
        repeated_starters: starter_counts,
    }
}
