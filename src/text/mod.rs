//! Text-side scoring: tokenization plus the emotion, plausibility and coherence
//! scorers that read recognized text.
//!
//! Recognized text mixes CJK runs (no spaces), Latin words, digits and punctuation.
//! Latin and digit runs split on class boundaries; CJK runs are segmented by forward
//! maximum matching against the lexicon vocabulary, with consecutive unknown
//! characters grouped into a single token.

pub mod coherence;
pub mod emotion;
pub mod word_frequency;

pub use coherence::ContextCoherenceScorer;
pub use emotion::{EmotionClassifier, EmotionCues};
pub use word_frequency::WordFrequencyScorer;

use crate::lexicon::Lexicon;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharClass {
    Cjk,
    Latin,
    Digit,
    Other,
}

#[inline]
pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF      // unified ideographs
        | 0x3400..=0x4DBF    // extension A
        | 0xF900..=0xFAFF    // compatibility ideographs
        | 0x20000..=0x2A6DF) // extension B
}

pub fn char_class(c: char) -> CharClass {
    if is_cjk(c) {
        CharClass::Cjk
    } else if c.is_ascii_digit() {
        CharClass::Digit
    } else if c.is_alphabetic() {
        CharClass::Latin
    } else {
        CharClass::Other
    }
}

/// Lower-cased tokens of `text`, in order.
pub fn tokenize(text: &str, lexicon: &Lexicon) -> Vec<String> {
    let chars: Vec<char> = text.to_lowercase().chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let class = char_class(chars[i]);
        let mut end = i + 1;
        while end < chars.len() && char_class(chars[end]) == class {
            end += 1;
        }
        match class {
            CharClass::Cjk => segment_cjk(&chars[i..end], lexicon, &mut tokens),
            CharClass::Latin | CharClass::Digit => tokens.push(chars[i..end].iter().collect()),
            CharClass::Other => {}
        }
        i = end;
    }
    tokens
}

/// Forward maximum matching over one run of CJK characters.
fn segment_cjk(run: &[char], lexicon: &Lexicon, out: &mut Vec<String>) {
    let max_len = lexicon.max_word_chars().max(1);
    let mut unknown = String::new();
    let mut i = 0;
    while i < run.len() {
        let longest = (1..=max_len.min(run.len() - i))
            .rev()
            .map(|len| (len, run[i..i + len].iter().collect::<String>()))
            .find(|(_, candidate)| lexicon.contains(candidate));

        match longest {
            Some((len, word)) => {
                if !unknown.is_empty() {
                    out.push(std::mem::take(&mut unknown));
                }
                out.push(word);
                i += len;
            }
            None => {
                unknown.push(run[i]);
                i += 1;
            }
        }
    }
    if !unknown.is_empty() {
        out.push(unknown);
    }
}

/// Approximate spoken word count: half a word per CJK character, one per Latin
/// or digit run.
pub fn word_count(text: &str) -> f32 {
    let mut cjk_chars = 0usize;
    let mut runs = 0usize;
    let mut prev = CharClass::Other;
    for c in text.chars() {
        let class = char_class(c);
        match class {
            CharClass::Cjk => cjk_chars += 1,
            CharClass::Latin | CharClass::Digit if class != prev => runs += 1,
            _ => {}
        }
        prev = class;
    }
    cjk_chars as f32 / 2.0 + runs as f32
}

/// Non-overlapping occurrences of `needle` in `haystack`. Needles that begin or
/// end with an ASCII letter or digit only match on word boundaries, so "so" does
/// not match inside "also".
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let bounded_start = needle
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphanumeric());
    let bounded_end = needle
        .chars()
        .last()
        .map_or(false, |c| c.is_ascii_alphanumeric());

    haystack
        .match_indices(needle)
        .filter(|(pos, _)| {
            let before_ok = !bounded_start
                || !haystack[..*pos]
                    .chars()
                    .last()
                    .map_or(false, |c| c.is_ascii_alphanumeric());
            let after_ok = !bounded_end
                || !haystack[pos + needle.len()..]
                    .chars()
                    .next()
                    .map_or(false, |c| c.is_ascii_alphanumeric());
            before_ok && after_ok
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_classes() {
        assert_eq!(char_class('好'), CharClass::Cjk);
        assert_eq!(char_class('a'), CharClass::Latin);
        assert_eq!(char_class('7'), CharClass::Digit);
        assert_eq!(char_class(','), CharClass::Other);
        assert_eq!(char_class(' '), CharClass::Other);
    }

    #[test]
    fn test_tokenize_mixed_text() {
        let lex = Lexicon::builtin();
        let tokens = tokenize("家人们,点击链接 Buy NOW 666", &lex);
        assert_eq!(tokens, vec!["家人们", "点击", "链接", "buy", "now", "666"]);
    }

    #[test]
    fn test_tokenize_groups_unknown_cjk() {
        let lex = Lexicon::builtin();
        let tokens = tokenize("我们饕餮盛宴", &lex);
        assert_eq!(tokens[0], "我们");
        assert_eq!(tokens.last().map(String::as_str), Some("饕餮盛宴"));
    }

    #[test]
    fn test_tokenize_empty_lexicon() {
        let lex = Lexicon::default();
        assert_eq!(tokenize("你好 world", &lex), vec!["你好", "world"]);
        assert!(tokenize("  ,.!", &lex).is_empty());
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("大家好呀"), 2.0);
        assert_eq!(word_count("hello there world"), 3.0);
        assert_eq!(word_count("买3件 ok"), 1.0 + 2.0);
        assert_eq!(word_count(""), 0.0);
    }

    #[test]
    fn test_count_occurrences_word_boundaries() {
        assert_eq!(count_occurrences("so good, also so fun", "so"), 2);
        assert_eq!(count_occurrences("哈哈哈哈", "哈哈"), 2);
        assert_eq!(count_occurrences("oh no, oh no!", "oh no"), 2);
        assert_eq!(count_occurrences("anything", ""), 0);
    }
}
