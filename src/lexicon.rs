//! Static text heuristics
//!
//! Keyword groups, plausibility scores, collocations and discourse markers used by
//! the emotion classifier and the two text scorers.
//!
//! # Design Notes
//! - The built-in tables ship as `assets/lexicon.json`, baked into the binary and
//!   parsed once. A malformed built-in table degrades to empty tables (every text
//!   score then sits at its neutral default) rather than panicking.
//! - Tables are immutable after load and handed out as `Arc<Lexicon>`, so sessions
//!   share them without locking.
//! - All entries are lower-cased on load; callers match against lower-cased text.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use log::{error, info};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::text::count_occurrences;
use crate::EmotionType;

static BUILTIN: Lazy<Arc<Lexicon>> = Lazy::new(|| {
    match Lexicon::from_json_str(include_str!("../assets/lexicon.json")) {
        Ok(lexicon) => {
            info!(
                "Built-in lexicon loaded: {} scored words, {} vocabulary entries",
                lexicon.word_scores.len(),
                lexicon.vocabulary.len()
            );
            Arc::new(lexicon)
        }
        Err(err) => {
            error!("Built-in lexicon is malformed, text scoring falls back to defaults: {err}");
            Arc::new(Lexicon::default())
        }
    }
});

// =============================================================================
// Table keys
// =============================================================================

/// Weight of a salient keyword hit
pub const SALIENT_WEIGHT: f32 = 1.5;
/// Weight of a tone-particle hit
pub const PARTICLE_WEIGHT: f32 = 1.2;
/// Weight of a baseline keyword hit
pub const BASELINE_WEIGHT: f32 = 1.0;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KeywordGroups {
    pub salient: Vec<String>,
    pub particles: Vec<String>,
    pub baseline: Vec<String>,
}

impl KeywordGroups {
    /// Every keyword paired with the weight of its group.
    pub fn weighted(&self) -> impl Iterator<Item = (&str, f32)> {
        let salient = self.salient.iter().map(|k| (k.as_str(), SALIENT_WEIGHT));
        let particles = self.particles.iter().map(|k| (k.as_str(), PARTICLE_WEIGHT));
        let baseline = self.baseline.iter().map(|k| (k.as_str(), BASELINE_WEIGHT));
        salient.chain(particles).chain(baseline)
    }

    fn lowercase(&mut self) {
        for group in [&mut self.salient, &mut self.particles, &mut self.baseline] {
            for k in group.iter_mut() {
                *k = k.to_lowercase();
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegreeLevel {
    High,
    Medium,
    Low,
}

impl DegreeLevel {
    pub fn factor(self) -> f32 {
        match self {
            DegreeLevel::High => 1.5,
            DegreeLevel::Medium => 1.2,
            DegreeLevel::Low => 0.8,
        }
    }
}

/// Coarse topical buckets used for external coherence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Sentiment,
    Product,
    Action,
    Time,
}

/// Word classes that grammar patterns are written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordClass {
    Degree,
    Sentiment,
    Product,
    Action,
    Time,
    Pronoun,
    Function,
}

impl From<Topic> for WordClass {
    fn from(topic: Topic) -> Self {
        match topic {
            Topic::Sentiment => WordClass::Sentiment,
            Topic::Product => WordClass::Product,
            Topic::Action => WordClass::Action,
            Topic::Time => WordClass::Time,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connective {
    Causal,
    Contrast,
    Progressive,
    Summary,
    Example,
}

/// On-disk shape of the tables.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LexiconFile {
    emotions: HashMap<EmotionType, KeywordGroups>,
    degree_modifiers: HashMap<DegreeLevel, Vec<String>>,
    speech_rate_bands: HashMap<EmotionType, [f32; 2]>,
    word_scores: HashMap<String, f32>,
    function_words: Vec<String>,
    pronouns: Vec<String>,
    topics: HashMap<Topic, Vec<String>>,
    collocations: Vec<(String, String)>,
    grammar_patterns: Vec<(WordClass, WordClass)>,
    connectives: HashMap<Connective, Vec<String>>,
    host_patterns: Vec<String>,
}

// =============================================================================
// Lexicon
// =============================================================================

#[derive(Debug, Clone)]
pub struct Lexicon {
    emotions: HashMap<EmotionType, KeywordGroups>,
    /// Longest modifiers first, so "超级" is consumed before "超"
    degree_modifiers: Vec<(String, DegreeLevel)>,
    speech_rate_bands: HashMap<EmotionType, (f32, f32)>,
    word_scores: HashMap<String, f32>,
    function_words: HashSet<String>,
    pronouns: HashSet<String>,
    word_topics: HashMap<String, Vec<Topic>>,
    collocations: HashSet<(String, String)>,
    grammar_patterns: HashSet<(WordClass, WordClass)>,
    connectives: HashMap<Connective, Vec<String>>,
    host_patterns: Vec<String>,
    /// Distinct emotion keywords across every non-neutral class
    emotion_keywords: Vec<String>,
    /// Everything the segmenter may emit as a known word
    vocabulary: HashSet<String>,
    max_word_chars: usize,
}

impl Default for Lexicon {
    /// Empty tables. Every lookup misses.
    fn default() -> Self {
        Self {
            emotions: HashMap::new(),
            degree_modifiers: Vec::new(),
            speech_rate_bands: HashMap::new(),
            word_scores: HashMap::new(),
            function_words: HashSet::new(),
            pronouns: HashSet::new(),
            word_topics: HashMap::new(),
            collocations: HashSet::new(),
            grammar_patterns: HashSet::new(),
            connectives: HashMap::new(),
            host_patterns: Vec::new(),
            emotion_keywords: Vec::new(),
            vocabulary: HashSet::new(),
            max_word_chars: 1,
        }
    }
}

impl Lexicon {
    /// The tables compiled into the crate. Parsed on first use.
    pub fn builtin() -> Arc<Lexicon> {
        Arc::clone(&BUILTIN)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let file: LexiconFile =
            serde_json::from_str(json).map_err(|source| ConfigError::Lexicon { source })?;
        Self::build(file)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lexicon {}", path.display()))?;
        let lexicon = Self::from_json_str(&json)
            .with_context(|| format!("Invalid lexicon {}", path.display()))?;
        info!("Lexicon loaded from {}", path.display());
        Ok(lexicon)
    }

    fn build(file: LexiconFile) -> Result<Self, ConfigError> {
        let lower = |words: Vec<String>| -> Vec<String> {
            words.into_iter().map(|w| w.to_lowercase()).collect()
        };

        let mut word_scores = HashMap::with_capacity(file.word_scores.len());
        for (word, score) in file.word_scores {
            if !(0.0..=1.0).contains(&score) {
                return Err(ConfigError::out_of_range("word_scores", score, 0.0, 1.0));
            }
            word_scores.insert(word.to_lowercase(), score);
        }

        let mut speech_rate_bands = HashMap::with_capacity(file.speech_rate_bands.len());
        for (emotion, [min, max]) in file.speech_rate_bands {
            if !(min.is_finite() && max.is_finite() && min > 0.0 && max > min) {
                return Err(ConfigError::out_of_range("speech_rate_bands", min, 0.0, max));
            }
            speech_rate_bands.insert(emotion, (min, max));
        }

        let mut emotions = file.emotions;
        for groups in emotions.values_mut() {
            groups.lowercase();
        }

        let mut degree_modifiers: Vec<(String, DegreeLevel)> = file
            .degree_modifiers
            .into_iter()
            .flat_map(|(level, words)| lower(words).into_iter().map(move |w| (w, level)))
            .collect();
        degree_modifiers.sort_by(|a, b| {
            b.0.chars()
                .count()
                .cmp(&a.0.chars().count())
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut word_topics: HashMap<String, Vec<Topic>> = HashMap::new();
        for (topic, words) in file.topics {
            for word in lower(words) {
                word_topics.entry(word).or_default().push(topic);
            }
        }

        let connectives = file
            .connectives
            .into_iter()
            .map(|(kind, words)| (kind, lower(words)))
            .collect::<HashMap<_, _>>();

        let mut emotion_keywords: Vec<String> = emotions
            .iter()
            .filter(|(emotion, _)| **emotion != EmotionType::Neutral)
            .flat_map(|(_, groups)| groups.weighted().map(|(k, _)| k.to_string()))
            .collect();
        emotion_keywords.sort();
        emotion_keywords.dedup();

        let function_words: HashSet<String> = lower(file.function_words).into_iter().collect();
        let pronouns: HashSet<String> = lower(file.pronouns).into_iter().collect();

        let mut vocabulary: HashSet<String> = word_scores.keys().cloned().collect();
        vocabulary.extend(function_words.iter().cloned());
        vocabulary.extend(pronouns.iter().cloned());
        vocabulary.extend(word_topics.keys().cloned());
        vocabulary.extend(degree_modifiers.iter().map(|(w, _)| w.clone()));
        vocabulary.extend(emotion_keywords.iter().cloned());
        vocabulary.extend(connectives.values().flatten().cloned());
        // multi-word Latin phrases never come out of the tokenizer as one token
        vocabulary.retain(|w| !w.contains(' '));

        let max_word_chars = vocabulary
            .iter()
            .map(|w| w.chars().count())
            .max()
            .unwrap_or(1);

        Ok(Self {
            emotions,
            degree_modifiers,
            speech_rate_bands,
            word_scores,
            function_words,
            pronouns,
            word_topics,
            collocations: file
                .collocations
                .into_iter()
                .map(|(a, b)| (a.to_lowercase(), b.to_lowercase()))
                .collect(),
            grammar_patterns: file.grammar_patterns.into_iter().collect(),
            connectives,
            host_patterns: lower(file.host_patterns),
            emotion_keywords,
            vocabulary,
            max_word_chars,
        })
    }

    // -------------------------------------------------------------------------
    // Emotion tables
    // -------------------------------------------------------------------------

    pub fn keyword_groups(&self, emotion: EmotionType) -> Option<&KeywordGroups> {
        self.emotions.get(&emotion)
    }

    pub fn degree_modifiers(&self) -> &[(String, DegreeLevel)] {
        &self.degree_modifiers
    }

    /// Plausible words-per-minute range for an emotion.
    pub fn speech_rate_band(&self, emotion: EmotionType) -> Option<(f32, f32)> {
        self.speech_rate_bands.get(&emotion).copied()
    }

    /// Occurrences of any emotion keyword in already lower-cased text.
    pub fn emotion_hits(&self, lowered: &str) -> usize {
        self.emotion_keywords
            .iter()
            .map(|k| count_occurrences(lowered, k))
            .sum()
    }

    // -------------------------------------------------------------------------
    // Word tables
    // -------------------------------------------------------------------------

    pub fn word_score(&self, word: &str) -> Option<f32> {
        self.word_scores.get(word).copied()
    }

    pub fn scored_words(&self) -> impl Iterator<Item = (&str, f32)> {
        self.word_scores.iter().map(|(w, s)| (w.as_str(), *s))
    }

    pub fn is_function_word(&self, word: &str) -> bool {
        self.function_words.contains(word)
    }

    /// Whether the segmenter treats `word` as a known unit.
    pub fn contains(&self, word: &str) -> bool {
        self.vocabulary.contains(word)
    }

    /// Length in chars of the longest vocabulary entry.
    pub fn max_word_chars(&self) -> usize {
        self.max_word_chars
    }

    pub fn topics(&self, word: &str) -> &[Topic] {
        self.word_topics.get(word).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn word_classes(&self, word: &str) -> Vec<WordClass> {
        let mut classes: Vec<WordClass> =
            self.topics(word).iter().map(|&t| WordClass::from(t)).collect();
        if self.degree_modifiers.iter().any(|(w, _)| w == word) {
            classes.push(WordClass::Degree);
        }
        if self.pronouns.contains(word) {
            classes.push(WordClass::Pronoun);
        }
        if self.function_words.contains(word) {
            classes.push(WordClass::Function);
        }
        classes
    }

    // -------------------------------------------------------------------------
    // Coherence tables
    // -------------------------------------------------------------------------

    pub fn is_collocation(&self, first: &str, second: &str) -> bool {
        self.collocations
            .contains(&(first.to_string(), second.to_string()))
    }

    /// Whether any class of `first` followed by any class of `second` is a known pattern.
    pub fn matches_grammar(&self, first: &str, second: &str) -> bool {
        if self.grammar_patterns.is_empty() {
            return false;
        }
        let left = self.word_classes(first);
        if left.is_empty() {
            return false;
        }
        let right = self.word_classes(second);
        left.iter().any(|a| {
            right
                .iter()
                .any(|b| self.grammar_patterns.contains(&(*a, *b)))
        })
    }

    pub fn connectives(&self) -> impl Iterator<Item = (Connective, &str)> {
        self.connectives
            .iter()
            .flat_map(|(kind, words)| words.iter().map(move |w| (*kind, w.as_str())))
    }

    pub fn host_patterns(&self) -> &[String] {
        &self.host_patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_parses() {
        let lex = Lexicon::builtin();
        assert!(lex.word_score("的").is_some());
        assert!(lex.is_function_word("了"));
        assert!(lex.contains("直播间"));
        assert!(lex.max_word_chars() >= 3);
        assert_eq!(lex.speech_rate_band(EmotionType::Calm), Some((90.0, 140.0)));
        assert!(lex
            .keyword_groups(EmotionType::Frustrated)
            .map(|g| !g.salient.is_empty())
            .unwrap_or(false));
    }

    #[test]
    fn test_builtin_is_shared() {
        let a = Lexicon::builtin();
        let b = Lexicon::builtin();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_degree_modifiers_longest_first() {
        let lex = Lexicon::builtin();
        let lens: Vec<usize> = lex
            .degree_modifiers()
            .iter()
            .map(|(w, _)| w.chars().count())
            .collect();
        assert!(lens.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_word_classes_and_grammar() {
        let lex = Lexicon::builtin();
        assert!(lex.word_classes("非常").contains(&WordClass::Degree));
        assert!(lex.word_classes("好看").contains(&WordClass::Sentiment));
        assert!(lex.matches_grammar("非常", "好看"));
        assert!(!lex.matches_grammar("好看", "非常"));
        assert!(lex.is_collocation("点击", "链接"));
    }

    #[test]
    fn test_emotion_hits() {
        let lex = Lexicon::builtin();
        assert_eq!(lex.emotion_hits("今天天气"), 0);
        assert!(lex.emotion_hits("太棒了,我好开心") >= 2);
    }

    #[test]
    fn test_custom_lexicon_lowercases() {
        let lex = Lexicon::from_json_str(
            r#"{ "word_scores": { "Hello": 0.7 }, "function_words": ["THE"] }"#,
        )
        .unwrap();
        assert_eq!(lex.word_score("hello"), Some(0.7));
        assert!(lex.is_function_word("the"));
        assert!(lex.keyword_groups(EmotionType::Joyful).is_none());
    }

    #[test]
    fn test_bad_tables_rejected() {
        assert!(matches!(
            Lexicon::from_json_str("[1, 2"),
            Err(ConfigError::Lexicon { .. })
        ));
        assert!(matches!(
            Lexicon::from_json_str(r#"{ "word_scores": { "x": 1.5 } }"#),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(Lexicon::from_json_str(r#"{ "speech_rate_bands": { "calm": [140.0, 90.0] } }"#)
            .is_err());
    }

    #[test]
    fn test_empty_lexicon_misses_everything() {
        let lex = Lexicon::default();
        assert!(lex.word_score("的").is_none());
        assert!(!lex.contains("的"));
        assert!(lex.word_classes("非常").is_empty());
        assert_eq!(lex.emotion_hits("开心"), 0);
    }
}
