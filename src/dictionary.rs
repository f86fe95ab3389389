/// Mutable set of legal words.
///
/// A token is *legal* when it is a real word (or pure punctuation, or an
/// accepted CJK run): legal tokens stay literal in templates, everything else
/// is a candidate for a wildcard.
use crate::miner_config::MinerConfig;
use crate::segmenter::Segmenter;
use crate::tokenizer::{is_cjk_run, is_punctuation};
use rustc_hash::FxHashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct LegalWordRules {
    wildcard: String,
    min_len: usize,
    max_len: usize,
    min_subword_len: usize,
    compound_delimiters: String,
    enable_compound: bool,
    compound_validity_check: bool,
    force_cjk_valid: bool,
}

#[derive(Debug, Clone)]
pub struct Dictionary {
    words: FxHashSet<String>,
    segmenter: Arc<Segmenter>,
    rules: LegalWordRules,
}

impl Dictionary {
    /// Seed with the segmenter vocabulary and the configured static additions,
    /// then apply the static removals.
    pub fn new(config: &MinerConfig, segmenter: Arc<Segmenter>) -> Self {
        let words = segmenter.vocabulary().map(str::to_string).collect();
        let mut dictionary = Self::with_words(config, segmenter, words);
        for word in &config.static_additions {
            dictionary.insert(word);
        }
        for word in &config.static_removals {
            dictionary.remove(word);
        }
        dictionary
    }

    /// Restore a persisted word set as-is.
    pub fn from_words<I, S>(config: &MinerConfig, segmenter: Arc<Segmenter>, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words.into_iter().map(|w| w.as_ref().to_lowercase()).collect();
        Self::with_words(config, segmenter, words)
    }

    fn with_words(config: &MinerConfig, segmenter: Arc<Segmenter>, words: FxHashSet<String>) -> Self {
        Self {
            words,
            segmenter,
            rules: LegalWordRules {
                wildcard: config.wildcard.clone(),
                min_len: config.min_word_length,
                max_len: config.max_word_length,
                min_subword_len: config.min_compound_subword_length,
                compound_delimiters: config.compound_delimiters.clone(),
                enable_compound: config.enable_compound,
                compound_validity_check: config.compound_validity_check,
                force_cjk_valid: config.force_cjk_valid,
            },
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word) || self.words.contains(&word.to_lowercase())
    }

    pub fn insert(&mut self, word: &str) -> bool {
        self.words.insert(word.to_lowercase())
    }

    pub fn remove(&mut self, word: &str) -> bool {
        self.words.remove(&word.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// All words, sorted so that persisted models are stable across saves.
    pub fn sorted_words(&self) -> Vec<String> {
        let mut words: Vec<String> = self.words.iter().cloned().collect();
        words.sort_unstable();
        words
    }

    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    pub fn is_punctuation(&self, token: &str) -> bool {
        is_punctuation(token, &self.rules.wildcard)
    }

    pub fn is_legal(&self, token: &str) -> bool {
        if !self.within_length(token) {
            return false;
        }
        self.contains(token)
            || self.is_punctuation(token)
            || (self.rules.force_cjk_valid && is_cjk_run(token))
            || (self.rules.enable_compound && self.is_compound(token))
    }

    /// Legality check used while deriving clustering keys. Applies the growth
    /// rules: an alphabetic first token of a line and any token that is only
    /// legal as a compound are learned so later lookups are direct hits.
    pub fn check_and_learn(&mut self, token: &str, position: usize) -> bool {
        if !self.within_length(token) {
            return false;
        }
        if self.contains(token) {
            return true;
        }
        if position == 0 && token.chars().all(char::is_alphabetic) {
            tracing::debug!("Learned leading keyword {:?}", token);
            self.insert(token);
            return true;
        }
        if self.is_punctuation(token) || (self.rules.force_cjk_valid && is_cjk_run(token)) {
            return true;
        }
        if self.rules.enable_compound && self.is_compound(token) {
            tracing::debug!("Learned compound word {:?}", token);
            self.insert(token);
            return true;
        }
        false
    }

    /// True unless some literal, non-punctuation token is missing from the
    /// lowercase dictionary.
    pub fn is_simplest(&self, tokens: &[String]) -> bool {
        tokens
            .iter()
            .filter(|t| **t != self.rules.wildcard && !self.is_punctuation(t))
            .all(|t| self.words.contains(&t.to_lowercase()))
    }

    fn within_length(&self, token: &str) -> bool {
        let len = token.chars().count();
        len >= self.rules.min_len && len <= self.rules.max_len
    }

    fn is_compound(&self, token: &str) -> bool {
        let mut subwords = token
            .split(|c| self.rules.compound_delimiters.contains(c))
            .filter(|chunk| !chunk.is_empty())
            .flat_map(|chunk| self.segmenter.segment(chunk))
            .peekable();

        if subwords.peek().is_none() {
            return false;
        }

        if self.rules.compound_validity_check {
            subwords.all(|w| w.chars().count() >= self.rules.min_subword_len && self.contains(&w))
        } else {
            subwords.all(|w| self.contains(&w) || self.segmenter.contains(&w))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary(config: &MinerConfig) -> Dictionary {
        Dictionary::new(config, Arc::new(Segmenter::default()))
    }

    #[test]
    fn test_basic_legality() {
        let dict = dictionary(&MinerConfig::default());
        assert!(dict.is_legal("connection"));
        assert!(dict.is_legal("Connection"));
        assert!(dict.is_legal(":"));
        assert!(dict.is_legal("登录"));
        assert!(!dict.is_legal("127"));
        assert!(!dict.is_legal("<*>"));
        assert!(!dict.is_legal("qzxv"));
    }

    #[test]
    fn test_compound_legality() {
        let config = MinerConfig::default().with_static_words(["user", "id", "request"]);
        let dict = dictionary(&config);
        assert!(dict.is_legal("user_id_request"));
        assert!(dict.is_legal("connectionclosed"));
        assert!(!dict.is_legal("user_qzxv"));

        let no_compound = dictionary(&config.clone().with_compound(false));
        assert!(!no_compound.is_legal("user_id_request"));
    }

    #[test]
    fn test_length_bounds() {
        let dict = dictionary(&MinerConfig::default().with_word_length(2, 5));
        assert!(!dict.is_legal("a"));
        assert!(!dict.is_legal("connection"));
        assert!(dict.is_legal("table"));
    }

    #[test]
    fn test_static_additions_and_removals() {
        let config = MinerConfig::default()
            .with_static_words(["GTM"])
            .without_static_words(["table"]);
        let dict = dictionary(&config);
        assert!(dict.contains("gtm"));
        assert!(!dict.contains("table"));
    }

    #[test]
    fn test_growth_rules() {
        let mut dict = dictionary(&MinerConfig::default());
        assert!(!dict.contains("pgbouncer"));
        assert!(dict.check_and_learn("pgbouncer", 0));
        assert!(dict.contains("pgbouncer"));

        assert!(!dict.check_and_learn("qzxv", 3));
        assert!(!dict.contains("qzxv"));

        assert!(dict.check_and_learn("checkpoint_request", 2));
        assert!(dict.contains("checkpoint_request"));
    }

    #[test]
    fn test_simplest() {
        let dict = dictionary(&MinerConfig::default());
        let simple: Vec<String> = ["disk", "<*>", ":", "full"].iter().map(|s| s.to_string()).collect();
        let not_simple: Vec<String> = ["disk", "sda1"].iter().map(|s| s.to_string()).collect();
        assert!(dict.is_simplest(&simple));
        assert!(!dict.is_simplest(&not_simple));
    }
}
