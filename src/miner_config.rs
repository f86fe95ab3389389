use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Per-instance settings of a [`TemplateMiner`](crate::template_miner::TemplateMiner).
///
/// Every field has a default so that model files written by older builds
/// (or hand-edited ones with missing keys) still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    pub wildcard: String,
    pub delimiters: String,
    pub strip_chars: String,
    pub compound_delimiters: String,
    pub min_word_length: usize,
    pub max_word_length: usize,
    pub min_compound_subword_length: usize,
    pub enable_compound: bool,
    pub compound_validity_check: bool,
    pub case_sensitive: bool,
    pub prefer_more_wildcards: bool,
    pub max_continuation_steps: usize,
    pub continuation_delimiters: String,
    pub force_cjk_valid: bool,
    pub extract_parameters: bool,
    pub max_tokens: usize,
    pub mask_patterns: Vec<String>,
    pub static_additions: Vec<String>,
    pub static_removals: Vec<String>,
    pub word_list_path: Option<PathBuf>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            wildcard: "<*>".to_string(),
            delimiters: " \t,;:=()[]{}|\"'".to_string(),
            strip_chars: ".!?".to_string(),
            compound_delimiters: "_-.".to_string(),
            min_word_length: 1,
            max_word_length: 30,
            min_compound_subword_length: 2,
            enable_compound: true,
            compound_validity_check: true,
            case_sensitive: false,
            prefer_more_wildcards: false,
            max_continuation_steps: 0,
            continuation_delimiters: " ,".to_string(),
            force_cjk_valid: true,
            extract_parameters: true,
            max_tokens: 500,
            mask_patterns: Vec::new(),
            static_additions: Vec::new(),
            static_removals: Vec::new(),
            word_list_path: None,
        }
    }
}

impl MinerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for database server logs: masks addresses, hex values and
    /// timestamps before tokenizing so they never reach the dictionary.
    pub fn database_logs() -> Self {
        Self {
            mask_patterns: vec![
                r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}(:\d+)?\b".to_string(),
                r"\b0x[0-9a-fA-F]+\b".to_string(),
                r"\b\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(\.\d+)?\b".to_string(),
            ],
            max_continuation_steps: 2,
            ..Default::default()
        }
    }

    pub fn with_wildcard(mut self, wildcard: &str) -> Self {
        self.wildcard = wildcard.to_string();
        self
    }

    pub fn with_delimiters(mut self, delimiters: &str) -> Self {
        self.delimiters = delimiters.to_string();
        self
    }

    pub fn with_word_length(mut self, min: usize, max: usize) -> Self {
        self.min_word_length = min.max(1);
        self.max_word_length = max.max(self.min_word_length);
        self
    }

    pub fn with_compound(mut self, enabled: bool) -> Self {
        self.enable_compound = enabled;
        self
    }

    pub fn with_case_sensitive(mut self, enabled: bool) -> Self {
        self.case_sensitive = enabled;
        self
    }

    pub fn with_prefer_more_wildcards(mut self, enabled: bool) -> Self {
        self.prefer_more_wildcards = enabled;
        self
    }

    pub fn with_continuation(mut self, steps: usize, delimiters: &str) -> Self {
        self.max_continuation_steps = steps;
        self.continuation_delimiters = delimiters.to_string();
        self
    }

    pub fn with_parameter_extraction(mut self, enabled: bool) -> Self {
        self.extract_parameters = enabled;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_mask_pattern(mut self, pattern: &str) -> Self {
        self.mask_patterns.push(pattern.to_string());
        self
    }

    pub fn with_static_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.static_additions.extend(words.into_iter().map(Into::into));
        self
    }

    pub fn without_static_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.static_removals.extend(words.into_iter().map(Into::into));
        self
    }

    pub fn with_word_list(mut self, path: impl Into<PathBuf>) -> Self {
        self.word_list_path = Some(path.into());
        self
    }

    /// Largest token count a line can produce; `0` in the config means unbounded.
    pub(crate) fn token_limit(&self) -> usize {
        if self.max_tokens == 0 {
            usize::MAX
        } else {
            self.max_tokens
        }
    }
}
