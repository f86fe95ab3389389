/// Dynamic-programming compound word segmenter.
///
/// Every vocabulary word at rank `r` (0 = most frequent) costs
/// `ln((r + 1) * ln(N))` for a vocabulary of `N` words; a segmentation is the
/// split of a token with the lowest total cost.
use crate::words::DEFAULT_WORDS;
use anyhow::{Context, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs;
use std::path::Path;

/// Cost of a piece that is not in the vocabulary, plus a per-char charge.
/// One unknown piece is always cheaper than several, and peeling a known word
/// off the edge of an unknown piece is cheaper than leaving it attached.
const UNKNOWN_WORD_COST: f64 = 1.0e6;
const UNKNOWN_CHAR_COST: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct Segmenter {
    costs: FxHashMap<String, f64>,
    max_word_len: usize,
}

impl Segmenter {
    /// Build from words ordered most frequent first. Later duplicates keep
    /// their first (cheaper) rank.
    pub fn from_ranked_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ranked: Vec<String> = Vec::new();
        let mut seen = FxHashSet::default();
        for word in words {
            let word = word.as_ref().trim().to_lowercase();
            if word.is_empty() || !seen.insert(word.clone()) {
                continue;
            }
            ranked.push(word);
        }

        let log_n = (ranked.len().max(3) as f64).ln();
        let mut max_word_len = 0;
        let costs = ranked
            .into_iter()
            .enumerate()
            .map(|(rank, word)| {
                max_word_len = max_word_len.max(word.chars().count());
                let cost = ((rank as f64 + 1.0) * log_n).ln();
                (word, cost)
            })
            .collect();

        Self {
            costs,
            max_word_len,
        }
    }

    /// Load a one-word-per-line list, most frequent first.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read word list: {}", path.display()))?;
        Ok(Self::from_ranked_words(content.lines()))
    }

    pub fn contains(&self, word: &str) -> bool {
        self.costs.contains_key(word)
    }

    pub fn vocabulary(&self) -> impl Iterator<Item = &str> {
        self.costs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    /// Split `token` into its most probable sequence of words.
    pub fn segment(&self, token: &str) -> Vec<String> {
        token
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|chunk| !chunk.is_empty())
            .flat_map(|chunk| self.segment_chunk(chunk))
            .collect()
    }

    fn word_cost(&self, piece: &str, len: usize) -> f64 {
        match self.costs.get(piece) {
            Some(&cost) => cost,
            None => UNKNOWN_WORD_COST + UNKNOWN_CHAR_COST * len as f64,
        }
    }

    fn segment_chunk(&self, chunk: &str) -> Vec<String> {
        let chars: Vec<char> = chunk.chars().collect();
        let n = chars.len();
        let window = self.max_word_len.max(1);

        // best[i] = (cost of chars[..i], length of the last word)
        let mut best: Vec<(f64, usize)> = Vec::with_capacity(n + 1);
        best.push((0.0, 0));
        let mut piece = String::new();
        for i in 1..=n {
            let mut candidate = (f64::INFINITY, 1);
            // Unknown pieces may be arbitrarily long, known ones never exceed
            // the longest vocabulary word.
            for k in 1..=i {
                let cost = if k > window {
                    best[i - k].0 + UNKNOWN_WORD_COST + UNKNOWN_CHAR_COST * k as f64
                } else {
                    piece.clear();
                    piece.extend(&chars[i - k..i]);
                    best[i - k].0 + self.word_cost(&piece, k)
                };
                if cost < candidate.0 {
                    candidate = (cost, k);
                }
            }
            best.push(candidate);
        }

        let mut out: Vec<String> = Vec::new();
        let mut i = n;
        while i > 0 {
            let k = best[i].1;
            let piece: String = chars[i - k..i].iter().collect();
            let mut new_token = true;
            if piece != "'" {
                if let Some(last) = out.last_mut() {
                    let split_possessive = last == "'s";
                    let split_digits = chars[i - 1].is_ascii_digit()
                        && last.chars().next().map_or(false, |c| c.is_ascii_digit());
                    if split_possessive || split_digits {
                        last.insert_str(0, &piece);
                        new_token = false;
                    }
                }
            }
            if new_token {
                out.push(piece);
            }
            i -= k;
        }

        out.reverse();
        out
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::from_ranked_words(DEFAULT_WORDS.split_whitespace())
    }
}
