/// Noise pre-processing and delimiter-based tokenization of log content.
///
/// Both operations are pure: the same input always yields the same tokens,
/// whatever state the owning miner is in.
use crate::miner_config::MinerConfig;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use smallvec::SmallVec;

static CJK_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{Han}\p{Hiragana}\p{Katakana}\p{Hangul}]+").expect("static CJK pattern")
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static whitespace pattern"));

#[derive(Debug, Clone)]
pub struct Tokenizer {
    wildcard: String,
    delimiters: String,
    strip_chars: String,
    case_sensitive: bool,
    max_tokens: usize,
    masks: Vec<Regex>,
}

impl Tokenizer {
    pub fn new(config: &MinerConfig) -> Self {
        let masks = config
            .mask_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::warn!("Skipping invalid mask pattern {:?}: {}", pattern, e);
                    None
                }
            })
            .collect();

        Self {
            wildcard: config.wildcard.clone(),
            delimiters: config.delimiters.clone(),
            strip_chars: config.strip_chars.clone(),
            case_sensitive: config.case_sensitive,
            max_tokens: config.token_limit(),
            masks,
        }
    }

    /// Mask noise, isolate CJK runs, collapse whitespace and optionally case-fold.
    pub fn preprocess_line(&self, line: &str) -> String {
        let mut text = line.to_string();
        for mask in &self.masks {
            text = mask.replace_all(&text, self.wildcard.as_str()).into_owned();
        }
        let text = CJK_RUN.replace_all(&text, " $0 ");
        let text = WHITESPACE.replace_all(&text, " ");
        let text = text.trim();

        if self.case_sensitive {
            return text.to_string();
        }
        if self.wildcard.is_empty() {
            return text.to_lowercase();
        }
        // Fold everything except the wildcard markers the masks inserted.
        text.split(self.wildcard.as_str())
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(&self.wildcard)
    }

    pub fn preprocess<S: AsRef<str> + Sync>(&self, lines: &[S]) -> Vec<String> {
        lines
            .par_iter()
            .map(|line| self.preprocess_line(line.as_ref()))
            .collect()
    }

    /// Split a preprocessed line into tokens.
    ///
    /// Whitespace separates tokens without being emitted. Runs of the other
    /// delimiter characters and stripped word-edge punctuation become tokens of
    /// their own. When the configured token limit is about to be reached the
    /// rest of the line becomes one final token.
    pub fn tokenize(&self, line: &str) -> Vec<String> {
        let mut tokens: Vec<String> = Vec::new();
        let mut i = 0;

        while i < line.len() {
            let rest = &line[i..];
            let c = match rest.chars().next() {
                Some(c) => c,
                None => break,
            };

            if c.is_whitespace() {
                i += c.len_utf8();
                continue;
            }

            let (end, pieces): (usize, SmallVec<[&str; 3]>) = if self.starts_with_wildcard(rest) {
                (i + self.wildcard.len(), SmallVec::from_slice(&[self.wildcard.as_str()]))
            } else if self.is_delimiter(c) {
                let len = self.span(rest, |t, ch| t.is_delimiter(ch) && !ch.is_whitespace());
                (i + len, SmallVec::from_slice(&[&rest[..len]]))
            } else {
                let len = self.span(rest, |t, ch| !t.is_delimiter(ch) && !ch.is_whitespace());
                (i + len, self.strip_edges(&rest[..len]))
            };

            let budget = self.max_tokens.saturating_sub(tokens.len());
            if pieces.len() > budget
                || (pieces.len() == budget && !line[end..].trim().is_empty())
            {
                // The last slot takes everything from here on.
                let keep = budget.saturating_sub(1);
                let offset: usize = pieces[..keep].iter().map(|p| p.len()).sum();
                tokens.extend(pieces[..keep].iter().map(|p| p.to_string()));
                let tail = rest[offset..].trim();
                if !tail.is_empty() {
                    tokens.push(tail.to_string());
                }
                break;
            }

            tokens.extend(pieces.iter().map(|p| p.to_string()));
            i = end;
        }

        tokens
    }

    pub fn tokenize_all<S: AsRef<str> + Sync>(&self, lines: &[S]) -> Vec<Vec<String>> {
        lines
            .par_iter()
            .map(|line| self.tokenize(&self.preprocess_line(line.as_ref())))
            .collect()
    }

    fn starts_with_wildcard(&self, text: &str) -> bool {
        !self.wildcard.is_empty() && text.starts_with(&self.wildcard)
    }

    fn is_delimiter(&self, c: char) -> bool {
        self.delimiters.contains(c)
    }

    /// Byte length of the longest prefix of `text` whose chars satisfy `keep`,
    /// stopping early at a wildcard marker.
    fn span(&self, text: &str, keep: impl Fn(&Self, char) -> bool) -> usize {
        let mut len = 0;
        for (idx, ch) in text.char_indices() {
            if idx > 0 && self.starts_with_wildcard(&text[idx..]) {
                break;
            }
            if !keep(self, ch) {
                break;
            }
            len = idx + ch.len_utf8();
        }
        len.max(text.chars().next().map_or(0, char::len_utf8))
    }

    fn strip_edges<'a>(&self, word: &'a str) -> SmallVec<[&'a str; 3]> {
        let core = word.trim_matches(|c| self.strip_chars.contains(c));
        if core.is_empty() {
            return SmallVec::from_slice(&[word]);
        }

        let start = word.len() - word.trim_start_matches(|c| self.strip_chars.contains(c)).len();
        let end = start + core.len();

        let mut pieces = SmallVec::new();
        if start > 0 {
            pieces.push(&word[..start]);
        }
        pieces.push(core);
        if end < word.len() {
            pieces.push(&word[end..]);
        }
        pieces
    }
}

/// A token made only of symbols. The wildcard marker is never punctuation.
pub fn is_punctuation(token: &str, wildcard: &str) -> bool {
    !token.is_empty()
        && token != wildcard
        && token.chars().all(|c| !c.is_alphanumeric() && !c.is_whitespace())
}

pub fn is_cjk_run(token: &str) -> bool {
    CJK_RUN
        .find(token)
        .map_or(false, |m| m.start() == 0 && m.end() == token.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer() -> Tokenizer {
        Tokenizer::new(&MinerConfig::default())
    }

    #[test]
    fn test_tokenize_basic() {
        let t = tokenizer();
        assert_eq!(
            t.tokenize("connection closed by 127.0.0.1"),
            vec!["connection", "closed", "by", "127.0.0.1"]
        );
    }

    #[test]
    fn test_delimiters_and_edges() {
        let t = tokenizer();
        assert_eq!(
            t.tokenize("checkpoint done: lsn=42, took 3ms."),
            vec!["checkpoint", "done", ":", "lsn", "=", "42", ",", "took", "3ms", "."]
        );
    }

    #[test]
    fn test_wildcard_spans_untouched() {
        let t = tokenizer();
        assert_eq!(t.tokenize("user <*> logged in"), vec!["user", "<*>", "logged", "in"]);
        assert_eq!(t.tokenize("id:<*>"), vec!["id", ":", "<*>"]);
    }

    #[test]
    fn test_empty_line() {
        let t = tokenizer();
        assert!(t.tokenize("").is_empty());
        assert!(t.tokenize("   ").is_empty());
    }

    #[test]
    fn test_max_tokens_tail() {
        let t = Tokenizer::new(&MinerConfig::default().with_max_tokens(3));
        assert_eq!(t.tokenize("a b c d e"), vec!["a", "b", "c d e"]);
    }

    #[test]
    fn test_max_tokens_exact_fit() {
        let t = Tokenizer::new(&MinerConfig::default().with_max_tokens(3));
        assert_eq!(t.tokenize("a b c"), vec!["a", "b", "c"]);
        assert_eq!(t.tokenize("a b."), vec!["a", "b", "."]);
        assert_eq!(t.tokenize("a b. c"), vec!["a", "b", ". c"]);
    }

    #[test]
    fn test_preprocess() {
        let config = MinerConfig::default().with_mask_pattern(r"\d+\.\d+\.\d+\.\d+");
        let t = Tokenizer::new(&config);
        assert_eq!(
            t.preprocess_line("  Connection   FROM 10.0.0.1  "),
            "connection from <*>"
        );
        assert_eq!(t.preprocess_line("登录失败 user"), "登录失败 user");
        assert_eq!(t.preprocess_line("x登录y"), "x 登录 y");
    }

    #[test]
    fn test_uppercase_wildcard_survives_case_folding() {
        let config = MinerConfig::default()
            .with_wildcard("<VAR>")
            .with_mask_pattern(r"\d+");
        let t = Tokenizer::new(&config);
        assert_eq!(t.preprocess_line("Disk 12 FULL"), "disk <VAR> full");
        assert_eq!(
            t.tokenize(&t.preprocess_line("disk 12 full")),
            vec!["disk", "<VAR>", "full"]
        );
    }

    #[test]
    fn test_invalid_mask_skipped() {
        let t = Tokenizer::new(&MinerConfig::default().with_mask_pattern("(unclosed"));
        assert_eq!(t.preprocess_line("a (unclosed b"), "a (unclosed b");
    }

    #[test]
    fn test_deterministic() {
        let t = tokenizer();
        let line = "ERROR: could not open file \"base/16384\": No such file";
        let first = t.tokenize(&t.preprocess_line(line));
        let second = t.tokenize(&t.preprocess_line(line));
        assert_eq!(first, second);
    }

    #[test]
    fn test_punctuation() {
        assert!(is_punctuation(":", "<*>"));
        assert!(is_punctuation("...", "<*>"));
        assert!(!is_punctuation("<*>", "<*>"));
        assert!(!is_punctuation("a:", "<*>"));
        assert!(is_cjk_run("登录失败"));
        assert!(!is_cjk_run("登录x"));
    }
}
