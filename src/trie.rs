//! Prefix tree over token sequences.
//!
//! Nodes live in an arena and refer to each other by index; every node keeps
//! its parent index so deletion can prune upwards without recursion. The
//! wildcard marker is stored as a distinguished child rather than a map key.
//!
//! [`TokenTrie::find`] is a backtracking search over every path the input can
//! take through the tree. It runs on an explicit stack of [`SearchFrame`]s and
//! ranks complete paths with [`MatchScore`].

use crate::dictionary::Dictionary;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::cmp::{Ordering, Reverse};

const ROOT: usize = 0;

#[derive(Debug, Clone, Default)]
struct TrieNode {
    parent: Option<usize>,
    key: String,
    children: FxHashMap<String, usize>,
    wildcard: Option<usize>,
    tag: Option<u64>,
}

impl TrieNode {
    fn is_leaf(&self) -> bool {
        self.children.is_empty() && self.wildcard.is_none()
    }
}

/// Search knobs taken from the miner configuration.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub prefer_more_wildcards: bool,
    pub max_continuation_steps: usize,
    pub continuation_delimiters: String,
    /// Also the "no literal hop yet" position, which no real position reaches.
    pub max_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieMatch {
    pub template_id: u64,
    pub template_tokens: Vec<String>,
    pub parameters: Vec<String>,
}

/// One pending path of the backtracking search.
#[derive(Debug, Clone)]
struct SearchFrame {
    node: usize,
    pos: usize,
    wildcard_hops: usize,
    literal_hops: usize,
    first_literal: usize,
    continuation_steps: usize,
    continuation_tokens: usize,
    /// The previous hop went through a wildcard, so it may keep absorbing.
    on_wildcard: bool,
    template_tokens: Vec<String>,
    parameters: SmallVec<[String; 4]>,
}

impl SearchFrame {
    fn literal(&self, node: usize, token: &str) -> Self {
        let mut next = self.clone();
        next.node = node;
        next.pos += 1;
        next.on_wildcard = false;
        next.literal_hops += 1;
        next.first_literal = next.first_literal.min(self.pos);
        next.template_tokens.push(token.to_string());
        next
    }

    /// Exact hop on a token that is not a legal word (punctuation or a
    /// verbatim variable value). Counts neither as literal nor wildcard.
    fn exact(&self, node: usize, token: &str) -> Self {
        let mut next = self.clone();
        next.node = node;
        next.pos += 1;
        next.on_wildcard = false;
        next.template_tokens.push(token.to_string());
        next
    }

    fn wildcard(&self, node: usize, token: &str, wildcard: &str) -> Self {
        let mut next = self.clone();
        next.node = node;
        next.pos += 1;
        next.on_wildcard = true;
        next.wildcard_hops += 1;
        next.template_tokens.push(wildcard.to_string());
        next.parameters.push(token.to_string());
        next
    }

    /// Let the active wildcard swallow `absorbed` more tokens.
    fn continuation(&self, absorbed: &[String], joiner: &str) -> Self {
        let mut next = self.clone();
        next.pos += absorbed.len();
        next.continuation_steps += 1;
        next.continuation_tokens += absorbed.len();
        if let Some(last) = next.parameters.last_mut() {
            for token in absorbed {
                last.push_str(joiner);
                last.push_str(token);
            }
        }
        next
    }
}

/// Ranking of a complete path; the greatest score wins.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct MatchScore {
    earliest_literal: Reverse<usize>,
    primary: i64,
    secondary: i64,
    continuation_tokens: Reverse<usize>,
    older_template: Reverse<u64>,
}

impl MatchScore {
    fn new(frame: &SearchFrame, template_id: u64, prefer_more_wildcards: bool) -> Self {
        let wildcards = frame.wildcard_hops as i64;
        let literals = frame.literal_hops as i64;
        let (primary, secondary) = if prefer_more_wildcards {
            (wildcards, literals)
        } else {
            (literals, -wildcards)
        };
        Self {
            earliest_literal: Reverse(frame.first_literal),
            primary,
            secondary,
            continuation_tokens: Reverse(frame.continuation_tokens),
            older_template: Reverse(template_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenTrie {
    nodes: Vec<TrieNode>,
    free: Vec<usize>,
    wildcard: String,
}

impl TokenTrie {
    pub fn new(wildcard: &str) -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            free: Vec::new(),
            wildcard: wildcard.to_string(),
        }
    }

    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[ROOT] = TrieNode::default();
        self.free.clear();
    }

    /// Live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Freed slots are reset, so only live nodes carry tags.
    pub fn template_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.tag.is_some()).count()
    }

    fn child(&self, node: usize, token: &str) -> Option<usize> {
        if token == self.wildcard {
            self.nodes[node].wildcard
        } else {
            self.nodes[node].children.get(token).copied()
        }
    }

    fn alloc(&mut self, parent: usize, key: &str) -> usize {
        let node = TrieNode {
            parent: Some(parent),
            key: key.to_string(),
            ..Default::default()
        };
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn walk(&self, tokens: &[String]) -> Option<usize> {
        tokens
            .iter()
            .try_fold(ROOT, |node, token| self.child(node, token))
    }

    pub fn tag_at(&self, tokens: &[String]) -> Option<u64> {
        self.walk(tokens).and_then(|node| self.nodes[node].tag)
    }

    /// Tag the path spelled by `tokens`, returning the tag it replaced.
    pub fn insert(&mut self, tokens: &[String], template_id: u64) -> Option<u64> {
        let mut node = ROOT;
        for token in tokens {
            node = match self.child(node, token) {
                Some(next) => next,
                None => {
                    let next = self.alloc(node, token);
                    if *token == self.wildcard {
                        self.nodes[node].wildcard = Some(next);
                    } else {
                        self.nodes[node].children.insert(token.clone(), next);
                    }
                    next
                }
            };
        }
        self.nodes[node].tag.replace(template_id)
    }

    /// Untag the path and prune every ancestor left untagged and childless.
    pub fn delete(&mut self, tokens: &[String]) -> Option<u64> {
        let mut node = self.walk(tokens)?;
        let removed = self.nodes[node].tag.take();

        while node != ROOT && self.nodes[node].tag.is_none() && self.nodes[node].is_leaf() {
            let Some(parent) = self.nodes[node].parent else {
                break;
            };
            let key = std::mem::take(&mut self.nodes[node].key);
            if key == self.wildcard {
                self.nodes[parent].wildcard = None;
            } else {
                self.nodes[parent].children.remove(&key);
            }
            self.nodes[node] = TrieNode::default();
            self.free.push(node);
            node = parent;
        }

        removed
    }

    /// Resolve `tokens` to the best-scoring tagged path.
    ///
    /// Paths whose only hops are wildcards are rejected when the input itself
    /// carries a legal word: such a line has content no stored template shares.
    pub fn find(
        &self,
        tokens: &[String],
        dictionary: &Dictionary,
        options: &SearchOptions,
    ) -> Option<TrieMatch> {
        let absorb_words = options.continuation_delimiters.chars().any(char::is_whitespace);
        let joiner = if absorb_words { " " } else { "" };

        let mut best: Option<(MatchScore, SearchFrame, u64)> = None;
        let mut stack = vec![SearchFrame {
            node: ROOT,
            pos: 0,
            wildcard_hops: 0,
            literal_hops: 0,
            first_literal: options.max_tokens,
            continuation_steps: 0,
            continuation_tokens: 0,
            on_wildcard: false,
            template_tokens: Vec::with_capacity(tokens.len()),
            parameters: SmallVec::new(),
        }];

        while let Some(frame) = stack.pop() {
            if frame.pos == tokens.len() {
                if let Some(template_id) = self.nodes[frame.node].tag {
                    let score = MatchScore::new(&frame, template_id, options.prefer_more_wildcards);
                    let better = best
                        .as_ref()
                        .map_or(true, |(current, _, _)| score.cmp(current) == Ordering::Greater);
                    if better {
                        best = Some((score, frame, template_id));
                    }
                }
                continue;
            }

            let token = &tokens[frame.pos];
            let node = &self.nodes[frame.node];
            let can_continue =
                frame.on_wildcard && frame.continuation_steps < options.max_continuation_steps;

            if *token == self.wildcard {
                if let Some(next) = node.wildcard {
                    stack.push(frame.wildcard(next, token, &self.wildcard));
                }
            } else if dictionary.is_punctuation(token) {
                if let Some(&next) = node.children.get(token) {
                    stack.push(frame.exact(next, token));
                }
                if can_continue && token.chars().all(|c| options.continuation_delimiters.contains(c)) {
                    // The delimiter and the word it introduces count as one step.
                    let end = match tokens.get(frame.pos + 1) {
                        Some(word) if !dictionary.is_punctuation(word) && *word != self.wildcard => {
                            frame.pos + 2
                        }
                        _ => frame.pos + 1,
                    };
                    stack.push(frame.continuation(&tokens[frame.pos..end], ""));
                }
            } else {
                if let Some(&next) = node.children.get(token) {
                    if dictionary.is_legal(token) {
                        stack.push(frame.literal(next, token));
                    } else {
                        stack.push(frame.exact(next, token));
                    }
                }
                if let Some(next) = node.wildcard {
                    stack.push(frame.wildcard(next, token, &self.wildcard));
                }
                if can_continue && absorb_words {
                    stack.push(frame.continuation(std::slice::from_ref(token), joiner));
                }
            }
        }

        let (_, frame, template_id) = best?;
        if frame.literal_hops == 0 && self.has_legal_word(tokens, dictionary) {
            tracing::debug!(
                "Rejected all-wildcard match of template {} for a line with content words",
                template_id
            );
            return None;
        }

        Some(TrieMatch {
            template_id,
            template_tokens: frame.template_tokens,
            parameters: frame.parameters.into_vec(),
        })
    }

    fn has_legal_word(&self, tokens: &[String], dictionary: &Dictionary) -> bool {
        tokens.iter().any(|t| {
            *t != self.wildcard && !dictionary.is_punctuation(t) && dictionary.is_legal(t)
        })
    }
}
