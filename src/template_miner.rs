//! Online log template miner.
//!
//! Lines are clustered by their *dwords* vector (token count followed by each
//! token, or the wildcard marker where the token is not a legal word). Each
//! cluster becomes a template; templates are indexed in a [`TokenTrie`] that
//! resolves new lines online.
//!
//! Only the dictionary, configuration, id counter, template table and the
//! template -> dwords inverse table are persisted. The trie and the
//! dwords -> template index are rebuilt on load.

use crate::dictionary::Dictionary;
use crate::miner_config::MinerConfig;
use crate::segmenter::Segmenter;
use crate::tokenizer::Tokenizer;
use crate::trie::{SearchOptions, TokenTrie, TrieMatch};
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Clustering key: `[token_count, t1', t2', ...]`.
pub type DWords = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub tokens: Vec<String>,
    pub count: u64,
    /// Every literal is already a dictionary word, so merging cannot
    /// generalize it any further.
    pub simplest: bool,
}

impl Template {
    pub fn text(&self) -> String {
        self.tokens.join(" ")
    }
}

/// Per-line result of [`TemplateMiner::predict`] and [`TemplateMiner::update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub template_id: u64,
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<String>>,
    pub count: u64,
    /// The line matched nothing; `template_id` is transient and not stored.
    #[serde(default)]
    pub novel: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedModel {
    dictionary: Vec<String>,
    config: MinerConfig,
    next_template_id: u64,
    inverse_table: BTreeMap<u64, Vec<DWords>>,
    templates: BTreeMap<u64, Template>,
}

struct Cluster {
    dwords: DWords,
    members: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct TemplateMiner {
    config: MinerConfig,
    tokenizer: Tokenizer,
    dictionary: Dictionary,
    trie: TokenTrie,
    templates: BTreeMap<u64, Template>,
    dwords_index: FxHashMap<DWords, u64>,
    inverse: BTreeMap<u64, Vec<DWords>>,
    next_id: u64,
}

fn load_segmenter(config: &MinerConfig) -> Segmenter {
    match &config.word_list_path {
        Some(path) => Segmenter::from_file(path).unwrap_or_else(|e| {
            warn!("{:#}; using the built-in word list", e);
            Segmenter::default()
        }),
        None => Segmenter::default(),
    }
}

impl TemplateMiner {
    pub fn new(config: MinerConfig) -> Self {
        let segmenter = Arc::new(load_segmenter(&config));
        let dictionary = Dictionary::new(&config, segmenter);
        Self::with_parts(config, dictionary)
    }

    fn with_parts(config: MinerConfig, dictionary: Dictionary) -> Self {
        Self {
            tokenizer: Tokenizer::new(&config),
            trie: TokenTrie::new(&config.wildcard),
            dictionary,
            config,
            templates: BTreeMap::new(),
            dwords_index: FxHashMap::default(),
            inverse: BTreeMap::new(),
            next_id: 1, // Start from 1
        }
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn template(&self, template_id: u64) -> Option<&Template> {
        self.templates.get(&template_id)
    }

    pub fn templates(&self) -> impl Iterator<Item = (u64, &Template)> {
        self.templates.iter().map(|(id, t)| (*id, t))
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Dwords vectors folded into a template.
    pub fn members(&self, template_id: u64) -> &[DWords] {
        self.inverse.get(&template_id).map_or(&[], Vec::as_slice)
    }

    pub fn next_template_id(&self) -> u64 {
        self.next_id
    }

    /// Preprocess and tokenize one content string.
    pub fn line_tokens(&self, line: &str) -> Vec<String> {
        self.tokenizer.tokenize(&self.tokenizer.preprocess_line(line))
    }

    fn search_options(&self) -> SearchOptions {
        SearchOptions {
            prefer_more_wildcards: self.config.prefer_more_wildcards,
            max_continuation_steps: self.config.max_continuation_steps,
            continuation_delimiters: self.config.continuation_delimiters.clone(),
            max_tokens: self.config.token_limit(),
        }
    }

    /// Batch training. Rebuilds the template table and trie from `lines`; the
    /// dictionary keeps everything it has learned.
    pub fn train<S: AsRef<str> + Sync>(&mut self, lines: &[S]) {
        self.templates.clear();
        self.dwords_index.clear();
        self.inverse.clear();
        self.trie.clear();

        let token_lists = self.tokenizer.tokenize_all(lines);
        let clusters = self.cluster(&token_lists);
        let cluster_count = clusters.len();

        for cluster in clusters {
            let mut tokens = self.fold_members(&cluster, &token_lists);
            for (token, key) in tokens.iter_mut().zip(cluster.dwords.iter().skip(1)) {
                if *key == self.config.wildcard {
                    *token = self.config.wildcard.clone();
                }
            }
            let count = cluster.members.len() as u64;
            self.mint(tokens, count, cluster.dwords);
        }

        self.rebuild_trie();
        info!(
            "Trained {} templates from {} lines ({} clusters)",
            self.templates.len(),
            lines.len(),
            cluster_count
        );
    }

    /// Resolve lines against the current templates without learning anything.
    ///
    /// Unmatched lines get a novel record holding their verbatim tokens and an
    /// id past the id counter, shared by identical novel lines in the batch.
    pub fn predict<S: AsRef<str> + Sync>(&mut self, lines: &[S]) -> Vec<TemplateRecord> {
        let token_lists = self.tokenizer.tokenize_all(lines);
        let mut novel_ids: FxHashMap<String, u64> = FxHashMap::default();
        let mut records = Vec::with_capacity(token_lists.len());

        for tokens in &token_lists {
            match self.find(tokens) {
                Some(found) => records.push(self.record(&found)),
                None => {
                    let text = tokens.join(" ");
                    let next = self.next_id + novel_ids.len() as u64;
                    let template_id = *novel_ids.entry(text.clone()).or_insert(next);
                    records.push(TemplateRecord {
                        template_id,
                        template: text,
                        parameters: None,
                        count: 0,
                        novel: true,
                    });
                }
            }
        }

        let mut novel_counts: FxHashMap<u64, u64> = FxHashMap::default();
        for record in records.iter().filter(|r| r.novel) {
            *novel_counts.entry(record.template_id).or_insert(0) += 1;
        }
        for record in records.iter_mut().filter(|r| r.novel) {
            record.count = novel_counts.get(&record.template_id).copied().unwrap_or(1);
        }

        records
    }

    /// Learn from a batch and return one record per line.
    pub fn update<S: AsRef<str> + Sync>(&mut self, lines: &[S]) -> Vec<TemplateRecord> {
        let token_lists = self.tokenizer.tokenize_all(lines);
        let clusters = self.cluster(&token_lists);

        let mut line_cluster = vec![0; token_lists.len()];
        for (idx, cluster) in clusters.iter().enumerate() {
            match self.dwords_index.get(&cluster.dwords).copied() {
                Some(template_id) if self.templates.contains_key(&template_id) => {
                    self.absorb_known(template_id, cluster, &token_lists);
                }
                _ => {
                    self.absorb_unknown(cluster, &token_lists);
                }
            }
            for &member in &cluster.members {
                line_cluster[member] = idx;
            }
        }

        let mut records = Vec::with_capacity(token_lists.len());
        for (tokens, idx) in token_lists.iter().zip(line_cluster) {
            let record = match self.find(tokens) {
                Some(found) => self.record(&found),
                None => {
                    // Lines rejected by the trie still belong to their cluster.
                    let template_id = self.dwords_index.get(&clusters[idx].dwords).copied();
                    match template_id.and_then(|id| self.templates.get(&id).map(|t| (id, t))) {
                        Some((template_id, template)) => TemplateRecord {
                            template_id,
                            template: template.text(),
                            parameters: None,
                            count: template.count,
                            novel: false,
                        },
                        None => TemplateRecord {
                            template_id: self.next_id,
                            template: tokens.join(" "),
                            parameters: None,
                            count: 1,
                            novel: true,
                        },
                    }
                }
            };
            records.push(record);
        }

        records
    }

    /// Trie lookup that repairs stale tags: a tag naming a template without
    /// registry backing is removed and the search repeated.
    pub fn find(&mut self, tokens: &[String]) -> Option<TrieMatch> {
        let options = self.search_options();
        loop {
            let found = self.trie.find(tokens, &self.dictionary, &options)?;
            if self.is_registered(found.template_id) {
                return Some(found);
            }
            warn!("Removing stale trie tag for template {}", found.template_id);
            self.trie.delete(&found.template_tokens);
        }
    }

    fn is_registered(&self, template_id: u64) -> bool {
        self.templates.contains_key(&template_id)
            && self.inverse.get(&template_id).map_or(false, |keys| !keys.is_empty())
    }

    fn record(&self, found: &TrieMatch) -> TemplateRecord {
        let (template, count) = match self.templates.get(&found.template_id) {
            Some(t) => (t.text(), t.count),
            None => (found.template_tokens.join(" "), 0),
        };
        TemplateRecord {
            template_id: found.template_id,
            template,
            parameters: self
                .config
                .extract_parameters
                .then(|| found.parameters.clone()),
            count,
            novel: false,
        }
    }

    fn derive_dwords(&mut self, tokens: &[String]) -> DWords {
        let mut dwords = Vec::with_capacity(tokens.len() + 1);
        dwords.push(tokens.len().to_string());
        for (pos, token) in tokens.iter().enumerate() {
            if *token != self.config.wildcard && self.dictionary.check_and_learn(token, pos) {
                dwords.push(token.clone());
            } else {
                dwords.push(self.config.wildcard.clone());
            }
        }
        dwords
    }

    /// Group lines sharing a dwords vector, in order of first appearance.
    fn cluster(&mut self, token_lists: &[Vec<String>]) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = Vec::new();
        let mut slots: FxHashMap<DWords, usize> = FxHashMap::default();

        for (idx, tokens) in token_lists.iter().enumerate() {
            let dwords = self.derive_dwords(tokens);
            match slots.get(&dwords) {
                Some(&slot) => clusters[slot].members.push(idx),
                None => {
                    slots.insert(dwords.clone(), clusters.len());
                    clusters.push(Cluster {
                        dwords,
                        members: vec![idx],
                    });
                }
            }
        }

        clusters
    }

    /// Position-wise merge: equal tokens stay, differing ones become wildcards.
    /// Sequences of different length cannot be merged.
    fn generalize(&self, template: &[String], tokens: &[String]) -> Option<Vec<String>> {
        if template.len() != tokens.len() {
            return None;
        }
        Some(
            template
                .iter()
                .zip(tokens)
                .map(|(a, b)| {
                    if a == b {
                        a.clone()
                    } else {
                        self.config.wildcard.clone()
                    }
                })
                .collect(),
        )
    }

    fn fold_members(&self, cluster: &Cluster, token_lists: &[Vec<String>]) -> Vec<String> {
        let mut members = cluster.members.iter().map(|&m| &token_lists[m]);
        let mut tokens = members.next().cloned().unwrap_or_default();
        for member in members {
            if let Some(merged) = self.generalize(&tokens, member) {
                tokens = merged;
            }
        }
        tokens
    }

    fn mint(&mut self, tokens: Vec<String>, count: u64, dwords: DWords) -> u64 {
        let template_id = self.next_id;
        self.next_id += 1;

        let simplest = self.dictionary.is_simplest(&tokens);
        debug!("Minted template {}: {}", template_id, tokens.join(" "));
        self.templates.insert(
            template_id,
            Template {
                tokens,
                count,
                simplest,
            },
        );
        self.inverse.insert(template_id, vec![dwords.clone()]);
        self.dwords_index.insert(dwords, template_id);
        template_id
    }

    fn absorb_known(&mut self, template_id: u64, cluster: &Cluster, token_lists: &[Vec<String>]) -> u64 {
        let Some(template) = self.templates.get_mut(&template_id) else {
            return template_id;
        };
        template.count += cluster.members.len() as u64;
        if template.simplest {
            return template_id;
        }

        let current = template.tokens.clone();
        let mut tokens = current.clone();
        for &member in &cluster.members {
            if let Some(merged) = self.generalize(&tokens, &token_lists[member]) {
                tokens = merged;
            }
        }
        if tokens == current {
            return template_id;
        }

        debug!(
            "Generalized template {}: {} -> {}",
            template_id,
            current.join(" "),
            tokens.join(" ")
        );
        if self.trie.tag_at(&current) == Some(template_id) {
            self.trie.delete(&current);
        }
        let simplest = self.dictionary.is_simplest(&tokens);
        if let Some(template) = self.templates.get_mut(&template_id) {
            template.tokens = tokens;
            template.simplest = simplest;
        }
        self.settle(template_id)
    }

    fn absorb_unknown(&mut self, cluster: &Cluster, token_lists: &[Vec<String>]) -> u64 {
        let count = cluster.members.len() as u64;
        let Some(&first) = cluster.members.first() else {
            return self.next_id;
        };

        // The trie may already know a broader shape than clustering did.
        if let Some(found) = self.find(&token_lists[first]) {
            let template_id = found.template_id;
            self.dwords_index.insert(cluster.dwords.clone(), template_id);
            self.inverse
                .entry(template_id)
                .or_default()
                .push(cluster.dwords.clone());
            if let Some(template) = self.templates.get_mut(&template_id) {
                template.count += count;
            }
            debug!("Folded new dwords shape into template {}", template_id);
            return template_id;
        }

        let tokens = self.fold_members(cluster, token_lists);
        let template_id = self.mint(tokens, count, cluster.dwords.clone());
        self.settle(template_id)
    }

    /// Index a template in the trie. When its tokens already resolve to
    /// another template, it is folded into that one instead and its id retired.
    fn settle(&mut self, template_id: u64) -> u64 {
        let Some(tokens) = self.templates.get(&template_id).map(|t| t.tokens.clone()) else {
            return template_id;
        };
        match self.find(&tokens) {
            Some(found) if found.template_id != template_id => {
                self.merge(template_id, found.template_id);
                found.template_id
            }
            _ => {
                if let Some(previous) = self.trie.insert(&tokens, template_id) {
                    if previous != template_id {
                        debug!("Template {} replaced trie tag {}", template_id, previous);
                    }
                }
                template_id
            }
        }
    }

    fn merge(&mut self, from: u64, into: u64) {
        let Some(retired) = self.templates.remove(&from) else {
            return;
        };
        if self.trie.tag_at(&retired.tokens) == Some(from) {
            self.trie.delete(&retired.tokens);
        }

        let keys = self.inverse.remove(&from).unwrap_or_default();
        for key in &keys {
            self.dwords_index.insert(key.clone(), into);
        }
        self.inverse.entry(into).or_default().extend(keys);
        if let Some(template) = self.templates.get_mut(&into) {
            template.count += retired.count;
        }
        debug!("Merged template {} into {}", from, into);
    }

    /// Re-insert every template, most literal tokens first, so a specific
    /// template is never shadowed by a general one inserted before it.
    fn rebuild_trie(&mut self) {
        self.trie.clear();
        let wildcard = &self.config.wildcard;
        let mut order: Vec<(usize, usize, u64)> = self
            .templates
            .iter()
            .map(|(id, t)| {
                let wildcards = t.tokens.iter().filter(|tok| *tok == wildcard).count();
                (t.tokens.len() - wildcards, wildcards, *id)
            })
            .collect();
        order.sort_by_key(|&(literals, wildcards, id)| (Reverse(literals), wildcards, id));

        for (_, _, template_id) in order {
            self.settle(template_id);
        }
    }

    fn to_persisted(&self) -> PersistedModel {
        PersistedModel {
            dictionary: self.dictionary.sorted_words(),
            config: self.config.clone(),
            next_template_id: self.next_id,
            inverse_table: self.inverse.clone(),
            templates: self.templates.clone(),
        }
    }

    fn from_persisted(model: PersistedModel) -> Self {
        let segmenter = Arc::new(load_segmenter(&model.config));
        let dictionary = Dictionary::from_words(&model.config, segmenter, &model.dictionary);
        let mut miner = Self::with_parts(model.config, dictionary);
        miner.next_id = model.next_template_id;
        miner.templates = model.templates;
        miner.inverse = model.inverse_table;
        miner.restore_registry();
        miner
    }

    /// Drop registry entries that lost their counterpart, then rebuild the
    /// derived index and trie.
    fn restore_registry(&mut self) {
        let templates = &self.templates;
        self.inverse
            .retain(|id, keys| !keys.is_empty() && templates.contains_key(id));

        let orphans: Vec<u64> = self
            .templates
            .keys()
            .filter(|id| !self.inverse.contains_key(*id))
            .copied()
            .collect();
        for id in orphans {
            warn!("Purging template {} without dwords entries", id);
            self.templates.remove(&id);
        }

        self.dwords_index = self
            .inverse
            .iter()
            .flat_map(|(id, keys)| keys.iter().map(move |key| (key.clone(), *id)))
            .collect();

        if let Some(&max_id) = self.templates.keys().next_back() {
            self.next_id = self.next_id.max(max_id + 1);
        }
        self.rebuild_trie();
    }

    /// Write the model as JSON. The file is replaced atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let model = self.to_persisted();
        write_atomically(path, |writer| {
            serde_json::to_writer(writer, &model).context("Failed to serialize model")
        })?;
        info!("Saved {} templates to {}", self.templates.len(), path.display());
        Ok(())
    }

    /// Load a JSON model, falling back to a fresh miner built from `fallback`
    /// when the file is missing, unreadable or malformed.
    pub fn load(path: impl AsRef<Path>, fallback: MinerConfig) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(miner) => miner,
            Err(e) => {
                warn!("{:#}; starting with a fresh model", e);
                Self::new(fallback)
            }
        }
    }

    pub fn try_load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open model file: {}", path.display()))?;
        let model: PersistedModel = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse model file: {}", path.display()))?;
        let miner = Self::from_persisted(model);
        info!("Loaded {} templates from {}", miner.templates.len(), path.display());
        Ok(miner)
    }

    /// Binary form of [`save`](Self::save) for fast restarts.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let model = self.to_persisted();
        write_atomically(path.as_ref(), |writer| {
            bincode::serialize_into(writer, &model).context("Failed to serialize snapshot")
        })
    }

    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open snapshot: {}", path.display()))?;
        let model: PersistedModel = bincode::deserialize_from(BufReader::new(file))
            .with_context(|| format!("Failed to decode snapshot: {}", path.display()))?;
        Ok(Self::from_persisted(model))
    }
}

fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
{
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let mut temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        write(&mut writer)?;
        writer.flush().context("Failed to flush model file")?;
    }
    temp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
