// Tokenization and legality
pub mod dictionary;
pub mod miner_config;
pub mod segmenter;
pub mod tokenizer;
mod words;

// Matching and mining
pub mod template_miner;
pub mod trie; // Arena-backed token trie with backtracking search

// Integration surfaces
pub mod config;
pub mod registry;
pub mod traits;
pub mod workflow;

pub use miner_config::MinerConfig;
pub use template_miner::{Template, TemplateMiner, TemplateRecord};
