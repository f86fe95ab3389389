//! One miner per monitored log source.
//!
//! Instances are created or loaded on first use and saved when the source's
//! log file rotates away or is removed.

use crate::miner_config::MinerConfig;
use crate::template_miner::TemplateMiner;
use anyhow::Result;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use tracing::info;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over the source's bytes. Fixed width, so a model directory
/// written by one build is found again by any other.
fn source_hash(source: &str) -> u64 {
    source.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

pub struct MinerRegistry {
    model_dir: PathBuf,
    config: MinerConfig,
    miners: FxHashMap<String, TemplateMiner>,
}

impl MinerRegistry {
    pub fn new(model_dir: impl Into<PathBuf>, config: MinerConfig) -> Self {
        Self {
            model_dir: model_dir.into(),
            config,
            miners: FxHashMap::default(),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Model file for `source`: a readable prefix plus a hash of the full
    /// identity, so distinct sources never share a file.
    pub fn model_path(&self, source: &str) -> PathBuf {
        let readable: String = source
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .take(64)
            .collect();

        self.model_dir
            .join(format!("{}-{:016x}.json", readable, source_hash(source)))
    }

    /// The miner for `source`, loading its model file on first use.
    pub fn get_or_load(&mut self, source: &str) -> &mut TemplateMiner {
        let path = self.model_path(source);
        let config = &self.config;
        self.miners.entry(source.to_string()).or_insert_with(|| {
            if path.exists() {
                TemplateMiner::load(&path, config.clone())
            } else {
                info!("Creating template miner for {}", source);
                TemplateMiner::new(config.clone())
            }
        })
    }

    pub fn get(&self, source: &str) -> Option<&TemplateMiner> {
        self.miners.get(source)
    }

    /// Save and drop the miner for `source`. Returns false when none was live.
    /// A failed save leaves the miner in place.
    pub fn evict(&mut self, source: &str) -> Result<bool> {
        let Some(miner) = self.miners.get(source) else {
            return Ok(false);
        };
        miner.save(self.model_path(source))?;
        self.miners.remove(source);
        info!("Evicted template miner for {}", source);
        Ok(true)
    }

    pub fn save_all(&self) -> Result<()> {
        for (source, miner) in &self.miners {
            miner.save(self.model_path(source))?;
        }
        Ok(())
    }

    pub fn sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = self.miners.keys().map(String::as_str).collect();
        sources.sort_unstable();
        sources
    }

    pub fn len(&self) -> usize {
        self.miners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.miners.is_empty()
    }
}
