/// Per-source bucketing of extracted log records for metric emission.
///
/// A record can land in three kinds of bucket: one per fixed regex metric its
/// content matches, one per severity level, and (kernel records only) one per
/// mined template. Buckets are per collection cycle; [`WorkflowGroups::clear`]
/// never touches a miner.
use crate::traits::TemplatePredictor;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A record whose header fields were already stripped by the harvester.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub content: String,
    #[serde(default)]
    pub level: Option<String>,
    /// Emitted by the database kernel rather than a surrounding tool.
    #[serde(default)]
    pub kernel: bool,
}

impl LogRecord {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn kernel(mut self) -> Self {
        self.kernel = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexMetric {
    pub name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Metrics computed straight from content, bypassing mining.
    pub regex_metrics: Vec<RegexMetric>,
    /// Template text -> how many records later the real payload sits.
    pub template_offsets: BTreeMap<String, usize>,
}

impl WorkflowConfig {
    pub fn with_regex_metric(mut self, name: &str, pattern: &str) -> Self {
        self.regex_metrics.push(RegexMetric {
            name: name.to_string(),
            pattern: pattern.to_string(),
        });
        self
    }

    pub fn with_template_offset(mut self, template: &str, offset: usize) -> Self {
        self.template_offsets.insert(template.to_string(), offset);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TemplateBucket {
    pub template: String,
    pub contents: Vec<String>,
}

#[derive(Debug)]
pub struct WorkflowGroups {
    metrics: Vec<(String, Regex)>,
    template_offsets: FxHashMap<String, usize>,
    regex_buckets: BTreeMap<String, Vec<String>>,
    severity_counts: BTreeMap<String, u64>,
    template_buckets: BTreeMap<u64, TemplateBucket>,
}

impl WorkflowGroups {
    pub fn new(config: WorkflowConfig) -> Self {
        let metrics = config
            .regex_metrics
            .into_iter()
            .filter_map(|metric| match Regex::new(&metric.pattern) {
                Ok(regex) => Some((metric.name, regex)),
                Err(e) => {
                    warn!("Skipping regex metric {:?}: {}", metric.name, e);
                    None
                }
            })
            .collect();

        Self {
            metrics,
            template_offsets: config.template_offsets.into_iter().collect(),
            regex_buckets: BTreeMap::new(),
            severity_counts: BTreeMap::new(),
            template_buckets: BTreeMap::new(),
        }
    }

    /// Route a batch of records into the buckets. Template buckets are only
    /// filled when a predictor is supplied.
    pub fn add(&mut self, records: &[LogRecord], predictor: Option<&mut dyn TemplatePredictor>) {
        for record in records {
            for (name, regex) in &self.metrics {
                if regex.is_match(&record.content) {
                    self.regex_buckets
                        .entry(name.clone())
                        .or_default()
                        .push(record.content.clone());
                }
            }
            if let Some(level) = &record.level {
                *self.severity_counts.entry(level.clone()).or_insert(0) += 1;
            }
        }

        let Some(predictor) = predictor else {
            return;
        };

        let kernel: Vec<usize> = (0..records.len()).filter(|&i| records[i].kernel).collect();
        if kernel.is_empty() {
            return;
        }

        let lines: Vec<String> = kernel.iter().map(|&i| records[i].content.clone()).collect();
        let predicted = predictor.predict(&lines);
        debug!(
            "{} resolved {} kernel records",
            predictor.name(),
            predicted.len()
        );

        for (&idx, result) in kernel.iter().zip(predicted) {
            // Multi-line entries carry their payload on a later record.
            let content = match self.template_offsets.get(&result.template) {
                Some(&offset) => records
                    .get(idx + offset)
                    .map_or(&records[idx].content, |later| &later.content),
                None => &records[idx].content,
            };

            self.template_buckets
                .entry(result.template_id)
                .or_insert_with(|| TemplateBucket {
                    template: result.template.clone(),
                    contents: Vec::new(),
                })
                .contents
                .push(content.clone());
        }
    }

    /// Reset the per-cycle buckets.
    pub fn clear(&mut self) {
        self.regex_buckets.clear();
        self.severity_counts.clear();
        self.template_buckets.clear();
    }

    pub fn regex_bucket(&self, name: &str) -> &[String] {
        self.regex_buckets.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn severity_counts(&self) -> &BTreeMap<String, u64> {
        &self.severity_counts
    }

    pub fn template_buckets(&self) -> &BTreeMap<u64, TemplateBucket> {
        &self.template_buckets
    }
}
