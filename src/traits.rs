/// Seams between the miner and the code that consumes it.
///
/// Workflow grouping only needs something that turns content lines into
/// template records, so it takes a [`TemplatePredictor`] rather than a
/// concrete [`TemplateMiner`]. Tests swap in a scripted predictor.
use crate::template_miner::{TemplateMiner, TemplateRecord};

// ============================================================================
// Template Prediction Trait
// ============================================================================

/// Resolves content lines to template records without learning from them.
pub trait TemplatePredictor: Send {
    /// One record per input line, in input order.
    fn predict(&mut self, lines: &[String]) -> Vec<TemplateRecord>;

    /// Convenience for a single line.
    fn predict_one(&mut self, line: &str) -> Option<TemplateRecord> {
        self.predict(&[line.to_string()]).into_iter().next()
    }

    /// Get the name/identifier of this predictor (for logging)
    fn name(&self) -> &str;
}

impl TemplatePredictor for TemplateMiner {
    fn predict(&mut self, lines: &[String]) -> Vec<TemplateRecord> {
        TemplateMiner::predict(self, lines)
    }

    fn name(&self) -> &str {
        "template-miner"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner_config::MinerConfig;

    #[test]
    fn test_miner_as_predictor() {
        let mut miner = TemplateMiner::new(MinerConfig::default());
        miner.train(&["disk sda full", "disk sdb full"]);

        let predictor: &mut dyn TemplatePredictor = &mut miner;
        let record = predictor.predict_one("disk sdc full").unwrap();
        assert_eq!(record.template, "disk <*> full");
        assert!(!record.novel);
        assert_eq!(predictor.name(), "template-miner");
    }
}
