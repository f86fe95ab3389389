/// Workflow grouping driven by a trained miner.
use log_template_miner::registry::MinerRegistry;
use log_template_miner::traits::TemplatePredictor;
use log_template_miner::workflow::{LogRecord, WorkflowConfig, WorkflowGroups};
use log_template_miner::MinerConfig;
use tempfile::TempDir;

#[test]
fn test_kernel_records_grouped_by_template() {
    let dir = TempDir::new().unwrap();
    let mut registry = MinerRegistry::new(dir.path(), MinerConfig::default());
    let miner = registry.get_or_load("/var/log/pg/postgresql.log");
    miner.train(&["disk sda full", "disk sdb full", "checkpoint starting"]);

    let config = WorkflowConfig::default()
        .with_regex_metric("disk_full", r"disk \S+ full")
        .with_template_offset("checkpoint starting", 1);
    let mut groups = WorkflowGroups::new(config);

    let records = vec![
        LogRecord::new("disk sdc full").with_level("ERROR").kernel(),
        LogRecord::new("checkpoint starting").with_level("LOG").kernel(),
        LogRecord::new("reason: time").with_level("LOG"),
        LogRecord::new("disk sdd full").kernel(),
    ];
    groups.add(&records, Some(&mut *miner as &mut dyn TemplatePredictor));

    assert_eq!(groups.regex_bucket("disk_full").len(), 2);
    assert_eq!(groups.severity_counts().get("LOG"), Some(&2));
    assert_eq!(groups.severity_counts().get("ERROR"), Some(&1));

    let buckets = groups.template_buckets();
    assert_eq!(buckets.len(), 2);
    let disk = buckets.values().find(|b| b.template == "disk <*> full").unwrap();
    assert_eq!(disk.contents, vec!["disk sdc full", "disk sdd full"]);
    let checkpoint = buckets.values().find(|b| b.template == "checkpoint starting").unwrap();
    assert_eq!(checkpoint.contents, vec!["reason: time"]);

    // Grouping predicts only; the miner learned nothing.
    assert_eq!(miner.template_count(), 2);

    groups.clear();
    assert!(groups.template_buckets().is_empty());
    assert_eq!(miner.template_count(), 2);

    println!("✅ Workflow grouping test passed");
}
