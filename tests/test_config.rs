/// Test miner configuration
use log_template_miner::{MinerConfig, TemplateMiner};

#[test]
fn test_default_config() {
    let miner = TemplateMiner::new(MinerConfig::default());
    let config = miner.config();

    println!("Default configuration:");
    println!("  Wildcard: {}", config.wildcard);
    println!("  Delimiters: {:?}", config.delimiters);
    println!("  Max tokens: {}", config.max_tokens);
    println!("  Continuation steps: {}", config.max_continuation_steps);

    assert_eq!(config.wildcard, "<*>");
    assert_eq!(config.max_tokens, 500);
    assert_eq!(config.max_continuation_steps, 0);
    assert_eq!(config.min_compound_subword_length, 2);
    assert!(config.enable_compound);
    assert!(!config.case_sensitive);
    assert!(config.extract_parameters);
}

#[test]
fn test_custom_config() {
    let config = MinerConfig::new()
        .with_wildcard("<v>")
        .with_word_length(2, 20)
        .with_prefer_more_wildcards(true)
        .with_continuation(3, " ");

    let miner = TemplateMiner::new(config);

    assert_eq!(miner.config().wildcard, "<v>");
    assert_eq!(miner.config().min_word_length, 2);
    assert_eq!(miner.config().max_word_length, 20);
    assert!(miner.config().prefer_more_wildcards);
    assert_eq!(miner.config().max_continuation_steps, 3);
}

#[test]
fn test_database_logs_config() {
    let config = MinerConfig::database_logs();
    let miner = TemplateMiner::new(config);

    println!("\nDatabase logs configuration:");
    println!("  Mask patterns: {}", miner.config().mask_patterns.len());

    assert_eq!(miner.config().mask_patterns.len(), 3);
    assert_eq!(
        miner.line_tokens("from 10.1.2.3:5432 at 0xdeadbeef"),
        vec!["from", "<*>", "at", "<*>"]
    );
}

#[test]
fn test_custom_wildcard_flows_through() {
    let mut miner = TemplateMiner::new(MinerConfig::new().with_wildcard("<v>"));
    miner.train(&["disk sda full", "disk sdb full"]);

    let (_, template) = miner.templates().next().unwrap();
    assert_eq!(template.text(), "disk <v> full");
    assert!(!miner.predict(&["disk sdq full"])[0].novel);
}

#[test]
fn test_case_sensitive_config() {
    let mut miner = TemplateMiner::new(MinerConfig::new().with_case_sensitive(true));
    assert_eq!(miner.line_tokens("Disk FULL"), vec!["Disk", "FULL"]);

    miner.train(&["Disk sda full", "Disk sdb full"]);
    let (_, template) = miner.templates().next().unwrap();
    assert_eq!(template.text(), "Disk <*> full");
}

#[test]
fn test_config_json_defaults() {
    let config: MinerConfig = serde_json::from_str(r#"{"case_sensitive": true}"#).unwrap();
    assert!(config.case_sensitive);
    assert_eq!(config, MinerConfig::default().with_case_sensitive(true));
}

#[test]
fn test_uppercase_wildcard_with_masks() {
    let config = MinerConfig::new()
        .with_wildcard("<VAR>")
        .with_mask_pattern(r"\d+");
    let mut miner = TemplateMiner::new(config);
    assert_eq!(miner.line_tokens("disk 12 full"), vec!["disk", "<VAR>", "full"]);

    miner.train(&["Disk 12 FULL", "disk 13 full"]);
    assert_eq!(miner.template_count(), 1);
    let (id, template) = miner.templates().next().unwrap();
    assert_eq!(template.text(), "disk <VAR> full");

    let records = miner.predict(&["DISK 99 Full"]);
    assert!(!records[0].novel);
    assert_eq!(records[0].template_id, id);
}
