use anyhow::{Context, Result};
use log_template_miner::config::RuntimeConfig;
use log_template_miner::registry::MinerRegistry;
use std::io::{self, BufRead, BufWriter, Write};
use tracing::info;

fn main() -> Result<()> {
    let runtime = RuntimeConfig::from_env();

    // Logs go to stderr; stdout carries the records
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    runtime.log_config();
    let config = runtime.miner_config()?;

    let lines: Vec<String> = io::stdin()
        .lock()
        .lines()
        .collect::<io::Result<_>>()
        .context("Failed to read stdin")?;
    info!("Read {} lines", lines.len());

    let mut registry = MinerRegistry::new(&runtime.model_dir, config);
    let miner = registry.get_or_load(&runtime.source);

    let records = if runtime.train {
        miner.train(&lines);
        miner.predict(&lines)
    } else {
        miner.update(&lines)
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for record in &records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    info!(
        "{} templates after {} lines",
        miner.template_count(),
        records.len()
    );
    registry.save_all()?;
    Ok(())
}
