mod batch;
mod config;
mod error;
mod invoice;
mod ledger;

use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "invoicer.toml";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = config::Config::load_or_default(CONFIG_PATH)?;
    info!(
        input = %cfg.input.display(),
        template = %cfg.template.display(),
        output_dir = %cfg.output_dir.display(),
        year = cfg.year(),
        "Starting invoice batch"
    );

    let (records, summary) = batch::process(&cfg)?;
    if !summary.failed.is_empty() {
        tracing::warn!(
            failed = summary.failed.len(),
            of = records.len(),
            "Some invoices were not written"
        );
    }

    println!("Total: {:.2}", summary.grand_total);
    Ok(())
}
