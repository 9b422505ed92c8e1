use anyhow::Context;
use clap::Parser;
use ekumen_core::EkumenConfig;
use ekumen_terminal::runner::AnsibleRunner;
use ekumen_terminal::OutputArchive;
use tracing::{info, warn};

mod args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the JSON verdict, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ekumen=info,ekumen_terminal=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = args::Cli::parse();

    // load config: --config > EKUMEN_CONFIG env > ~/.ekumen/ekumen.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("EKUMEN_CONFIG").ok());
    let config = EkumenConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        EkumenConfig::default()
    });

    let request = cli.to_request()?;

    let runner = AnsibleRunner::new(config.runner);
    if !runner.is_available() {
        warn!(tool = %runner.config().ansible_bin, "automation tool not found on PATH");
    }

    let verdict = runner.run(request).await;

    if let Some(dir) = &cli.save_dir {
        let archive = OutputArchive::new(&verdict, chrono::Local::now());
        if archive.is_empty() {
            info!("no output to save");
        } else {
            let path = dir.join(archive.filename());
            std::fs::write(&path, &archive.content)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "output saved");
        }
    }

    println!("{}", serde_json::to_string_pretty(&verdict)?);

    if !verdict.success {
        std::process::exit(1);
    }
    Ok(())
}
