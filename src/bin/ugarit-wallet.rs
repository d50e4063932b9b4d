use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use ugarit_ledger::{
    cli::{Cli, Service},
    config::Config,
    ledger::Ledger,
    onboarding::LogNotifier,
    storage::file::FileStorage,
};

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ugarit_ledger=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let storage = FileStorage::open(&config.data_dir).with_context(|| {
        format!("Failed to open data directory `{}`", config.data_dir.display())
    })?;

    let service = Service {
        ledger: Ledger::new(storage, config),
        output: &mut std::io::stdout(),
        notifier: Box::new(LogNotifier),
    };
    service.run(cli.command)
}
