use profile_scraper_lib::{cancel, input_loader, logger, persistence};
use profile_scraper_lib::{
    CancellationFlag, Collaborators, Config, DedupStore, HaltReason, Orchestrator, PersistenceLayer, SystemClock,
    TimeGate,
};
use profile_scraper_lib::scraper::{HtmlSectionLocator, HttpAuthenticator};
use profile_scraper_lib::session::Authenticator;

use std::path::PathBuf;
use std::process;
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{error, info, warn};

#[derive(Parser)]
#[command(name = "profile-scraper", version, about = "Scheduled, resumable profile scraper")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape every target not yet processed, inside the operating window.
    Run {
        /// A .txt, .csv or .xlsx file of targets, or a search-results page URL.
        source: String,

        /// Stop after this many profiles in this run.
        #[arg(long)]
        max_profiles: Option<usize>,
    },
    /// Write the structured store out as a single JSON array.
    Export {
        #[arg(long, default_value = "profiles.json")]
        out: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };
    logger::init(config.log_level, config.log_file.as_deref());

    let code = match cli.command {
        Command::Run { source, max_profiles } => match scrape(&config, &source, max_profiles) {
            Ok(halt) => halt.exit_code(),
            Err(e) => {
                error!("Scraper failed: {}", e);
                HaltReason::Fatal.exit_code()
            }
        },
        Command::Export { out } => match persistence::export_json_array(&config.storage.structured, &out) {
            Ok(n) => {
                info!("Exported {} records to {}", n, out.display());
                0
            }
            Err(e) => {
                error!("Export failed: {}", e);
                1
            }
        },
    };
    process::exit(code);
}

/// One scheduled run. The session is dropped, and the driver closed, before
/// this returns.
fn scrape(config: &Config, source: &str, max_profiles: Option<usize>) -> profile_scraper_lib::Result<HaltReason> {
    info!("Starting profile scraper (headless: {})...", config.site.headless);

    if let Some(reason) = TimeGate::new(&config.window).closed_reason(&Utc::now()) {
        info!("Outside operating hours, not logging in: {}", reason);
        return Ok(HaltReason::WindowClosed);
    }

    let credentials = config.credentials()?;
    let dedup = DedupStore::open(&config.storage.dedup)?;
    let store = PersistenceLayer::open(&config.storage)?;
    info!(
        "{} targets already processed; writing to {}",
        dedup.len(),
        store.structured_path().display()
    );

    let mut session = HttpAuthenticator::new(credentials, &config.site).login()?;

    let targets = if source.starts_with("http://") || source.starts_with("https://") {
        input_loader::collect_from_search(session.driver(), source, &config.site.profile_marker)?
    } else {
        input_loader::load_targets(source)?
    };
    if targets.is_empty() {
        warn!("No targets found in {}", source);
    }

    let cancel = CancellationFlag::new();
    cancel::watch_stdin(cancel.clone());
    info!("Type 'q' and press Enter to stop after the current profile");

    let locator = HtmlSectionLocator::new();
    let clock = SystemClock;
    let with = Collaborators {
        locator: &locator,
        clock: &clock,
        cancel: &cancel,
    };
    let mut orchestrator = Orchestrator::new(config, dedup, store, with).with_max_profiles(max_profiles);
    let report = orchestrator.run(&targets, session.driver());

    if let Some(cause) = &report.cause {
        error!("Run stopped on: {}", cause);
    }
    Ok(report.halt)
}
