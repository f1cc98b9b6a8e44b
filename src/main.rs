use std::io::Write;
use std::sync::Arc;

use color_eyre::eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_error::ErrorLayer;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::{
    auth::{ServiceAccountKey, TokenProvider},
    config::{LogFormat, VaultConfig},
    drive::{DriveStore, FileStore},
    fetcher::{MediaFetcher, YtDlp},
    pipeline::{ProcessOutcome, VideoPipeline},
    sheets::{SheetsTracker, TrackingSheet},
};

#[macro_use]
extern crate tracing;
#[macro_use]
extern crate serde;

pub mod auth;
pub mod config;
pub mod drive;
pub mod error;
pub mod fetcher;
pub mod ident;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod sanitize;
pub mod sheets;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    let config = VaultConfig::load().wrap_err("failed to load configuration")?;
    init_tracing(&config);

    trace!("initialized, preparing services");

    config
        .paths()
        .ensure_all()
        .wrap_err("failed to prepare the storage directories")?;
    YtDlp::check_binaries()
        .await
        .wrap_err("media tooling is missing")?;

    let key = ServiceAccountKey::load(&config.credentials_path())
        .wrap_err("failed to load the Google credentials")?;
    let http = reqwest::Client::new();
    let auth = Arc::new(TokenProvider::new(key, http.clone()));

    let fetcher = YtDlp::new(&config);
    let store = DriveStore::new(&config, Arc::clone(&auth), http.clone());
    let sheet = SheetsTracker::new(&config, auth, http);

    sheet
        .ensure_header()
        .await
        .wrap_err("failed to provision the tracking sheet header")?;

    let pipeline = VideoPipeline::new(config, fetcher, store, sheet);

    banner();
    input_loop(&pipeline).await
}

fn init_tracing(config: &VaultConfig) {
    // RUST_LOG wins when set; the configured level is the default
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_target(false);

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default());

    match config.log_format {
        LogFormat::Full => registry.with(fmt).init(),
        LogFormat::Compact => registry.with(fmt.compact()).init(),
        LogFormat::Pretty => registry.with(fmt.pretty()).init(),
    }
}

fn banner() {
    println!("tubevault");
    println!("supported inputs:");
    println!("  https://www.youtube.com/watch?v=VIDEO_ID");
    println!("  https://youtu.be/VIDEO_ID");
    println!("  https://www.youtube.com/shorts/VIDEO_ID");
    println!("  VIDEO_ID (11 characters)");
}

/// One URL per line until `q` or end of input. Pipeline errors are printed
/// and the loop moves on; only startup failures are fatal.
async fn input_loop<F, S, T>(pipeline: &VideoPipeline<F, S, T>) -> Result<()>
where
    F: MediaFetcher,
    S: FileStore,
    T: TrackingSheet,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nenter a YouTube URL or video id (q to quit): ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        if input.eq_ignore_ascii_case("q") {
            break;
        }
        if input.is_empty() {
            println!("input cannot be empty");
            continue;
        }

        match pipeline.process(input).await {
            Ok(ProcessOutcome::Processed) => println!("video processed successfully"),
            Ok(ProcessOutcome::AlreadyExists) => {
                println!("video is already recorded in the tracking sheet")
            }
            Err(err) => {
                error!("{err}");
                println!("error: {err}");
            }
        }
    }

    info!("exiting");
    Ok(())
}
