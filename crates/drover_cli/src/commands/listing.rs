//! The `drover s3-listing` and `drover html-listing` commands: scan
//! artifacts discovered through public listings.

use std::sync::Arc;

use drover_core::prelude::*;
use drover_sources::download::{FetchRunner, download_client};
use drover_sources::weblisting::{HtmlListing, S3Listing, WebListingScanner, load_config};

use crate::ListingArgs;
use crate::commands::{runtime, scan_and_publish, scanner_config};

/// Walks every S3 listing in the config file and scans matching objects.
pub fn run_s3(args: &ListingArgs) -> anyhow::Result<()> {
    let insights = InsightsConfig::from_env()?;
    let duroc =
        scanner_config("DUROC_HOG_PATH", OutputMode::Stdout, &args.run)?.with_args(["-z"]);

    runtime()?.block_on(async {
        let listings: Vec<S3Listing> = load_config(&args.config)?;
        let scanner = WebListingScanner::new()?;
        let mut targets = Vec::new();
        for listing in &listings {
            targets.extend(scanner.s3_targets(listing).await?);
        }

        let runner = Arc::new(FetchRunner::new(download_client()?, BinaryRunner::new(duroc)));
        scan_and_publish("s3weblisting_secret_monitor", targets, runner, &insights, &args.run)
            .await?;
        Ok(())
    })
}

/// Walks every HTML listing in the config file and scans matching files.
pub fn run_html(args: &ListingArgs) -> anyhow::Result<()> {
    let insights = InsightsConfig::from_env()?;
    let duroc =
        scanner_config("DUROC_HOG_PATH", OutputMode::Stdout, &args.run)?.with_args(["-z"]);

    runtime()?.block_on(async {
        let listings: Vec<HtmlListing> = load_config(&args.config)?;
        let scanner = WebListingScanner::new()?;
        let mut targets = Vec::new();
        for listing in &listings {
            targets.extend(scanner.html_targets(listing).await?);
        }

        let runner = Arc::new(FetchRunner::new(download_client()?, BinaryRunner::new(duroc)));
        scan_and_publish("htmldirlisting_secret_monitor", targets, runner, &insights, &args.run)
            .await?;
        Ok(())
    })
}
