//! The `drover pypi` and `drover rubygems` commands: scan the latest
//! published artifact of one package.

use std::sync::Arc;

use drover_core::prelude::*;
use drover_sources::download::{FetchRunner, download_client};
use drover_sources::packages::{PypiClient, RubyGemsClient, gem_target, pypi_target};

use crate::commands::{runtime, scan_and_publish, scanner_config};
use crate::{PypiArgs, RubygemsArgs};

/// Resolves and scans the latest sdist of the named package.
pub fn run_pypi(args: &PypiArgs) -> anyhow::Result<()> {
    let insights = InsightsConfig::from_env()?;
    let duroc =
        scanner_config("DUROC_HOG_PATH", OutputMode::Stdout, &args.run)?.with_args(["-z"]);

    runtime()?.block_on(async {
        let base_url =
            optional_env("PYPI_BASE_URL").unwrap_or_else(|| PypiClient::DEFAULT_BASE_URL.to_string());
        let release = PypiClient::new(base_url)?.latest_sdist(&args.package).await?;

        let runner = Arc::new(FetchRunner::new(download_client()?, BinaryRunner::new(duroc)));
        scan_and_publish(
            "pypi_secret_monitor",
            vec![pypi_target(&release)],
            runner,
            &insights,
            &args.run,
        )
        .await?;
        Ok(())
    })
}

/// Resolves and scans the latest version of the named gem.
pub fn run_rubygems(args: &RubygemsArgs) -> anyhow::Result<()> {
    let insights = InsightsConfig::from_env()?;
    let duroc =
        scanner_config("DUROC_HOG_PATH", OutputMode::Stdout, &args.run)?.with_args(["-z"]);

    runtime()?.block_on(async {
        let base_url = optional_env("RUBYGEMS_BASE_URL")
            .unwrap_or_else(|| RubyGemsClient::DEFAULT_BASE_URL.to_string());
        let release = RubyGemsClient::new(base_url)?.latest_gem(&args.gem).await?;

        let runner = Arc::new(FetchRunner::new(download_client()?, BinaryRunner::new(duroc)));
        // Event type name predates this tool; the dashboards key on it.
        scan_and_publish(
            "rubyagent_secret_monitor",
            vec![gem_target(&release)],
            runner,
            &insights,
            &args.run,
        )
        .await?;
        Ok(())
    })
}
