//! The `drover gdrive` command: scan a Drive corpus by MIME type.
//!
//! Native documents and spreadsheets go to the doc scanner by file id;
//! everything else downloadable is fetched through the authorized media
//! endpoint and scanned as a binary. Both passes publish under the same
//! event type.

use std::sync::Arc;

use drover_core::prelude::*;
use drover_sources::download::FetchRunner;
use drover_sources::gdrive::{GdriveClient, ListScope};

use crate::GdriveArgs;
use crate::commands::{runtime, scan_and_publish, scanner_config};

/// Lists the scoped corpus, then runs the doc pass and the binary pass.
pub fn run(args: &GdriveArgs) -> anyhow::Result<()> {
    let insights = InsightsConfig::from_env()?;
    let token = require_env("GDRIVE_TOKEN")?;
    let ankamali = scanner_config("ANKAMALI_HOG_PATH", OutputMode::OutputFile, &args.run)?;
    let duroc =
        scanner_config("DUROC_HOG_PATH", OutputMode::Stdout, &args.run)?.with_args(["-z"]);

    runtime()?.block_on(async {
        let api_base = optional_env("GDRIVE_API_BASE")
            .unwrap_or_else(|| GdriveClient::DEFAULT_API_BASE.to_string());
        let client = GdriveClient::new(api_base, token)?;

        let scope = ListScope {
            folder: args.folder.clone(),
            drive_id: args.drive_id.clone(),
        };
        let files = client.list_files(&scope).await?;
        let partition = client.partition_targets(&files);

        scan_and_publish(
            "gdrive_secret_monitor",
            partition.docs,
            Arc::new(BinaryRunner::new(ankamali)),
            &insights,
            &args.run,
        )
        .await?;

        let fetch = FetchRunner::new(client.authorized_client()?, BinaryRunner::new(duroc));
        scan_and_publish(
            "gdrive_secret_monitor",
            partition.binaries,
            Arc::new(fetch),
            &insights,
            &args.run,
        )
        .await?;
        Ok(())
    })
}
