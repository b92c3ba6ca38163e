//! Process command implementation
//!
//! Loads the configuration, runs the staged pipeline for every dataset group
//! (concurrently, bounded by the worker count) and reports a summary.

use super::shared::{
    create_progress_bar, identifier_groups, load_configuration, output_size, setup_logging,
    RunSummary,
};
use crate::cli::args::{ProcessArgs, ReportFormat};
use crate::config::PipelineConfig;
use crate::processor::RegionProcessor;
use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tracing::{debug, error, info};

/// Process command runner
pub async fn run_process(args: ProcessArgs) -> Result<RunSummary> {
    let start_time = Instant::now();
    setup_logging(args.get_log_level(), args.quiet);

    info!("Starting region processor");
    debug!("Command line arguments: {:?}", args);

    let config = load_configuration(&args)?;
    let groups = identifier_groups(&config, &args);
    info!(
        "Processing {} dataset groups with {} workers",
        groups.len(),
        config.workers
    );

    let progress = args
        .show_progress()
        .then(|| create_progress_bar(groups.len() as u64, "dataset groups"));

    let results = stream::iter(groups)
        .map(|identifiers| {
            let config = config.clone().with_identifiers(identifiers);
            async move {
                let key = PipelineConfig::group_key(&config.identifiers);
                let result = match RegionProcessor::from_config(config) {
                    Ok(processor) => processor.process().await,
                    Err(e) => Err(e),
                };
                (key, result)
            }
        })
        .buffer_unordered(config.workers)
        .inspect(|_| {
            if let Some(pb) = &progress {
                pb.inc(1);
            }
        })
        .collect::<Vec<_>>()
        .await;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let summary = summarize(results, start_time.elapsed().as_millis())?;

    match args.output_format {
        ReportFormat::Human => summary.print(),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    if summary.groups.is_empty() {
        bail!("every dataset group failed");
    }
    Ok(summary)
}

/// Fold per-group results into a summary; critical errors abort the run
fn summarize(
    results: Vec<(String, crate::Result<crate::ProcessingStats>)>,
    elapsed_ms: u128,
) -> Result<RunSummary> {
    let mut summary = RunSummary {
        elapsed_ms,
        ..Default::default()
    };

    for (key, result) in results {
        match result {
            Ok(stats) => summary.groups.push(stats),
            Err(e) if e.is_critical() => {
                return Err(anyhow::Error::new(e).context(format!("dataset group {}", key)));
            }
            Err(e) => {
                error!("Dataset group {} failed: {}", key, e);
                summary.failures.push((key, e.to_string()));
            }
        }
    }

    summary.groups.sort_by(|a, b| a.dataset.cmp(&b.dataset));
    let outputs: Vec<_> = summary.groups.iter().map(|g| g.output_path.clone()).collect();
    summary.output_bytes = output_size(&outputs);
    Ok(summary)
}
