//! CLI binary for pdf-to-png.
//!
//! A thin front end over the core crate: it collects input files, drives a
//! `BatchConversionJob`, shows a progress bar and prints the run summary.

mod cli;
mod inputs;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_to_png_core::{
    BatchConversionJob, CancellationToken, ChannelProgressSink, ConversionRequest, JobConfig,
    JobStatus, PdfiumRasterizer, PoolConfig, ProgressEvent, RenderConfig,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // The progress bar carries the feedback; keep library logs quiet under it.
    let show_progress = !cli.json && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };
    pdf_to_png_core::init_logging_with_default(filter);

    match run(cli, show_progress).await {
        Ok(JobStatus::FullSuccess) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli, show_progress: bool) -> Result<JobStatus> {
    let documents = inputs::collect_inputs(&cli.inputs)?;
    debug!("Collected {} document(s)", documents.len());

    let concurrency = cli
        .jobs
        .unwrap_or_else(|| PoolConfig::default().concurrency);
    let config = JobConfig::new(concurrency).with_render(
        RenderConfig::default()
            .background_color(cli.background.into())
            .png_compression(cli.compression),
    );

    let rasterizer = PdfiumRasterizer::with_library_dir(cli.pdfium_dir.clone())
        .context("Failed to load the pdfium library")?;
    let job = Arc::new(BatchConversionJob::new(Arc::new(rasterizer), config)?);
    let request = ConversionRequest::new(documents, cli.output.clone()).with_dpi(cli.dpi);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing pages already in progress");
            on_interrupt.cancel();
        }
    });

    let bar = progress_bar(request.input_paths.len(), show_progress);
    let (sink, events) = ChannelProgressSink::unbounded();
    let drain = async {
        while let Ok(event) = events.recv().await {
            match event {
                ProgressEvent::Progress(state) => {
                    bar.set_position(state.completed_documents as u64);
                    bar.set_message(state.current_label);
                }
                ProgressEvent::Completed(_) | ProgressEvent::Failed { .. } => break,
            }
        }
    };

    let (result, ()) = tokio::join!(job.run_async(request, sink, cancel), drain);
    bar.finish_and_clear();
    let result = result?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize job result")?
        );
    } else {
        println!("{}", result);
    }

    Ok(result.status())
}

fn progress_bar(total: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} {msg:.bold}  [{bar:42.green/238}]  ⏱ {elapsed_precise}  ETA {eta_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ");
    bar.set_style(style);
    bar.set_message(format!("Converting: 0 / {}", total));
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}
