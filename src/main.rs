//! Clipfit - trim an MP4 and re-encode it to fit a target file size
//!
//! Command-line front end: collects the request, hands it to an encode worker,
//! waits for the outcome and exits normally.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clipfit::app::AppContext;
use clipfit::cli::{Args, Commands};
use clipfit::config::Config;
use clipfit::error::ClipError;
use clipfit::timecode::format_time;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Held until the end of main so buffered log lines are flushed on exit
    let _log_guard = setup_logging(args.verbose)?;

    info!("Starting Clipfit");

    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    if let Commands::InitConfig { output } = &args.command {
        config.save_to_file(output)?;
        println!("Wrote configuration to {}", output.display());
        return Ok(ExitCode::SUCCESS);
    }

    let ctx = AppContext::new(config);

    match args.command {
        Commands::Cut { input, start, end, size, mute, delete_original } => {
            let request = match ctx.prepare(input, start, end, size, mute, delete_original).await {
                Ok(request) => request,
                Err(e) => {
                    report_failure(&e);
                    return Ok(ExitCode::FAILURE);
                }
            };

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")?);
            spinner.set_message(format!("Encoding {}", request.source.display()));
            spinner.enable_steady_tick(Duration::from_millis(120));

            let outcome = ctx.process(request).await;
            spinner.finish_and_clear();

            match outcome {
                Ok(report) => {
                    println!(
                        "Video processing complete. File saved successfully at {}",
                        report.output.display()
                    );
                    println!(
                        "Clip {}-{}, {:.2} MB after {} attempt(s)",
                        format_time(report.range.start),
                        format_time(report.range.end),
                        report.final_size() as f64 / 1024.0 / 1024.0,
                        report.attempts.len()
                    );
                    if report.source_deleted {
                        println!("Deleted original video");
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    report_failure(&e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Probe { input } => {
            let source = ctx.media().probe(&input).await?;
            println!("File:      {}", source.path.display());
            println!("Container: {}", source.container);
            println!("Duration:  {} ({:.3}s)", format_time(source.duration), source.duration);
            println!("Audio:     {}", if source.has_audio { "yes" } else { "no" });
            println!("Size:      {:.2} MB", source.size as f64 / 1024.0 / 1024.0);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check => {
            ctx.media().check_availability().await?;
            let version = ctx.media().version_info().await?;
            println!("{}", version);
            Ok(ExitCode::SUCCESS)
        }
        Commands::InitConfig { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn report_failure(e: &ClipError) {
    if e.is_hard_failure() {
        error!("Error processing video: {}", e);
    } else {
        error!("{}", e);
    }
    eprintln!("Failed to achieve target size or process video.");
}

fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(".clipfit").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // File appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "clipfit.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("clipfit.log").display()
    );

    Ok(guard)
}
