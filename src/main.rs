use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use sav_converter::cli::Args;
use sav_converter::processor::load_source;
use sav_converter::{ConversionSummary, ConvertError, Converter};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::error;

fn main() {
    let args = Args::parse();

    if let Err(e) = setup_logging(&args) {
        eprintln!("Failed to initialise logging: {:#}", e);
        process::exit(1);
    }

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        let cancellation_token = CancellationToken::new();

        // Ctrl+C cancels between steps so staged output is cleaned up
        let signal_token = cancellation_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nReceived CTRL+C, stopping after the current step...");
                signal_token.cancel();
            }
        });

        run(&args, &cancellation_token).await
    });

    match result {
        Ok(summary) => {
            if !args.quiet {
                report(&summary);
            }
            process::exit(0);
        }
        Err(e) => {
            error!("Conversion failed: {}", e);
            eprintln!("{} {}", "Error:".bright_red().bold(), e);
            process::exit(e.kind().exit_code());
        }
    }
}

async fn run(args: &Args, cancel: &CancellationToken) -> Result<ConversionSummary, ConvertError> {
    let source = load_source(&args.input).await?;
    let converter = Converter::new(args.to_config());
    converter.convert(args.to_request(source), cancel).await
}

fn setup_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sav_converter={}", args.get_log_level())));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()
        .context("a global tracing subscriber is already installed")?;
    Ok(())
}

fn report(summary: &ConversionSummary) {
    if let Some(preview) = &summary.preview {
        println!("{}", "Data preview".bright_cyan().bold());
        println!("{}\n", preview);
    }

    println!(
        "{} {}",
        "File successfully converted and saved as".bright_green().bold(),
        summary.destination.display().to_string().bright_white()
    );
    println!(
        "  {} {} rows x {} columns",
        "Shape:".bright_cyan(),
        summary.rows.to_string().bright_white(),
        summary.columns.to_string().bright_white()
    );
    println!(
        "  {} {} bytes ({})",
        "Written:".bright_cyan(),
        summary.bytes_written,
        summary.format
    );
    println!(
        "  {} {}ms",
        "Time elapsed:".bright_cyan(),
        summary.elapsed.as_millis().to_string().bright_white()
    );
}
