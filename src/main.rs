use anyhow::Result;
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ytscribe::cli::{resolve_arg, Cli, Commands, OutputFormat};
use ytscribe::output::{self, ProcessResult};
use ytscribe::transcribe::build_fetcher;
use ytscribe::{server, ClassifiedError, Config, TranscriptPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = Config::load()?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            server::serve(&config).await?;
        }
        Commands::Process {
            url,
            format,
            output,
            raw,
        } => {
            process(&url, format, output, raw, cli.quiet).await?;
        }
        Commands::Resolve { url } => {
            let video_id = resolve_arg(&url).ok_or(ClassifiedError::InvalidUrl)?;
            println!("{}", video_id);
        }
        Commands::Config { show, init } => {
            if init {
                let path = Config::user_config_path()
                    .ok_or_else(|| anyhow::anyhow!("Could not determine the user config directory"))?;
                if path.exists() {
                    anyhow::bail!("Config file already exists: {}", path.display());
                }
                Config::default().save(&path)?;
                println!("Default configuration written to: {}", path.display());
            } else if show {
                Config::load()?.display();
            } else {
                match Config::config_path() {
                    Some(path) => println!("Using config file: {}", path.display()),
                    None => println!("No config file found, using defaults and environment"),
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose { "ytscribe=debug" } else { "ytscribe=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    // stdout carries command output, logs go to stderr
    let (plain, json) = if json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();
}

async fn process(url: &str, format: OutputFormat, output: Option<PathBuf>, raw: bool, quiet: bool) -> Result<()> {
    // Reject bad input before any key or network is needed
    let video_id = resolve_arg(url).ok_or(ClassifiedError::InvalidUrl)?;
    let config = Config::load()?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let progress = if quiet { ProgressBar::hidden() } else { ProgressBar::new_spinner() };
    progress.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    progress.enable_steady_tick(Duration::from_millis(120));

    let started = Instant::now();
    let transcript = if raw {
        progress.set_message(format!("Fetching transcript for {}...", video_id));
        build_fetcher(&config)?.fetch(&video_id, &cancel).await
    } else {
        progress.set_message(format!("Fetching and improving transcript for {}...", video_id));
        TranscriptPipeline::from_config(&config)?
            .run_with_cancel(&video_id, &cancel)
            .await
    };
    progress.finish_and_clear();

    let transcript = transcript?;
    let result = ProcessResult {
        video_id,
        transcript,
        improved: !raw,
        elapsed_secs: started.elapsed().as_secs_f64(),
        processed_at: chrono::Utc::now(),
    };

    match output {
        Some(path) => {
            output::save_to_file(&result, &path, &format)?;
            eprintln!("{} Transcript saved to: {}", style("✓").green(), path.display());
        }
        None => output::print_to_console(&result, &format)?,
    }

    Ok(())
}
