use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::resolver::{resolve, VideoId};

#[derive(Parser)]
#[command(
    name = "ytscribe",
    about = "ytscribe - Fetch YouTube transcripts and polish them with a language model",
    version,
    long_about = "Serves a small HTTP API that resolves a YouTube URL, fetches the video's transcript with retries and backoff, and improves punctuation and formatting through an OpenAI compatible chat completions API."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "YTSCRIBE_JSON_LOGS")]
    pub json_logs: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to bind (overrides config and HOST)
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Port to listen on (overrides config and PORT)
        #[arg(short, long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Process a single URL locally and print the result
    Process {
        /// YouTube URL (watch, youtu.be, embed, shorts) or bare video id
        #[arg(value_name = "URL")]
        url: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Skip the improvement step and return the raw transcript
        #[arg(long)]
        raw: bool,
    },

    /// Print the video id a URL resolves to
    Resolve {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Show or initialise configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write a default config file to the user config directory
        #[arg(long, conflicts_with = "show")]
        init: bool,
    },
}

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON with metadata
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Resolve a command line URL argument, also accepting a bare video id.
///
/// The HTTP API goes through [`resolve`] only.
pub fn resolve_arg(input: &str) -> Option<VideoId> {
    VideoId::parse(input.trim()).or_else(|| resolve(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_process() {
        let cli = Cli::parse_from(["ytscribe", "process", "https://youtu.be/dQw4w9WgXcQ", "--raw", "-f", "json"]);
        match cli.command {
            Commands::Process { url, format, raw, output } => {
                assert_eq!(url, "https://youtu.be/dQw4w9WgXcQ");
                assert!(matches!(format, OutputFormat::Json));
                assert!(raw);
                assert!(output.is_none());
            }
            _ => panic!("expected process command"),
        }
    }

    #[test]
    fn test_resolve_arg_accepts_bare_id() {
        assert_eq!(resolve_arg(" dQw4w9WgXcQ\n").unwrap().as_str(), "dQw4w9WgXcQ");
        assert_eq!(resolve_arg("https://youtu.be/dQw4w9WgXcQ").unwrap().as_str(), "dQw4w9WgXcQ");
        assert!(resolve_arg("not a youtube url").is_none());
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::parse_from(["ytscribe", "serve", "--port", "9090", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Serve { host: None, port: Some(9090) }));
    }
}
