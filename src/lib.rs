//! ytscribe - fetch YouTube transcripts and polish them with a language model
//!
//! This library resolves YouTube URLs to video ids, fetches transcripts with a
//! bounded retry policy, passes them through a text-completion service and
//! exposes the whole flow over a small HTTP API.

pub mod cli;
pub mod config;
pub mod improve;
pub mod output;
pub mod resolver;
pub mod server;
pub mod sources;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use resolver::{resolve, VideoId};
pub use sources::{TranscriptSegment, TranscriptSource};
pub use transcribe::TranscriptPipeline;

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// External service that signalled a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    TranscriptSource,
    CaptionsApi,
    CompletionService,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceKind::TranscriptSource => write!(f, "transcript service"),
            ServiceKind::CaptionsApi => write!(f, "captions API"),
            ServiceKind::CompletionService => write!(f, "completion service"),
        }
    }
}

/// Classified failure of a single transcript request
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ClassifiedError {
    #[error("Invalid YouTube URL")]
    InvalidUrl,

    #[error("Transcripts are disabled for this video")]
    TranscriptsDisabled,

    #[error("Rate limit reached on the {service}, please try again later")]
    RateLimited { service: ServiceKind },

    #[error("Error fetching transcript after {attempts} attempt(s): {last_message}")]
    TranscriptFetchFailed { attempts: u32, last_message: String },

    #[error("Error improving transcript: {message}")]
    ImprovementFailed { message: String },

    #[error("An unexpected error occurred: {message}")]
    Unexpected { message: String },

    #[error("Request was cancelled before it completed")]
    Cancelled,
}
