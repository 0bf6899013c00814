use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod captions;
pub mod youtube;

use crate::resolver::VideoId;

pub use captions::YoutubeDataApiCaptions;
pub use youtube::YoutubeTranscriptSource;

/// One timed caption entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Caption text
    pub text: String,

    /// Start time in seconds
    pub start: f64,

    /// Duration in seconds
    pub duration: f64,
}

impl TranscriptSegment {
    pub fn new(text: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            text: text.into(),
            start,
            duration,
        }
    }
}

/// Outcome of a single call to a transcript or captions source
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("transcripts are disabled for this video")]
    Disabled,

    #[error("no transcript available for this video")]
    NoTranscript,

    #[error("rate limited by upstream service")]
    RateLimited,

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().map(|s| s.as_u16()) == Some(429) {
            SourceError::RateLimited
        } else {
            // Request URLs carry API keys in their query string
            SourceError::Other(err.without_url().to_string())
        }
    }
}

/// Primary transcript provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetch the ordered transcript segments for a video
    async fn fetch(&self, video_id: &VideoId) -> Result<Vec<TranscriptSegment>, SourceError>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// Secondary captions provider consulted when the primary source has nothing
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptionsSource: Send + Sync {
    async fn fetch_captions(&self, video_id: &VideoId) -> Result<Vec<TranscriptSegment>, SourceError>;
}

/// Concatenate segment texts in order, separated by a single space
pub fn join_segments(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|segment| segment.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
