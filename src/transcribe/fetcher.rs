use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::backoff::BackoffPolicy;
use crate::resolver::VideoId;
use crate::sources::{join_segments, CaptionsSource, SourceError, TranscriptSegment, TranscriptSource};
use crate::utils::format_duration;
use crate::{ClassifiedError, ServiceKind};

const NO_CAPTIONS_MESSAGE: &str = "No captions available for this video";

/// Retry settings for the fetch step
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    /// Maximum number of attempts, at least one is always made
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
    /// Wait `delay(n)` before every attempt instead of after each failure
    pub wait_before_first_attempt: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::default(),
            wait_before_first_attempt: false,
        }
    }
}

/// Fetches a transcript with bounded retries and an optional captions fallback
pub struct TranscriptFetcher {
    source: Arc<dyn TranscriptSource>,
    captions: Option<Arc<dyn CaptionsSource>>,
    retry: RetrySettings,
}

impl TranscriptFetcher {
    pub fn new(source: Arc<dyn TranscriptSource>, retry: RetrySettings) -> Self {
        Self {
            source,
            captions: None,
            retry,
        }
    }

    /// Consult a secondary captions source when the primary one has no transcript
    pub fn with_captions(mut self, captions: Arc<dyn CaptionsSource>) -> Self {
        self.captions = Some(captions);
        self
    }

    /// Fetch the transcript and join its segments into a single string
    pub async fn fetch(&self, video_id: &VideoId, cancel: &CancellationToken) -> Result<String, ClassifiedError> {
        self.fetch_segments(video_id, cancel)
            .await
            .map(|segments| join_segments(&segments))
    }

    /// Fetch the ordered transcript segments
    pub async fn fetch_segments(
        &self,
        video_id: &VideoId,
        cancel: &CancellationToken,
    ) -> Result<Vec<TranscriptSegment>, ClassifiedError> {
        let max_attempts = self.retry.max_retries.max(1);
        let mut last_error = SourceError::Other("no attempt was made".to_string());

        for attempt in 1..=max_attempts {
            if self.retry.wait_before_first_attempt {
                self.wait(attempt, cancel).await?;
            }

            if cancel.is_cancelled() {
                return Err(ClassifiedError::Cancelled);
            }

            tracing::info!(
                "Fetching transcript for {} from {} (attempt {}/{})",
                video_id,
                self.source.name(),
                attempt,
                max_attempts
            );

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClassifiedError::Cancelled),
                outcome = self.source.fetch(video_id) => outcome,
            };

            match outcome {
                Ok(segments) if !segments.is_empty() => {
                    tracing::info!("Fetched {} transcript segments for {}", segments.len(), video_id);
                    return Ok(segments);
                }
                Ok(_) | Err(SourceError::NoTranscript) => {
                    return self.fetch_captions(video_id, attempt, cancel).await;
                }
                Err(SourceError::Disabled) => {
                    tracing::warn!("Transcripts are disabled for {}", video_id);
                    return Err(ClassifiedError::TranscriptsDisabled);
                }
                Err(err) => {
                    tracing::warn!("Attempt {}/{} for {} failed: {}", attempt, max_attempts, video_id, err);
                    last_error = err;
                }
            }

            if !self.retry.wait_before_first_attempt && attempt < max_attempts {
                self.wait(attempt, cancel).await?;
            }
        }

        tracing::error!("Giving up on {} after {} attempts: {}", video_id, max_attempts, last_error);

        Err(match last_error {
            SourceError::RateLimited => ClassifiedError::RateLimited {
                service: ServiceKind::TranscriptSource,
            },
            other => ClassifiedError::TranscriptFetchFailed {
                attempts: max_attempts,
                last_message: other.to_string(),
            },
        })
    }

    /// Fallback path taken when the primary source reports no transcript.
    ///
    /// `attempts` counts primary source attempts only; the captions call is not included.
    async fn fetch_captions(
        &self,
        video_id: &VideoId,
        attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<TranscriptSegment>, ClassifiedError> {
        let no_captions = || ClassifiedError::TranscriptFetchFailed {
            attempts,
            last_message: NO_CAPTIONS_MESSAGE.to_string(),
        };

        let Some(captions) = &self.captions else {
            tracing::warn!("No transcript for {} and no captions fallback configured", video_id);
            return Err(no_captions());
        };

        tracing::info!("No transcript for {}, trying the captions API", video_id);

        if cancel.is_cancelled() {
            return Err(ClassifiedError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClassifiedError::Cancelled),
            outcome = captions.fetch_captions(video_id) => outcome,
        };

        match outcome {
            Ok(segments) if !segments.is_empty() => Ok(segments),
            Ok(_) | Err(SourceError::NoTranscript) | Err(SourceError::Disabled) => Err(no_captions()),
            Err(SourceError::RateLimited) => Err(ClassifiedError::RateLimited {
                service: ServiceKind::CaptionsApi,
            }),
            Err(SourceError::Other(message)) => Err(ClassifiedError::TranscriptFetchFailed {
                attempts,
                last_message: message,
            }),
        }
    }

    async fn wait(&self, attempt: u32, cancel: &CancellationToken) -> Result<(), ClassifiedError> {
        let delay = self.retry.backoff.delay(attempt);
        if delay.is_zero() {
            return Ok(());
        }

        tracing::debug!("Backing off for {} before the next attempt", format_duration(delay));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClassifiedError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
