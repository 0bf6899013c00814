use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod backoff;
pub mod fetcher;

use crate::config::Config;
use crate::improve::{user_prompt, ImproveError, ImprovementPolicy, OpenAiImprover, TextImprover, SYSTEM_INSTRUCTION};
use crate::resolver::VideoId;
use crate::utils::preview;
use crate::sources::{YoutubeDataApiCaptions, YoutubeTranscriptSource};
use crate::{ClassifiedError, Result, ServiceKind};

pub use backoff::BackoffPolicy;
pub use fetcher::{RetrySettings, TranscriptFetcher};

/// Fetch a transcript, then polish it with the completion service
pub struct TranscriptPipeline {
    fetcher: TranscriptFetcher,
    improver: Arc<dyn TextImprover>,
    policy: ImprovementPolicy,
}

impl TranscriptPipeline {
    pub fn new(fetcher: TranscriptFetcher, improver: Arc<dyn TextImprover>, policy: ImprovementPolicy) -> Self {
        Self {
            fetcher,
            improver,
            policy,
        }
    }

    /// Build the pipeline with the real YouTube and OpenAI clients
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = build_fetcher(config)?;

        let improver = OpenAiImprover::new(
            &config.improvement.api_base,
            config.openai_api_key()?.to_string(),
            config.improvement.model.clone(),
            Duration::from_secs(config.improvement.timeout_secs),
        )?;

        Ok(Self::new(fetcher, Arc::new(improver), config.improvement.policy))
    }

    pub fn policy(&self) -> ImprovementPolicy {
        self.policy
    }

    /// Run the whole pipeline without external cancellation
    pub async fn run(&self, video_id: &VideoId) -> std::result::Result<String, ClassifiedError> {
        self.run_with_cancel(video_id, &CancellationToken::new()).await
    }

    /// Run the whole pipeline, abandoning it as soon as `cancel` fires
    pub async fn run_with_cancel(
        &self,
        video_id: &VideoId,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, ClassifiedError> {
        let transcript = self.fetcher.fetch(video_id, cancel).await?;
        self.improve(video_id, transcript, cancel).await
    }

    async fn improve(
        &self,
        video_id: &VideoId,
        transcript: String,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, ClassifiedError> {
        if cancel.is_cancelled() {
            return Err(ClassifiedError::Cancelled);
        }

        tracing::info!("Improving transcript for {} ({} chars)", video_id, transcript.len());

        let prompt = user_prompt(&transcript);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClassifiedError::Cancelled),
            outcome = self.improver.improve(SYSTEM_INSTRUCTION, &prompt) => outcome,
        };

        match (outcome, self.policy) {
            (Ok(improved), _) => {
                tracing::debug!("Improved transcript for {}: {}", video_id, preview(&improved, 80));
                Ok(improved)
            }
            (Err(err), ImprovementPolicy::Lenient) => {
                tracing::warn!("Improvement failed for {}, returning raw transcript: {}", video_id, err);
                Ok(transcript)
            }
            (Err(ImproveError::RateLimited), ImprovementPolicy::Strict) => Err(ClassifiedError::RateLimited {
                service: ServiceKind::CompletionService,
            }),
            (Err(ImproveError::Failed(message)), ImprovementPolicy::Strict) => {
                tracing::error!("Improvement failed for {}: {}", video_id, message);
                Err(ClassifiedError::ImprovementFailed { message })
            }
        }
    }
}

/// Build the transcript fetcher alone, no completion service key required
pub fn build_fetcher(config: &Config) -> Result<TranscriptFetcher> {
    let source = YoutubeTranscriptSource::new(config.transcript.languages.clone(), config.http_timeout())?;
    let fetcher = TranscriptFetcher::new(Arc::new(source), config.retry_settings());

    if !config.transcript.captions_fallback {
        return Ok(fetcher);
    }

    let api_key = config
        .youtube_api_key
        .clone()
        .context("transcript.captions_fallback is enabled but YOUTUBE_API_KEY is not set")?;
    let captions = YoutubeDataApiCaptions::new(api_key, config.transcript.languages.clone(), config.http_timeout())?;

    Ok(fetcher.with_captions(Arc::new(captions)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::improve::MockTextImprover;
    use crate::sources::{MockTranscriptSource, SourceError, TranscriptSegment};

    fn video() -> VideoId {
        VideoId::parse("dQw4w9WgXcQ").unwrap()
    }

    fn fetcher_returning(result: std::result::Result<Vec<TranscriptSegment>, SourceError>) -> TranscriptFetcher {
        let mut source = MockTranscriptSource::new();
        source.expect_name().return_const("mock");
        source.expect_fetch().returning(move |_| result.clone());

        TranscriptFetcher::new(
            Arc::new(source),
            RetrySettings {
                max_retries: 3,
                backoff: BackoffPolicy::Fixed { seconds: 0.0 },
                wait_before_first_attempt: false,
            },
        )
    }

    fn hello_world() -> std::result::Result<Vec<TranscriptSegment>, SourceError> {
        Ok(vec![
            TranscriptSegment::new("hello", 0.0, 1.0),
            TranscriptSegment::new("world", 1.0, 1.0),
        ])
    }

    #[tokio::test]
    async fn test_improver_receives_instruction_and_transcript() {
        let mut improver = MockTextImprover::new();
        improver
            .expect_improve()
            .withf(|system, user| system.to_string() == SYSTEM_INSTRUCTION && user.ends_with("\n\nhello world"))
            .times(1)
            .returning(|_, _| Ok("Hello, world.".to_string()));

        let pipeline = TranscriptPipeline::new(fetcher_returning(hello_world()), Arc::new(improver), ImprovementPolicy::Strict);

        assert_eq!(pipeline.run(&video()).await.unwrap(), "Hello, world.");
    }

    #[tokio::test]
    async fn test_strict_policy_propagates_rate_limit() {
        let mut improver = MockTextImprover::new();
        improver.expect_improve().returning(|_, _| Err(ImproveError::RateLimited));

        let pipeline = TranscriptPipeline::new(fetcher_returning(hello_world()), Arc::new(improver), ImprovementPolicy::Strict);

        assert_eq!(
            pipeline.run(&video()).await.unwrap_err(),
            ClassifiedError::RateLimited {
                service: ServiceKind::CompletionService
            }
        );
    }

    #[tokio::test]
    async fn test_strict_policy_propagates_failure() {
        let mut improver = MockTextImprover::new();
        improver
            .expect_improve()
            .returning(|_, _| Err(ImproveError::Failed("model overloaded".to_string())));

        let pipeline = TranscriptPipeline::new(fetcher_returning(hello_world()), Arc::new(improver), ImprovementPolicy::Strict);

        assert_eq!(
            pipeline.run(&video()).await.unwrap_err(),
            ClassifiedError::ImprovementFailed {
                message: "model overloaded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_lenient_policy_returns_raw_transcript() {
        let mut improver = MockTextImprover::new();
        improver.expect_improve().returning(|_, _| Err(ImproveError::RateLimited));

        let pipeline = TranscriptPipeline::new(fetcher_returning(hello_world()), Arc::new(improver), ImprovementPolicy::Lenient);

        assert_eq!(pipeline.run(&video()).await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_improvement() {
        let mut improver = MockTextImprover::new();
        improver.expect_improve().times(0);

        let pipeline = TranscriptPipeline::new(
            fetcher_returning(Err(SourceError::Disabled)),
            Arc::new(improver),
            ImprovementPolicy::Lenient,
        );

        assert_eq!(pipeline.run(&video()).await.unwrap_err(), ClassifiedError::TranscriptsDisabled);
    }

    #[test]
    fn test_from_config_requires_openai_key() {
        let config = Config::default();
        assert!(TranscriptPipeline::from_config(&config).is_err());

        let mut config = Config::default();
        config.openai_api_key = Some("sk-test".to_string());
        assert!(TranscriptPipeline::from_config(&config).is_ok());
    }

    #[test]
    fn test_captions_fallback_requires_key() {
        let mut config = Config::default();
        config.transcript.captions_fallback = true;
        assert!(build_fetcher(&config).is_err());

        config.youtube_api_key = Some("yt-key".to_string());
        assert!(build_fetcher(&config).is_ok());
    }
}
