use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{CaptionsSource, SourceError, TranscriptSegment};
use crate::resolver::VideoId;
use crate::Result;

const CAPTIONS_API_URL: &str = "https://www.googleapis.com/youtube/v3/captions";

#[derive(Debug, Deserialize)]
struct CaptionListResponse {
    #[serde(default)]
    items: Vec<CaptionItem>,
}

#[derive(Debug, Deserialize)]
struct CaptionItem {
    id: String,
    snippet: CaptionSnippet,
}

#[derive(Debug, Deserialize)]
struct CaptionSnippet {
    language: String,
    #[serde(rename = "trackKind", default)]
    track_kind: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorReason {
    #[serde(default)]
    reason: String,
}

/// Captions fetched through the official YouTube Data API v3
pub struct YoutubeDataApiCaptions {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    languages: Vec<String>,
}

impl YoutubeDataApiCaptions {
    pub fn new(api_key: String, languages: Vec<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build captions API client")?;

        Ok(Self {
            client,
            endpoint: CAPTIONS_API_URL.to_string(),
            api_key,
            languages,
        })
    }

    async fn list_tracks(&self, video_id: &VideoId) -> std::result::Result<Vec<CaptionItem>, SourceError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("part", "snippet"),
                ("videoId", video_id.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error(status.as_u16(), &body));
        }

        let list: CaptionListResponse = response.json().await?;
        Ok(list.items)
    }

    async fn download_track(&self, caption_id: &str) -> std::result::Result<String, SourceError> {
        let response = self
            .client
            .get(format!("{}/{}", self.endpoint, caption_id))
            .query(&[("tfmt", "srt"), ("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error(status.as_u16(), &body));
        }

        Ok(response.text().await?)
    }

    /// Prefer standard tracks in the configured languages, then anything
    fn pick<'a>(&self, items: &'a [CaptionItem]) -> Option<&'a CaptionItem> {
        self.languages
            .iter()
            .find_map(|lang| {
                items
                    .iter()
                    .find(|item| &item.snippet.language == lang && item.snippet.track_kind != "asr")
                    .or_else(|| items.iter().find(|item| &item.snippet.language == lang))
            })
            .or_else(|| items.first())
    }
}

#[async_trait]
impl CaptionsSource for YoutubeDataApiCaptions {
    async fn fetch_captions(&self, video_id: &VideoId) -> std::result::Result<Vec<TranscriptSegment>, SourceError> {
        let items = self.list_tracks(video_id).await?;
        let Some(item) = self.pick(&items) else {
            return Err(SourceError::NoTranscript);
        };

        tracing::debug!("Downloading caption track {} ({})", item.id, item.snippet.language);

        let srt = self.download_track(&item.id).await?;
        let segments = parse_srt(&srt);
        if segments.is_empty() {
            return Err(SourceError::NoTranscript);
        }

        Ok(segments)
    }
}

fn classify_api_error(status: u16, body: &str) -> SourceError {
    let detail = serde_json::from_str::<ApiErrorBody>(body).ok().map(|b| b.error);

    let quota = detail
        .as_ref()
        .map(|d| {
            d.errors
                .iter()
                .any(|e| matches!(e.reason.as_str(), "quotaExceeded" | "rateLimitExceeded" | "userRateLimitExceeded"))
        })
        .unwrap_or(false);

    if status == 429 || quota {
        return SourceError::RateLimited;
    }

    match status {
        404 => SourceError::NoTranscript,
        _ => {
            let message = detail
                .map(|d| d.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "no details".to_string());
            SourceError::Other(format!("Captions API returned HTTP {}: {}", status, message))
        }
    }
}

/// Parse SubRip text into segments
pub(crate) fn parse_srt(srt: &str) -> Vec<TranscriptSegment> {
    let normalized = srt.replace("\r\n", "\n");

    normalized
        .split("\n\n")
        .filter_map(|block| {
            let mut lines = block.lines().map(str::trim).skip_while(|l| l.is_empty());
            // Cue number is optional in practice
            let mut timing = lines.next()?;
            if !timing.contains("-->") {
                timing = lines.next()?;
            }
            let (start, end) = timing.split_once("-->")?;
            let start = parse_srt_timestamp(start.trim())?;
            let end = parse_srt_timestamp(end.trim())?;

            let text = lines.filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return None;
            }

            Some(TranscriptSegment::new(text, start, (end - start).max(0.0)))
        })
        .collect()
}

/// `HH:MM:SS,mmm` to seconds
fn parse_srt_timestamp(value: &str) -> Option<f64> {
    let (clock, millis) = value.split_once([',', '.'])?;
    let mut parts = clock.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    let millis: f64 = millis.get(..3).unwrap_or(millis).parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds + millis / 1000.0)
}
