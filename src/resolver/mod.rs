use regex::Regex;
use serde::Serialize;
use url::Url;

/// Length of every canonical YouTube video id
pub const VIDEO_ID_LEN: usize = 11;

lazy_static::lazy_static! {
    /// Loose scan used when a URL cannot be taken apart structurally
    static ref FALLBACK_RE: Regex = Regex::new(r"(?:v=|/)([0-9A-Za-z_-]{11})")
        .expect("fallback pattern is valid");
}

/// Canonical 11-character YouTube video identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Validate a candidate id
    pub fn parse(candidate: &str) -> Option<Self> {
        if is_valid_id(candidate) {
            Some(Self(candidate.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_valid_id(candidate: &str) -> bool {
    candidate.len() == VIDEO_ID_LEN
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Resolve a user supplied URL to a video id.
///
/// Structured parsing (host, path, query) is tried first. Only when that yields
/// nothing is the string scanned for an 11-character token following a `v=` or
/// `/` delimiter. Returns `None` when no candidate exists.
pub fn resolve(url: &str) -> Option<VideoId> {
    let input = url.trim();
    if input.is_empty() {
        return None;
    }

    resolve_structured(input).or_else(|| resolve_fallback(input))
}

fn resolve_structured(input: &str) -> Option<VideoId> {
    let parsed = parse_youtube_url(input)?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    if host == "youtu.be" {
        let first = parsed.path_segments()?.next()?;
        return VideoId::parse(first);
    }

    if !is_youtube_host(host) {
        return None;
    }

    let from_query = parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .and_then(|(_, value)| VideoId::parse(&value));
    if from_query.is_some() {
        return from_query;
    }

    // embed/<id>, v/<id>, shorts/<id>, live/<id>
    let segments: Vec<&str> = parsed.path_segments()?.collect();
    segments
        .windows(2)
        .find(|pair| matches!(pair[0], "embed" | "v" | "shorts" | "live"))
        .and_then(|pair| VideoId::parse(pair[1]))
}

fn resolve_fallback(input: &str) -> Option<VideoId> {
    FALLBACK_RE
        .captures(input)
        .and_then(|caps| caps.get(1))
        .and_then(|m| VideoId::parse(m.as_str()))
}

/// Parse the input as a URL, adding a scheme to bare YouTube links
fn parse_youtube_url(input: &str) -> Option<Url> {
    let lower = input.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        input.to_string()
    } else if lower.contains("youtube.com") || lower.contains("youtu.be") || lower.contains("youtube-nocookie.com") {
        format!("https://{}", input)
    } else {
        return None;
    };

    Url::parse(&candidate).ok()
}

fn is_youtube_host(host: &str) -> bool {
    matches!(
        host,
        "youtube.com" | "m.youtube.com" | "music.youtube.com" | "youtube-nocookie.com"
    )
}
