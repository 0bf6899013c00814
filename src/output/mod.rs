use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::resolver::VideoId;

/// Result of a locally processed URL
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub video_id: VideoId,

    /// Final transcript text
    pub transcript: String,

    /// Whether the completion service was asked to improve the text
    pub improved: bool,

    /// Wall-clock processing time in seconds
    pub elapsed_secs: f64,

    pub processed_at: DateTime<Utc>,
}

pub fn format_as_text(result: &ProcessResult) -> String {
    result.transcript.clone()
}

pub fn format_as_json(result: &ProcessResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("Failed to serialize result")
}

fn render(result: &ProcessResult, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format_as_text(result)),
        OutputFormat::Json => format_as_json(result),
    }
}

/// Save result to file
pub fn save_to_file(result: &ProcessResult, path: &Path, format: &OutputFormat) -> Result<()> {
    let content = render(result, format)?;
    fs_err::write(path, content)?;
    Ok(())
}

/// Print result to console
pub fn print_to_console(result: &ProcessResult, format: &OutputFormat) -> Result<()> {
    println!("{}", render(result, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProcessResult {
        ProcessResult {
            video_id: VideoId::parse("dQw4w9WgXcQ").unwrap(),
            transcript: "Hello, world.".to_string(),
            improved: true,
            elapsed_secs: 1.5,
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn test_text_is_transcript_only() {
        assert_eq!(format_as_text(&sample()), "Hello, world.");
    }

    #[test]
    fn test_json_contains_metadata() {
        let json: serde_json::Value = serde_json::from_str(&format_as_json(&sample()).unwrap()).unwrap();
        assert_eq!(json["video_id"], "dQw4w9WgXcQ");
        assert_eq!(json["transcript"], "Hello, world.");
        assert_eq!(json["improved"], true);
    }

    #[test]
    fn test_save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        save_to_file(&sample(), &path, &OutputFormat::Text).unwrap();
        assert_eq!(fs_err::read_to_string(&path).unwrap(), "Hello, world.");
    }
}
