use std::path::Path;
use tokio::fs;
use tracing::info;

use crate::error::{Result, EpisubError};

/// A single SRT cue
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Read and parse an SRT file
pub async fn read_srt<P: AsRef<Path>>(path: P) -> Result<Vec<Cue>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).await?;
    parse_srt(&content)
        .map_err(|e| EpisubError::Translation(format!("{}: {}", path.display(), e)))
}

/// Generate an SRT subtitle file from cues.
///
/// The content goes to a sibling `.partial` file first so a reader never sees
/// a half-written subtitle at `output_path`.
pub async fn generate_srt<P: AsRef<Path>>(cues: &[Cue], output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    info!("Generating SRT file: {}", output_path.display());

    let partial = output_path.with_extension("srt.partial");
    fs::write(&partial, render_srt(cues)).await?;
    fs::rename(&partial, output_path).await?;

    info!("SRT file generated successfully");
    Ok(())
}

pub fn render_srt(cues: &[Cue]) -> String {
    let mut srt_content = String::new();

    for (index, cue) in cues.iter().enumerate() {
        srt_content.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            format_srt_time(cue.start),
            format_srt_time(cue.end),
            cue.text.trim()
        ));
    }

    srt_content
}

/// Parse SRT content. Cue numbering in the input is ignored.
pub fn parse_srt(content: &str) -> std::result::Result<Vec<Cue>, String> {
    let normalized = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let mut cues = Vec::new();

    for block in normalized.split("\n\n") {
        let mut lines = block.lines().map(str::trim_end).filter(|l| !l.is_empty()).peekable();

        let Some(first) = lines.next() else {
            continue;
        };
        // The index line is optional in practice; the timing line is not
        let timing = if first.contains("-->") {
            first
        } else {
            lines.next().ok_or_else(|| format!("cue '{}' has no timing line", first))?
        };

        let (start, end) = timing
            .split_once("-->")
            .ok_or_else(|| format!("invalid timing line '{}'", timing))?;
        let start = parse_srt_time(start.trim())?;
        let end = parse_srt_time(end.trim())?;

        let text = lines.collect::<Vec<_>>().join("\n");
        cues.push(Cue { start, end, text });
    }

    Ok(cues)
}

/// Format time in seconds to SRT time format (HH:MM:SS,mmm)
fn format_srt_time(seconds: f64) -> String {
    let total_milliseconds = (seconds * 1000.0).round() as u64;
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

fn parse_srt_time(value: &str) -> std::result::Result<f64, String> {
    let invalid = || format!("invalid timestamp '{}'", value);

    let (clock, millis) = value.split_once([',', '.']).ok_or_else(invalid)?;
    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }

    let mut total = 0u64;
    for part in parts {
        total = total * 60 + part.parse::<u64>().map_err(|_| invalid())?;
    }
    let millis: u64 = millis.parse().map_err(|_| invalid())?;

    Ok(total as f64 + millis as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_srt_time() {
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
        assert_eq!(format_srt_time(65.123), "00:01:05,123");
        assert_eq!(format_srt_time(3661.500), "01:01:01,500");
    }

    #[test]
    fn test_parse_srt() {
        let content = "1\r\n00:00:01,000 --> 00:00:02,500\r\n你好\r\n\r\n2\r\n00:00:03,000 --> 00:00:04,000\r\n第一行\r\n第二行\r\n";
        let cues = parse_srt(content).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start, 1.0);
        assert_eq!(cues[0].end, 2.5);
        assert_eq!(cues[0].text, "你好");
        assert_eq!(cues[1].text, "第一行\n第二行");
    }

    #[test]
    fn test_parse_rejects_bad_timing() {
        assert!(parse_srt("1\nnot a timing line\nhello\n").is_err());
        assert!(parse_srt("1\n00:00:01 --> 00:00:02,000\nhello\n").is_err());
    }

    #[test]
    fn test_render_renumbers_cues() {
        let cues = vec![Cue { start: 1.0, end: 2.0, text: " hello ".to_string() }];
        assert_eq!(render_srt(&cues), "1\n00:00:01,000 --> 00:00:02,000\nhello\n\n");
    }

    #[tokio::test]
    async fn test_generate_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.srt");
        let cues = vec![
            Cue { start: 0.0, end: 1.2, text: "one".to_string() },
            Cue { start: 1.2, end: 3.0, text: "two".to_string() },
        ];
        generate_srt(&cues, &path).await.unwrap();

        assert!(!dir.path().join("out.srt.partial").exists());
        assert_eq!(read_srt(&path).await.unwrap(), cues);
    }
}
