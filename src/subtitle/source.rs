use std::path::Path;
use std::time::Duration;
use reqwest::Client;
use tracing::{info, warn};

use crate::error::{Result, SerifuError};
use super::SubtitleTrack;

/// Loads subtitle documents from a URL or a local file and parses them into
/// a track. A failed load leaves the previous track untouched at the call
/// site; this type only ever returns a complete new track or an error.
pub struct SubtitleLoader {
    client: Client,
}

impl SubtitleLoader {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self { client }
    }

    /// Load and parse a document. `source` is treated as a URL when it has
    /// an http scheme, as a file path otherwise.
    pub async fn load(&self, source: &str) -> Result<SubtitleTrack> {
        let content = if source.starts_with("http://") || source.starts_with("https://") {
            self.fetch_url(source).await?
        } else {
            read_with_encoding_fallback(Path::new(source)).await?
        };

        let track = SubtitleTrack::parse(&content);
        if track.is_empty() {
            return Err(SerifuError::Subtitle(format!(
                "No cues parsed from {}",
                source
            )));
        }

        info!("Loaded {} subtitle cues from {}", track.len(), source);
        Ok(track)
    }

    async fn fetch_url(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(SerifuError::Subtitle(format!(
                "Subtitle fetch failed with status {}",
                response.status()
            )));
        }

        Ok(response.text().await?)
    }
}

impl Default for SubtitleLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a subtitle file, trying UTF-8 first (byte-order marker tolerated)
/// and falling back to Windows-1251 for legacy Cyrillic documents. The
/// fallback decode is total over single bytes, so a file is only rejected
/// when it cannot be read at all.
async fn read_with_encoding_fallback(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(SerifuError::FileNotFound(path.display().to_string()));
    }

    let bytes = tokio::fs::read(path).await?;

    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            warn!(
                "Subtitle file {} is not UTF-8, retrying as Windows-1251",
                path.display()
            );
            let (text, _, _) = encoding_rs::WINDOWS_1251.decode(err.as_bytes());
            Ok(text.into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_utf8_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nhello\n").unwrap();

        let loader = SubtitleLoader::new();
        let track = loader.load(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(track.cues()[0].text, "hello");
    }

    #[tokio::test]
    async fn test_load_windows_1251_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"00:00:01.000 --> 00:00:02.000\n").unwrap();
        // "Привет" in Windows-1251
        file.write_all(&[0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2, b'\n'])
            .unwrap();

        let loader = SubtitleLoader::new();
        let track = loader.load(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(track.cues()[0].text, "Привет");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let loader = SubtitleLoader::new();
        let result = loader.load("/nonexistent/subtitles.vtt").await;
        assert!(matches!(result, Err(SerifuError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_load_rejects_cueless_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "WEBVTT\n\njust prose, no cues\n").unwrap();

        let loader = SubtitleLoader::new();
        assert!(loader.load(file.path().to_str().unwrap()).await.is_err());
    }
}
