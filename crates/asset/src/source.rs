//! Asset locations: a local path or an `http(s)://` URL.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, ensure};

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetSource {
    Path(PathBuf),
    Url(String),
}

impl AssetSource {
    /// Classify a location string. `file://` prefixes are stripped.
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            AssetSource::Url(location.to_owned())
        } else if lower.starts_with("file://") {
            AssetSource::Path(PathBuf::from(&location["file://".len()..]))
        } else {
            AssetSource::Path(PathBuf::from(location))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, AssetSource::Url(_))
    }

    /// Read the whole resource. Blocking; call from a loader thread.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        match self {
            AssetSource::Path(path) => {
                std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
            }
            AssetSource::Url(url) => fetch(url),
        }
    }
}

impl From<&str> for AssetSource {
    fn from(location: &str) -> Self {
        AssetSource::parse(location)
    }
}

impl fmt::Display for AssetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetSource::Path(path) => write!(f, "{}", path.display()),
            AssetSource::Url(url) => f.write_str(url),
        }
    }
}

fn fetch(url: &str) -> Result<Vec<u8>> {
    log::info!("Fetching {url}");
    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("GET {url} failed"))?;
    let status = response.status();
    ensure!(status.is_success(), "GET {url} returned {status}");
    let bytes = response
        .bytes()
        .with_context(|| format!("Failed to read body of {url}"))?;
    log::debug!("Fetched {} bytes from {url}", bytes.len());
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_and_paths_are_told_apart() {
        let hdr = "https://dl.polyhaven.org/file/ph-assets/HDRIs/hdr/1k/studio_small_09_1k.hdr";
        assert_eq!(AssetSource::parse(hdr), AssetSource::Url(hdr.to_owned()));
        assert!(AssetSource::parse("HTTP://example.com/a.hdr").is_remote());
        assert_eq!(
            AssetSource::parse("assets/studio.hdr"),
            AssetSource::Path(PathBuf::from("assets/studio.hdr"))
        );
        assert_eq!(
            AssetSource::parse("file:///tmp/env.hdr"),
            AssetSource::Path(PathBuf::from("/tmp/env.hdr"))
        );
        assert!(!AssetSource::parse("C:\\maps\\env.hdr").is_remote());
        assert_eq!(AssetSource::from(" /abs/env.hdr ").to_string(), "/abs/env.hdr");
    }

    #[test]
    fn local_reads_go_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let source = AssetSource::Path(path);
        assert_eq!(source.read_bytes().unwrap(), vec![1, 2, 3]);
        assert!(AssetSource::Path(dir.path().join("missing")).read_bytes().is_err());
    }

    #[test]
    fn unreachable_url_is_an_error() {
        // Port 9 (discard) has no HTTP listener.
        assert!(AssetSource::parse("http://127.0.0.1:9/env.hdr").read_bytes().is_err());
    }
}
