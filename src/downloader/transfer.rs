use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::TransferError;

/// Write buffer size for downloads (256 KB).
const WRITE_BUFFER_SIZE: usize = 256 * 1024;

/// Fetches a url and stores its bytes under a filename.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Returns the path the bytes were written to.
    async fn fetch_and_persist(&self, url: &str, filename: &str)
    -> Result<PathBuf, TransferError>;
}

#[async_trait]
impl<T: Downloader + ?Sized> Downloader for Arc<T> {
    async fn fetch_and_persist(
        &self,
        url: &str,
        filename: &str,
    ) -> Result<PathBuf, TransferError> {
        (**self).fetch_and_persist(url, filename).await
    }
}

/// Downloads over HTTP into a local directory. Never overwrites a file: a
/// name that is already on disk or taken by another download of this
/// instance gets a " (2)", " (3)", ... suffix.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
    output_dir: PathBuf,
    claimed: Arc<Mutex<HashSet<PathBuf>>>,
}

impl HttpDownloader {
    pub fn new(client: reqwest::Client, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            output_dir: output_dir.into(),
            claimed: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Picks the first free variant of `name` and holds it for this download.
    async fn reserve(&self, name: &str) -> Result<PathBuf, TransferError> {
        let mut claimed = self.claimed.lock().await;
        let mut n = 1;
        loop {
            let candidate = self.output_dir.join(numbered_file_name(name, n));
            if !claimed.contains(&candidate) {
                let exists = fs::try_exists(&candidate)
                    .await
                    .map_err(|source| TransferError::Io {
                        path: candidate.clone(),
                        source,
                    })?;
                if !exists {
                    claimed.insert(candidate.clone());
                    return Ok(candidate);
                }
            }
            n += 1;
        }
    }

    async fn persist(&self, response: reqwest::Response, target: &Path) -> Result<u64, TransferError> {
        let mut partial = target.to_path_buf().into_os_string();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        let written = match write_stream(response, &partial).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&partial).await;
                return Err(err);
            }
        };

        fs::rename(&partial, target)
            .await
            .map_err(|source| TransferError::Io {
                path: target.to_path_buf(),
                source,
            })?;
        Ok(written)
    }
}

async fn write_stream(response: reqwest::Response, path: &Path) -> Result<u64, TransferError> {
    let io_error = |source| TransferError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).await.map_err(io_error)?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await.map_err(io_error)?;
        written += chunk.len() as u64;
    }
    writer.flush().await.map_err(io_error)?;

    Ok(written)
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch_and_persist(
        &self,
        url: &str,
        filename: &str,
    ) -> Result<PathBuf, TransferError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(TransferError::Status {
                status: response.status().as_u16(),
            });
        }

        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| TransferError::Io {
                path: self.output_dir.clone(),
                source,
            })?;

        let target = self.reserve(&file_name_for(filename, url)).await?;
        match self.persist(response, &target).await {
            Ok(bytes) => {
                debug!(path = %target.display(), bytes, "persisted download");
                Ok(target)
            }
            Err(err) => {
                warn!(path = %target.display(), "discarding partial download");
                self.claimed.lock().await.remove(&target);
                Err(err)
            }
        }
    }
}

/// `n == 1` is the name itself; later variants go before the extension,
/// e.g. "Intro (2).m4a".
fn numbered_file_name(name: &str, n: u32) -> String {
    if n <= 1 {
        return name.to_string();
    }
    match file_extension(name) {
        Some(ext) => {
            let stem = &name[..name.len() - ext.len() - 1];
            format!("{} ({}).{}", stem, n, ext)
        }
        None => format!("{} ({})", name, n),
    }
}

/// Builds the on-disk name for a track: the sanitized title, plus the url's
/// extension when the title has none of its own.
pub fn file_name_for(title: &str, url: &str) -> String {
    let mut name = sanitize_file_name(title);
    if file_extension(&name).is_none() {
        if let Some(ext) = url_extension(url) {
            name.push('.');
            name.push_str(&ext);
        }
    }
    name
}

pub fn sanitize_file_name(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c.is_whitespace() || c == '.');
    if trimmed.is_empty() {
        "track".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Only short alphanumeric suffixes with at least one letter count, so
/// neither "Vol. 2" nor "Lesson 1.2" has an extension.
fn file_extension(name: &str) -> Option<&str> {
    let ext = Path::new(name).extension()?.to_str()?;
    if (1..=5).contains(&ext.len())
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
        && ext.chars().any(|c| c.is_ascii_alphabetic())
    {
        Some(ext)
    } else {
        None
    }
}

fn url_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    file_extension(last).map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};
    use tokio::net::TcpListener;

    async fn start_mock_cdn() -> String {
        let app = Router::new()
            .route("/audio/track.m4a", get(|| async { "fake-audio-bytes" }))
            .route("/a.m4a", get(|| async { "AAAA" }))
            .route("/b.m4a", get(|| async { "BBBB" }))
            .route("/missing.mp3", get(|| async { StatusCode::NOT_FOUND }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Chapter 1: Intro"), "Chapter 1_ Intro");
        assert_eq!(sanitize_file_name("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_file_name("  .hidden. "), "hidden");
        assert_eq!(sanitize_file_name("tab\there"), "tab_here");
        assert_eq!(sanitize_file_name(" .. "), "track");
        assert_eq!(sanitize_file_name("第一集"), "第一集");
    }

    #[test]
    fn test_file_name_takes_extension_from_url() {
        assert_eq!(
            file_name_for("Episode 3", "https://cdn.example/a/b/xyz.M4A?sign=1"),
            "Episode 3.m4a"
        );
        assert_eq!(
            file_name_for("song.mp3", "https://cdn.example/xyz.m4a"),
            "song.mp3"
        );
        assert_eq!(
            file_name_for("Episode 3", "https://cdn.example/stream"),
            "Episode 3"
        );
        assert_eq!(file_name_for("Episode 3", "not a url"), "Episode 3");
        assert_eq!(
            file_name_for("Vol. 2", "https://cdn.example/xyz.mp3"),
            "Vol. 2.mp3"
        );
        assert_eq!(
            file_name_for("Lesson 1.2", "https://cdn.example/xyz.m4a"),
            "Lesson 1.2.m4a"
        );
    }

    #[test]
    fn test_numbered_file_name() {
        assert_eq!(numbered_file_name("Intro.m4a", 1), "Intro.m4a");
        assert_eq!(numbered_file_name("Intro.m4a", 2), "Intro (2).m4a");
        assert_eq!(numbered_file_name("Intro", 3), "Intro (3)");
        assert_eq!(numbered_file_name("Lesson 1.2", 2), "Lesson 1.2 (2)");
    }

    #[tokio::test]
    async fn test_fetch_and_persist_writes_file() {
        let base = start_mock_cdn().await;
        let dir = tempfile::tempdir().unwrap();
        let downloader = HttpDownloader::new(reqwest::Client::new(), dir.path().join("album"));

        let path = downloader
            .fetch_and_persist(&format!("{}/audio/track.m4a", base), "Ep: 1")
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("album").join("Ep_ 1.m4a"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fake-audio-bytes");
        assert!(!dir.path().join("album").join("Ep_ 1.m4a.part").exists());
    }

    #[tokio::test]
    async fn test_fetch_and_persist_error_status() {
        let base = start_mock_cdn().await;
        let dir = tempfile::tempdir().unwrap();
        let downloader = HttpDownloader::new(reqwest::Client::new(), dir.path());

        let result = downloader
            .fetch_and_persist(&format!("{}/missing.mp3", base), "gone")
            .await;

        assert!(matches!(result, Err(TransferError::Status { status: 404 })));
        assert!(!dir.path().join("gone.mp3").exists());
    }

    #[tokio::test]
    async fn test_fetch_and_persist_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = HttpDownloader::new(reqwest::Client::new(), dir.path());

        let result = downloader
            .fetch_and_persist("http://127.0.0.1:1/x.mp3", "x")
            .await;

        assert!(matches!(result, Err(TransferError::Request(_))));
    }

    #[tokio::test]
    async fn test_same_title_keeps_both_files() {
        let base = start_mock_cdn().await;
        let dir = tempfile::tempdir().unwrap();
        let downloader = HttpDownloader::new(reqwest::Client::new(), dir.path());

        let first = downloader
            .fetch_and_persist(&format!("{}/a.m4a", base), "Intro")
            .await
            .unwrap();
        let second = downloader
            .fetch_and_persist(&format!("{}/b.m4a", base), "Intro")
            .await
            .unwrap();

        assert_eq!(first, dir.path().join("Intro.m4a"));
        assert_eq!(second, dir.path().join("Intro (2).m4a"));
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "AAAA");
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "BBBB");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_same_title_concurrently_keeps_both_files() {
        let base = start_mock_cdn().await;
        let dir = tempfile::tempdir().unwrap();
        let downloader = HttpDownloader::new(reqwest::Client::new(), dir.path());
        let url_a = format!("{}/a.m4a", base);
        let url_b = format!("{}/b.m4a", base);

        let (a, b) = tokio::join!(
            downloader.fetch_and_persist(&url_a, "预告"),
            downloader.fetch_and_persist(&url_b, "预告"),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a, b);
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "AAAA");
        assert_eq!(std::fs::read_to_string(&b).unwrap(), "BBBB");
        let names: HashSet<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(
            names,
            HashSet::from(["预告.m4a".to_string(), "预告 (2).m4a".to_string()])
        );
    }

    #[tokio::test]
    async fn test_existing_file_is_not_overwritten() {
        let base = start_mock_cdn().await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Intro.m4a"), "old").unwrap();
        let downloader = HttpDownloader::new(reqwest::Client::new(), dir.path());

        let path = downloader
            .fetch_and_persist(&format!("{}/a.m4a", base), "Intro")
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("Intro (2).m4a"));
        assert_eq!(std::fs::read_to_string(dir.path().join("Intro.m4a")).unwrap(), "old");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "AAAA");
    }
}
