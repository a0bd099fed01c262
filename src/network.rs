//! Fetching VAST documents and dispatching tracking pixels.

use crate::error::{Result, VastError};
use crate::host::TrackerDispatcher;
use crate::settings::Settings;
use log::{debug, info, warn};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Source of VAST documents, keyed by the `VASTAdTagURI` of a wrapper or the
/// input given by the caller.
pub trait VastFetcher {
    fn fetch(&self, url: &str) -> Result<String>;
}

impl<T: VastFetcher + ?Sized> VastFetcher for &T {
    fn fetch(&self, url: &str) -> Result<String> {
        (**self).fetch(url)
    }
}

/// Random ID tying together the log lines of one request
fn request_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect()
}

/// Fetches over HTTP with the configured timeout and user agent.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| VastError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(HttpFetcher { client })
    }
}

impl VastFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        let req_id = request_id();
        let parsed = url::Url::parse(url)?;

        info!("[{req_id}] Fetching from URL: {parsed}");
        let start_time = Instant::now();

        let response = self.client.get(parsed).send().map_err(|e| {
            warn!("[{req_id}] Request failed after {:?}", start_time.elapsed());
            VastError::fetch(url, e)
        })?;

        debug!("[{req_id}] Received response in {:?}", start_time.elapsed());

        if !response.status().is_success() {
            return Err(VastError::fetch(url, format!("HTTP status {}", response.status())));
        }

        let body = response.text().map_err(|e| VastError::fetch(url, e))?;
        debug!("[{req_id}] Total request completed in {:?}", start_time.elapsed());
        Ok(body)
    }
}

/// Reads `file://` URLs and plain paths.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher;

impl FileFetcher {
    /// The local path `url_or_path` points at, if it names a file
    pub fn local_path(url_or_path: &str) -> Option<PathBuf> {
        if let Some(path) = url_or_path.strip_prefix("file://") {
            #[cfg(target_os = "windows")]
            let path = path.trim_start_matches('/');
            return Some(PathBuf::from(path));
        }
        let path = Path::new(url_or_path);
        path.exists().then(|| path.to_path_buf())
    }
}

impl VastFetcher for FileFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        let path = FileFetcher::local_path(url)
            .ok_or_else(|| VastError::fetch(url, "not a local file"))?;
        debug!("Reading from file: {}", path.display());
        Ok(fs::read_to_string(path)?)
    }
}

/// Local files when the input names one, HTTP otherwise.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    http: HttpFetcher,
}

impl DefaultFetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(DefaultFetcher {
            http: HttpFetcher::new(settings)?,
        })
    }
}

impl VastFetcher for DefaultFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        match FileFetcher::local_path(url) {
            Some(_) => FileFetcher.fetch(url),
            None => self.http.fetch(url),
        }
    }
}

/// Serves documents from a map. Unknown URLs fail like a network error.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFetcher {
    documents: HashMap<String, String>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, xml: impl Into<String>) -> Self {
        self.documents.insert(url.into(), xml.into());
        self
    }
}

impl VastFetcher for InMemoryFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| VastError::fetch(url, "no such document"))
    }
}

/// Fires each tracking pixel on its own thread. Failures are logged and
/// otherwise dropped.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::blocking::Client,
}

impl HttpDispatcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| VastError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(HttpDispatcher { client })
    }
}

impl TrackerDispatcher for HttpDispatcher {
    fn fire_and_forget(&self, url: &str) {
        let client = self.client.clone();
        let url = url.to_string();
        std::thread::spawn(move || match client.get(&url).send() {
            Ok(response) if response.status().is_success() => debug!("Tracker sent: {url}"),
            Ok(response) => warn!("Tracker {url} answered {}", response.status()),
            Err(e) => warn!("Tracker {url} failed: {e}"),
        });
    }
}

/// Logs tracker URLs instead of sending them
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDispatcher;

impl TrackerDispatcher for LoggingDispatcher {
    fn fire_and_forget(&self, url: &str) {
        info!("Tracker: {url}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_fetcher() {
        let fetcher = InMemoryFetcher::new().with("https://ads/1", "<VAST/>");
        assert_eq!(fetcher.fetch("https://ads/1").unwrap(), "<VAST/>");
        assert!(matches!(
            fetcher.fetch("https://ads/2"),
            Err(VastError::FetchError { .. })
        ));
    }

    #[test]
    fn test_local_path_detection() {
        assert_eq!(
            FileFetcher::local_path("file:///tmp/vast.xml"),
            Some(PathBuf::from("/tmp/vast.xml"))
        );
        assert_eq!(FileFetcher::local_path("https://example.com/vast.xml"), None);
    }

    #[test]
    fn test_file_fetcher_reads_file() {
        let path = std::env::temp_dir().join(format!("vast-video-{}.xml", request_id()));
        fs::write(&path, "<VAST version=\"3.0\"/>").unwrap();
        let xml = FileFetcher.fetch(path.to_str().unwrap()).unwrap();
        assert_eq!(xml, "<VAST version=\"3.0\"/>");
        fs::remove_file(path).unwrap();
    }
}
