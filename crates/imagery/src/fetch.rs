use std::collections::BTreeMap;
use std::fs;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use tracing::debug;

use crate::source::{request_mode, ImageSource, RequestMode};

/// Retrieves the raw bytes behind an [`ImageSource`].
///
/// Implementations run on loader worker threads, one call per image.
pub trait ImageFetcher: Send + Sync + 'static {
    fn fetch(&self, source: &ImageSource) -> Result<Vec<u8>>;
}

/// Fetcher backed by the filesystem and a blocking HTTP client.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    http: Client,
    page_origin: Option<Url>,
    headers: HeaderMap,
}

impl SourceFetcher {
    pub fn new(page_origin: Option<&str>, headers: &BTreeMap<String, String>) -> Result<Self> {
        let page_origin = page_origin
            .map(|origin| Url::parse(origin).with_context(|| format!("parsing page origin '{origin}'")))
            .transpose()?;

        let mut header_map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| anyhow!("invalid header name '{name}': {err}"))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| anyhow!("invalid value for header '{name}': {err}"))?;
            header_map.insert(name, value);
        }

        let http = Client::builder()
            .build()
            .context("failed to construct HTTP client")?;
        Ok(Self {
            http,
            page_origin,
            headers: header_map,
        })
    }

    fn fetch_remote(&self, url: &Url) -> Result<Vec<u8>> {
        let mode = request_mode(url, self.page_origin.as_ref());
        debug!(%url, ?mode, "requesting image");
        let mut request = self.http.get(url.clone());
        if mode == RequestMode::SameOrigin && !self.headers.is_empty() {
            request = request.headers(self.headers.clone());
        }
        let response = request
            .send()
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()
            .context("image request returned an error status")?;
        let bytes = response.bytes().context("reading image response body")?;
        Ok(bytes.to_vec())
    }
}

impl ImageFetcher for SourceFetcher {
    fn fetch(&self, source: &ImageSource) -> Result<Vec<u8>> {
        match source {
            ImageSource::Remote(url) => self.fetch_remote(url),
            ImageSource::Local(path) => {
                debug!(path = %path.display(), "reading image");
                fs::read(path).with_context(|| format!("reading {}", path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bytes.bin");
        fs::write(&path, [1u8, 2, 3]).unwrap();

        let fetcher = SourceFetcher::new(None, &BTreeMap::new()).unwrap();
        let bytes = fetcher.fetch(&ImageSource::Local(path)).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn missing_local_file_is_an_error() {
        let fetcher = SourceFetcher::new(None, &BTreeMap::new()).unwrap();
        let err = fetcher
            .fetch(&ImageSource::Local("/no/such/image.png".into()))
            .unwrap_err();
        assert!(format!("{err:#}").contains("/no/such/image.png"));
    }

    #[test]
    fn rejects_invalid_header_names() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        assert!(SourceFetcher::new(None, &headers).is_err());
    }
}
