use std::fmt;
use std::path::{Path, PathBuf};

use reqwest::Url;

use crate::LoadError;

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Remote(Url),
    Local(PathBuf),
}

impl ImageSource {
    /// Interprets a scene entry as a URL or filesystem path.
    ///
    /// `http(s)://` entries are remote, `file://` URLs and bare paths are
    /// local. Relative paths resolve against `base_dir` when one is given.
    pub fn parse(raw: &str, base_dir: Option<&Path>) -> Result<Self, LoadError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LoadError::InvalidSource {
                raw: raw.to_string(),
                reason: "source must not be empty".into(),
            });
        }

        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let url = Url::parse(trimmed).map_err(|err| LoadError::InvalidSource {
                raw: raw.to_string(),
                reason: err.to_string(),
            })?;
            return Ok(Self::Remote(url));
        }

        if trimmed.starts_with("file://") {
            let path = Url::parse(trimmed)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| LoadError::InvalidSource {
                    raw: raw.to_string(),
                    reason: "not a valid file URL".into(),
                })?;
            return Ok(Self::Local(path));
        }

        let path = PathBuf::from(trimmed);
        let path = match base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        };
        Ok(Self::Local(path))
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Remote(url) => write!(f, "{url}"),
            ImageSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Credential handling for a remote fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Same origin as the scene; configured headers are attached.
    SameOrigin,
    /// Cross-origin; the request carries no configured credentials.
    Anonymous,
}

/// Classifies a request against the page origin. Without a page origin every
/// remote request is cross-origin.
pub fn request_mode(url: &Url, page_origin: Option<&Url>) -> RequestMode {
    match page_origin {
        Some(origin) if origin.origin() == url.origin() => RequestMode::SameOrigin,
        _ => RequestMode::Anonymous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_remote_and_local_sources() {
        let remote = ImageSource::parse("https://cdn.example.com/a.jpg", None).unwrap();
        assert!(matches!(remote, ImageSource::Remote(_)));

        let local = ImageSource::parse("depth.png", Some(Path::new("/scenes"))).unwrap();
        assert_eq!(local, ImageSource::Local(PathBuf::from("/scenes/depth.png")));

        let absolute = ImageSource::parse("/tmp/a.png", Some(Path::new("/scenes"))).unwrap();
        assert_eq!(absolute, ImageSource::Local(PathBuf::from("/tmp/a.png")));
    }

    #[test]
    fn parses_file_urls_as_local() {
        let source = ImageSource::parse("file:///tmp/photo.png", None).unwrap();
        assert_eq!(source, ImageSource::Local(PathBuf::from("/tmp/photo.png")));
    }

    #[test]
    fn rejects_empty_source() {
        let err = ImageSource::parse("  ", None).unwrap_err();
        assert!(matches!(err, LoadError::InvalidSource { .. }));
    }

    #[test]
    fn cross_origin_requests_are_anonymous() {
        let page = Url::parse("https://example.com/gallery/").unwrap();
        let same = Url::parse("https://example.com/img/a.jpg").unwrap();
        let other_host = Url::parse("https://cdn.example.com/a.jpg").unwrap();
        let other_port = Url::parse("https://example.com:8443/a.jpg").unwrap();

        assert_eq!(request_mode(&same, Some(&page)), RequestMode::SameOrigin);
        assert_eq!(request_mode(&other_host, Some(&page)), RequestMode::Anonymous);
        assert_eq!(request_mode(&other_port, Some(&page)), RequestMode::Anonymous);
        assert_eq!(request_mode(&same, None), RequestMode::Anonymous);
    }
}
