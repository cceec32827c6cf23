//! Image acquisition for the parallax viewer.
//!
//! The viewer needs exactly two images before it can draw: the colour image
//! and its depth map. Each one is fetched and decoded on its own worker
//! thread; [`PendingImages`] counts the arrivals down and hands back the
//! decoded images ordered by the position they were requested in, no matter
//! which download finished first.

mod fetch;
mod pending;
mod source;

pub use fetch::{ImageFetcher, SourceFetcher};
pub use pending::{load_images, PendingImages};
pub use source::{request_mode, ImageSource, RequestMode};

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("invalid image source '{raw}': {reason}")]
    InvalidSource { raw: String, reason: String },
    #[error("failed to fetch image #{index} from {location}: {message}")]
    Fetch {
        index: usize,
        location: String,
        message: String,
    },
    #[error("failed to decode image #{index} from {location}: {error}")]
    Decode {
        index: usize,
        location: String,
        #[source]
        error: image::ImageError,
    },
    #[error("timed out after {timeout:?} waiting for {}", .missing.join(", "))]
    Timeout {
        timeout: Duration,
        missing: Vec<String>,
    },
    #[error("image loader stopped before all images were reported")]
    Disconnected,
    #[error("failed to spawn image loader thread: {0}")]
    Spawn(#[source] std::io::Error),
}
