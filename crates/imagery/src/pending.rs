use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, TryRecvError};
use image::RgbaImage;
use tracing::{debug, info};

use crate::fetch::ImageFetcher;
use crate::source::ImageSource;
use crate::LoadError;

type LoadReport = (usize, Result<RgbaImage, LoadError>);

/// Upper bound on the wait when the requested timeout would overflow the clock.
const MAX_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Images still in flight.
///
/// Arrivals are counted down as workers report; once every image has
/// arrived they are returned sorted by request index. The first failure or
/// the deadline ends the wait.
pub struct PendingImages {
    receiver: Receiver<LoadReport>,
    locations: Vec<String>,
    slots: Vec<Option<RgbaImage>>,
    received: usize,
    timeout: Duration,
    deadline: Instant,
    delivered: bool,
}

/// Starts one worker per source and returns the pending set.
pub fn load_images<F>(
    fetcher: Arc<F>,
    sources: Vec<ImageSource>,
    timeout: Duration,
) -> Result<PendingImages, LoadError>
where
    F: ImageFetcher + ?Sized,
{
    let (sender, receiver) = unbounded();
    let locations: Vec<String> = sources.iter().map(ToString::to_string).collect();

    for (index, source) in sources.into_iter().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let sender = sender.clone();
        thread::Builder::new()
            .name(format!("image-load-{index}"))
            .spawn(move || {
                let result = fetch_and_decode(fetcher.as_ref(), index, &source);
                let _ = sender.send((index, result));
            })
            .map_err(LoadError::Spawn)?;
    }

    let now = Instant::now();
    let deadline = now
        .checked_add(timeout)
        .unwrap_or_else(|| now + MAX_WAIT);

    Ok(PendingImages {
        receiver,
        slots: locations.iter().map(|_| None).collect(),
        locations,
        received: 0,
        timeout,
        deadline,
        delivered: false,
    })
}

fn fetch_and_decode<F>(
    fetcher: &F,
    index: usize,
    source: &ImageSource,
) -> Result<RgbaImage, LoadError>
where
    F: ImageFetcher + ?Sized,
{
    let bytes = fetcher.fetch(source).map_err(|err| LoadError::Fetch {
        index,
        location: source.to_string(),
        message: format!("{err:#}"),
    })?;
    let decoded = image::load_from_memory(&bytes).map_err(|error| LoadError::Decode {
        index,
        location: source.to_string(),
        error,
    })?;
    let rgba = decoded.to_rgba8();
    debug!(
        index,
        source = %source,
        width = rgba.width(),
        height = rgba.height(),
        "image decoded"
    );
    Ok(rgba)
}

impl PendingImages {
    /// Time at which the wait gives up.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Number of images that have not arrived yet.
    pub fn remaining(&self) -> usize {
        self.locations.len().saturating_sub(self.received)
    }

    /// Drains finished loads without blocking.
    ///
    /// Returns the ordered images once, on the call that completes the set,
    /// and `Ok(None)` while loads are outstanding or after delivery.
    pub fn poll(&mut self, now: Instant) -> Result<Option<Vec<RgbaImage>>, LoadError> {
        if self.delivered {
            return Ok(None);
        }

        loop {
            match self.receiver.try_recv() {
                Ok(report) => self.record(report)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.remaining() > 0 {
                        return Err(LoadError::Disconnected);
                    }
                    break;
                }
            }
        }

        if self.remaining() == 0 {
            return Ok(Some(self.deliver()));
        }
        if now >= self.deadline {
            return Err(self.timeout_error());
        }
        Ok(None)
    }

    /// Blocks until every image has arrived, one fails, or the deadline passes.
    pub fn wait(mut self) -> Result<Vec<RgbaImage>, LoadError> {
        while self.remaining() > 0 {
            match self.receiver.recv_deadline(self.deadline) {
                Ok(report) => self.record(report)?,
                Err(RecvTimeoutError::Timeout) => return Err(self.timeout_error()),
                Err(RecvTimeoutError::Disconnected) => return Err(LoadError::Disconnected),
            }
        }
        Ok(self.deliver())
    }

    fn record(&mut self, (index, result): LoadReport) -> Result<(), LoadError> {
        let image = result?;
        let Some(slot) = self.slots.get_mut(index) else {
            return Ok(());
        };
        if slot.replace(image).is_none() {
            self.received += 1;
        }
        debug!(index, remaining = self.remaining(), "image arrived");
        Ok(())
    }

    fn deliver(&mut self) -> Vec<RgbaImage> {
        self.delivered = true;
        let images: Vec<RgbaImage> = std::mem::take(&mut self.slots)
            .into_iter()
            .flatten()
            .collect();
        info!(count = images.len(), "all images loaded");
        images
    }

    fn timeout_error(&self) -> LoadError {
        LoadError::Timeout {
            timeout: self.timeout,
            missing: self
                .slots
                .iter()
                .zip(&self.locations)
                .filter(|(slot, _)| slot.is_none())
                .map(|(_, location)| location.clone())
                .collect(),
        }
    }
}
