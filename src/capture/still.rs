//! Replays an image file from disk as if it were a live capture

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{CaptureError, Frame, FrameSource};

/// Decodes the same file on every capture, so edits to it show up on the next tick
pub struct StillImageSource {
    path: PathBuf,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FrameSource for StillImageSource {
    #[instrument(skip(self))]
    async fn capture(&self) -> Result<Frame, CaptureError> {
        debug!("Loading {}", self.path.display());
        let path = self.path.clone();
        let image = tokio::task::spawn_blocking(move || image::open(&path))
            .await
            .map_err(|e| CaptureError::Worker(e.to_string()))??;

        Ok(Frame::from_rgba(image.to_rgba8()))
    }

    fn name(&self) -> &str {
        "still-image"
    }
}
