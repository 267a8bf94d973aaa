//! Primary monitor capture through xcap

use async_trait::async_trait;
use image::RgbaImage;
use tracing::{debug, instrument};

use super::{CaptureError, Frame, FrameSource};

/// Grabs the primary monitor, falling back to the first one reported
#[derive(Default)]
pub struct ScreenSource;

impl ScreenSource {
    pub fn new() -> Self {
        Self
    }

    fn grab() -> Result<Frame, CaptureError> {
        let monitors =
            xcap::Monitor::all().map_err(|e| CaptureError::Unavailable(e.to_string()))?;

        let monitor = monitors
            .iter()
            .find(|m| m.is_primary())
            .or_else(|| monitors.first())
            .ok_or_else(|| CaptureError::Unavailable("no monitors found".into()))?;

        debug!("Capturing monitor {}", monitor.name());

        let captured = monitor
            .capture_image()
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;

        // xcap may pin a different `image` release; go through raw bytes
        let (width, height) = captured.dimensions();
        let image = RgbaImage::from_raw(width, height, captured.into_raw())
            .ok_or_else(|| CaptureError::Unavailable("monitor returned a short buffer".into()))?;

        Ok(Frame::from_rgba(image))
    }
}

#[async_trait]
impl FrameSource for ScreenSource {
    #[instrument(skip(self))]
    async fn capture(&self) -> Result<Frame, CaptureError> {
        tokio::task::spawn_blocking(Self::grab)
            .await
            .map_err(|e| CaptureError::Worker(e.to_string()))?
    }

    fn name(&self) -> &str {
        "screen"
    }
}
