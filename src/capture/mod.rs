pub mod frame;
#[cfg(feature = "screen-capture")]
pub mod screen;
pub mod still;

pub use frame::Frame;
pub use frame::PixelFormat;
#[cfg(feature = "screen-capture")]
pub use screen::ScreenSource;
pub use still::StillImageSource;

use std::sync::Arc;

use async_trait::async_trait;

use crate::CaptureConfig;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Device missing, permission denied, display server unreachable
    #[error("capture device unavailable: {0}")]
    Unavailable(String),

    #[error("failed to decode frame: {0}")]
    Image(#[from] image::ImageError),

    #[error("capture worker failed: {0}")]
    Worker(String),
}

/// Something that can produce one frame on demand.
///
/// Implementations are shared between pipeline runs, so they take `&self`.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture(&self) -> Result<Frame, CaptureError>;

    /// Short label for logs
    fn name(&self) -> &str {
        "frame-source"
    }
}

/// Still image when one is configured, otherwise the screen
pub fn source_for(config: &CaptureConfig) -> Result<Arc<dyn FrameSource>, CaptureError> {
    if let Some(path) = &config.image_path {
        return Ok(Arc::new(StillImageSource::new(path.clone())));
    }

    #[cfg(feature = "screen-capture")]
    {
        Ok(Arc::new(ScreenSource::new()))
    }

    #[cfg(not(feature = "screen-capture"))]
    {
        Err(CaptureError::Unavailable(
            "screen capture is not compiled in, pass --image or build with --features screen-capture"
                .into(),
        ))
    }
}
