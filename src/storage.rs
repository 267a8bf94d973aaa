//! Frame persistence

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::ImageFormat;
use tracing::debug;

use crate::capture::Frame;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),

    #[error("frame buffer does not match its dimensions")]
    InvalidFrame,

    #[error("persistence worker failed: {0}")]
    Worker(String),
}

/// Writes a frame somewhere and reports how many bytes it took
#[async_trait]
pub trait FrameStore: Send + Sync {
    async fn persist(&self, frame: &Frame, path: &Path) -> Result<u64, PersistError>;
}

/// Encode a frame as PNG in memory
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>, PersistError> {
    let image = frame.to_rgba().ok_or(PersistError::InvalidFrame)?;
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Saves frames as PNG files, creating parent directories on demand
#[derive(Debug, Default, Clone)]
pub struct PngStore;

impl PngStore {
    pub fn new() -> Self {
        Self
    }

    fn write(frame: &Frame, path: &Path) -> Result<u64, PersistError> {
        let io_err = |source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let png = encode_png(frame)?;
        std::fs::write(path, &png).map_err(io_err)?;
        let written = std::fs::metadata(path).map_err(io_err)?.len();

        debug!("Saved {} ({} bytes)", path.display(), written);
        Ok(written)
    }
}

#[async_trait]
impl FrameStore for PngStore {
    async fn persist(&self, frame: &Frame, path: &Path) -> Result<u64, PersistError> {
        let frame = frame.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::write(&frame, &path))
            .await
            .map_err(|e| PersistError::Worker(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[tokio::test]
    async fn test_png_store_creates_dirs_and_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/live_1_1.png");
        let frame = Frame::from_rgba(RgbaImage::from_pixel(12, 7, Rgba([200, 10, 10, 255])));

        let written = PngStore::new().persist(&frame, &path).await.unwrap();

        assert!(written > 0);
        assert_eq!(written, std::fs::metadata(&path).unwrap().len());
        let reloaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(reloaded.dimensions(), (12, 7));
        assert_eq!(reloaded.get_pixel(3, 3), &Rgba([200, 10, 10, 255]));
    }

    #[tokio::test]
    async fn test_unwritable_target_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // A file where a directory is expected
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let frame = Frame::from_rgba(RgbaImage::new(2, 2));

        let result = PngStore::new()
            .persist(&frame, &blocker.join("frame.png"))
            .await;
        assert!(matches!(result, Err(PersistError::Io { .. })));
    }
}
