//! Aspect-preserving resize into the analysis bounding box

use image::imageops::{self, FilterType};

use crate::capture::Frame;

/// Size that fits `(width, height)` inside `(max_width, max_height)` keeping aspect ratio.
///
/// The limiting side lands exactly on the box edge; never returns a zero dimension.
pub fn fit_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }

    // Integer cross-multiplication keeps the limiting side exact
    let (w, h) = (width as u64, height as u64);
    let (mw, mh) = (max_width as u64, max_height as u64);

    let (scaled_w, scaled_h) = if w * mh <= h * mw {
        (w * mh / h, mh)
    } else {
        (mw, h * mw / w)
    };

    (scaled_w.max(1) as u32, scaled_h.max(1) as u32)
}

/// Scale a frame to fit within the box. Returns the input untouched when it already fits exactly.
pub fn fit_within(frame: &Frame, max_width: u32, max_height: u32) -> Frame {
    let (width, height) = frame.dimensions();
    let target = fit_dimensions(width, height, max_width, max_height);
    if target == (width, height) {
        return frame.clone();
    }

    let Some(image) = frame.to_rgba() else {
        return frame.clone();
    };

    let resized = imageops::resize(&image, target.0, target.1, FilterType::Lanczos3);
    let mut scaled = Frame::from_rgba(resized);
    scaled.timestamp = frame.timestamp;
    scaled
}
