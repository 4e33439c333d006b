//! Decoded image handoff between the adapter and detector backends.
//!
//! - `DecodedImage`: owned RGB8 pixels for one input file, alive for one `detect` call.
//! - `InferenceView`: borrowed view that backends receive. Pixels flow in, detections flow out.
//!
//! Backends never see file paths or the output directory, only pixels and dimensions.

use std::path::Path;

use anyhow::{anyhow, Context, Result};

// ----------------------------------------------------------------------------
// DecodedImage: owned pixels
// ----------------------------------------------------------------------------

/// RGB8 pixels in row-major order, three bytes per pixel.
pub struct DecodedImage {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl DecodedImage {
    /// Wrap raw RGB8 pixels. Fails when the buffer does not match the dimensions.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("image dimensions overflow"))?;
        if data.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected_len,
                width,
                height,
                data.len()
            ));
        }
        if width == 0 || height == 0 {
            return Err(anyhow!("image has zero area ({}x{})", width, height));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Decode a JPEG or PNG file from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?;
        let rgb = image.into_rgb8();
        let (width, height) = rgb.dimensions();
        Self::from_rgb(rgb.into_raw(), width, height)
    }

    pub fn inference_view(&self) -> InferenceView<'_> {
        InferenceView { image: self }
    }
}

// ----------------------------------------------------------------------------
// InferenceView: what backends receive
// ----------------------------------------------------------------------------

/// Read-only view of a decoded image for a single backend call.
pub struct InferenceView<'a> {
    image: &'a DecodedImage,
}

impl<'a> InferenceView<'a> {
    pub fn width(&self) -> u32 {
        self.image.width
    }

    pub fn height(&self) -> u32 {
        self.image.height
    }

    /// RGB8 pixel bytes. The slice lifetime keeps backends from retaining them.
    pub fn pixels(&self) -> &'a [u8] {
        &self.image.data
    }
}
