//! Input image preprocessing: decode, center-crop to the target aspect,
//! resize to exact target dimensions.
//!
//! Each stage consumes the buffer it was handed and owns the buffer it
//! produces, so any early return releases everything allocated so far. A
//! process-wide gauge counts live decoded buffers; tests use it to pin down
//! the release-exactly-once discipline of the scratch slots.

use std::sync::atomic::{AtomicUsize, Ordering};

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use tracing::debug;

use crate::engine::ImageRef;
use crate::error::GenerationError;

static LIVE_BUFFERS: AtomicUsize = AtomicUsize::new(0);

/// Number of decoded pixel buffers currently alive in the process.
pub fn live_buffer_count() -> usize {
    LIVE_BUFFERS.load(Ordering::SeqCst)
}

/// An exclusively owned raw pixel buffer with its layout.
#[derive(Debug)]
pub struct DecodedImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl DecodedImage {
    fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        LIVE_BUFFERS.fetch_add(1, Ordering::SeqCst);
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn view(&self) -> ImageRef<'_> {
        ImageRef {
            width: self.width,
            height: self.height,
            channels: self.channels,
            data: &self.data,
        }
    }

    /// Invert every sample in place (mask polarity flip).
    pub(crate) fn invert(&mut self) {
        for byte in &mut self.data {
            *byte = 255 - *byte;
        }
    }

    fn into_raw(mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }
}

impl Drop for DecodedImage {
    fn drop(&mut self) {
        LIVE_BUFFERS.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decode an encoded image and fit it to `expected_width x expected_height`
/// with `expected_channels` samples per pixel (3 = RGB, 1 = mask).
///
/// When either expected dimension is zero the decoded buffer is returned at
/// its native size. When both are set and differ from the native size, the
/// source is center-cropped to the destination aspect ratio and then resized
/// to exactly the expected dimensions.
pub fn prepare_image(
    encoded: &[u8],
    expected_width: u32,
    expected_height: u32,
    expected_channels: u8,
) -> Result<DecodedImage, GenerationError> {
    let decoded =
        image::load_from_memory(encoded).map_err(|e| GenerationError::Decode(e.to_string()))?;

    let native_channels = decoded.color().channel_count();
    if native_channels < expected_channels {
        return Err(GenerationError::Decode(format!(
            "input image must have at least {expected_channels} channels, got {native_channels}"
        )));
    }
    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        return Err(GenerationError::Decode(format!(
            "input image has degenerate dimensions {width}x{height}"
        )));
    }

    let image = match expected_channels {
        1 => DecodedImage::new(decoded.into_luma8().into_raw(), width, height, 1),
        3 => DecodedImage::new(decoded.into_rgb8().into_raw(), width, height, 3),
        other => {
            return Err(GenerationError::Decode(format!(
                "unsupported channel layout {other}"
            )))
        }
    };

    if expected_width == 0
        || expected_height == 0
        || (width == expected_width && height == expected_height)
    {
        return Ok(image);
    }

    let image = center_crop(image, expected_width, expected_height);
    resize_exact(image, expected_width, expected_height)
}

/// Crop the source along whichever axis makes its aspect ratio match the
/// destination's, centered. Returns the input unchanged when no crop offset
/// results.
pub(crate) fn center_crop(image: DecodedImage, dst_width: u32, dst_height: u32) -> DecodedImage {
    let dst_aspect = dst_width as f32 / dst_height as f32;
    let src_aspect = image.width as f32 / image.height as f32;

    let (mut crop_w, mut crop_h) = (image.width, image.height);
    let (mut crop_x, mut crop_y) = (0u32, 0u32);

    if src_aspect > dst_aspect {
        crop_w = (image.height as f32 * dst_aspect) as u32;
        crop_x = (image.width - crop_w) / 2;
    } else if src_aspect < dst_aspect {
        crop_h = (image.width as f32 / dst_aspect) as u32;
        crop_y = (image.height - crop_h) / 2;
    }

    if crop_x == 0 && crop_y == 0 {
        return image;
    }
    debug!(
        "cropping input image from {}x{} to {}x{}",
        image.width, image.height, crop_w, crop_h
    );

    let channels = image.channels;
    let samples = channels as usize;
    let row_len = crop_w as usize * samples;
    let mut cropped = Vec::with_capacity(crop_h as usize * row_len);
    for row in 0..crop_h as usize {
        let start =
            ((crop_y as usize + row) * image.width as usize + crop_x as usize) * samples;
        cropped.extend_from_slice(&image.data[start..start + row_len]);
    }
    drop(image);

    DecodedImage::new(cropped, crop_w, crop_h, channels)
}

/// Resize to exactly `dst_width x dst_height`, consuming the source buffer.
pub(crate) fn resize_exact(
    image: DecodedImage,
    dst_width: u32,
    dst_height: u32,
) -> Result<DecodedImage, GenerationError> {
    debug!(
        "resizing input image from {}x{} to {}x{}",
        image.width, image.height, dst_width, dst_height
    );

    let (width, height, channels) = (image.width, image.height, image.channels);
    let resized = match channels {
        1 => {
            let src = GrayImage::from_raw(width, height, image.into_raw()).ok_or_else(|| {
                GenerationError::Allocation("mask buffer has invalid capacity".to_string())
            })?;
            imageops::resize(&src, dst_width, dst_height, FilterType::Triangle).into_raw()
        }
        3 => {
            let src = RgbImage::from_raw(width, height, image.into_raw()).ok_or_else(|| {
                GenerationError::Allocation("image buffer has invalid capacity".to_string())
            })?;
            imageops::resize(&src, dst_width, dst_height, FilterType::Triangle).into_raw()
        }
        other => {
            return Err(GenerationError::Decode(format!(
                "unsupported channel layout {other}"
            )))
        }
    };

    Ok(DecodedImage::new(resized, dst_width, dst_height, channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::png::PngEncoder;
    use image::{ExtendedColorType, ImageEncoder};

    fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&color);
        }
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(&data, width, height, ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    fn gray_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let data = vec![128u8; (width * height) as usize];
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(&data, width, height, ExtendedColorType::L8)
            .unwrap();
        out
    }

    #[test]
    fn native_size_round_trips_unchanged() {
        let encoded = png_bytes(32, 24, [10, 20, 30]);
        let img = prepare_image(&encoded, 32, 24, 3).unwrap();
        assert_eq!((img.width(), img.height(), img.channels()), (32, 24, 3));
        assert_eq!(img.data().len(), 32 * 24 * 3);
        assert_eq!(&img.data()[..3], &[10, 20, 30]);
    }

    #[test]
    fn unspecified_target_keeps_native_size() {
        let encoded = png_bytes(40, 30, [1, 2, 3]);
        let img = prepare_image(&encoded, 0, 0, 3).unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
    }

    #[test]
    fn resize_hits_exact_target() {
        let encoded = png_bytes(100, 50, [200, 200, 200]);
        let img = prepare_image(&encoded, 64, 64, 3).unwrap();
        assert_eq!((img.width(), img.height()), (64, 64));
        assert_eq!(img.data().len(), 64 * 64 * 3);
    }

    #[test]
    fn mask_decodes_single_channel() {
        let encoded = png_bytes(16, 16, [255, 255, 255]);
        let mask = prepare_image(&encoded, 16, 16, 1).unwrap();
        assert_eq!(mask.channels(), 1);
        assert_eq!(mask.data().len(), 16 * 16);
        assert_eq!(mask.data()[0], 255);
    }

    #[test]
    fn mask_invert_flips_samples() {
        let encoded = png_bytes(8, 8, [255, 255, 255]);
        let mut mask = prepare_image(&encoded, 8, 8, 1).unwrap();
        mask.invert();
        assert!(mask.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn too_few_channels_is_a_decode_error() {
        let encoded = gray_png_bytes(16, 16);
        let err = prepare_image(&encoded, 16, 16, 3).unwrap_err();
        assert!(matches!(err, GenerationError::Decode(_)), "{err:?}");
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = prepare_image(b"not an image", 64, 64, 3).unwrap_err();
        assert!(matches!(err, GenerationError::Decode(_)));
    }

    #[test]
    fn crop_axis_follows_relative_aspect() {
        // 100x50 -> 50x50 target: source is relatively too wide, so width is
        // cropped to 50 before resizing.
        let wide = DecodedImage::new(vec![0; 100 * 50 * 3], 100, 50, 3);
        let cropped = center_crop(wide, 50, 50);
        assert_eq!((cropped.width(), cropped.height()), (50, 50));

        // 50x100 -> 50x50 target: height is cropped instead.
        let tall = DecodedImage::new(vec![0; 50 * 100 * 3], 50, 100, 3);
        let cropped = center_crop(tall, 50, 50);
        assert_eq!((cropped.width(), cropped.height()), (50, 50));
    }

    #[test]
    fn crop_is_centered() {
        // 6x2 image, target aspect 1:1 -> crop to 2x2 starting at x = 2.
        let mut data = Vec::new();
        for x in 0u8..6 {
            data.extend_from_slice(&[x * 10, 0, 0]);
        }
        let data = [data.clone(), data].concat();
        let img = DecodedImage::new(data, 6, 2, 3);
        let cropped = center_crop(img, 2, 2);
        assert_eq!((cropped.width(), cropped.height()), (2, 2));
        assert_eq!(cropped.data()[0], 20);
        assert_eq!(cropped.data()[3], 30);
    }
}
