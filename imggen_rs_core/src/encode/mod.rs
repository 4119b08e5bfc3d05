//! Output payload encoding boundary.
//!
//! The dispatcher hands finished frames to an [`OutputEncoder`]; the bundled
//! implementation covers PNG and GIF through the `image` crate and MJPEG-AVI
//! through a small RIFF muxer. Callers with their own muxing stack can swap
//! in another implementation.

mod avi;

use anyhow::Result;
use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::png::PngEncoder;
use image::{Delay, DynamicImage, ExtendedColorType, GrayImage, ImageEncoder, RgbImage, RgbaImage};

use crate::engine::Frame;

/// Frame rate for animated payloads.
pub const VIDEO_FPS: u32 = 16;

/// Which animated container(s) a multi-frame generation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoOutputKind {
    #[default]
    Gif,
    Avi,
    /// Both containers: GIF as the payload, AVI as the secondary payload.
    Both,
}

impl VideoOutputKind {
    pub(crate) fn wants_gif(&self) -> bool {
        matches!(self, Self::Gif | Self::Both)
    }

    pub(crate) fn wants_avi(&self) -> bool {
        matches!(self, Self::Avi | Self::Both)
    }
}

/// Payload encoding collaborator.
pub trait OutputEncoder {
    /// Encode a still frame as PNG. `metadata` is the generation parameter
    /// record; implementations that can embed a text chunk should.
    fn encode_png(&self, frame: &Frame, metadata: Option<&str>) -> Result<Vec<u8>>;

    /// Encode a frame sequence as an animated GIF.
    fn encode_gif(&self, frames: &[Frame], fps: u32) -> Result<Vec<u8>>;

    /// Encode a frame sequence as an MJPEG AVI.
    fn encode_avi(&self, frames: &[Frame], fps: u32) -> Result<Vec<u8>>;
}

/// The bundled encoder. PNG output does not carry the parameter record (the
/// record still reaches callers through the response); GIF and AVI loop at
/// the requested frame rate.
#[derive(Debug, Default)]
pub struct ImageCrateEncoder;

impl OutputEncoder for ImageCrateEncoder {
    fn encode_png(&self, frame: &Frame, _metadata: Option<&str>) -> Result<Vec<u8>> {
        let color = match frame.channels {
            1 => ExtendedColorType::L8,
            3 => ExtendedColorType::Rgb8,
            4 => ExtendedColorType::Rgba8,
            other => anyhow::bail!("unsupported channel count {other} for PNG output"),
        };
        let mut out = Vec::new();
        PngEncoder::new(&mut out).write_image(&frame.data, frame.width, frame.height, color)?;
        Ok(out)
    }

    fn encode_gif(&self, frames: &[Frame], fps: u32) -> Result<Vec<u8>> {
        if frames.is_empty() {
            anyhow::bail!("no frames to encode");
        }
        if fps == 0 {
            anyhow::bail!("zero frame rate");
        }
        let mut out = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut out);
            encoder.set_repeat(Repeat::Infinite)?;
            let delay = Delay::from_numer_denom_ms(1000, fps);
            for frame in frames {
                let rgba = frame_rgba(frame)?;
                encoder.encode_frame(image::Frame::from_parts(rgba, 0, 0, delay))?;
            }
        }
        Ok(out)
    }

    fn encode_avi(&self, frames: &[Frame], fps: u32) -> Result<Vec<u8>> {
        avi::encode_mjpeg_avi(frames, fps)
    }
}

fn frame_rgba(frame: &Frame) -> Result<RgbaImage> {
    let dynamic = match frame.channels {
        1 => GrayImage::from_raw(frame.width, frame.height, frame.data.clone())
            .map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
            .map(DynamicImage::ImageRgb8),
        4 => RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
            .map(DynamicImage::ImageRgba8),
        other => anyhow::bail!("unsupported channel count {other} for animated output"),
    };
    let dynamic = dynamic
        .ok_or_else(|| anyhow::anyhow!("frame buffer has invalid capacity"))?;
    Ok(dynamic.into_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame {
            width,
            height,
            channels: 3,
            data: vec![value; (width * height * 3) as usize],
        }
    }

    #[test]
    fn png_payload_has_signature() {
        let png = ImageCrateEncoder
            .encode_png(&solid_frame(16, 16, 127), None)
            .unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
    }

    #[test]
    fn gif_payload_has_signature() {
        let frames = [solid_frame(8, 8, 0), solid_frame(8, 8, 255)];
        let gif = ImageCrateEncoder.encode_gif(&frames, VIDEO_FPS).unwrap();
        assert_eq!(&gif[..6], b"GIF89a");
    }

    #[test]
    fn empty_sequence_is_rejected() {
        assert!(ImageCrateEncoder.encode_gif(&[], VIDEO_FPS).is_err());
        assert!(ImageCrateEncoder.encode_avi(&[], VIDEO_FPS).is_err());
    }
}
