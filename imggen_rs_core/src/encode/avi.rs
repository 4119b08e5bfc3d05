//! Minimal MJPEG-in-AVI muxer.
//!
//! Classic RIFF layout: `hdrl` (main header + one video stream), `movi` with
//! one `00dc` chunk per JPEG-compressed frame, and an `idx1` keyframe index
//! so stock players can seek.

use anyhow::{bail, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::engine::Frame;

const JPEG_QUALITY: u8 = 90;
const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;

pub(crate) fn encode_mjpeg_avi(frames: &[Frame], fps: u32) -> Result<Vec<u8>> {
    let Some(first) = frames.first() else {
        bail!("no frames to mux");
    };
    if fps == 0 {
        bail!("zero frame rate");
    }
    let (width, height) = (first.width, first.height);

    // Compress every frame up front; chunk sizes feed the headers.
    let mut jpegs = Vec::with_capacity(frames.len());
    for frame in frames {
        let color = match frame.channels {
            1 => ExtendedColorType::L8,
            3 => ExtendedColorType::Rgb8,
            other => bail!("unsupported channel count {other} for AVI output"),
        };
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).write_image(
            &frame.data,
            frame.width,
            frame.height,
            color,
        )?;
        jpegs.push(jpeg);
    }
    let max_chunk = jpegs.iter().map(Vec::len).max().unwrap_or(0) as u32;

    // movi chunks and the idx1 index; offsets are relative to the list's
    // 'movi' fourcc, so the first chunk sits at 4.
    let mut movi_body = Vec::new();
    let mut idx1 = Vec::new();
    for jpeg in &jpegs {
        let offset = 4 + movi_body.len() as u32;
        write_chunk(&mut movi_body, b"00dc", jpeg)?;
        idx1.extend_from_slice(b"00dc");
        idx1.write_u32::<LittleEndian>(AVIIF_KEYFRAME)?;
        idx1.write_u32::<LittleEndian>(offset)?;
        idx1.write_u32::<LittleEndian>(jpeg.len() as u32)?;
    }

    // AVISTREAMHEADER
    let mut strh = Vec::new();
    strh.extend_from_slice(b"vids");
    strh.extend_from_slice(b"MJPG");
    strh.write_u32::<LittleEndian>(0)?; // flags
    strh.write_u16::<LittleEndian>(0)?; // priority
    strh.write_u16::<LittleEndian>(0)?; // language
    strh.write_u32::<LittleEndian>(0)?; // initial frames
    strh.write_u32::<LittleEndian>(1)?; // scale
    strh.write_u32::<LittleEndian>(fps)?; // rate
    strh.write_u32::<LittleEndian>(0)?; // start
    strh.write_u32::<LittleEndian>(frames.len() as u32)?; // length
    strh.write_u32::<LittleEndian>(max_chunk)?; // suggested buffer size
    strh.write_u32::<LittleEndian>(u32::MAX)?; // quality
    strh.write_u32::<LittleEndian>(0)?; // sample size
    strh.write_u16::<LittleEndian>(0)?; // rcFrame left
    strh.write_u16::<LittleEndian>(0)?; // rcFrame top
    strh.write_u16::<LittleEndian>(width as u16)?; // rcFrame right
    strh.write_u16::<LittleEndian>(height as u16)?; // rcFrame bottom

    // BITMAPINFOHEADER
    let mut strf = Vec::new();
    strf.write_u32::<LittleEndian>(40)?; // header size
    strf.write_i32::<LittleEndian>(width as i32)?;
    strf.write_i32::<LittleEndian>(height as i32)?;
    strf.write_u16::<LittleEndian>(1)?; // planes
    strf.write_u16::<LittleEndian>(24)?; // bits per pixel
    strf.extend_from_slice(b"MJPG"); // compression
    strf.write_u32::<LittleEndian>(width * height * 3)?; // image size
    strf.write_i32::<LittleEndian>(0)?; // x pels per meter
    strf.write_i32::<LittleEndian>(0)?; // y pels per meter
    strf.write_u32::<LittleEndian>(0)?; // colors used
    strf.write_u32::<LittleEndian>(0)?; // colors important

    // MainAVIHeader
    let mut avih = Vec::new();
    avih.write_u32::<LittleEndian>(1_000_000 / fps)?; // microseconds per frame
    avih.write_u32::<LittleEndian>(max_chunk.saturating_mul(fps))?; // max bytes per second
    avih.write_u32::<LittleEndian>(0)?; // padding granularity
    avih.write_u32::<LittleEndian>(AVIF_HASINDEX)?;
    avih.write_u32::<LittleEndian>(frames.len() as u32)?;
    avih.write_u32::<LittleEndian>(0)?; // initial frames
    avih.write_u32::<LittleEndian>(1)?; // streams
    avih.write_u32::<LittleEndian>(max_chunk)?;
    avih.write_u32::<LittleEndian>(width)?;
    avih.write_u32::<LittleEndian>(height)?;
    for _ in 0..4 {
        avih.write_u32::<LittleEndian>(0)?; // reserved
    }

    let mut strl = Vec::new();
    write_chunk(&mut strl, b"strh", &strh)?;
    write_chunk(&mut strl, b"strf", &strf)?;

    let mut hdrl = Vec::new();
    write_chunk(&mut hdrl, b"avih", &avih)?;
    write_list(&mut hdrl, b"strl", &strl)?;

    let mut riff_body = Vec::new();
    riff_body.extend_from_slice(b"AVI ");
    write_list(&mut riff_body, b"hdrl", &hdrl)?;
    write_list(&mut riff_body, b"movi", &movi_body)?;
    write_chunk(&mut riff_body, b"idx1", &idx1)?;

    let mut out = Vec::with_capacity(riff_body.len() + 8);
    out.extend_from_slice(b"RIFF");
    out.write_u32::<LittleEndian>(riff_body.len() as u32)?;
    out.extend_from_slice(&riff_body);
    Ok(out)
}

fn write_chunk(out: &mut Vec<u8>, fourcc: &[u8; 4], body: &[u8]) -> Result<()> {
    out.extend_from_slice(fourcc);
    out.write_u32::<LittleEndian>(body.len() as u32)?;
    out.extend_from_slice(body);
    if body.len() % 2 != 0 {
        out.push(0); // chunks are word aligned
    }
    Ok(())
}

fn write_list(out: &mut Vec<u8>, fourcc: &[u8; 4], body: &[u8]) -> Result<()> {
    out.extend_from_slice(b"LIST");
    out.write_u32::<LittleEndian>(4 + body.len() as u32)?;
    out.extend_from_slice(fourcc);
    out.extend_from_slice(body);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(value: u8) -> Frame {
        Frame {
            width: 16,
            height: 16,
            channels: 3,
            data: vec![value; 16 * 16 * 3],
        }
    }

    #[test]
    fn produces_well_formed_riff() {
        let frames = [solid_frame(0), solid_frame(128), solid_frame(255)];
        let avi = encode_mjpeg_avi(&frames, 16).unwrap();
        assert_eq!(&avi[..4], b"RIFF");
        assert_eq!(&avi[8..12], b"AVI ");
        let declared = u32::from_le_bytes(avi[4..8].try_into().unwrap()) as usize;
        assert_eq!(declared + 8, avi.len());
        // one index entry per frame
        let idx_pos = avi.windows(4).position(|w| w == b"idx1").unwrap();
        let idx_len = u32::from_le_bytes(avi[idx_pos + 4..idx_pos + 8].try_into().unwrap());
        assert_eq!(idx_len, 16 * frames.len() as u32);
    }

    #[test]
    fn rejects_empty_input() {
        assert!(encode_mjpeg_avi(&[], 16).is_err());
    }
}
