//! Producer pixel formats and conversion into the canonical packed layout
//! (little-endian R, G, B, A bytes with opaque alpha).

use crate::error::{FsrvError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// 0RGB1555, the libretro default.
    Xrgb1555,
    Rgb565,
    Xrgb8888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Xrgb1555 | PixelFormat::Rgb565 => 2,
            PixelFormat::Xrgb8888 => 4,
        }
    }

    fn to_rgba(self, px: &[u8]) -> [u8; 4] {
        match self {
            PixelFormat::Xrgb1555 => {
                let v = u16::from_le_bytes([px[0], px[1]]);
                let r = (((v & 0x7c00) >> 10) << 3) as u8;
                let g = (((v & 0x03e0) >> 5) << 3) as u8;
                let b = ((v & 0x001f) << 3) as u8;
                [r, g, b, 0xff]
            }
            PixelFormat::Rgb565 => {
                let v = u16::from_le_bytes([px[0], px[1]]);
                let r = (((v & 0xf800) >> 11) << 3) as u8;
                let g = (((v & 0x07e0) >> 5) << 2) as u8;
                let b = ((v & 0x001f) << 3) as u8;
                [r, g, b, 0xff]
            }
            PixelFormat::Xrgb8888 => {
                let v = u32::from_le_bytes([px[0], px[1], px[2], px[3]]);
                [(v >> 16) as u8, (v >> 8) as u8, v as u8, 0xff]
            }
        }
    }
}

/// A frame in the producer's native format. `pitch` is the source row stride
/// in bytes and may be larger than `width * bytes_per_pixel`.
#[derive(Clone, Copy, Debug)]
pub struct VideoFrame<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub pitch: usize,
    pub format: PixelFormat,
}

impl<'a> VideoFrame<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32, pitch: usize, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            pitch,
            format,
        }
    }

    fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(FsrvError::InvalidFrame("empty frame"));
        }
        if self.pitch < self.row_bytes() {
            return Err(FsrvError::InvalidFrame("pitch shorter than a row"));
        }
        let needed = (self.height as usize - 1) * self.pitch + self.row_bytes();
        if self.data.len() < needed {
            return Err(FsrvError::InvalidFrame("frame data is truncated"));
        }
        Ok(())
    }
}

/// Converts `frame` row by row into `dst`, packed at the frame's width.
pub fn convert(frame: &VideoFrame<'_>, dst: &mut [u8]) -> Result<()> {
    frame.validate()?;
    let width = frame.width as usize;
    let bpp = frame.format.bytes_per_pixel();
    if dst.len() < width * frame.height as usize * 4 {
        return Err(FsrvError::InvalidFrame("frame exceeds page capacity"));
    }

    for (y, out_row) in dst
        .chunks_exact_mut(width * 4)
        .take(frame.height as usize)
        .enumerate()
    {
        let start = y * frame.pitch;
        let src_row = &frame.data[start..start + width * bpp];
        for (src, out) in src_row.chunks_exact(bpp).zip(out_row.chunks_exact_mut(4)) {
            out.copy_from_slice(&frame.format.to_rgba(src));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xrgb1555_expands_each_channel() {
        // r=31, g=0, b=16
        let px = ((31u16 << 10) | 16).to_le_bytes();
        let frame = VideoFrame::new(&px, 1, 1, 2, PixelFormat::Xrgb1555);
        let mut out = [0u8; 4];
        convert(&frame, &mut out).unwrap();
        assert_eq!(out, [248, 0, 128, 0xff]);
    }

    #[test]
    fn rgb565_keeps_six_bit_green() {
        let px = (63u16 << 5).to_le_bytes();
        let frame = VideoFrame::new(&px, 1, 1, 2, PixelFormat::Rgb565);
        let mut out = [0u8; 4];
        convert(&frame, &mut out).unwrap();
        assert_eq!(out, [0, 252, 0, 0xff]);
    }

    #[test]
    fn padded_source_stride_is_skipped() {
        // 2x2 XRGB8888 with 4 bytes of padding per row
        let mut data = vec![0u8; 12 * 2];
        data[0..4].copy_from_slice(&0x00ff_0000u32.to_le_bytes());
        data[4..8].copy_from_slice(&0x0000_ff00u32.to_le_bytes());
        data[8..12].copy_from_slice(&0xdead_beefu32.to_le_bytes());
        data[12..16].copy_from_slice(&0x0000_00ffu32.to_le_bytes());
        data[16..20].copy_from_slice(&0x0010_2030u32.to_le_bytes());

        let frame = VideoFrame::new(&data, 2, 2, 12, PixelFormat::Xrgb8888);
        let mut out = [0u8; 16];
        convert(&frame, &mut out).unwrap();
        assert_eq!(
            out,
            [
                0xff, 0, 0, 0xff, 0, 0xff, 0, 0xff, //
                0, 0, 0xff, 0xff, 0x10, 0x20, 0x30, 0xff
            ]
        );
    }

    #[test]
    fn truncated_frames_are_rejected() {
        let data = [0u8; 7];
        let frame = VideoFrame::new(&data, 2, 2, 4, PixelFormat::Rgb565);
        assert_eq!(
            frame.validate().unwrap_err(),
            FsrvError::InvalidFrame("frame data is truncated")
        );
        let frame = VideoFrame::new(&data, 4, 1, 4, PixelFormat::Rgb565);
        assert!(frame.validate().is_err());
    }

    #[test]
    fn frames_larger_than_the_destination_are_rejected() {
        let data = [0u8; 16];
        let frame = VideoFrame::new(&data, 2, 2, 8, PixelFormat::Xrgb8888);
        let mut out = [0u8; 8];
        assert!(convert(&frame, &mut out).is_err());
    }
}
