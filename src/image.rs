//! Image and mask compositing pipeline.
//!
//! Sampled pixel data comes in row by row through a [`SampleReader`],
//! gets converted into a packed device pixel buffer (color) or a 1-bit
//! stencil expanded to alpha bytes, and is handed to the surface as a
//! borrowed pattern for a single paint call.

use log::warn;

use crate::device::{ImageFormat, ImageView};
use crate::error::{RenderError, RenderResult};
use crate::state::{invert_matrix, Matrix, Rgb};

/// Row-oriented access to decoded image samples.
///
/// Each line holds `width × components` samples, one byte per sample
/// regardless of the source bit depth. A reader that runs out of data
/// simply stops yielding lines; missing rows stay transparent.
pub trait SampleReader {
    fn next_line(&mut self) -> Option<&[u8]>;
}

/// Unpacks bit-packed sample rows from an in-memory byte slice.
///
/// Rows are packed most-significant-bit first and padded to a byte
/// boundary, the layout used by image data streams.
pub struct PackedSampleReader<'a> {
    data: &'a [u8],
    samples_per_line: usize,
    bits: u8,
    bytes_per_line: usize,
    pos: usize,
    line: Vec<u8>,
}

impl<'a> PackedSampleReader<'a> {
    /// `samples_per_line` is `width × components`; `bits` must be
    /// 1, 2, 4, 8, or 16 (16-bit samples are truncated to their high byte).
    pub fn new(data: &'a [u8], samples_per_line: usize, bits: u8) -> Self {
        debug_assert!(matches!(bits, 1 | 2 | 4 | 8 | 16));
        let bytes_per_line = (samples_per_line * bits as usize).div_ceil(8);
        PackedSampleReader {
            data,
            samples_per_line,
            bits,
            bytes_per_line,
            pos: 0,
            line: vec![0; samples_per_line],
        }
    }
}

impl SampleReader for PackedSampleReader<'_> {
    fn next_line(&mut self) -> Option<&[u8]> {
        let row = self.data.get(self.pos..self.pos + self.bytes_per_line)?;
        self.pos += self.bytes_per_line;

        match self.bits {
            8 => self.line.copy_from_slice(&row[..self.samples_per_line]),
            16 => {
                for (i, sample) in self.line.iter_mut().enumerate() {
                    *sample = row[2 * i];
                }
            }
            bits => {
                let per_byte = 8 / bits as usize;
                let mask = (1u16 << bits) - 1;
                for (i, sample) in self.line.iter_mut().enumerate() {
                    let byte = row[i / per_byte];
                    let shift = 8 - bits as usize * (i % per_byte + 1);
                    *sample = ((byte as u16 >> shift) & mask) as u8;
                }
            }
        }
        Some(&self.line)
    }
}

/// The supplied color map: converts raw samples to RGB.
///
/// Color-space math stays behind this trait; the pipeline only invokes
/// it (or skips it on the device-RGB fast path).
pub trait ColorMap {
    /// Components per pixel in the sample stream.
    fn num_pixel_comps(&self) -> usize;

    /// Bits per component in the encoded stream.
    fn bits(&self) -> u8;

    /// Convert one pixel's samples (one byte per component) to RGB.
    fn rgb(&self, samples: &[u8]) -> Rgb;

    /// True for device-RGB data, including ICC-based spaces whose
    /// alternate is device RGB: channel bytes can be copied through
    /// without invoking the transform, with identical results.
    fn is_device_rgb(&self) -> bool {
        false
    }
}

/// Inclusive per-component sample range used for color-key masking.
pub type ComponentRange = (u8, u8);

/// Owned pixel storage for one image paint.
///
/// Two layouts exist: `Alpha8` stencils with the row stride padded to a
/// 4-byte boundary, and `Bgra32` color pixels with stride `width × 4`.
/// The buffer is lent to the surface as an [`ImageView`] for exactly one
/// paint call and freed when it goes out of scope.
pub struct ImageBuffer {
    width: usize,
    height: usize,
    stride: usize,
    format: ImageFormat,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Allocate a zeroed stencil buffer (fully transparent).
    pub fn stencil(width: usize, height: usize) -> RenderResult<Self> {
        let stride = width.checked_add(3).map(|w| w & !3).ok_or(
            RenderError::ImageTooLarge { width, height },
        )?;
        Ok(ImageBuffer {
            width,
            height,
            stride,
            format: ImageFormat::Alpha8,
            data: Self::alloc(stride, height, width, height)?,
        })
    }

    /// Allocate a zeroed B,G,R,A color buffer.
    pub fn color(width: usize, height: usize) -> RenderResult<Self> {
        let stride = width
            .checked_mul(4)
            .ok_or(RenderError::ImageTooLarge { width, height })?;
        Ok(ImageBuffer {
            width,
            height,
            stride,
            format: ImageFormat::Bgra32,
            data: Self::alloc(stride, height, width, height)?,
        })
    }

    fn alloc(stride: usize, rows: usize, width: usize, height: usize) -> RenderResult<Vec<u8>> {
        let len = stride
            .checked_mul(rows)
            .ok_or(RenderError::ImageTooLarge { width, height })?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| RenderError::ImageAllocation { bytes: len })?;
        data.resize(len, 0);
        Ok(data)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// One row of pixel bytes, without the stride padding.
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let bytes = match self.format {
            ImageFormat::Alpha8 => self.width,
            ImageFormat::Bgra32 => self.width * 4,
        };
        let start = y * self.stride;
        &mut self.data[start..start + bytes]
    }

    /// Borrow the buffer for a paint call.
    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
            data: &self.data,
        }
    }
}

/// Decode a 1-bit mask stream into an alpha stencil.
///
/// A sample equal to the invert flag becomes opaque (255), anything else
/// transparent (0): painted pixels are the ones that will carry the fill
/// color.
pub fn decode_stencil(
    reader: &mut dyn SampleReader,
    width: usize,
    height: usize,
    invert: bool,
) -> RenderResult<ImageBuffer> {
    let mut buffer = ImageBuffer::stencil(width, height)?;
    let invert_bit = invert as u8;

    for y in 0..height {
        let Some(line) = reader.next_line() else {
            warn!("mask data ended after {} of {} rows", y, height);
            break;
        };
        let row = buffer.row_mut(y);
        for (dest, &sample) in row.iter_mut().zip(line) {
            *dest = if sample ^ invert_bit == 0 { 255 } else { 0 };
        }
    }
    Ok(buffer)
}

/// Decode sampled color data into a packed B,G,R,A buffer.
///
/// `transparent` supplies the color-key ranges: a pixel whose every
/// component lies inside its corresponding inclusive range gets alpha 0,
/// any other pixel alpha 255.
pub fn decode_color(
    reader: &mut dyn SampleReader,
    width: usize,
    height: usize,
    color_map: &dyn ColorMap,
    transparent: Option<&[ComponentRange]>,
) -> RenderResult<ImageBuffer> {
    let mut buffer = ImageBuffer::color(width, height)?;
    let n_comps = color_map.num_pixel_comps();
    if n_comps == 0 {
        warn!("color map reports zero components; image left blank");
        return Ok(buffer);
    }
    let direct = color_map.is_device_rgb() && n_comps == 3 && color_map.bits() == 8;

    for y in 0..height {
        let Some(line) = reader.next_line() else {
            warn!("image data ended after {} of {} rows", y, height);
            break;
        };
        let row = buffer.row_mut(y);
        for (pix, dest) in line.chunks_exact(n_comps).zip(row.chunks_exact_mut(4)) {
            let alpha = match transparent {
                Some(ranges) => {
                    let masked = ranges.len() == n_comps
                        && pix
                            .iter()
                            .zip(ranges)
                            .all(|(&s, &(lo, hi))| s >= lo && s <= hi);
                    if masked { 0 } else { 255 }
                }
                None => 255,
            };
            if direct {
                dest[0] = pix[2];
                dest[1] = pix[1];
                dest[2] = pix[0];
            } else {
                let rgb = color_map.rgb(pix);
                dest[0] = channel_byte(rgb.b);
                dest[1] = channel_byte(rgb.g);
                dest[2] = channel_byte(rgb.r);
            }
            dest[3] = alpha;
        }
    }
    Ok(buffer)
}

/// Round a unit-range channel to the nearest byte value.
fn channel_byte(v: f64) -> u8 {
    (255.0 * v.clamp(0.0, 1.0) + 0.5) as u8
}

/// The pattern transform for an image paint: device space to image pixel
/// space.
///
/// Image rows run top-down while the transformed unit square runs
/// bottom-up, so the vertical column is negated and the translation
/// recomputed before inverting. Returns `None` for a degenerate CTM.
pub fn image_pattern_matrix(ctm: &Matrix, width: usize, height: usize) -> Option<Matrix> {
    if width == 0 || height == 0 {
        return None;
    }
    let w = width as f64;
    let h = height as f64;
    let [a, b, c, d, e, f] = *ctm;
    invert_matrix(&[a / w, b / w, -c / h, -d / h, c + e, d + f])
}

#[cfg(test)]
mod tests {
    use super::*;

    struct GrayMap;
    impl ColorMap for GrayMap {
        fn num_pixel_comps(&self) -> usize {
            1
        }
        fn bits(&self) -> u8 {
            8
        }
        fn rgb(&self, samples: &[u8]) -> Rgb {
            let v = samples[0] as f64 / 255.0;
            Rgb::new(v, v, v)
        }
    }

    struct RgbMap;
    impl ColorMap for RgbMap {
        fn num_pixel_comps(&self) -> usize {
            3
        }
        fn bits(&self) -> u8 {
            8
        }
        fn rgb(&self, samples: &[u8]) -> Rgb {
            Rgb::new(
                samples[0] as f64 / 255.0,
                samples[1] as f64 / 255.0,
                samples[2] as f64 / 255.0,
            )
        }
        fn is_device_rgb(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_packed_reader_1bit() {
        // Two rows of 5 one-bit samples: 10110…, 01001…
        let data = [0b1011_0000, 0b0100_1000];
        let mut reader = PackedSampleReader::new(&data, 5, 1);
        assert_eq!(reader.next_line(), Some(&[1, 0, 1, 1, 0][..]));
        assert_eq!(reader.next_line(), Some(&[0, 1, 0, 0, 1][..]));
        assert_eq!(reader.next_line(), None);
    }

    #[test]
    fn test_packed_reader_4bit() {
        let data = [0xAB, 0xC0];
        let mut reader = PackedSampleReader::new(&data, 3, 4);
        assert_eq!(reader.next_line(), Some(&[0xA, 0xB, 0xC][..]));
    }

    #[test]
    fn test_packed_reader_8bit() {
        let data = [1, 2, 3, 4, 5, 6];
        let mut reader = PackedSampleReader::new(&data, 3, 8);
        assert_eq!(reader.next_line(), Some(&[1, 2, 3][..]));
        assert_eq!(reader.next_line(), Some(&[4, 5, 6][..]));
    }

    #[test]
    fn test_stencil_stride_padding() {
        let buffer = ImageBuffer::stencil(5, 2).unwrap();
        assert_eq!(buffer.stride(), 8);
        assert_eq!(buffer.view().data.len(), 16);

        let buffer = ImageBuffer::stencil(8, 1).unwrap();
        assert_eq!(buffer.stride(), 8);
    }

    #[test]
    fn test_color_stride() {
        let buffer = ImageBuffer::color(5, 2).unwrap();
        assert_eq!(buffer.stride(), 20);
        assert_eq!(buffer.view().data.len(), 40);
    }

    #[test]
    fn test_decode_stencil_mapping() {
        // invert = false: sample 0 -> opaque, 1 -> transparent.
        let data = [0b1010_0000];
        let mut reader = PackedSampleReader::new(&data, 4, 1);
        let buffer = decode_stencil(&mut reader, 4, 1, false).unwrap();
        assert_eq!(&buffer.view().data[..4], &[0, 255, 0, 255]);

        // invert = true flips the mapping.
        let mut reader = PackedSampleReader::new(&data, 4, 1);
        let buffer = decode_stencil(&mut reader, 4, 1, true).unwrap();
        assert_eq!(&buffer.view().data[..4], &[255, 0, 255, 0]);
    }

    #[test]
    fn test_decode_stencil_truncated_rows_stay_transparent() {
        let data = [0b0000_0000];
        let mut reader = PackedSampleReader::new(&data, 4, 1);
        let buffer = decode_stencil(&mut reader, 4, 2, false).unwrap();
        assert_eq!(&buffer.view().data[..4], &[255, 255, 255, 255]);
        assert_eq!(&buffer.view().data[buffer.stride()..buffer.stride() + 4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_color_general_path() {
        let data = [0u8, 255];
        let mut reader = PackedSampleReader::new(&data, 1, 8);
        let buffer = decode_color(&mut reader, 1, 2, &GrayMap, None).unwrap();
        assert_eq!(&buffer.view().data[..4], &[0, 0, 0, 255]);
        assert_eq!(&buffer.view().data[4..8], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_decode_color_fast_path_reverses_channels() {
        let data = [10u8, 20, 30];
        let mut reader = PackedSampleReader::new(&data, 3, 8);
        let buffer = decode_color(&mut reader, 1, 1, &RgbMap, None).unwrap();
        assert_eq!(&buffer.view().data[..4], &[30, 20, 10, 255]);
    }

    #[test]
    fn test_fast_path_matches_general_path() {
        struct SlowRgbMap;
        impl ColorMap for SlowRgbMap {
            fn num_pixel_comps(&self) -> usize {
                3
            }
            fn bits(&self) -> u8 {
                8
            }
            fn rgb(&self, samples: &[u8]) -> Rgb {
                RgbMap.rgb(samples)
            }
        }

        let data = [0u8, 127, 255, 63, 64, 65];
        let mut fast = PackedSampleReader::new(&data, 6, 8);
        let mut slow = PackedSampleReader::new(&data, 6, 8);
        let fast_buf = decode_color(&mut fast, 2, 1, &RgbMap, None).unwrap();
        let slow_buf = decode_color(&mut slow, 2, 1, &SlowRgbMap, None).unwrap();
        assert_eq!(fast_buf.view().data, slow_buf.view().data);
    }

    #[test]
    fn test_color_key_masking() {
        // 2x2 gray image; one pixel inside the transparent range.
        let data = [100u8, 10, 200, 250];
        let mut reader = PackedSampleReader::new(&data, 2, 8);
        let ranges = [(90u8, 110u8)];
        let buffer = decode_color(&mut reader, 2, 2, &GrayMap, Some(&ranges)).unwrap();
        let px = buffer.view().data;
        assert_eq!(px[3], 0); // 100 lies in [90, 110]
        assert_eq!(px[7], 255);
        assert_eq!(px[11], 255);
        assert_eq!(px[15], 255);
    }

    #[test]
    fn test_color_key_requires_every_component() {
        struct TwoCompMap;
        impl ColorMap for TwoCompMap {
            fn num_pixel_comps(&self) -> usize {
                2
            }
            fn bits(&self) -> u8 {
                8
            }
            fn rgb(&self, samples: &[u8]) -> Rgb {
                let v = samples[0] as f64 / 255.0;
                Rgb::new(v, v, v)
            }
        }

        // First pixel: both components inside. Second: one outside.
        let data = [5u8, 5, 5, 99];
        let mut reader = PackedSampleReader::new(&data, 4, 8);
        let ranges = [(0u8, 10u8), (0u8, 10u8)];
        let buffer = decode_color(&mut reader, 2, 1, &TwoCompMap, Some(&ranges)).unwrap();
        let px = buffer.view().data;
        assert_eq!(px[3], 0);
        assert_eq!(px[7], 255);
    }

    #[test]
    fn test_channel_rounding() {
        assert_eq!(channel_byte(0.0), 0);
        assert_eq!(channel_byte(1.0), 255);
        assert_eq!(channel_byte(0.5), 128);
        assert_eq!(channel_byte(-1.0), 0);
        assert_eq!(channel_byte(2.0), 255);
    }

    #[test]
    fn test_pattern_matrix_axis_aligned() {
        // Image placed in a 100x50 box at (10, 20), no flip in the CTM.
        let ctm = [100.0, 0.0, 0.0, 50.0, 10.0, 20.0];
        let m = image_pattern_matrix(&ctm, 4, 2).unwrap();
        // Forward transform maps pixel (0,0) -> device (10, 70) and
        // (4,2) -> (110, 20); the inverse must map them back.
        let apply = |m: &Matrix, x: f64, y: f64| {
            (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
        };
        let (px, py) = apply(&m, 10.0, 70.0);
        assert!((px - 0.0).abs() < 1e-9 && (py - 0.0).abs() < 1e-9);
        let (px, py) = apply(&m, 110.0, 20.0);
        assert!((px - 4.0).abs() < 1e-9 && (py - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_pattern_matrix_degenerate() {
        assert!(image_pattern_matrix(&[0.0; 6], 4, 4).is_none());
        assert!(image_pattern_matrix(&[1.0, 0.0, 0.0, 1.0, 0.0, 0.0], 0, 4).is_none());
    }
}
