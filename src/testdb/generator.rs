//! Page generator for simulated scanners
//!
//! Builds the raw buffers a native-transfer driver hands over: uncompressed
//! 24-bit BMP images with a deterministic pattern. Pages are kept small so
//! scenario runs stay fast; their size still follows the negotiated
//! resolution so tests can see that negotiation reached the scanner.

use crate::device::traits::PixelType;

/// Size of the BMP file header plus the BITMAPINFOHEADER
const BMP_HEADER_SIZE: u32 = 54;

/// Pixels per meter written into the header (72 DPI)
const PIXELS_PER_METER: u32 = 2835;

/// Letter-size page, in hundredths of an inch
const PAGE_WIDTH_HUNDREDTHS: u32 = 850;
const PAGE_HEIGHT_HUNDREDTHS: u32 = 1100;

/// Simulated pages are this many times smaller than the real thing
const DOWNSCALE: u32 = 50;

/// Generator for simulated page content
pub struct MockPageGenerator;

impl MockPageGenerator {
    /// Page dimensions in pixels for `dpi`, downscaled
    pub fn page_size(dpi: u32) -> (u32, u32) {
        let dpi = if dpi == 0 { 200 } else { dpi };
        let width = (PAGE_WIDTH_HUNDREDTHS * dpi / 100 / DOWNSCALE).max(4);
        let height = (PAGE_HEIGHT_HUNDREDTHS * dpi / 100 / DOWNSCALE).max(4);
        (width, height)
    }

    /// Render one page as BMP bytes.
    ///
    /// `shade` sets the base intensity; the pattern varies along both axes so
    /// two pages with different shades never encode identically.
    pub fn render(width: u32, height: u32, shade: u8, pixel_type: PixelType) -> Vec<u8> {
        let row_bytes = width * 3;
        let padding = (4 - row_bytes % 4) % 4;
        let image_size = (row_bytes + padding) * height;
        let file_size = BMP_HEADER_SIZE + image_size;

        let mut data = Vec::with_capacity(file_size as usize);

        // BITMAPFILEHEADER
        data.extend_from_slice(b"BM");
        data.extend_from_slice(&file_size.to_le_bytes());
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // Reserved
        data.extend_from_slice(&BMP_HEADER_SIZE.to_le_bytes()); // Pixel data offset

        // BITMAPINFOHEADER
        data.extend_from_slice(&40u32.to_le_bytes());
        data.extend_from_slice(&(width as i32).to_le_bytes());
        data.extend_from_slice(&(height as i32).to_le_bytes()); // Bottom-up
        data.extend_from_slice(&1u16.to_le_bytes()); // Planes
        data.extend_from_slice(&24u16.to_le_bytes()); // Bits per pixel
        data.extend_from_slice(&0u32.to_le_bytes()); // BI_RGB
        data.extend_from_slice(&image_size.to_le_bytes());
        data.extend_from_slice(&PIXELS_PER_METER.to_le_bytes());
        data.extend_from_slice(&PIXELS_PER_METER.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes()); // Palette colors
        data.extend_from_slice(&0u32.to_le_bytes()); // Important colors

        for y in 0..height {
            for x in 0..width {
                let (b, g, r) = Self::pixel(x, y, shade, pixel_type);
                data.extend_from_slice(&[b, g, r]);
            }
            data.extend(std::iter::repeat(0u8).take(padding as usize));
        }

        data
    }

    fn pixel(x: u32, y: u32, shade: u8, pixel_type: PixelType) -> (u8, u8, u8) {
        let base = shade.wrapping_add(((x + y) % 64) as u8);
        match pixel_type {
            PixelType::BlackWhite => {
                let v = if base >= 0x80 { 0xFF } else { 0x00 };
                (v, v, v)
            }
            PixelType::Gray => (base, base, base),
            PixelType::Rgb => (
                base,
                shade.wrapping_add((x % 128) as u8),
                shade.wrapping_add((y % 128) as u8),
            ),
        }
    }

    /// Bytes that look like the start of a page but don't decode
    pub fn corrupt(size: usize, seed: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(size);
        data.extend_from_slice(b"BM");
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        data.extend_from_slice(&BMP_HEADER_SIZE.to_le_bytes());
        // no such info header size
        data.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());

        let mut current = seed;
        while data.len() < size {
            current = current.wrapping_mul(6364136223846793005).wrapping_add(1);
            data.push((current >> 33) as u8);
        }
        data.truncate(size.max(18));
        data
    }
}

/// RGB page of `width` x `height` pixels as BMP bytes
pub fn render_page(width: u32, height: u32, shade: u8) -> Vec<u8> {
    MockPageGenerator::render(width, height, shade, PixelType::Rgb)
}
