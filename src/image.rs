//! CPU-side image buffers exchanged between the tile manager, the denoiser
//! and render output consumers.

use std::{collections::HashMap, fmt, sync::Arc};

/// Alpha value written by the tile pipeline once a tile is initialized.
pub const FULLY_OPAQUE: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum ImageFormat {
    /// 4 x f32 per pixel.
    Rgba32F,

    /// 4 x f16 per pixel. Produced by HDR-output backends; this crate moves
    /// the bytes around without converting them.
    Rgba16F,
}

impl ImageFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            ImageFormat::Rgba32F => 16,
            ImageFormat::Rgba16F => 8,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Buffer of {actual} bytes does not match {width}x{height} {format:?} ({expected} bytes)")]
    SizeMismatch {
        width: u32,
        height: u32,
        format: ImageFormat,
        expected: usize,
        actual: usize,
    },

    #[error("Operation requires {expected:?} data, buffer is {actual:?}")]
    WrongFormat {
        expected: ImageFormat,
        actual: ImageFormat,
    },

    #[error("Rectangle {x},{y} {w}x{h} exceeds image bounds {width}x{height}")]
    OutOfBounds {
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        width: u32,
        height: u32,
    },
}

/// Owned pixel rectangle.
#[derive(Clone, PartialEq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    format: ImageFormat,
    data: Vec<u8>,
}

impl fmt::Debug for ImageBuffer {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("ImageBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("data", &format_args!("{} bytes", self.data.len()))
            .finish()
    }
}

impl ImageBuffer {
    /// Zero-initialized buffer.
    pub fn new(width: u32, height: u32, format: ImageFormat) -> Self {
        ImageBuffer {
            width,
            height,
            format,
            data: vec![0u8; width as usize * height as usize * format.bytes_per_pixel()],
        }
    }

    /// Wraps existing pixel bytes. The byte count must match the extent.
    pub fn from_bytes(
        width: u32,
        height: u32,
        format: ImageFormat,
        data: Vec<u8>,
    ) -> Result<Self, ImageError> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(ImageError::SizeMismatch {
                width,
                height,
                format,
                expected,
                actual: data.len(),
            });
        }
        Ok(ImageBuffer {
            width,
            height,
            format,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn extent(&self) -> crate::Extent2d {
        crate::Extent2d::new(self.width, self.height)
    }

    pub fn size_in_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Float view of an `Rgba32F` buffer.
    pub fn pixels_f32(&self) -> Result<&[f32], ImageError> {
        if self.format != ImageFormat::Rgba32F {
            return Err(ImageError::WrongFormat {
                expected: ImageFormat::Rgba32F,
                actual: self.format,
            });
        }
        Ok(bytemuck::cast_slice(&self.data))
    }

    pub fn pixels_f32_mut(&mut self) -> Result<&mut [f32], ImageError> {
        if self.format != ImageFormat::Rgba32F {
            return Err(ImageError::WrongFormat {
                expected: ImageFormat::Rgba32F,
                actual: self.format,
            });
        }
        Ok(bytemuck::cast_slice_mut(&mut self.data))
    }

    pub fn flip_horizontally(&mut self) {
        let bpp = self.format.bytes_per_pixel();
        let row_size = self.width as usize * bpp;
        let width = self.width as usize;
        for row in self.data.chunks_exact_mut(row_size) {
            for x in 0..width / 2 {
                let lx = x * bpp;
                let rx = (width - 1 - x) * bpp;
                for b in 0..bpp {
                    row.swap(lx + b, rx + b);
                }
            }
        }
    }

    pub fn flip_vertically(&mut self) {
        let row_size = self.width as usize * self.format.bytes_per_pixel();
        let h = self.height as usize;
        for y in 0..h / 2 {
            let (top, bottom) = self.data.split_at_mut((h - 1 - y) * row_size);
            top[y * row_size..(y + 1) * row_size].swap_with_slice(&mut bottom[..row_size]);
        }
    }

    pub fn flip(&mut self, horizontally: bool, vertically: bool) {
        if horizontally {
            self.flip_horizontally();
        }
        if vertically {
            self.flip_vertically();
        }
    }

    /// Overwrites the alpha channel of every pixel. `Rgba16F` data is written
    /// with the half-precision bit pattern of 0 or 1.
    pub fn clear_alpha(&mut self, alpha: f32) {
        match self.format {
            ImageFormat::Rgba32F => {
                let pixels: &mut [f32] = bytemuck::cast_slice_mut(&mut self.data);
                for px in pixels.chunks_exact_mut(4) {
                    px[3] = alpha;
                }
            }
            ImageFormat::Rgba16F => {
                let bits: u16 = if alpha >= 1.0 { 0x3c00 } else { 0 };
                let pixels: &mut [u16] = bytemuck::cast_slice_mut(&mut self.data);
                for px in pixels.chunks_exact_mut(4) {
                    px[3] = bits;
                }
            }
        }
    }

    /// Copies `src` into this buffer with its top-left corner at `(x, y)`.
    pub fn blit_from(&mut self, src: &ImageBuffer, x: u32, y: u32) -> Result<(), ImageError> {
        if src.format != self.format {
            return Err(ImageError::WrongFormat {
                expected: self.format,
                actual: src.format,
            });
        }
        if x + src.width > self.width || y + src.height > self.height {
            return Err(ImageError::OutOfBounds {
                x,
                y,
                w: src.width,
                h: src.height,
                width: self.width,
                height: self.height,
            });
        }
        let bpp = self.format.bytes_per_pixel();
        let src_row = src.width as usize * bpp;
        let dst_row = self.width as usize * bpp;
        let mut dst_offset = (y as usize * self.width as usize + x as usize) * bpp;
        let mut src_offset = 0;
        for _ in 0..src.height {
            self.data[dst_offset..dst_offset + src_row]
                .copy_from_slice(&src.data[src_offset..src_offset + src_row]);
            src_offset += src_row;
            dst_offset += dst_row;
        }
        Ok(())
    }

    /// Stacks `top` above `bottom` into a buffer twice as tall. Used for
    /// stereoscopic output (left eye on top).
    pub fn stack_vertical(
        top: &ImageBuffer,
        bottom: &ImageBuffer,
    ) -> Result<ImageBuffer, ImageError> {
        if top.format != bottom.format {
            return Err(ImageError::WrongFormat {
                expected: top.format,
                actual: bottom.format,
            });
        }
        if top.width != bottom.width || top.height != bottom.height {
            return Err(ImageError::OutOfBounds {
                x: 0,
                y: top.height,
                w: bottom.width,
                h: bottom.height,
                width: top.width,
                height: top.height * 2,
            });
        }
        let mut out = ImageBuffer::new(top.width, top.height * 2, top.format);
        let split = top.data.len();
        out.data[..split].copy_from_slice(&top.data);
        out.data[split..].copy_from_slice(&bottom.data);
        Ok(out)
    }
}

/// Render result: one image per declared pass.
#[derive(Clone, Debug, Default)]
pub struct ImageLayerSet {
    pub images: HashMap<String, Arc<ImageBuffer>>,
}

impl ImageLayerSet {
    pub fn get(&self, name: &str) -> Option<&Arc<ImageBuffer>> {
        self.images.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, image: Arc<ImageBuffer>) {
        self.images.insert(name.into(), image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(w: u32, h: u32, f: impl Fn(u32, u32) -> [f32; 4]) -> ImageBuffer {
        let mut img = ImageBuffer::new(w, h, ImageFormat::Rgba32F);
        {
            let px = img.pixels_f32_mut().unwrap();
            for y in 0..h {
                for x in 0..w {
                    let i = ((y * w + x) * 4) as usize;
                    px[i..i + 4].copy_from_slice(&f(x, y));
                }
            }
        }
        img
    }

    fn pixel(img: &ImageBuffer, x: u32, y: u32) -> [f32; 4] {
        let px = img.pixels_f32().unwrap();
        let i = ((y * img.width() + x) * 4) as usize;
        [px[i], px[i + 1], px[i + 2], px[i + 3]]
    }

    #[test]
    fn horizontal_flip_mirrors_pixels() {
        let mut img = filled(4, 2, |x, y| [x as f32, y as f32, 0.0, 1.0]);
        img.flip_horizontally();
        assert_eq!(pixel(&img, 0, 0)[0], 3.0);
        assert_eq!(pixel(&img, 3, 0)[0], 0.0);
        assert_eq!(pixel(&img, 1, 1)[1], 1.0);
    }

    #[test]
    fn vertical_flip_mirrors_rows() {
        let mut img = filled(2, 4, |x, y| [x as f32, y as f32, 0.0, 1.0]);
        img.flip_vertically();
        assert_eq!(pixel(&img, 0, 0)[1], 3.0);
        assert_eq!(pixel(&img, 0, 3)[1], 0.0);
    }

    #[test]
    fn clear_alpha_sets_every_pixel() {
        let mut img = filled(3, 3, |_, _| [0.2, 0.4, 0.6, 0.1]);
        img.clear_alpha(FULLY_OPAQUE);
        for y in 0..3 {
            for x in 0..3 {
                assert_eq!(pixel(&img, x, y)[3], 1.0);
            }
        }
    }

    #[test]
    fn blit_places_rect() {
        let mut dst = ImageBuffer::new(4, 4, ImageFormat::Rgba32F);
        let src = filled(2, 2, |_, _| [1.0, 2.0, 3.0, 4.0]);
        dst.blit_from(&src, 2, 1).unwrap();
        assert_eq!(pixel(&dst, 2, 1), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(pixel(&dst, 3, 2), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(pixel(&dst, 1, 1), [0.0; 4]);
    }

    #[test]
    fn blit_rejects_out_of_bounds() {
        let mut dst = ImageBuffer::new(2, 2, ImageFormat::Rgba32F);
        let src = ImageBuffer::new(2, 2, ImageFormat::Rgba32F);
        assert!(dst.blit_from(&src, 1, 0).is_err());
    }

    #[test]
    fn vertical_stack_keeps_top_on_top() {
        let top = filled(2, 2, |_, _| [1.0, 0.0, 0.0, 1.0]);
        let bottom = filled(2, 2, |_, _| [0.0, 1.0, 0.0, 1.0]);
        let merged = ImageBuffer::stack_vertical(&top, &bottom).unwrap();
        assert_eq!(merged.height(), 4);
        assert_eq!(pixel(&merged, 0, 0), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(pixel(&merged, 1, 3), [0.0, 1.0, 0.0, 1.0]);
    }
}
