//! Facade over an external denoising device.
//!
//! The actual filter (an OIDN-style device) is injected behind
//! [`DenoiseDevice`]; this module only prepares inputs, selects the filter
//! variant and forwards progress/cancellation.

use std::sync::Arc;

use crate::image::{ImageBuffer, ImageFormat};

/// Denoiser invocation parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Info {
    pub num_threads: u32,
    pub width: u32,
    pub height: u32,
    /// Selects the lightmap-tuned filter and disables the HDR flag.
    pub lightmap: bool,
    pub hdr: bool,
}

impl Default for Info {
    fn default() -> Self {
        Info {
            num_threads: 16,
            width: 0,
            height: 0,
            lightmap: false,
            hdr: true,
        }
    }
}

/// Pixel formats accepted by denoising devices: interleaved 3-channel float
/// rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DenoiseImageFormat {
    Rgb32F,
    Rgb16F,
}

/// Borrowed pixel plane handed to the device.
#[derive(Debug)]
pub struct ImageData<'a> {
    pub data: &'a mut [u8],
    pub format: DenoiseImageFormat,
}

/// Input planes: the beauty image plus optional auxiliary feature images.
#[derive(Debug)]
pub struct ImageInputs<'a> {
    pub beauty: ImageData<'a>,
    pub albedo: Option<ImageData<'a>>,
    pub normal: Option<ImageData<'a>>,
}

/// Progress callback; returning `false` cancels the filter.
pub type ProgressCallback<'a> = &'a (dyn Fn(f32) -> bool + Send + Sync);

/// An external denoising device. Implementations surface their own error
/// strings verbatim.
pub trait DenoiseDevice: Send + Sync {
    fn denoise(
        &self,
        info: &Info,
        inputs: &mut ImageInputs<'_>,
        output: &mut ImageData<'_>,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<(), String>;
}

/// Pass-through device used when no real denoiser is installed.
#[derive(Debug, Default)]
pub struct IdentityDenoiser;

impl DenoiseDevice for IdentityDenoiser {
    fn denoise(
        &self,
        _info: &Info,
        inputs: &mut ImageInputs<'_>,
        output: &mut ImageData<'_>,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<(), String> {
        if let Some(progress) = progress {
            if !progress(0.0) {
                return Err("Cancelled".to_owned());
            }
        }
        if output.data.len() != inputs.beauty.data.len() {
            return Err(format!(
                "Output size {} does not match input size {}",
                output.data.len(),
                inputs.beauty.data.len()
            ));
        }
        output.data.copy_from_slice(inputs.beauty.data);
        if let Some(progress) = progress {
            progress(1.0);
        }
        Ok(())
    }
}

/// Denoiser facade bound to a device.
pub struct Denoiser {
    device: Arc<dyn DenoiseDevice>,
}

impl std::fmt::Debug for Denoiser {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Denoiser").finish()
    }
}

impl Default for Denoiser {
    fn default() -> Self {
        Denoiser {
            device: Arc::new(IdentityDenoiser),
        }
    }
}

impl Denoiser {
    pub fn new(device: Arc<dyn DenoiseDevice>) -> Self {
        Denoiser { device }
    }

    pub fn denoise(
        &self,
        info: &Info,
        inputs: &mut ImageInputs<'_>,
        output: &mut ImageData<'_>,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<(), String> {
        let mut info = *info;
        if info.lightmap {
            info.hdr = false;
        }
        self.device.denoise(&info, inputs, output, progress)
    }

    /// Denoises an RGBA image buffer in place, extracting RGB planes for the
    /// device and writing the filtered color back over the input.
    pub fn denoise_image(
        &self,
        info: &Info,
        image: &mut ImageBuffer,
        albedo: Option<&ImageBuffer>,
        normal: Option<&ImageBuffer>,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<(), String> {
        let mut beauty = extract_rgb(image)?;
        let mut albedo_plane = albedo.map(extract_rgb).transpose()?;
        let mut normal_plane = normal.map(extract_rgb).transpose()?;
        let mut output = vec![0u8; beauty.len()];

        let mut inputs = ImageInputs {
            beauty: ImageData {
                data: &mut beauty,
                format: DenoiseImageFormat::Rgb32F,
            },
            albedo: albedo_plane.as_mut().map(|p| ImageData {
                data: p.as_mut_slice(),
                format: DenoiseImageFormat::Rgb32F,
            }),
            normal: normal_plane.as_mut().map(|p| ImageData {
                data: p.as_mut_slice(),
                format: DenoiseImageFormat::Rgb32F,
            }),
        };
        let mut output_data = ImageData {
            data: &mut output,
            format: DenoiseImageFormat::Rgb32F,
        };
        self.denoise(info, &mut inputs, &mut output_data, progress)?;
        write_rgb(image, &output)
    }
}

fn extract_rgb(image: &ImageBuffer) -> Result<Vec<u8>, String> {
    if image.format() != ImageFormat::Rgba32F {
        return Err(format!(
            "Denoiser input must be Rgba32F, got {:?}",
            image.format()
        ));
    }
    let pixels = image.pixels_f32().map_err(|e| e.to_string())?;
    let mut rgb = Vec::with_capacity(pixels.len() / 4 * 3);
    for px in pixels.chunks_exact(4) {
        rgb.extend_from_slice(&px[0].to_le_bytes());
        rgb.extend_from_slice(&px[1].to_le_bytes());
        rgb.extend_from_slice(&px[2].to_le_bytes());
    }
    Ok(rgb)
}

fn write_rgb(image: &mut ImageBuffer, rgb: &[u8]) -> Result<(), String> {
    let pixels = image.pixels_f32_mut().map_err(|e| e.to_string())?;
    let channels: &[f32] = bytemuck::cast_slice(rgb);
    if channels.len() != pixels.len() / 4 * 3 {
        return Err("Denoiser output plane has unexpected size".to_owned());
    }
    for (px, rgb) in pixels.chunks_exact_mut(4).zip(channels.chunks_exact(3)) {
        px[0] = rgb[0];
        px[1] = rgb[1];
        px[2] = rgb[2];
    }
    Ok(())
}

/// Denoises with the default device.
pub fn denoise(
    info: &Info,
    inputs: &mut ImageInputs<'_>,
    output: &mut ImageData<'_>,
    progress: Option<ProgressCallback<'_>>,
) -> Result<(), String> {
    Denoiser::default().denoise(info, inputs, output, progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_device_copies_beauty() {
        let mut image = ImageBuffer::new(2, 2, ImageFormat::Rgba32F);
        {
            let px = image.pixels_f32_mut().unwrap();
            for (i, v) in px.iter_mut().enumerate() {
                *v = i as f32;
            }
        }
        let before = image.clone();
        Denoiser::default()
            .denoise_image(
                &Info {
                    width: 2,
                    height: 2,
                    ..Info::default()
                },
                &mut image,
                None,
                None,
                None,
            )
            .unwrap();
        // RGB unchanged, alpha untouched.
        assert_eq!(image, before);
    }

    #[test]
    fn lightmap_disables_hdr() {
        struct Probe;
        impl DenoiseDevice for Probe {
            fn denoise(
                &self,
                info: &Info,
                _inputs: &mut ImageInputs<'_>,
                _output: &mut ImageData<'_>,
                _progress: Option<ProgressCallback<'_>>,
            ) -> Result<(), String> {
                assert!(info.lightmap);
                assert!(!info.hdr);
                Ok(())
            }
        }
        let denoiser = Denoiser::new(Arc::new(Probe));
        let mut beauty = vec![0u8; 12];
        let mut output = vec![0u8; 12];
        let mut inputs = ImageInputs {
            beauty: ImageData {
                data: &mut beauty,
                format: DenoiseImageFormat::Rgb32F,
            },
            albedo: None,
            normal: None,
        };
        let mut out = ImageData {
            data: &mut output,
            format: DenoiseImageFormat::Rgb32F,
        };
        denoiser
            .denoise(
                &Info {
                    lightmap: true,
                    hdr: true,
                    width: 1,
                    height: 1,
                    ..Info::default()
                },
                &mut inputs,
                &mut out,
                None,
            )
            .unwrap();
    }

    #[test]
    fn cancelling_progress_aborts() {
        let mut beauty = vec![0u8; 12];
        let mut output = vec![0u8; 12];
        let mut inputs = ImageInputs {
            beauty: ImageData {
                data: &mut beauty,
                format: DenoiseImageFormat::Rgb32F,
            },
            albedo: None,
            normal: None,
        };
        let mut out = ImageData {
            data: &mut output,
            format: DenoiseImageFormat::Rgb32F,
        };
        let cancel: &(dyn Fn(f32) -> bool + Send + Sync) = &|_| false;
        let result = denoise(&Info::default(), &mut inputs, &mut out, Some(cancel));
        assert!(result.is_err());
    }
}
