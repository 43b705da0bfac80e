// ============================================================================
// IMGPROC: buffer I/O, colour conversion, thresholding, inpaint dispatch
// ============================================================================

use image::{GrayImage, RgbaImage};
use rayon::prelude::*;

use super::context::Engine;
use super::mat::Mat;
use super::EngineError;
use crate::ops::inpaint::{self, InpaintMethod};

/// Supported colour-space conversions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorConversion {
    /// Drop alpha.
    Rgba2Rgb,
    /// Luma from RGB, alpha ignored.
    Rgba2Gray,
    Rgb2Gray,
    /// Opaque RGBA from RGB.
    Rgb2Rgba,
}

impl ColorConversion {
    fn input_channels(self) -> u8 {
        match self {
            ColorConversion::Rgba2Rgb | ColorConversion::Rgba2Gray => 4,
            ColorConversion::Rgb2Gray | ColorConversion::Rgb2Rgba => 3,
        }
    }

    fn output_channels(self) -> u8 {
        match self {
            ColorConversion::Rgba2Rgb => 3,
            ColorConversion::Rgba2Gray | ColorConversion::Rgb2Gray => 1,
            ColorConversion::Rgb2Rgba => 4,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ColorConversion::Rgba2Rgb => "RGBA2RGB",
            ColorConversion::Rgba2Gray => "RGBA2GRAY",
            ColorConversion::Rgb2Gray => "RGB2GRAY",
            ColorConversion::Rgb2Rgba => "RGB2RGBA",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThresholdType {
    /// `max` where `src > thresh`, else 0.
    Binary,
    /// 0 where `src > thresh`, else `max`.
    BinaryInv,
}

/// Rec.601 luma in 14-bit fixed point; weights sum to exactly 1 << 14 so
/// pure white maps to 255 and pure black to 0.
#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14) as u8
}

impl Engine {
    pub(crate) fn mat_from_raw(
        &self,
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<Mat, EngineError> {
        Mat::from_raw(self.buffers(), width, height, channels, data)
    }

    /// Read an RGBA raster into a 4-channel buffer.
    pub fn read_rgba(&self, img: &RgbaImage) -> Result<Mat, EngineError> {
        if img.width() == 0 || img.height() == 0 {
            return Err(EngineError::EmptyImage);
        }
        self.mat_from_raw(img.width(), img.height(), 4, img.as_raw().clone())
    }

    /// Read a grayscale raster into a 1-channel buffer.
    pub fn read_gray(&self, img: &GrayImage) -> Result<Mat, EngineError> {
        if img.width() == 0 || img.height() == 0 {
            return Err(EngineError::EmptyImage);
        }
        self.mat_from_raw(img.width(), img.height(), 1, img.as_raw().clone())
    }

    pub fn cvt_color(&self, src: &Mat, code: ColorConversion) -> Result<Mat, EngineError> {
        let cin = code.input_channels();
        if src.channels() != cin {
            return Err(EngineError::ChannelMismatch {
                op: code.name(),
                expected: match cin {
                    4 => "4",
                    _ => "3",
                },
                got: src.channels(),
            });
        }
        let (cin, cout) = (cin as usize, code.output_channels() as usize);
        let mut dst = Mat::zeros(self.buffers(), src.width(), src.height(), cout as u8)?;
        dst.data_mut()
            .par_chunks_exact_mut(cout)
            .zip(src.data().par_chunks_exact(cin))
            .for_each(|(d, s)| match code {
                ColorConversion::Rgba2Rgb => d.copy_from_slice(&s[..3]),
                ColorConversion::Rgba2Gray | ColorConversion::Rgb2Gray => {
                    d[0] = luma(s[0], s[1], s[2])
                }
                ColorConversion::Rgb2Rgba => {
                    d[..3].copy_from_slice(s);
                    d[3] = 255;
                }
            });
        Ok(dst)
    }

    pub fn threshold(
        &self,
        src: &Mat,
        thresh: u8,
        max_value: u8,
        kind: ThresholdType,
    ) -> Result<Mat, EngineError> {
        if src.channels() != 1 {
            return Err(EngineError::ChannelMismatch {
                op: "threshold",
                expected: "1",
                got: src.channels(),
            });
        }
        let (hit, miss) = match kind {
            ThresholdType::Binary => (max_value, 0),
            ThresholdType::BinaryInv => (0, max_value),
        };
        let data: Vec<u8> = src
            .data()
            .par_iter()
            .map(|&v| if v > thresh { hit } else { miss })
            .collect();
        self.mat_from_raw(src.width(), src.height(), 1, data)
    }

    /// Fill the non-zero pixels of `mask` in `src`.
    ///
    /// `src` must have 1 or 3 channels; 4-channel input is rejected and has to
    /// be converted with [`ColorConversion::Rgba2Rgb`] first.
    pub fn inpaint(
        &self,
        src: &Mat,
        mask: &Mat,
        radius: u32,
        method: InpaintMethod,
    ) -> Result<Mat, EngineError> {
        if src.is_empty() {
            return Err(EngineError::EmptyImage);
        }
        if !matches!(src.channels(), 1 | 3) {
            return Err(EngineError::ChannelMismatch {
                op: "inpaint",
                expected: "1 or 3",
                got: src.channels(),
            });
        }
        if mask.channels() != 1 {
            return Err(EngineError::ChannelMismatch {
                op: "inpaint mask",
                expected: "1",
                got: mask.channels(),
            });
        }
        if src.dimensions() != mask.dimensions() {
            return Err(EngineError::SizeMismatch {
                source: src.dimensions(),
                mask: mask.dimensions(),
            });
        }
        let max = self.config().max_radius;
        if radius == 0 || radius > max {
            return Err(EngineError::InvalidRadius { radius, max });
        }

        let (w, h) = src.dimensions();
        let channels = src.channels() as usize;
        let data = match method {
            InpaintMethod::Telea => {
                inpaint::inpaint_telea(src.data(), w, h, channels, mask.data(), radius)
            }
            InpaintMethod::PatchMatch => inpaint::inpaint_patchmatch(
                src.data(),
                w,
                h,
                channels,
                mask.data(),
                self.config().patch_size,
                self.config().patch_iterations,
            ),
        };
        self.mat_from_raw(w, h, src.channels(), data)
    }

    /// Render a buffer as an RGBA raster; 1 and 3 channel input becomes opaque.
    pub fn to_rgba_image(&self, mat: &Mat) -> Result<RgbaImage, EngineError> {
        let (w, h) = mat.dimensions();
        let data: Vec<u8> = match mat.channels() {
            4 => mat.data().to_vec(),
            3 => mat
                .data()
                .par_chunks_exact(3)
                .flat_map_iter(|p| [p[0], p[1], p[2], 255])
                .collect(),
            1 => mat
                .data()
                .par_iter()
                .flat_map_iter(|&v| [v, v, v, 255])
                .collect(),
            c => return Err(EngineError::UnsupportedChannels(c)),
        };
        let expected = w as usize * h as usize * 4;
        let got = data.len();
        RgbaImage::from_raw(w, h, data).ok_or(EngineError::BadLength { expected, got })
    }
}
