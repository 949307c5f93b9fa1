//! Similarity warping of color images
//!
//! Every output pixel is mapped back through the inverse transform and
//! resampled from the source. Rows are independent and filled in parallel.

pub mod annotate;

use crate::config::{BorderMode, Interpolation, WarpConfig};
use crate::error::{AlignError, AlignResult};
use crate::estimator::SimilarityTransform;
use image::{Rgb, RgbImage};
use rayon::prelude::*;

pub use annotate::draw_landmarks;

const CHANNELS: usize = 3;

/// Sample coordinates are pinned to this magnitude before the integer cast,
/// so neighbor offsets can never overflow.
const SAMPLE_LIMIT: f64 = 1e9;

/// Catmull-Rom kernel (a = -0.5).
fn cubic_weight(x: f64) -> f64 {
    const A: f64 = -0.5;
    let x = x.abs();
    if x <= 1.0 {
        ((A + 2.0) * x - (A + 3.0)) * x * x + 1.0
    } else if x < 2.0 {
        ((A * x - 5.0 * A) * x + 8.0 * A) * x - 4.0 * A
    } else {
        0.0
    }
}

fn pin(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(-SAMPLE_LIMIT, SAMPLE_LIMIT)
    }
}

/// Map a possibly out-of-range index into `0..len`.
fn border_index(i: i64, len: u32, border: BorderMode) -> u32 {
    let n = len as i64;
    let mapped = match border {
        BorderMode::Replicate => i.clamp(0, n - 1),
        BorderMode::Reflect => {
            // edge pixel repeated: "cba|abcd|dcb"
            let m = i.rem_euclid(2 * n);
            if m >= n {
                2 * n - 1 - m
            } else {
                m
            }
        }
    };
    mapped as u32
}

/// Output canvas: the source size when the background is kept, otherwise
/// the reference output size.
pub fn canvas_size(source: (u32, u32), output_size: (u32, u32), preserve_background: bool) -> (u32, u32) {
    if preserve_background {
        source
    } else {
        output_size
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageWarper {
    interpolation: Interpolation,
    border: BorderMode,
}

impl Default for ImageWarper {
    fn default() -> Self {
        Self::new(&WarpConfig::default())
    }
}

impl ImageWarper {
    pub fn new(config: &WarpConfig) -> Self {
        Self {
            interpolation: config.interpolation,
            border: config.border,
        }
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn border(&self) -> BorderMode {
        self.border
    }

    /// Warp `image` by the forward `transform` onto a canvas chosen by
    /// [`canvas_size`].
    pub fn warp(
        &self,
        image: &RgbImage,
        transform: &SimilarityTransform,
        output_size: (u32, u32),
        preserve_background: bool,
    ) -> AlignResult<RgbImage> {
        let (src_w, src_h) = image.dimensions();
        if src_w == 0 || src_h == 0 {
            return Err(AlignError::DegenerateGeometry("empty source image".to_string()));
        }

        let (out_w, out_h) = canvas_size((src_w, src_h), output_size, preserve_background);
        if out_w == 0 || out_h == 0 {
            return Err(AlignError::DegenerateGeometry(format!(
                "empty output canvas {}x{}",
                out_w, out_h
            )));
        }

        let inverse = transform.inverse().ok_or_else(|| {
            AlignError::DegenerateGeometry(format!("transform is not invertible (scale {})", transform.scale()))
        })?;
        let [[a, b, tx], [c, d, ty]] = inverse.matrix();

        let row_len = out_w as usize * CHANNELS;
        let mut buffer = vec![0u8; row_len * out_h as usize];

        buffer
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| {
                let yf = y as f64;
                // row-constant part of the inverse mapping
                let base_x = b * yf + tx;
                let base_y = d * yf + ty;

                for (x, pixel) in row.chunks_exact_mut(CHANNELS).enumerate() {
                    let xf = x as f64;
                    let sx = a * xf + base_x;
                    let sy = c * xf + base_y;
                    let value = match self.interpolation {
                        Interpolation::Bilinear => self.sample_bilinear(image, sx, sy),
                        Interpolation::Bicubic => self.sample_bicubic(image, sx, sy),
                    };
                    pixel.copy_from_slice(&value.0);
                }
            });

        RgbImage::from_raw(out_w, out_h, buffer)
            .ok_or_else(|| AlignError::DegenerateGeometry("warp buffer size mismatch".to_string()))
    }

    fn fetch(&self, image: &RgbImage, x: i64, y: i64) -> [f64; CHANNELS] {
        let (w, h) = image.dimensions();
        let p = image.get_pixel(border_index(x, w, self.border), border_index(y, h, self.border));
        [p[0] as f64, p[1] as f64, p[2] as f64]
    }

    fn sample_bilinear(&self, image: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
        let (x, y) = (pin(x), pin(y));
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (xi, yi) = (x0 as i64, y0 as i64);

        let p00 = self.fetch(image, xi, yi);
        let p10 = self.fetch(image, xi + 1, yi);
        let p01 = self.fetch(image, xi, yi + 1);
        let p11 = self.fetch(image, xi + 1, yi + 1);

        let mut out = [0u8; CHANNELS];
        for ch in 0..CHANNELS {
            let v = p00[ch] * (1.0 - fx) * (1.0 - fy)
                + p10[ch] * fx * (1.0 - fy)
                + p01[ch] * (1.0 - fx) * fy
                + p11[ch] * fx * fy;
            out[ch] = v.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    }

    fn sample_bicubic(&self, image: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
        let (x, y) = (pin(x), pin(y));
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (xi, yi) = (x0 as i64, y0 as i64);

        let wx = [-1.0, 0.0, 1.0, 2.0].map(|i: f64| cubic_weight(i - fx));
        let wy = [-1.0, 0.0, 1.0, 2.0].map(|j: f64| cubic_weight(j - fy));

        let mut acc = [0.0f64; CHANNELS];
        for (j, wyj) in wy.iter().enumerate() {
            for (i, wxi) in wx.iter().enumerate() {
                let p = self.fetch(image, xi + i as i64 - 1, yi + j as i64 - 1);
                let w = wxi * wyj;
                for ch in 0..CHANNELS {
                    acc[ch] += p[ch] * w;
                }
            }
        }

        Rgb(acc.map(|v| v.round().clamp(0.0, 255.0) as u8))
    }
}
