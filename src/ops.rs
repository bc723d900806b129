// ops.rs — pixel-level image operations
//
// Every op here is a pure function `ImageBuffer -> ImageBuffer`: it never
// mutates its input, returns the empty buffer when handed one, and
// saturates instead of wrapping. Border handling for neighborhood ops is
// reflect-101 throughout.

use crate::buffer::{reflect_101, ImageBuffer};
use serde::{Deserialize, Serialize};

#[inline]
fn saturate(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

// ── Color conversion ────────────────────────────────────────────────

/// Convert to a single-channel grayscale buffer (BT.601 weights for RGB
/// inputs). A grayscale input is passed through unchanged.
pub fn to_grayscale(src: &ImageBuffer) -> ImageBuffer {
    if src.is_empty() {
        return ImageBuffer::empty();
    }
    if src.channels() == 1 {
        return src.clone();
    }
    let mut out = ImageBuffer::new(src.width(), src.height(), 1);
    for y in 0..src.height() {
        for x in 0..src.width() {
            let px = src.pixel(x, y);
            let v = if src.channels() >= 3 {
                0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
            } else {
                px[0] as f32
            };
            out.set_sample(x, y, 0, saturate(v));
        }
    }
    out
}

/// Replicate a grayscale buffer into three channels.
pub fn gray_to_rgb(src: &ImageBuffer) -> ImageBuffer {
    if src.is_empty() {
        return ImageBuffer::empty();
    }
    if src.channels() == 3 {
        return src.clone();
    }
    let mut out = ImageBuffer::new(src.width(), src.height(), 3);
    for y in 0..src.height() {
        for x in 0..src.width() {
            let v = src.sample(x, y, 0);
            out.pixel_mut(x, y).copy_from_slice(&[v, v, v]);
        }
    }
    out
}

/// Match `src`'s channel count to `channels` (1 or 3) by grayscale
/// conversion or replication.
pub fn match_channels(src: &ImageBuffer, channels: u8) -> ImageBuffer {
    match channels {
        1 => to_grayscale(src),
        _ => gray_to_rgb(src),
    }
}

// ── Tone ────────────────────────────────────────────────────────────

/// Linear tone map: `out = saturate(v * contrast + brightness)`.
pub fn brightness_contrast(src: &ImageBuffer, contrast: f32, brightness: f32) -> ImageBuffer {
    if src.is_empty() {
        return ImageBuffer::empty();
    }
    let mut out = src.clone();
    for v in out.data_mut() {
        *v = saturate(*v as f32 * contrast + brightness);
    }
    out
}

// ── Channel extraction ──────────────────────────────────────────────

/// Pull one channel out of an RGB image. With `grayscale` the result is
/// single-channel; otherwise the channel is kept in place with the other
/// two zeroed. Inputs with fewer than three channels produce the empty
/// buffer (channel split is not applicable).
pub fn extract_channel(src: &ImageBuffer, channel: u8, grayscale: bool) -> ImageBuffer {
    if src.is_empty() || src.channels() < 3 || channel >= 3 {
        return ImageBuffer::empty();
    }
    if grayscale {
        let mut out = ImageBuffer::new(src.width(), src.height(), 1);
        for y in 0..src.height() {
            for x in 0..src.width() {
                out.set_sample(x, y, 0, src.sample(x, y, channel));
            }
        }
        out
    } else {
        let mut out = ImageBuffer::new(src.width(), src.height(), 3);
        for y in 0..src.height() {
            for x in 0..src.width() {
                out.set_sample(x, y, channel, src.sample(x, y, channel));
            }
        }
        out
    }
}

// ── Kernels & convolution ───────────────────────────────────────────

/// A square convolution kernel, row-major weights.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    pub size: usize,
    pub weights: Vec<f32>,
}

impl Kernel {
    pub fn new(size: usize, weights: Vec<f32>) -> Self {
        debug_assert_eq!(weights.len(), size * size);
        Kernel { size, weights }
    }

    /// Scale weights so they sum to 1 (no-op for a zero-sum kernel).
    pub fn normalized(mut self) -> Self {
        let sum: f32 = self.weights.iter().sum();
        if sum.abs() > f32::EPSILON {
            for w in &mut self.weights {
                *w /= sum;
            }
        }
        self
    }
}

/// 1D Gaussian taps. A non-positive sigma falls back to the usual
/// size-derived default `0.3 * ((n - 1) * 0.5 - 1) + 0.8`.
pub fn gaussian_kernel_1d(size: usize, sigma: f64) -> Vec<f32> {
    let sigma = if sigma <= 0.0 {
        0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8
    } else {
        sigma
    };
    let center = (size / 2) as f64;
    let mut taps: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f64 - center;
            (-d * d / (2.0 * sigma * sigma)).exp() as f32
        })
        .collect();
    let sum: f32 = taps.iter().sum();
    for t in &mut taps {
        *t /= sum;
    }
    taps
}

/// 2D Gaussian kernel of size `2 * radius + 1` with sigma = radius / 3.
pub fn gaussian_kernel(radius: u32) -> Kernel {
    let radius = radius.max(1) as usize;
    let size = 2 * radius + 1;
    let taps = gaussian_kernel_1d(size, radius as f64 / 3.0);
    let mut weights = Vec::with_capacity(size * size);
    for i in 0..size {
        for j in 0..size {
            weights.push(taps[i] * taps[j]);
        }
    }
    Kernel::new(size, weights)
}

/// Motion-blur style kernel: Gaussian falloff with distance from the
/// line through the center at `angle_degrees`.
pub fn directional_kernel(radius: u32, angle_degrees: f32) -> Kernel {
    let radius = radius.max(1) as usize;
    let size = 2 * radius + 1;
    let angle = (angle_degrees as f64).to_radians();
    let (dy, dx) = angle.sin_cos();
    let center = (size / 2) as f64;

    let mut weights = Vec::with_capacity(size * size);
    for i in 0..size {
        let y = i as f64 - center;
        for j in 0..size {
            let x = j as f64 - center;
            let dist = (x * dy - y * dx).abs();
            weights.push((-dist * dist / 2.0).exp() as f32);
        }
    }
    Kernel::new(size, weights).normalized()
}

/// Correlate `src` with `kernel / divisor`, add `offset`, saturate.
/// Borders are reflect-101. A zero divisor is treated as 1.
pub fn convolve(src: &ImageBuffer, kernel: &Kernel, divisor: f32, offset: f32) -> ImageBuffer {
    if src.is_empty() {
        return ImageBuffer::empty();
    }
    let divisor = if divisor.abs() < f32::EPSILON {
        1.0
    } else {
        divisor
    };
    let k = kernel.size;
    let half = (k / 2) as i64;
    let mut out = ImageBuffer::new(src.width(), src.height(), src.channels());

    for y in 0..src.height() {
        for x in 0..src.width() {
            for c in 0..src.channels() {
                let mut sum = 0.0f32;
                for i in 0..k {
                    let sy = reflect_101(y as i64 + i as i64 - half, src.height());
                    for j in 0..k {
                        let sx = reflect_101(x as i64 + j as i64 - half, src.width());
                        sum += kernel.weights[i * k + j] / divisor
                            * src.sample(sx, sy, c) as f32;
                    }
                }
                out.set_sample(x, y, c, saturate(sum + offset));
            }
        }
    }
    out
}

// ── Thresholding ────────────────────────────────────────────────────

/// Per-pixel response once a threshold level is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdKind {
    Binary,
    BinaryInv,
    Truncate,
    ToZero,
    ToZeroInv,
}

#[inline]
fn apply_threshold(v: u8, level: u8, max_value: u8, kind: ThresholdKind) -> u8 {
    match kind {
        ThresholdKind::Binary => {
            if v > level {
                max_value
            } else {
                0
            }
        }
        ThresholdKind::BinaryInv => {
            if v > level {
                0
            } else {
                max_value
            }
        }
        ThresholdKind::Truncate => v.min(level),
        ThresholdKind::ToZero => {
            if v > level {
                v
            } else {
                0
            }
        }
        ThresholdKind::ToZeroInv => {
            if v > level {
                0
            } else {
                v
            }
        }
    }
}

/// Fixed-level threshold over a grayscale buffer.
pub fn threshold_fixed(
    src: &ImageBuffer,
    level: u8,
    max_value: u8,
    kind: ThresholdKind,
) -> ImageBuffer {
    if src.is_empty() {
        return ImageBuffer::empty();
    }
    let mut out = src.clone();
    for v in out.data_mut() {
        *v = apply_threshold(*v, level, max_value, kind);
    }
    out
}

/// Otsu's method: the level maximizing between-class variance of the
/// grayscale histogram.
pub fn otsu_level(src: &ImageBuffer) -> u8 {
    let mut histogram = [0u64; 256];
    for &v in src.data() {
        histogram[v as usize] += 1;
    }
    let total = src.data().len() as f64;
    if total == 0.0 {
        return 0;
    }

    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut sum_bg = 0.0;
    let mut weight_bg = 0.0;
    let mut best_level = 0u8;
    let mut best_variance = 0.0;

    for level in 0..256usize {
        weight_bg += histogram[level] as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        sum_bg += level as f64 * histogram[level] as f64;

        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;
        let variance = weight_bg * weight_fg * (mean_bg - mean_fg) * (mean_bg - mean_fg);
        if variance > best_variance {
            best_variance = variance;
            best_level = level as u8;
        }
    }
    best_level
}

/// Neighborhood statistic used for the adaptive threshold level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdaptiveMethod {
    Mean,
    Gaussian,
}

/// Adaptive binary threshold: each pixel is compared against the
/// (weighted) mean of its `block_size` neighborhood minus `c`.
pub fn threshold_adaptive(
    src: &ImageBuffer,
    method: AdaptiveMethod,
    block_size: u32,
    c: f32,
    max_value: u8,
) -> ImageBuffer {
    if src.is_empty() {
        return ImageBuffer::empty();
    }
    let block = (block_size.max(3) | 1) as usize;
    let half = (block / 2) as i64;

    let weights: Vec<f32> = match method {
        AdaptiveMethod::Mean => {
            let w = 1.0 / (block * block) as f32;
            vec![w; block * block]
        }
        AdaptiveMethod::Gaussian => {
            let taps = gaussian_kernel_1d(block, 0.0);
            let mut ws = Vec::with_capacity(block * block);
            for i in 0..block {
                for j in 0..block {
                    ws.push(taps[i] * taps[j]);
                }
            }
            ws
        }
    };

    let mut out = ImageBuffer::new(src.width(), src.height(), 1);
    for y in 0..src.height() {
        for x in 0..src.width() {
            let mut mean = 0.0f32;
            for i in 0..block {
                let sy = reflect_101(y as i64 + i as i64 - half, src.height());
                for j in 0..block {
                    let sx = reflect_101(x as i64 + j as i64 - half, src.width());
                    mean += weights[i * block + j] * src.sample(sx, sy, 0) as f32;
                }
            }
            let v = src.sample(x, y, 0) as f32;
            let result = if v > mean - c { max_value } else { 0 };
            out.set_sample(x, y, 0, result);
        }
    }
    out
}

// ── Sobel edge detection ────────────────────────────────────────────

fn binomial_row(len: usize) -> Vec<f32> {
    let mut row = vec![1.0f32];
    for _ in 1..len {
        let mut next = vec![1.0f32; row.len() + 1];
        for i in 1..row.len() {
            next[i] = row[i - 1] + row[i];
        }
        row = next;
    }
    row
}

fn convolve_1d(a: &[f32], b: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0f32; a.len() + b.len() - 1];
    for (i, &av) in a.iter().enumerate() {
        for (j, &bv) in b.iter().enumerate() {
            out[i + j] += av * bv;
        }
    }
    out
}

/// 1D Sobel taps: smoothing is a binomial row, the derivative is the
/// binomial row of size n-2 convolved with [-1, 0, 1]. Size 1 selects
/// the unsmoothed central difference.
pub fn sobel_kernel_1d(size: usize, derivative: bool) -> Vec<f32> {
    if derivative {
        if size <= 1 {
            vec![-1.0, 0.0, 1.0]
        } else {
            convolve_1d(&binomial_row(size - 2), &[-1.0, 0.0, 1.0])
        }
    } else if size <= 1 {
        vec![1.0]
    } else {
        binomial_row(size)
    }
}

fn sobel_axis(src: &ImageBuffer, horizontal: bool, size: usize, scale: f32, delta: f32) -> Vec<f32> {
    let (kx, ky) = if horizontal {
        (sobel_kernel_1d(size, true), sobel_kernel_1d(size, false))
    } else {
        (sobel_kernel_1d(size, false), sobel_kernel_1d(size, true))
    };
    let half_x = (kx.len() / 2) as i64;
    let half_y = (ky.len() / 2) as i64;

    let mut out = vec![0.0f32; src.width() as usize * src.height() as usize];
    for y in 0..src.height() {
        for x in 0..src.width() {
            let mut sum = 0.0f32;
            for (i, &wy) in ky.iter().enumerate() {
                let sy = reflect_101(y as i64 + i as i64 - half_y, src.height());
                for (j, &wx) in kx.iter().enumerate() {
                    let sx = reflect_101(x as i64 + j as i64 - half_x, src.width());
                    sum += wy * wx * src.sample(sx, sy, 0) as f32;
                }
            }
            out[y as usize * src.width() as usize + x as usize] = sum * scale + delta;
        }
    }
    out
}

/// Gradient magnitude by Sobel correlation over a grayscale buffer.
/// Axis responses are absolute-valued and, when both axes are enabled,
/// averaged. Disabling both axes yields a zero image.
pub fn sobel(
    src: &ImageBuffer,
    horizontal: bool,
    vertical: bool,
    kernel_size: u32,
    scale: f32,
    delta: f32,
) -> ImageBuffer {
    if src.is_empty() {
        return ImageBuffer::empty();
    }
    let size = (kernel_size.clamp(1, 7) | 1) as usize;
    let mut out = ImageBuffer::new(src.width(), src.height(), 1);

    let gx = horizontal.then(|| sobel_axis(src, true, size, scale, delta));
    let gy = vertical.then(|| sobel_axis(src, false, size, scale, delta));

    let data = out.data_mut();
    match (gx, gy) {
        (Some(gx), Some(gy)) => {
            for (i, v) in data.iter_mut().enumerate() {
                *v = saturate(0.5 * gx[i].abs() + 0.5 * gy[i].abs());
            }
        }
        (Some(g), None) | (None, Some(g)) => {
            for (i, v) in data.iter_mut().enumerate() {
                *v = saturate(g[i].abs());
            }
        }
        (None, None) => {}
    }
    out
}

/// Paint detected edges red on top of the source image.
pub fn overlay_edges(src: &ImageBuffer, edges: &ImageBuffer) -> ImageBuffer {
    if src.is_empty() || edges.is_empty() {
        return ImageBuffer::empty();
    }
    let mut out = gray_to_rgb(src);
    for y in 0..out.height().min(edges.height()) {
        for x in 0..out.width().min(edges.width()) {
            if edges.sample(x, y, 0) > 0 {
                out.pixel_mut(x, y).copy_from_slice(&[255, 0, 0]);
            }
        }
    }
    out
}

// ── Blending ────────────────────────────────────────────────────────

/// Weighted sum of two same-size, same-channel buffers:
/// `saturate(a * alpha + b * beta + gamma)`.
pub fn add_weighted(
    a: &ImageBuffer,
    alpha: f32,
    b: &ImageBuffer,
    beta: f32,
    gamma: f32,
) -> ImageBuffer {
    if a.is_empty() || b.is_empty() || !a.same_size(b) || a.channels() != b.channels() {
        return ImageBuffer::empty();
    }
    let mut out = a.clone();
    for (o, &bv) in out.data_mut().iter_mut().zip(b.data()) {
        *o = saturate(*o as f32 * alpha + bv as f32 * beta + gamma);
    }
    out
}

/// Arithmetic blend mode applied per channel in normalized [0, 1] space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum BlendMode {
    /// Weighted addition of the overlay onto the base.
    Normal { opacity: f32 },
    Multiply,
    Screen,
    Overlay,
    Difference,
}

impl Default for BlendMode {
    fn default() -> Self {
        BlendMode::Normal { opacity: 1.0 }
    }
}

/// Blend `overlay` onto `base`. The buffers must agree in size and
/// channel count (use [`resize_bilinear`] and [`match_channels`] first).
pub fn blend(base: &ImageBuffer, overlay: &ImageBuffer, mode: BlendMode) -> ImageBuffer {
    if base.is_empty() || overlay.is_empty() || !base.same_size(overlay)
        || base.channels() != overlay.channels()
    {
        return ImageBuffer::empty();
    }
    if let BlendMode::Normal { opacity } = mode {
        return add_weighted(base, 1.0, overlay, opacity, 0.0);
    }
    let mut out = base.clone();
    for (o, &bv) in out.data_mut().iter_mut().zip(overlay.data()) {
        let a = *o as f32 / 255.0;
        let b = bv as f32 / 255.0;
        let v = match mode {
            BlendMode::Multiply => a * b,
            BlendMode::Screen => 1.0 - (1.0 - a) * (1.0 - b),
            BlendMode::Overlay => {
                if a < 0.5 {
                    2.0 * a * b
                } else {
                    1.0 - 2.0 * (1.0 - a) * (1.0 - b)
                }
            }
            BlendMode::Difference => (a - b).abs(),
            BlendMode::Normal { .. } => unreachable!(),
        };
        *o = saturate(v * 255.0);
    }
    out
}

// ── Resampling ──────────────────────────────────────────────────────

/// Bilinear resize to `width` x `height`.
pub fn resize_bilinear(src: &ImageBuffer, width: u32, height: u32) -> ImageBuffer {
    if src.is_empty() || width == 0 || height == 0 {
        return ImageBuffer::empty();
    }
    if src.width() == width && src.height() == height {
        return src.clone();
    }
    let mut out = ImageBuffer::new(width, height, src.channels());
    let x_ratio = src.width() as f32 / width as f32;
    let y_ratio = src.height() as f32 / height as f32;

    for y in 0..height {
        let sy = ((y as f32 + 0.5) * y_ratio - 0.5).max(0.0);
        let y0 = sy.floor() as u32;
        let y1 = (y0 + 1).min(src.height() - 1);
        let fy = sy - y0 as f32;
        for x in 0..width {
            let sx = ((x as f32 + 0.5) * x_ratio - 0.5).max(0.0);
            let x0 = sx.floor() as u32;
            let x1 = (x0 + 1).min(src.width() - 1);
            let fx = sx - x0 as f32;
            for c in 0..src.channels() {
                let top = src.sample(x0, y0, c) as f32 * (1.0 - fx)
                    + src.sample(x1, y0, c) as f32 * fx;
                let bottom = src.sample(x0, y1, c) as f32 * (1.0 - fx)
                    + src.sample(x1, y1, c) as f32 * fx;
                out.set_sample(x, y, c, saturate(top * (1.0 - fy) + bottom * fy));
            }
        }
    }
    out
}

// ── Noise field application ─────────────────────────────────────────

/// A color gradient sampled by normalized field intensity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub stops: Vec<PaletteStop>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaletteStop {
    /// Position in [0, 1].
    pub at: f32,
    pub color: [u8; 3],
}

impl Default for Palette {
    fn default() -> Self {
        Palette::grayscale()
    }
}

impl Palette {
    pub fn grayscale() -> Self {
        Palette {
            stops: vec![
                PaletteStop {
                    at: 0.0,
                    color: [0, 0, 0],
                },
                PaletteStop {
                    at: 1.0,
                    color: [255, 255, 255],
                },
            ],
        }
    }

    /// Linear interpolation between adjacent stops; `t` is clamped.
    pub fn sample(&self, t: f32) -> [u8; 3] {
        if self.stops.is_empty() {
            return [0, 0, 0];
        }
        let t = t.clamp(0.0, 1.0);
        let first = &self.stops[0];
        if t <= first.at {
            return first.color;
        }
        for pair in self.stops.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if t <= hi.at {
                let span = (hi.at - lo.at).max(f32::EPSILON);
                let f = (t - lo.at) / span;
                let mut color = [0u8; 3];
                for (i, ch) in color.iter_mut().enumerate() {
                    *ch = saturate(lo.color[i] as f32 * (1.0 - f) + hi.color[i] as f32 * f);
                }
                return color;
            }
        }
        self.stops[self.stops.len() - 1].color
    }
}

/// Map a single-channel field through a palette into an RGB image.
pub fn colorize(field: &[u8], width: u32, height: u32, palette: &Palette) -> ImageBuffer {
    if field.len() != width as usize * height as usize {
        return ImageBuffer::empty();
    }
    let mut out = ImageBuffer::new(width, height, 3);
    for y in 0..height {
        for x in 0..width {
            let v = field[y as usize * width as usize + x as usize] as f32 / 255.0;
            out.pixel_mut(x, y).copy_from_slice(&palette.sample(v));
        }
    }
    out
}

/// Add a field onto an image: `saturate(src + field * strength)` on every
/// channel. The field must cover the image dimensions.
pub fn add_field(src: &ImageBuffer, field: &[u8], strength: f32) -> ImageBuffer {
    if src.is_empty() || field.len() != src.width() as usize * src.height() as usize {
        return ImageBuffer::empty();
    }
    let mut out = src.clone();
    for y in 0..src.height() {
        for x in 0..src.width() {
            let n = field[y as usize * src.width() as usize + x as usize] as f32;
            for c in 0..src.channels() {
                let v = out.sample(x, y, c) as f32 + n * strength;
                out.set_sample(x, y, c, saturate(v));
            }
        }
    }
    out
}

/// Remap each output pixel to a spatially offset source pixel driven by
/// the field: offset = (field/255 - 0.5) * strength on both axes, with
/// reflect-101 resolution of out-of-bounds coordinates.
pub fn displace(src: &ImageBuffer, field: &[u8], strength: f32) -> ImageBuffer {
    if src.is_empty() || field.len() != src.width() as usize * src.height() as usize {
        return ImageBuffer::empty();
    }
    let mut out = src.clone();
    for y in 0..src.height() {
        for x in 0..src.width() {
            let n = field[y as usize * src.width() as usize + x as usize] as f32 / 255.0;
            let d = ((n - 0.5) * strength) as i64;
            let sx = reflect_101(x as i64 + d, src.width());
            let sy = reflect_101(y as i64 + d, src.height());
            for c in 0..src.channels() {
                let v = src.sample(sx, sy, c);
                out.set_sample(x, y, c, v);
            }
        }
    }
    out
}
