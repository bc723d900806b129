// nodes.rs — node kinds, their parameters, and the compute dispatch
//
// A node's behavior is fully described by its `NodeKind` value: the
// variant selects the operation, the payload carries the parameters.
// `process` is a pure function of (kind, inputs) -> output buffer, which
// is what makes the dirty-flag cache sound: a node only needs recomputing
// when its kind changed or an upstream output changed.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::buffer::ImageBuffer;
use crate::noise::NoiseSynth;
use crate::ops::{
    self, AdaptiveMethod, BlendMode, Kernel, Palette, ThresholdKind,
};

fn default_true() -> bool {
    true
}

// ── Per-kind parameter blocks ───────────────────────────────────────

/// Source node: an image decoded from disk. The decoded pixels are kept
/// out of serialized documents; reloading from `path` restores them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadImageParams {
    pub path: Option<PathBuf>,
    #[serde(skip)]
    pub image: ImageBuffer,
}

impl LoadImageParams {
    pub fn with_image(image: ImageBuffer) -> Self {
        LoadImageParams { path: None, image }
    }
}

/// RGB channel selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Red,
    Green,
    #[default]
    Blue,
}

impl Channel {
    pub fn index(self) -> u8 {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }
}

/// Threshold level selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum ThresholdMethod {
    Fixed {
        value: u8,
        kind: ThresholdKind,
    },
    Otsu {
        kind: ThresholdKind,
    },
    Adaptive {
        adaptive: AdaptiveMethod,
        block_size: u32,
        c: f32,
    },
}

impl Default for ThresholdMethod {
    fn default() -> Self {
        ThresholdMethod::Fixed {
            value: 127,
            kind: ThresholdKind::Binary,
        }
    }
}

/// How a synthesized noise field is applied to the node's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum NoiseMode {
    /// Additive grain: `out = src + field * strength`.
    Add { strength: f32 },
    /// Spatial distortion: each pixel reads from a field-driven offset.
    Displace { strength: f32 },
    /// Replace the input with the field mapped through a color palette.
    Colorize { palette: Palette },
}

impl Default for NoiseMode {
    fn default() -> Self {
        NoiseMode::Add { strength: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    #[serde(flatten)]
    pub synth: NoiseSynth,
    #[serde(flatten)]
    pub mode: NoiseMode,
}

impl Default for NoiseParams {
    fn default() -> Self {
        NoiseParams {
            synth: NoiseSynth::default(),
            mode: NoiseMode::default(),
        }
    }
}

/// User-supplied square convolution matrix with OpenCV-style divisor
/// and offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvolveParams {
    pub size: u32,
    pub weights: Vec<f32>,
    pub divisor: f32,
    pub offset: f32,
}

impl Default for ConvolveParams {
    fn default() -> Self {
        Self::identity()
    }
}

impl ConvolveParams {
    pub fn identity() -> Self {
        ConvolveParams {
            size: 3,
            weights: vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            divisor: 1.0,
            offset: 0.0,
        }
    }

    pub fn sharpen() -> Self {
        ConvolveParams {
            size: 3,
            weights: vec![0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0],
            divisor: 1.0,
            offset: 0.0,
        }
    }

    pub fn emboss() -> Self {
        ConvolveParams {
            size: 3,
            weights: vec![-2.0, -1.0, 0.0, -1.0, 1.0, 1.0, 0.0, 1.0, 2.0],
            divisor: 1.0,
            offset: 128.0,
        }
    }

    pub fn edge_enhance() -> Self {
        ConvolveParams {
            size: 3,
            weights: vec![0.0, 0.0, 0.0, -1.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            divisor: 1.0,
            offset: 128.0,
        }
    }

    /// Laplacian-style all-direction edge response.
    pub fn edge_detect() -> Self {
        ConvolveParams {
            size: 3,
            weights: vec![-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0],
            divisor: 1.0,
            offset: 0.0,
        }
    }

    pub fn gaussian_blur() -> Self {
        ConvolveParams {
            size: 3,
            weights: vec![1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0],
            divisor: 16.0,
            offset: 0.0,
        }
    }

    pub fn box_blur(size: u32) -> Self {
        let size = (size.max(3) | 1).min(15);
        let n = (size * size) as usize;
        ConvolveParams {
            size,
            weights: vec![1.0; n],
            divisor: n as f32,
            offset: 0.0,
        }
    }

    fn kernel(&self) -> Kernel {
        Kernel::new(self.size as usize, self.weights.clone())
    }
}

/// PNG encoder effort/size trade-off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PngCompression {
    Fast,
    #[default]
    Default,
    Best,
}

/// Encoding selected by a sink node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format")]
pub enum OutputFormat {
    Jpeg {
        quality: u8,
    },
    Png {
        #[serde(default)]
        compression: PngCompression,
    },
    Bmp,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Png {
            compression: PngCompression::Default,
        }
    }
}

// ── Node kinds ──────────────────────────────────────────────────────

/// Every node the pipeline knows how to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    LoadImage(LoadImageParams),

    BrightnessContrast {
        #[serde(default)]
        brightness: f32,
        #[serde(default = "default_contrast")]
        contrast: f32,
    },

    ChannelSplit {
        #[serde(default)]
        channel: Channel,
        #[serde(default)]
        grayscale: bool,
    },

    Blur {
        #[serde(default = "default_blur_radius")]
        radius: u32,
        #[serde(default)]
        directional: bool,
        #[serde(default)]
        angle: f32,
    },

    Threshold {
        #[serde(flatten)]
        method: ThresholdMethod,
        #[serde(default = "default_max_value")]
        max_value: u8,
    },

    EdgeDetect {
        #[serde(default = "default_true")]
        horizontal: bool,
        #[serde(default = "default_true")]
        vertical: bool,
        #[serde(default = "default_edge_ksize")]
        kernel_size: u32,
        #[serde(default = "default_contrast")]
        scale: f32,
        #[serde(default)]
        delta: f32,
        #[serde(default)]
        overlay: bool,
    },

    Blend {
        #[serde(flatten)]
        mode: BlendMode,
    },

    NoiseGenerate(NoiseParams),

    Convolve(ConvolveParams),

    Output {
        #[serde(flatten)]
        format: OutputFormat,
        path: Option<PathBuf>,
    },
}

fn default_contrast() -> f32 {
    1.0
}

fn default_blur_radius() -> u32 {
    5
}

fn default_max_value() -> u8 {
    255
}

fn default_edge_ksize() -> u32 {
    3
}

impl NodeKind {
    /// Number of input slots this kind consumes.
    pub fn input_count(&self) -> usize {
        match self {
            NodeKind::LoadImage(_) => 0,
            NodeKind::Blend { .. } => 2,
            _ => 1,
        }
    }

    /// Short human-readable name for logs and UIs.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::LoadImage(_) => "load",
            NodeKind::BrightnessContrast { .. } => "brightness/contrast",
            NodeKind::ChannelSplit { .. } => "channel split",
            NodeKind::Blur { .. } => "blur",
            NodeKind::Threshold { .. } => "threshold",
            NodeKind::EdgeDetect { .. } => "edge detect",
            NodeKind::Blend { .. } => "blend",
            NodeKind::NoiseGenerate(_) => "noise",
            NodeKind::Convolve(_) => "convolve",
            NodeKind::Output { .. } => "output",
        }
    }

    /// Compute this node's output from its resolved inputs. Missing or
    /// unconnected inputs arrive as empty buffers; operations degrade to
    /// the empty buffer rather than failing.
    pub fn process(&self, inputs: &[Arc<ImageBuffer>]) -> ImageBuffer {
        let empty = ImageBuffer::empty();
        let input = |slot: usize| inputs.get(slot).map(|b| b.as_ref()).unwrap_or(&empty);

        match self {
            NodeKind::LoadImage(params) => params.image.clone(),

            NodeKind::BrightnessContrast {
                brightness,
                contrast,
            } => ops::brightness_contrast(input(0), *contrast, *brightness),

            NodeKind::ChannelSplit { channel, grayscale } => {
                ops::extract_channel(input(0), channel.index(), *grayscale)
            }

            NodeKind::Blur {
                radius,
                directional,
                angle,
            } => {
                let kernel = if *directional {
                    ops::directional_kernel(*radius, *angle)
                } else {
                    ops::gaussian_kernel(*radius)
                };
                ops::convolve(input(0), &kernel, 1.0, 0.0)
            }

            NodeKind::Threshold { method, max_value } => {
                let gray = ops::to_grayscale(input(0));
                if gray.is_empty() {
                    return gray;
                }
                match method {
                    ThresholdMethod::Fixed { value, kind } => {
                        ops::threshold_fixed(&gray, *value, *max_value, *kind)
                    }
                    ThresholdMethod::Otsu { kind } => {
                        let level = ops::otsu_level(&gray);
                        ops::threshold_fixed(&gray, level, *max_value, *kind)
                    }
                    ThresholdMethod::Adaptive {
                        adaptive,
                        block_size,
                        c,
                    } => ops::threshold_adaptive(&gray, *adaptive, *block_size, *c, *max_value),
                }
            }

            NodeKind::EdgeDetect {
                horizontal,
                vertical,
                kernel_size,
                scale,
                delta,
                overlay,
            } => {
                let src = input(0);
                let gray = ops::to_grayscale(src);
                let edges = ops::sobel(&gray, *horizontal, *vertical, *kernel_size, *scale, *delta);
                if *overlay {
                    ops::overlay_edges(src, &edges)
                } else {
                    edges
                }
            }

            NodeKind::Blend { mode } => {
                let base = input(0);
                let over = input(1);
                if base.is_empty() {
                    return ImageBuffer::empty();
                }
                // No overlay connected: the blend is a passthrough
                if over.is_empty() {
                    return base.clone();
                }
                let over = ops::resize_bilinear(over, base.width(), base.height());
                let over = ops::match_channels(&over, base.channels());
                ops::blend(base, &over, *mode)
            }

            NodeKind::NoiseGenerate(params) => {
                let src = input(0);
                // Field dimensions always come from the input image
                if src.is_empty() {
                    return ImageBuffer::empty();
                }
                let field = params.synth.render(src.width(), src.height());
                match &params.mode {
                    NoiseMode::Colorize { palette } => {
                        ops::colorize(&field, src.width(), src.height(), palette)
                    }
                    NoiseMode::Add { strength } => ops::add_field(src, &field, *strength),
                    NoiseMode::Displace { strength } => ops::displace(src, &field, *strength),
                }
            }

            NodeKind::Convolve(params) => {
                ops::convolve(input(0), &params.kernel(), params.divisor, params.offset)
            }

            NodeKind::Output { .. } => input(0).clone(),
        }
    }
}
