// io.rs — image decode/encode at the graph's file boundaries
//
// Everything inside the graph is an `ImageBuffer`; this module is the
// only place the `image` crate's formats and color types appear. Loads
// normalize to 3-channel RGB. Saves accept 1- or 3-channel buffers.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};
use tracing::debug;

use crate::buffer::ImageBuffer;
use crate::error::IoError;
use crate::graph::{NodeId, PipelineGraph};
use crate::nodes::{LoadImageParams, NodeKind, OutputFormat, PngCompression};

/// Decode an image file into a 3-channel RGB buffer. The format is
/// inferred from the file contents.
pub fn load(path: impl AsRef<Path>) -> Result<ImageBuffer, IoError> {
    let path = path.as_ref();
    let decoded = image::open(path).map_err(IoError::Decode)?.to_rgb8();
    let (width, height) = decoded.dimensions();
    debug!(path = %path.display(), width, height, "decoded image");
    // Length is width * height * 3 by construction
    Ok(ImageBuffer::from_raw(width, height, 3, decoded.into_raw())
        .unwrap_or_else(ImageBuffer::empty))
}

/// Encode `buffer` to `path` in the given format. Grayscale buffers are
/// written as 8-bit luma, RGB buffers as 8-bit RGB.
pub fn save(path: impl AsRef<Path>, buffer: &ImageBuffer, format: OutputFormat) -> Result<(), IoError> {
    if buffer.is_empty() {
        return Err(IoError::EmptyBuffer);
    }
    let color = match buffer.channels() {
        1 => ExtendedColorType::L8,
        3 => ExtendedColorType::Rgb8,
        other => return Err(IoError::UnsupportedChannels(other)),
    };

    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    let (w, h) = (buffer.width(), buffer.height());
    match format {
        OutputFormat::Jpeg { quality } => {
            JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100))
                .write_image(buffer.data(), w, h, color)
                .map_err(IoError::Encode)?;
        }
        OutputFormat::Png { compression } => {
            let level = match compression {
                PngCompression::Fast => CompressionType::Fast,
                PngCompression::Default => CompressionType::Default,
                PngCompression::Best => CompressionType::Best,
            };
            PngEncoder::new_with_quality(&mut writer, level, FilterType::Adaptive)
                .write_image(buffer.data(), w, h, color)
                .map_err(IoError::Encode)?;
        }
        OutputFormat::Bmp => {
            BmpEncoder::new(&mut writer)
                .write_image(buffer.data(), w, h, color)
                .map_err(IoError::Encode)?;
        }
    }
    debug!(path = %path.display(), ?format, width = w, height = h, "encoded image");
    Ok(())
}

/// Re-decode every load node that has a path but no pixels. Graph
/// documents do not carry pixel data, so a graph restored through
/// `PipelineGraph::from_spec` calls this to repopulate its sources.
/// Load nodes without a path are left alone.
pub fn reload_sources(graph: &mut PipelineGraph) -> Result<(), IoError> {
    let ids: Vec<NodeId> = graph.node_ids().collect();
    for id in ids {
        let path = match graph.kind(id) {
            Ok(NodeKind::LoadImage(params)) if params.image.is_empty() => {
                match &params.path {
                    Some(path) => path.clone(),
                    None => continue,
                }
            }
            _ => continue,
        };
        let image = load(&path)?;
        // The id comes from node_ids, so set_kind cannot fail
        let _ = graph.set_kind(
            id,
            NodeKind::LoadImage(LoadImageParams {
                path: Some(path),
                image,
            }),
        );
    }
    Ok(())
}

/// Write every output node's cached buffer to its configured path.
/// Nodes without a path or with an empty cache are skipped; call
/// `evaluate_all` first for fresh results.
pub fn save_outputs(graph: &PipelineGraph) -> Result<(), IoError> {
    for id in graph.node_ids() {
        if let Ok(NodeKind::Output {
            format,
            path: Some(path),
        }) = graph.kind(id)
        {
            let buffer = match graph.output(id) {
                Ok(buffer) if !buffer.is_empty() => buffer,
                _ => continue,
            };
            save(path, &buffer, *format)?;
        }
    }
    Ok(())
}
