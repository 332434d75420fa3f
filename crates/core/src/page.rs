//! Single page conversion: rasterize, flatten, encode, write.

use crate::config::{PageTask, RenderConfig};
use crate::error::{ConversionError, Result};
use crate::rasterizer::DocumentHandle;
use image::{Rgb, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

/// A page that was written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOutput {
    /// Zero-based page index.
    pub index: usize,
    /// Final PNG location.
    pub path: PathBuf,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
}

/// Converts individual pages of an open document to PNG files.
#[derive(Debug, Clone, Default)]
pub struct PageConverter {
    config: RenderConfig,
}

impl PageConverter {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Convert one page to `task.output_path`.
    ///
    /// The parent directory must already exist. On failure nothing is left
    /// at the output path; an existing file there is only replaced once the
    /// new one is complete.
    pub fn convert(
        &self,
        document: &dyn DocumentHandle,
        task: &PageTask,
        dpi: u32,
    ) -> Result<PageOutput> {
        let start = Instant::now();

        let raster = document.render_page(task.index, dpi)?;
        let flattened = flatten_alpha(&raster, self.config.background_color);
        drop(raster);

        let png_data = encode_png(&flattened, self.config.png_compression_mode())?;
        write_atomic(&task.output_path, &png_data)?;

        debug!(
            "Page {} -> {:?} ({}x{}) in {:?}",
            task.index + 1,
            task.output_path,
            flattened.width(),
            flattened.height(),
            start.elapsed()
        );

        Ok(PageOutput {
            index: task.index,
            path: task.output_path.clone(),
            width: flattened.width(),
            height: flattened.height(),
        })
    }
}

/// Composite an RGBA image over an opaque background, dropping alpha.
///
/// Per channel: `out = src * a + bg * (1 - a)`, rounded to nearest.
pub fn flatten_alpha(image: &RgbaImage, background: (u8, u8, u8)) -> RgbImage {
    let (r, g, b) = background;
    let bg = [r, g, b];

    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let px = image.get_pixel(x, y);
        let alpha = u32::from(px[3]);
        if alpha == 255 {
            return Rgb([px[0], px[1], px[2]]);
        }
        let inv = 255 - alpha;
        let blend = |c: usize| -> u8 {
            ((u32::from(px[c]) * alpha + u32::from(bg[c]) * inv + 127) / 255) as u8
        };
        Rgb([blend(0), blend(1), blend(2)])
    })
}

/// Encode an opaque RGB image to PNG bytes.
pub fn encode_png(image: &RgbImage, compression: png::Compression) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());

    let mut encoder = png::Encoder::new(&mut buffer, image.width(), image.height());
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(compression);

    let mut writer = encoder.write_header()?;
    writer.write_image_data(image.as_raw())?;
    drop(writer);

    Ok(buffer.into_inner())
}

/// Write `data` to `path` through a temporary sibling file and rename it
/// into place, so a partially written PNG is never visible under `path`.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut builder = tempfile::Builder::new();
    builder.prefix(".pdf2png-").suffix(".tmp");
    // Same mode as a plain create; the umask still applies.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }

    let mut tmp = builder
        .tempfile_in(parent)
        .map_err(|e| ConversionError::write(path, e))?;

    tmp.write_all(data)
        .and_then(|_| tmp.flush())
        .map_err(|e| ConversionError::write(path, e))?;

    tmp.persist(path)
        .map_err(|e| ConversionError::write(path, e.error))?;

    Ok(())
}
