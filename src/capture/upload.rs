use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::io::Cursor;
use std::path::Path;

const MAX_WIDTH: u32 = 1280;

/// Reads an image file and returns it as a `data:image/png;base64,...` URI,
/// downscaled to at most 1280 px wide.
pub fn load_data_uri(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    encode_data_uri(&bytes).with_context(|| format!("{} is not a usable image", path.display()))
}

pub fn encode_data_uri(bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        bail!("image is empty");
    }
    let format = image::guess_format(bytes).context("unrecognized image format")?;
    let image = image::load_from_memory_with_format(bytes, format)
        .context("failed to decode image")?;

    let (width, height) = (image.width(), image.height());
    let image = if width > MAX_WIDTH {
        let scale = MAX_WIDTH as f64 / width as f64;
        let new_height = ((height as f64 * scale) as u32).max(1);
        image.resize_exact(MAX_WIDTH, new_height, image::imageops::FilterType::Triangle)
    } else {
        image
    };
    log::debug!(
        "Encoded {:?} image {}x{} as {}x{} PNG",
        format,
        width,
        height,
        image.width(),
        image.height()
    );

    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, image::ImageFormat::Png)
        .context("failed to encode image")?;

    Ok(format!(
        "data:image/png;base64,{}",
        STANDARD.encode(buffer.into_inner())
    ))
}
