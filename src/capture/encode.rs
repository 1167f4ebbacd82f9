use std::io::Cursor;

use image::{imageops::FilterType, DynamicImage, ImageFormat};

use super::CaptureError;

/// Halve both dimensions and encode as JPEG to keep attachments small.
pub fn encode_half_scale_jpeg(image: &DynamicImage) -> Result<Vec<u8>, CaptureError> {
    let width = (image.width() / 2).max(1);
    let height = (image.height() / 2).max(1);

    let resized = image.resize_exact(width, height, FilterType::Triangle);
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut bytes = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok(bytes)
}
