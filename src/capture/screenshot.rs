//! Full-screen capture using the `xcap` crate.

use image::DynamicImage;
use xcap::Monitor;

use super::{encode_half_scale_jpeg, CaptureError, CaptureProvider};

/// Captures the primary monitor, or the first monitor when none reports primary.
#[derive(Debug, Default)]
pub struct PrimaryMonitorCapture;

impl PrimaryMonitorCapture {
    pub fn new() -> Self {
        Self
    }

    fn capture_image(&self) -> Result<DynamicImage, CaptureError> {
        let monitors =
            Monitor::all().map_err(|e| CaptureError::MonitorEnumeration(e.to_string()))?;

        let primary_index = monitors
            .iter()
            .position(|m| m.is_primary().unwrap_or(false))
            .unwrap_or(0);

        let monitor = monitors
            .into_iter()
            .nth(primary_index)
            .ok_or(CaptureError::NoMonitor)?;

        let image = monitor
            .capture_image()
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

        Ok(DynamicImage::ImageRgba8(image))
    }
}

impl CaptureProvider for PrimaryMonitorCapture {
    fn capture_frame(&self) -> Result<Vec<u8>, CaptureError> {
        let start = std::time::Instant::now();
        let image = self.capture_image()?;
        let bytes = encode_half_scale_jpeg(&image)?;
        log::debug!(
            "Captured {}x{} screen into {} bytes in {}ms",
            image.width(),
            image.height(),
            bytes.len(),
            start.elapsed().as_millis()
        );
        Ok(bytes)
    }
}
