use std::sync::Arc;

use chrono::{DateTime, Local};

/// Strftime pattern used for archive and pending item file names.
pub const FILE_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S%.3f";

/// Strftime pattern used in message bodies.
pub const BODY_STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A compressed screen image and the moment it was taken. Immutable; clones share
/// the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    bytes: Arc<[u8]>,
    captured_at: DateTime<Local>,
}

impl CapturedFrame {
    pub fn new(bytes: impl Into<Arc<[u8]>>, captured_at: DateTime<Local>) -> Self {
        Self {
            bytes: bytes.into(),
            captured_at,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    /// File stem derived from the capture time, millisecond precision.
    pub fn file_stem(&self) -> String {
        self.captured_at.format(FILE_STAMP_FORMAT).to_string()
    }

    /// `YYYY-MM` bucket the frame belongs to.
    pub fn month_key(&self) -> String {
        self.captured_at.format("%Y-%m").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_stem_and_month_key_follow_capture_time() {
        let at = Local.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap();
        let frame = CapturedFrame::new(vec![1u8, 2, 3], at);

        assert_eq!(frame.file_stem(), "2026-03-09_14-05-07.000");
        assert_eq!(frame.month_key(), "2026-03");
        assert_eq!(frame.bytes(), &[1, 2, 3]);
    }
}
