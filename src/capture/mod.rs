//! Screen capture boundary.
//!
//! The engine only sees [`CaptureProvider`]; the OS-facing implementation lives in
//! `screenshot.rs` behind the `screen` feature.

mod encode;
#[cfg(feature = "screen")]
mod screenshot;

pub use encode::encode_half_scale_jpeg;
#[cfg(feature = "screen")]
pub use screenshot::PrimaryMonitorCapture;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Failed to enumerate monitors: {0}")]
    MonitorEnumeration(String),

    #[error("No monitor found")]
    NoMonitor,

    #[error("Screen capture failed: {0}")]
    CaptureFailed(String),

    #[error("Frame encoding failed: {0}")]
    Encode(String),
}

/// Produces one compressed raster image per call. May block.
pub trait CaptureProvider: Send + Sync {
    fn capture_frame(&self) -> Result<Vec<u8>, CaptureError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc, Mutex, PoisonError,
    };

    use super::{CaptureError, CaptureProvider};

    /// Returns a tiny JPEG-looking payload per call, failing on demand. With a gate
    /// installed, each capture reports entry and waits for a release.
    #[derive(Default)]
    pub(crate) struct ScriptedCapture {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        failures: Mutex<usize>,
        gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
    }

    impl ScriptedCapture {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Returns (entered, release): `entered` fires as a capture starts, and the
        /// capture finishes once `release` is sent a value.
        pub(crate) fn gated() -> (Arc<Self>, mpsc::Receiver<()>, mpsc::Sender<()>) {
            let (entered_tx, entered_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            let capture = Self::default();
            *capture.gate.lock().unwrap_or_else(PoisonError::into_inner) =
                Some((entered_tx, release_rx));
            (Arc::new(capture), entered_rx, release_tx)
        }

        pub(crate) fn fail_next(&self, times: usize) {
            *self.failures.lock().unwrap_or_else(PoisonError::into_inner) += times;
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    impl CaptureProvider for ScriptedCapture {
        fn capture_frame(&self) -> Result<Vec<u8>, CaptureError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some((entered, release)) =
                self.gate.lock().unwrap_or_else(PoisonError::into_inner).as_ref()
            {
                let _ = entered.send(());
                let _ = release.recv();
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
            if *failures > 0 {
                *failures -= 1;
                return Err(CaptureError::CaptureFailed("display asleep".into()));
            }
            Ok(vec![0xFF, 0xD8, 0xFF, (n % 256) as u8])
        }
    }
}
