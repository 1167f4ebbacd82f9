//! One capture cycle: drain → capture → deliver (or queue) → archive.
//!
//! Every step is isolated: a failure is logged here and the cycle carries on to
//! whatever is still meaningful, so the caller can always reschedule.

use std::{path::PathBuf, sync::Arc};

use chrono::Local;
use serde::Serialize;

use crate::{
    archive::ArchiveStore,
    capture::CaptureProvider,
    delivery::{DeliveryPipeline, SendOutcome},
    models::CapturedFrame,
    queue::{DrainReport, PendingQueue},
};

// Set to false to silence per-cycle logging
const ENABLE_LOGS: bool = true;

use crate::{cycle_error, cycle_info, cycle_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum CyclePhase {
    #[default]
    Idle,
    Draining,
    Capturing,
    Delivering,
    Archiving,
    Rescheduling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    NotConfigured,
    /// Transport failed; the frame is now the pending item with this id.
    Queued(String),
    /// Transport failed and the frame could not be queued either.
    Dropped,
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub drained: DrainReport,
    pub capture_failed: bool,
    pub delivery: Option<DeliveryOutcome>,
    pub archived: Option<PathBuf>,
}

pub struct CaptureCycle {
    capture: Arc<dyn CaptureProvider>,
    delivery: Arc<DeliveryPipeline>,
    queue: Arc<PendingQueue>,
    archive: Arc<ArchiveStore>,
}

impl CaptureCycle {
    pub fn new(
        capture: Arc<dyn CaptureProvider>,
        delivery: Arc<DeliveryPipeline>,
        queue: Arc<PendingQueue>,
        archive: Arc<ArchiveStore>,
    ) -> Self {
        Self {
            capture,
            delivery,
            queue,
            archive,
        }
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn archive(&self) -> &ArchiveStore {
        &self.archive
    }

    /// Run every step of one cycle. Blocking; `on_phase` observes progress.
    pub fn run<F>(&self, cycle: u64, mut on_phase: F) -> CycleReport
    where
        F: FnMut(CyclePhase),
    {
        let mut report = CycleReport::default();

        on_phase(CyclePhase::Draining);
        report.drained = self.queue.drain_and_replay(|frame| {
            match self.delivery.deliver_frame(frame) {
                Ok(SendOutcome::Sent) => Ok(()),
                Ok(SendOutcome::NotConfigured) => Err("delivery not configured".to_string()),
                Err(err) => Err(err.to_string()),
            }
        });

        on_phase(CyclePhase::Capturing);
        let captured_at = Local::now();
        let frame = match self.capture.capture_frame() {
            Ok(bytes) => CapturedFrame::new(bytes, captured_at),
            Err(err) => {
                cycle_warn!(cycle, "capture failed, skipping delivery and archive: {err}");
                report.capture_failed = true;
                return report;
            }
        };

        on_phase(CyclePhase::Delivering);
        let outcome = match self.delivery.deliver_frame(&frame) {
            Ok(SendOutcome::Sent) => {
                cycle_info!(cycle, "delivered frame {}", frame.file_stem());
                DeliveryOutcome::Sent
            }
            Ok(SendOutcome::NotConfigured) => DeliveryOutcome::NotConfigured,
            Err(err) => {
                cycle_warn!(cycle, "delivery failed, queueing frame: {err}");
                match self.queue.enqueue(&frame) {
                    Ok(id) => DeliveryOutcome::Queued(id),
                    Err(err) => {
                        cycle_error!(cycle, "could not queue frame, dropping it: {err}");
                        DeliveryOutcome::Dropped
                    }
                }
            }
        };
        report.delivery = Some(outcome);

        on_phase(CyclePhase::Archiving);
        report.archived = self.archive.store(&frame);

        report
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::CaptureCycle;
    use crate::{
        archive::ArchiveStore,
        capture::testing::ScriptedCapture,
        delivery::{testing::RecordingTransport, DeliveryPipeline},
        queue::PendingQueue,
        secrets::tests::test_sealer,
        settings::SettingsStore,
    };

    /// A cycle wired to fakes inside a scratch data dir.
    pub(crate) struct Harness {
        pub(crate) dir: TempDir,
        pub(crate) settings: Arc<SettingsStore>,
        pub(crate) transport: Arc<RecordingTransport>,
        pub(crate) capture: Arc<ScriptedCapture>,
        pub(crate) cycle: Arc<CaptureCycle>,
    }

    impl Harness {
        pub(crate) fn new(configured: bool) -> Self {
            Self::with_capture(configured, ScriptedCapture::new())
        }

        pub(crate) fn with_capture(configured: bool, capture: Arc<ScriptedCapture>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let settings = Arc::new(SettingsStore::open(
                dir.path().join("settings.json"),
                test_sealer(),
            ));
            if configured {
                settings
                    .commit(|c| {
                        c.smtp_username = "me@example.com".into();
                        c.smtp_password = "app-password".into();
                        c.destination_email = "partner@example.com".into();
                        c.frequency_minutes = 10;
                    })
                    .unwrap();
            }

            let transport = RecordingTransport::new();
            let delivery = Arc::new(DeliveryPipeline::new(settings.clone(), transport.clone()));
            let screens = dir.path().join("Screenshots");
            let queue = Arc::new(PendingQueue::new(screens.join("Pending"), test_sealer()));
            let archive = Arc::new(ArchiveStore::new(screens));
            let cycle = Arc::new(CaptureCycle::new(capture.clone(), delivery, queue, archive));

            Self {
                dir,
                settings,
                transport,
                capture,
                cycle,
            }
        }

        pub(crate) fn archived_count(&self) -> usize {
            let archive = self.cycle.archive();
            archive
                .months()
                .iter()
                .map(|month| archive.entries(month).len())
                .sum()
        }
    }
}
