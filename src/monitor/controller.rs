use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::NaiveDate;
use log::{error, info, warn};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use crate::{
    archive::ArchiveStore,
    delivery::{DeliveryPipeline, Notice},
    error::PersistenceError,
    queue::PendingQueue,
    scheduler::CaptureScheduler,
    settings::{ConfigurationError, ConfigurationUpdate, SettingsStore},
};

use super::{ConfigurationView, MonitorEvent, MonitorSnapshot, MonitorStatus, StartupOutcome};

const EVENT_CAPACITY: usize = 16;

/// Inactive/Active lifecycle and the operations the presentation layer calls.
/// Transitions are serialized by the status lock.
#[derive(Clone)]
pub struct MonitorController {
    status: Arc<Mutex<MonitorStatus>>,
    settings: Arc<SettingsStore>,
    delivery: Arc<DeliveryPipeline>,
    scheduler: CaptureScheduler,
    archive: Arc<ArchiveStore>,
    queue: Arc<PendingQueue>,
    events: broadcast::Sender<MonitorEvent>,
    shutdown: CancellationToken,
    started: Arc<AtomicBool>,
}

impl MonitorController {
    pub fn new(
        settings: Arc<SettingsStore>,
        delivery: Arc<DeliveryPipeline>,
        scheduler: CaptureScheduler,
        archive: Arc<ArchiveStore>,
        queue: Arc<PendingQueue>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            status: Arc::new(Mutex::new(MonitorStatus::Inactive)),
            settings,
            delivery,
            scheduler,
            archive,
            queue,
            events,
            shutdown: CancellationToken::new(),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub async fn status(&self) -> MonitorStatus {
        *self.status.lock().await
    }

    /// Process-start sequence: resume monitoring if possible, acknowledge the start
    /// once, then prune last month's archive bucket.
    pub async fn startup(&self, today: NaiveDate) -> StartupOutcome {
        let config = self.settings.snapshot();
        let outcome = if config.can_resume() {
            self.activate().await;
            StartupOutcome::Resumed
        } else {
            info!("Monitoring not resumed: configuration incomplete or inactive");
            self.emit(MonitorEvent::SetupRequired);
            StartupOutcome::SetupRequired
        };

        if self.started.swap(true, Ordering::SeqCst) {
            return outcome;
        }

        self.notify(Notice::Startup).await;

        let archive = Arc::clone(&self.archive);
        if let Err(err) =
            tokio::task::spawn_blocking(move || archive.prune_previous_month(today)).await
        {
            error!("Archive pruning task failed: {err}");
        }

        outcome
    }

    /// Announce, arm the scheduler (replacing any running timer) and persist
    /// `isActive = true`.
    pub async fn activate(&self) -> MonitorStatus {
        let mut status = self.status.lock().await;

        self.notify(Notice::Activated).await;
        self.scheduler.arm();
        if let Err(err) = self.settings.set_active(true) {
            warn!("Monitoring activated but the flag was not saved: {err}");
        }

        *status = MonitorStatus::Active;
        self.emit(MonitorEvent::StatusChanged { status: *status });
        *status
    }

    /// Stop the timer, announce, and persist `isActive = false`.
    pub async fn deactivate(&self) -> MonitorStatus {
        let mut status = self.status.lock().await;

        self.scheduler.disarm();
        self.notify(Notice::Deactivated).await;
        if let Err(err) = self.settings.set_active(false) {
            warn!("Monitoring deactivated but the flag was not saved: {err}");
        }

        *status = MonitorStatus::Inactive;
        self.emit(MonitorEvent::StatusChanged { status: *status });
        *status
    }

    /// Send the exit notice, stop the timer and release [`wait_for_exit`]. The
    /// persisted activation flag is kept so the next start resumes.
    ///
    /// [`wait_for_exit`]: MonitorController::wait_for_exit
    pub async fn request_exit(&self) {
        let _status = self.status.lock().await;

        self.notify(Notice::Exit).await;
        self.scheduler.disarm();

        self.emit(MonitorEvent::ExitRequested);
        self.shutdown.cancel();
        info!("Exit requested");
    }

    pub async fn wait_for_exit(&self) {
        self.shutdown.cancelled().await;
    }

    pub fn exit_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Validate and commit values proposed by the UI. Invalid frequency input is
    /// rejected before anything is written.
    pub fn update_configuration(
        &self,
        update: ConfigurationUpdate,
    ) -> Result<ConfigurationView, ConfigurationError> {
        let frequency = update.parse_frequency()?;
        let committed = self
            .settings
            .commit(|config| update.apply(frequency, config))?;
        info!(
            "Configuration updated (frequency {} min, destination {})",
            committed.frequency_minutes, committed.destination_email
        );
        Ok(ConfigurationView::from(&committed))
    }

    pub fn configuration(&self) -> ConfigurationView {
        ConfigurationView::from(&self.settings.snapshot())
    }

    /// Delete every queued frame.
    pub fn purge_pending(&self) -> Result<usize, PersistenceError> {
        self.queue.purge()
    }

    pub async fn snapshot(&self) -> MonitorSnapshot {
        let status = *self.status.lock().await;
        MonitorSnapshot {
            status,
            scheduler: self.scheduler.snapshot(),
            pending_items: self.queue.len(),
            configuration: self.configuration(),
        }
    }

    async fn notify(&self, notice: Notice<'static>) {
        let delivery = Arc::clone(&self.delivery);
        if let Err(err) = tokio::task::spawn_blocking(move || delivery.notify(notice)).await {
            error!("{} notice task failed: {err}", notice.label());
        }
    }

    fn emit(&self, event: MonitorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
