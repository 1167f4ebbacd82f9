pub mod archive;
pub mod capture;
pub mod delivery;
pub mod error;
pub mod models;
pub mod monitor;
pub mod queue;
pub mod scheduler;
pub mod secrets;
pub mod settings;
pub mod utils;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;

use archive::{ArchiveStore, PENDING_DIR_NAME};
use capture::CaptureProvider;
use delivery::{DeliveryPipeline, MailTransport};
use monitor::MonitorController;
use queue::PendingQueue;
use scheduler::{CaptureCycle, CaptureScheduler};
use secrets::Sealer;
use settings::SettingsStore;

pub const APP_DIR_NAME: &str = "SimpleAccountability";

/// On-disk layout under the per-user data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
    pub settings: PathBuf,
    pub screenshots: PathBuf,
    pub pending: PathBuf,
}

impl DataPaths {
    pub fn new(root: PathBuf) -> Self {
        let screenshots = root.join("Screenshots");
        Self {
            settings: root.join("settings.json"),
            pending: screenshots.join(PENDING_DIR_NAME),
            screenshots,
            root,
        }
    }

    /// `<data dir>/SimpleAccountability`.
    pub fn for_current_user() -> anyhow::Result<Self> {
        let base = dirs::data_dir().context("no per-user data directory on this platform")?;
        Ok(Self::new(base.join(APP_DIR_NAME)))
    }

    pub fn ensure(&self) -> anyhow::Result<()> {
        for dir in [&self.root, &self.screenshots, &self.pending] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Wire the engine over the given collaborators. `tick_unit` overrides the
/// one-minute scheduling unit.
pub fn assemble(
    paths: &DataPaths,
    capture: Arc<dyn CaptureProvider>,
    transport: Arc<dyn MailTransport>,
    sealer: Sealer,
    tick_unit: Option<Duration>,
) -> anyhow::Result<MonitorController> {
    paths.ensure()?;

    let settings = Arc::new(SettingsStore::open(paths.settings.clone(), sealer.clone()));
    let delivery = Arc::new(DeliveryPipeline::new(settings.clone(), transport));
    let queue = Arc::new(PendingQueue::new(paths.pending.clone(), sealer));
    let archive = Arc::new(ArchiveStore::new(paths.screenshots.clone()));

    let cycle = Arc::new(CaptureCycle::new(
        capture,
        delivery.clone(),
        queue.clone(),
        archive.clone(),
    ));
    let scheduler = match tick_unit {
        Some(unit) => CaptureScheduler::with_tick_unit(cycle, settings.clone(), unit),
        None => CaptureScheduler::new(cycle, settings.clone()),
    };

    Ok(MonitorController::new(
        settings, delivery, scheduler, archive, queue,
    ))
}

/// Load the user-scoped key for `data_dir` and build a sealer from it.
pub fn user_sealer(data_dir: &Path) -> anyhow::Result<Sealer> {
    let store = secrets::default_key_store(data_dir);
    Sealer::from_store(store.as_ref()).context("Failed to load the queue encryption key")
}

/// Headless entry point: capture the primary monitor, send through SMTP, and run
/// until Ctrl-C or an exit request.
#[cfg(feature = "screen")]
pub fn run() -> anyhow::Result<()> {
    use chrono::Local;
    use log::{info, warn};
    use monitor::StartupOutcome;

    utils::logging::init();
    info!("SimpleAccountability starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    runtime.block_on(async {
        let paths = DataPaths::for_current_user()?;
        paths.ensure()?;
        let sealer = user_sealer(&paths.root)?;

        let controller = assemble(
            &paths,
            Arc::new(capture::PrimaryMonitorCapture::new()),
            Arc::new(delivery::SmtpMailTransport::new()),
            sealer,
            None,
        )?;

        let outcome = controller.startup(Local::now().date_naive()).await;
        if outcome == StartupOutcome::SetupRequired && !configure_from_env(&controller).await {
            warn!(
                "Monitoring inactive: set ACCOUNTABILITY_SMTP_USERNAME, \
                 ACCOUNTABILITY_SMTP_PASSWORD and ACCOUNTABILITY_DESTINATION, or configure \
                 through the desktop shell ({})",
                paths.settings.display()
            );
        }

        wait_for_shutdown(&controller, tokio::signal::ctrl_c()).await;

        info!("SimpleAccountability stopped");
        Ok(())
    })
}

/// Block until an exit request, or until `signal` fires, which then requests one.
/// A signal listener that fails is logged and ignored.
#[cfg(any(feature = "screen", test))]
async fn wait_for_shutdown<S>(controller: &MonitorController, signal: S)
where
    S: std::future::Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        _ = controller.wait_for_exit() => {}
        received = signal => match received {
            Ok(()) => controller.request_exit().await,
            Err(err) => {
                log::warn!("Failed to listen for Ctrl-C, waiting for an exit request: {err}");
                controller.wait_for_exit().await;
            }
        }
    }
}

/// Apply `ACCOUNTABILITY_*` variables and activate. Returns whether monitoring
/// was started.
#[cfg(feature = "screen")]
async fn configure_from_env(controller: &MonitorController) -> bool {
    use settings::ConfigurationUpdate;

    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
    let (Some(username), Some(password), Some(destination)) = (
        var("ACCOUNTABILITY_SMTP_USERNAME"),
        var("ACCOUNTABILITY_SMTP_PASSWORD"),
        var("ACCOUNTABILITY_DESTINATION"),
    ) else {
        return false;
    };

    let frequency = var("ACCOUNTABILITY_FREQUENCY")
        .unwrap_or_else(|| controller.configuration().frequency_minutes.to_string());

    match controller.update_configuration(ConfigurationUpdate {
        smtp_username: username,
        smtp_password: Some(password),
        destination_email: destination,
        frequency,
    }) {
        Ok(_) => {
            controller.activate().await;
            true
        }
        Err(err) => {
            log::error!("Environment configuration rejected: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capture::testing::ScriptedCapture, delivery::testing::RecordingTransport,
        secrets::tests::test_sealer,
    };
    use std::io;
    use tempfile::tempdir;

    fn controller(paths: &DataPaths) -> MonitorController {
        assemble(
            paths,
            ScriptedCapture::new(),
            RecordingTransport::new(),
            test_sealer(),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn ctrl_c_requests_exit() {
        let dir = tempdir().unwrap();
        let monitor = controller(&DataPaths::new(dir.path().to_path_buf()));

        wait_for_shutdown(&monitor, async { Ok(()) }).await;

        assert!(monitor.exit_requested());
    }

    #[tokio::test]
    async fn broken_signal_listener_keeps_running_until_exit_request() {
        let dir = tempdir().unwrap();
        let monitor = controller(&DataPaths::new(dir.path().to_path_buf()));

        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move {
                let broken = async { Err(io::Error::new(io::ErrorKind::Other, "no handler")) };
                wait_for_shutdown(&monitor, broken).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!waiter.is_finished());
        assert!(!monitor.exit_requested());

        monitor.request_exit().await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
