use serde::{Deserialize, Serialize};

use crate::{scheduler::SchedulerSnapshot, settings::Configuration};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum MonitorStatus {
    #[default]
    Inactive,
    Active,
}

/// Broadcast to whatever presentation layer is attached.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum MonitorEvent {
    /// Credentials/destination missing or monitoring was off: show the settings form.
    SetupRequired,
    StatusChanged { status: MonitorStatus },
    ExitRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    Resumed,
    SetupRequired,
}

/// Configuration as shown to the UI; the password never leaves the engine.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationView {
    pub frequency_minutes: u32,
    pub destination_email: String,
    pub smtp_username: String,
    pub has_password: bool,
    pub is_active: bool,
    pub thread_id: String,
}

impl From<&Configuration> for ConfigurationView {
    fn from(config: &Configuration) -> Self {
        Self {
            frequency_minutes: config.frequency_minutes,
            destination_email: config.destination_email.clone(),
            smtp_username: config.smtp_username.clone(),
            has_password: !config.smtp_password.is_empty(),
            is_active: config.is_active,
            thread_id: config.thread_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub status: MonitorStatus,
    pub scheduler: SchedulerSnapshot,
    pub pending_items: usize,
    pub configuration: ConfigurationView,
}
