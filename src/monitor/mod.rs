#[cfg(feature = "desktop")]
pub mod commands;
pub mod controller;
pub mod state;

pub use controller::MonitorController;
pub use state::{ConfigurationView, MonitorEvent, MonitorSnapshot, MonitorStatus, StartupOutcome};
