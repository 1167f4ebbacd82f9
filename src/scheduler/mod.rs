pub mod controller;
pub mod cycle;
pub mod policy;

pub use controller::{CaptureScheduler, SchedulerSnapshot};
pub use cycle::{CaptureCycle, CycleReport, CyclePhase, DeliveryOutcome};
