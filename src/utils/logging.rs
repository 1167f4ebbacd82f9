//! Cycle-scoped logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! Usage:
//! ```rust,ignore
//! // In your module, define the flag first:
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{cycle_info, cycle_warn, cycle_error};
//!
//! cycle_warn!(cycle, "delivery failed: {err}");
//! // => "[cycle 7] delivery failed: ..."
//! ```

/// Initialise `env_logger` once for the process.
///
/// `RUST_LOG` wins when set. Otherwise the level is `Info`, or `Debug` when
/// `ACCOUNTABILITY_DEBUG` is `1`/`true`.
pub fn init() {
    let debug_mode = std::env::var("ACCOUNTABILITY_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let level = if debug_mode {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

/// Info line tagged with the cycle number.
#[macro_export]
macro_rules! cycle_info {
    ($cycle:expr, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!("[cycle {}] {}", $cycle, format_args!($($arg)*));
        }
    };
}

/// Warning tagged with the cycle number.
#[macro_export]
macro_rules! cycle_warn {
    ($cycle:expr, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!("[cycle {}] {}", $cycle, format_args!($($arg)*));
        }
    };
}

/// Error tagged with the cycle number.
#[macro_export]
macro_rules! cycle_error {
    ($cycle:expr, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!("[cycle {}] {}", $cycle, format_args!($($arg)*));
        }
    };
}
