// Prevents an additional console window on Windows in release.
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    if let Err(err) = accountability_lib::run() {
        log::error!("{err:#}");
        eprintln!("accountability-monitor: {err:#}");
        std::process::exit(1);
    }
}
