//! Tauri command surface for a tray/settings shell.
//!
//! The host app manages a [`MonitorController`] and registers these with
//! `tauri::generate_handler!`.

use tauri::{AppHandle, Emitter, State};
use tokio::sync::broadcast::error::RecvError;

use crate::settings::ConfigurationUpdate;

use super::{ConfigurationView, MonitorController, MonitorSnapshot, MonitorStatus};

fn controller_from_state(state: &State<'_, MonitorController>) -> MonitorController {
    state.inner().clone()
}

#[tauri::command]
pub async fn activate(state: State<'_, MonitorController>) -> Result<MonitorStatus, String> {
    let controller = controller_from_state(&state);
    Ok(controller.activate().await)
}

#[tauri::command]
pub async fn deactivate(state: State<'_, MonitorController>) -> Result<MonitorStatus, String> {
    let controller = controller_from_state(&state);
    Ok(controller.deactivate().await)
}

#[tauri::command]
pub async fn update_configuration(
    state: State<'_, MonitorController>,
    update: ConfigurationUpdate,
) -> Result<ConfigurationView, String> {
    let controller = controller_from_state(&state);
    controller
        .update_configuration(update)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn request_exit(
    state: State<'_, MonitorController>,
    app_handle: AppHandle,
) -> Result<(), String> {
    let controller = controller_from_state(&state);
    controller.request_exit().await;
    app_handle.exit(0);
    Ok(())
}

#[tauri::command]
pub async fn get_monitor_state(
    state: State<'_, MonitorController>,
) -> Result<MonitorSnapshot, String> {
    let controller = controller_from_state(&state);
    Ok(controller.snapshot().await)
}

#[tauri::command]
pub async fn purge_pending(state: State<'_, MonitorController>) -> Result<usize, String> {
    let controller = controller_from_state(&state);
    controller.purge_pending().map_err(|e| e.to_string())
}

/// Re-emit engine events to the webview as `monitor-event`.
pub fn forward_events(app_handle: AppHandle, controller: &MonitorController) {
    let mut events = controller.subscribe();
    tauri::async_runtime::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let _ = app_handle.emit("monitor-event", &event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Dropped {skipped} monitor event(s) before forwarding");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
