//! Durable, encrypted holding area for frames whose delivery failed.
//!
//! Each item is one sealed file named after the capture time. Replay deletes an
//! item only after its delivery succeeds, so a drain interrupted at any point can
//! simply be run again.

use std::{
    fmt::Display,
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{Local, TimeZone};
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    error::PersistenceError, models::CapturedFrame, secrets::Sealer, utils::fs::write_unique,
};

const ITEM_EXTENSION: &str = "dat";
const STAMP_LEN: usize = 8;

/// Totals from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
    pub unreadable: usize,
}

impl DrainReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed + self.unreadable
    }
}

pub struct PendingQueue {
    dir: PathBuf,
    sealer: Sealer,
}

impl PendingQueue {
    pub fn new(dir: PathBuf, sealer: Sealer) -> Self {
        Self { dir, sealer }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Seal `frame` and write it under a unique id derived from its capture time.
    pub fn enqueue(&self, frame: &CapturedFrame) -> Result<String, PersistenceError> {
        let sealed = self.sealer.seal(&encode_item(frame))?;
        let path = write_unique(&self.dir, &frame.file_stem(), ITEM_EXTENSION, &sealed)?;
        let id = item_id(&path);
        info!("Queued frame {id} for later delivery");
        Ok(id)
    }

    /// Ids of every pending item, in id order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.item_paths().iter().map(|path| item_id(path)).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.item_paths().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replay every pending item through `deliver`. Successful items are deleted;
    /// failed or unreadable ones stay for a later pass. One item's failure never
    /// stops the others.
    pub fn drain_and_replay<F, E>(&self, mut deliver: F) -> DrainReport
    where
        F: FnMut(&CapturedFrame) -> Result<(), E>,
        E: Display,
    {
        let mut report = DrainReport::default();

        for path in self.item_paths() {
            let id = item_id(&path);

            let frame = match self.read_item(&path) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!("Pending item {id} unreadable, leaving it in place: {err}");
                    report.unreadable += 1;
                    continue;
                }
            };

            match deliver(&frame) {
                Ok(()) => {
                    if let Err(err) = fs::remove_file(&path) {
                        // Left behind it will be delivered twice; log and move on.
                        warn!("Delivered pending item {id} but could not delete it: {err}");
                    }
                    debug!("Replayed pending item {id}");
                    report.delivered += 1;
                }
                Err(err) => {
                    debug!("Pending item {id} still undeliverable: {err}");
                    report.failed += 1;
                }
            }
        }

        if report.attempted() > 0 {
            info!(
                "Pending queue drain: {} delivered, {} failed, {} unreadable",
                report.delivered, report.failed, report.unreadable
            );
        }
        report
    }

    /// Delete every pending item. Returns how many were removed.
    pub fn purge(&self) -> Result<usize, PersistenceError> {
        let mut removed = 0;
        for path in self.item_paths() {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        info!("Purged {removed} pending item(s)");
        Ok(removed)
    }

    fn read_item(&self, path: &Path) -> Result<CapturedFrame, PersistenceError> {
        let sealed = fs::read(path)?;
        let plain = self.sealer.open(&sealed)?;
        decode_item(&plain).ok_or_else(|| PersistenceError::MalformedItem(item_id(path)))
    }

    fn item_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)
            .map(|iter| {
                iter.filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .filter(|path| {
                        path.is_file()
                            && path.extension().and_then(|ext| ext.to_str()) == Some(ITEM_EXTENSION)
                    })
                    .collect()
            })
            .unwrap_or_default();
        paths.sort();
        paths
    }
}

fn item_id(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `capture_millis (i64 BE) || image bytes`.
fn encode_item(frame: &CapturedFrame) -> Vec<u8> {
    let mut plain = Vec::with_capacity(STAMP_LEN + frame.bytes().len());
    plain.extend_from_slice(&frame.captured_at().timestamp_millis().to_be_bytes());
    plain.extend_from_slice(frame.bytes());
    plain
}

fn decode_item(plain: &[u8]) -> Option<CapturedFrame> {
    if plain.len() < STAMP_LEN {
        return None;
    }
    let (stamp, bytes) = plain.split_at(STAMP_LEN);
    let millis = i64::from_be_bytes(stamp.try_into().ok()?);
    let captured_at = Local.timestamp_millis_opt(millis).single()?;
    Some(CapturedFrame::new(bytes.to_vec(), captured_at))
}
