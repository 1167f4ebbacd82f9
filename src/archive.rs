//! Unencrypted local copies of every captured frame, bucketed by month.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{Months, NaiveDate};
use log::{info, warn};

use crate::{error::PersistenceError, models::CapturedFrame, utils::fs::write_unique};

pub const PENDING_DIR_NAME: &str = "Pending";

pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `frame` under `<root>/<YYYY-MM>/`. Failures are logged and reported as
    /// `None`; archival never interrupts the caller.
    pub fn store(&self, frame: &CapturedFrame) -> Option<PathBuf> {
        match self.try_store(frame) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!("Failed to archive frame {}: {err}", frame.file_stem());
                None
            }
        }
    }

    fn try_store(&self, frame: &CapturedFrame) -> Result<PathBuf, PersistenceError> {
        let bucket = self.root.join(frame.month_key());
        Ok(write_unique(&bucket, &frame.file_stem(), "jpg", frame.bytes())?)
    }

    /// Recursively delete the bucket for `month_key` (`YYYY-MM`). Returns whether a
    /// bucket was removed.
    pub fn prune_month(&self, month_key: &str) -> Result<bool, PersistenceError> {
        parse_month_key(month_key)?;

        let bucket = self.root.join(month_key);
        match fs::remove_dir_all(&bucket) {
            Ok(()) => {
                info!("Pruned archive bucket {}", bucket.display());
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Drop the bucket one calendar month before `today`. Called once per process
    /// start; errors are logged.
    pub fn prune_previous_month(&self, today: NaiveDate) -> bool {
        let Some(previous) = today.checked_sub_months(Months::new(1)) else {
            return false;
        };
        let key = previous.format("%Y-%m").to_string();

        self.prune_month(&key).unwrap_or_else(|err| {
            warn!("Failed to prune archive bucket {key}: {err}");
            false
        })
    }

    /// Files in the bucket for `month_key`, sorted by name.
    pub fn entries(&self, month_key: &str) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(self.root.join(month_key))
            .map(|iter| {
                iter.filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .filter(|path| path.is_file())
                    .collect()
            })
            .unwrap_or_default();
        files.sort();
        files
    }

    /// Every bucket present on disk, oldest first.
    pub fn months(&self) -> Vec<String> {
        let mut months: Vec<String> = fs::read_dir(&self.root)
            .map(|iter| {
                iter.filter_map(|entry| entry.ok())
                    .filter(|entry| entry.path().is_dir())
                    .filter_map(|entry| entry.file_name().into_string().ok())
                    .filter(|name| parse_month_key(name).is_ok())
                    .collect()
            })
            .unwrap_or_default();
        months.sort();
        months
    }
}

fn parse_month_key(month_key: &str) -> Result<NaiveDate, PersistenceError> {
    NaiveDate::parse_from_str(&format!("{month_key}-01"), "%Y-%m-%d")
        .map_err(|_| PersistenceError::InvalidMonth(month_key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use tempfile::tempdir;

    fn frame_at(y: i32, m: u32, d: u32) -> CapturedFrame {
        let at = Local.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap();
        CapturedFrame::new(vec![0xFF, 0xD8, 0xFF], at)
    }

    #[test]
    fn stores_under_month_bucket() {
        let dir = tempdir().unwrap();
        let archive = ArchiveStore::new(dir.path().to_path_buf());

        let path = archive.store(&frame_at(2026, 10, 17)).unwrap();

        assert_eq!(path, dir.path().join("2026-10").join("2026-10-17_12-00-00.000.jpg"));
        assert_eq!(fs::read(&path).unwrap(), vec![0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn same_timestamp_does_not_overwrite() {
        let dir = tempdir().unwrap();
        let archive = ArchiveStore::new(dir.path().to_path_buf());
        let frame = frame_at(2026, 10, 17);

        archive.store(&frame).unwrap();
        archive.store(&frame).unwrap();

        assert_eq!(archive.entries("2026-10").len(), 2);
    }

    #[test]
    fn store_failure_is_swallowed() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();
        let archive = ArchiveStore::new(blocker);

        assert!(archive.store(&frame_at(2026, 10, 17)).is_none());
    }

    #[test]
    fn prunes_only_previous_month() {
        let dir = tempdir().unwrap();
        let archive = ArchiveStore::new(dir.path().to_path_buf());
        for (y, m) in [(2026, 10), (2026, 9), (2026, 8)] {
            archive.store(&frame_at(y, m, 3)).unwrap();
        }
        fs::create_dir_all(dir.path().join(PENDING_DIR_NAME)).unwrap();

        let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        assert!(archive.prune_previous_month(today));

        assert_eq!(archive.months(), vec!["2026-08".to_string(), "2026-10".to_string()]);
        assert!(dir.path().join(PENDING_DIR_NAME).is_dir());
    }

    #[test]
    fn prune_across_year_boundary() {
        let dir = tempdir().unwrap();
        let archive = ArchiveStore::new(dir.path().to_path_buf());
        archive.store(&frame_at(2025, 12, 31)).unwrap();

        let today = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert!(archive.prune_previous_month(today));
        assert!(archive.months().is_empty());
    }

    #[test]
    fn pruning_missing_bucket_is_a_no_op() {
        let dir = tempdir().unwrap();
        let archive = ArchiveStore::new(dir.path().to_path_buf());

        assert!(!archive.prune_month("2026-09").unwrap());
        assert!(matches!(
            archive.prune_month(PENDING_DIR_NAME),
            Err(PersistenceError::InvalidMonth(_))
        ));
    }
}
