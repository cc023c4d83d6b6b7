//! Deletion of expired log files and date folders.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::io;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;
use time::{Date, OffsetDateTime};

use crate::config::TimeZone;
use crate::resolver::list_names;
use crate::rotation::parse_date_prefix;

/// Interval between two scheduled sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Ages beyond this are already outside the supported calendar range.
const MAX_AGE_DAYS: i64 = 10_000 * 366;

/// What a sweep removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub removed_files: Vec<PathBuf>,
    pub removed_dirs: Vec<PathBuf>,
    /// Entries that could not be inspected or removed.
    pub errors: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.removed_files.is_empty() && self.removed_dirs.is_empty()
    }
}

pub(crate) struct RetentionSweeper<'a> {
    root: &'a Path,
    keep_suffix: &'a str,
    time_zone: TimeZone,
}

impl<'a> RetentionSweeper<'a> {
    pub(crate) fn new(root: &'a Path, keep_suffix: &'a str, time_zone: TimeZone) -> Self {
        Self {
            root,
            keep_suffix,
            time_zone,
        }
    }

    /// Remove everything under the root dated at or before `now - max_age_days`.
    ///
    /// `active` holds the lower-cased base names of the files currently open for writing.
    pub(crate) fn sweep(&self, max_age_days: i64, active: &[String]) -> SweepReport {
        let now = self.time_zone.now();
        let cutoff = if max_age_days > 0 {
            let days = time::Duration::days(max_age_days.min(MAX_AGE_DAYS));
            match now.checked_sub(days) {
                Some(cutoff) => cutoff,
                // Before the calendar's first day: nothing is old enough.
                None => return SweepReport::default(),
            }
        } else {
            now
        };
        self.sweep_at(cutoff, active)
    }

    pub(crate) fn sweep_at(&self, cutoff: OffsetDateTime, active: &[String]) -> SweepReport {
        let mut report = SweepReport::default();
        let cutoff_date = cutoff.date();

        match list_names(self.root, true) {
            Ok(dirs) => {
                for name in dirs {
                    if self.is_kept(&name) {
                        continue;
                    }
                    // Folders not named after a date are not ours.
                    let Some(date) = parse_date_prefix(&name) else {
                        continue;
                    };
                    if date <= cutoff_date {
                        self.sweep_date_dir(&self.root.join(&name), active, &mut report);
                    }
                }
            }
            Err(e) => self.record_error(&mut report, self.root, e),
        }

        self.sweep_files(self.root, cutoff, cutoff_date, active, &mut report);
        report
    }

    fn is_kept(&self, name: &str) -> bool {
        !self.keep_suffix.is_empty() && name.ends_with(self.keep_suffix)
    }

    fn is_active(name: &str, active: &[String]) -> bool {
        let lower = name.to_lowercase();
        active.iter().any(|a| *a == lower)
    }

    fn sweep_date_dir(&self, dir: &Path, active: &[String], report: &mut SweepReport) {
        let names = match list_names(dir, false) {
            Ok(names) => names,
            Err(e) => return self.record_error(report, dir, e),
        };
        for name in names {
            if self.is_kept(&name) || Self::is_active(&name, active) {
                continue;
            }
            self.remove_file(&dir.join(name), report);
        }

        match std::fs::read_dir(dir).map(|mut entries| entries.next().is_none()) {
            Ok(true) => match std::fs::remove_dir(dir) {
                Ok(()) => report.removed_dirs.push(dir.to_path_buf()),
                Err(e) => self.record_error(report, dir, e),
            },
            Ok(false) => {}
            Err(e) => self.record_error(report, dir, e),
        }
    }

    fn sweep_files(
        &self,
        dir: &Path,
        cutoff: OffsetDateTime,
        cutoff_date: Date,
        active: &[String],
        report: &mut SweepReport,
    ) {
        let names = match list_names(dir, false) {
            Ok(names) => names,
            Err(e) => return self.record_error(report, dir, e),
        };
        for name in names {
            if self.is_kept(&name) || Self::is_active(&name, active) {
                continue;
            }
            let path = dir.join(&name);
            let expired = match parse_date_prefix(&name) {
                Some(date) => date <= cutoff_date,
                None => match std::fs::metadata(&path).and_then(|m| m.modified()) {
                    Ok(modified) => OffsetDateTime::from(modified) <= cutoff,
                    Err(e) => {
                        self.record_error(report, &path, e);
                        continue;
                    }
                },
            };
            if expired {
                self.remove_file(&path, report);
            }
        }
    }

    fn remove_file(&self, path: &Path, report: &mut SweepReport) {
        match std::fs::remove_file(path) {
            Ok(()) => report.removed_files.push(path.to_path_buf()),
            Err(e) => self.record_error(report, path, e),
        }
    }

    fn record_error(&self, report: &mut SweepReport, path: &Path, err: io::Error) {
        tracing::warn!("retention sweep failed on {}: {}", path.display(), err);
        report.errors += 1;
    }
}

/// The scheduled sweep thread. Dropping or stopping it ends the loop promptly.
#[derive(Debug)]
pub(crate) struct RetentionTask {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RetentionTask {
    /// Run `sweep` now and then once per `interval` until stopped.
    pub(crate) fn spawn<F>(interval: Duration, mut sweep: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, rx): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(1);
        let handle = std::thread::Builder::new()
            .name("splitlog-retention".to_string())
            .spawn(move || {
                loop {
                    sweep();
                    match rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;
        Ok(Self {
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    pub(crate) fn stop(&mut self) {
        // Dropping the sender disconnects the channel and wakes the thread.
        self.shutdown.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            eprintln!("splitlog: retention thread panicked");
        }
    }
}

impl Drop for RetentionTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::datetime;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_sweep_old_date_dirs_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("2026_01_01").join("2026_01_01.log"));
        touch(&root.join("2026_01_01").join("2026_01_01_keep"));
        touch(&root.join("2026_01_02").join("2026_01_02.log"));
        touch(&root.join("2026_01_09").join("2026_01_09.log"));
        touch(&root.join("archive").join("2020_01_01.log"));
        touch(&root.join("2026_01_02_120000.log"));
        touch(&root.join("2026_01_09_120000.log"));

        let sweeper = RetentionSweeper::new(root, "keep", TimeZone::Utc);
        let report = sweeper.sweep_at(datetime!(2026-01-07 12:00:00 UTC), &[]);

        assert!(root.join("2026_01_01").join("2026_01_01_keep").exists());
        assert!(!root.join("2026_01_01").join("2026_01_01.log").exists());
        assert!(!root.join("2026_01_02").exists());
        assert!(root.join("2026_01_09").join("2026_01_09.log").exists());
        assert!(root.join("archive").join("2020_01_01.log").exists());
        assert!(!root.join("2026_01_02_120000.log").exists());
        assert!(root.join("2026_01_09_120000.log").exists());

        assert_eq!(report.removed_files.len(), 3);
        assert_eq!(report.removed_dirs, vec![root.join("2026_01_02")]);
        assert_eq!(report.errors, 0);
    }

    #[test]
    fn test_sweep_skips_active_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("2026_01_01_120000.LOG"));
        touch(&root.join("2026_01_01_110000.log"));

        let sweeper = RetentionSweeper::new(root, "keep", TimeZone::Utc);
        let active = vec!["2026_01_01_120000.log".to_string()];
        sweeper.sweep_at(datetime!(2026-01-07 00:00:00 UTC), &active);

        assert!(root.join("2026_01_01_120000.LOG").exists());
        assert!(!root.join("2026_01_01_110000.log").exists());
    }

    #[test]
    fn test_non_date_files_use_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("default.log"));
        let sweeper = RetentionSweeper::new(root, "keep", TimeZone::Utc);

        let report = sweeper.sweep(3, &[]);
        assert!(report.is_empty());
        assert!(root.join("default.log").exists());

        let report = sweeper.sweep(0, &[]);
        assert_eq!(report.removed_files, vec![root.join("default.log")]);
    }

    #[test]
    fn test_empty_keep_suffix_disables_marker() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("2020_01_01_keep"));

        RetentionSweeper::new(root, "", TimeZone::Utc).sweep(0, &[]);
        assert!(!root.join("2020_01_01_keep").exists());
    }

    #[test]
    fn test_missing_root_counts_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let report = RetentionSweeper::new(&missing, "keep", TimeZone::Utc).sweep(1, &[]);
        assert_eq!(report.errors, 2);
    }

    #[test]
    fn test_age_past_calendar_range_removes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("0001_01_01").join("0001_01_01.log"));
        touch(&root.join("2000_01_01_120000.log"));

        let sweeper = RetentionSweeper::new(root, "keep", TimeZone::Utc);
        for days in [i64::from(u32::MAX), 10_000_000, i64::MAX] {
            assert_eq!(sweeper.sweep(days, &[]), SweepReport::default());
        }
        assert!(root.join("0001_01_01").join("0001_01_01.log").exists());
        assert!(root.join("2000_01_01_120000.log").exists());
    }

    #[test]
    fn test_task_runs_immediately_and_stops() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut task = {
            let runs = Arc::clone(&runs);
            RetentionTask::spawn(SWEEP_INTERVAL, move || {
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        };
        while runs.load(Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(5));
        }
        task.stop();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_task_repeats_on_interval() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = {
            let runs = Arc::clone(&runs);
            RetentionTask::spawn(Duration::from_millis(5), move || {
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        };
        while runs.load(Ordering::SeqCst) < 3 {
            std::thread::sleep(Duration::from_millis(5));
        }
        drop(task);
    }
}
