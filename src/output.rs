//! File output: rotation state, routing and the lock discipline around them.
//!
//! One `RwLock` guards the open handles. Producers hold it shared while they write
//! (a `&File` append is safe from many threads); rotation and purge take it
//! exclusively. The buffered writer is only touched by the flusher, which holds the
//! lock shared, or by an exclusive holder, so tearing it down never races a flush.
//! Producers enqueue buffered lines after releasing the lock, so a producer blocked
//! on a full queue never holds up the flusher it is waiting for.

use parking_lot::RwLock;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

use crate::Severity;
use crate::buffer::PendingQueue;
use crate::config::{ResolvedConfig, SizeScope};
use crate::resolver::{OpenedTargets, Resume, WriteTargetResolver};
use crate::retention::{RetentionSweeper, SweepReport};
use crate::rotation::{SplitDecision, SplitPolicy, date_key};
use crate::writer::{FileHandleSet, NormalWriter};

#[derive(Debug)]
struct RotationState {
    file_date: String,
    /// `None` only after a purge failed to reopen; the next write retries.
    handles: Option<FileHandleSet>,
}

#[derive(Debug)]
pub(crate) struct FileOutput {
    config: Arc<ResolvedConfig>,
    policy: SplitPolicy,
    state: RwLock<RotationState>,
    /// Bytes counted toward the size threshold. Reset only under the exclusive lock.
    size: AtomicU64,
    queue: Option<Arc<PendingQueue>>,
}

impl FileOutput {
    /// Open the initial files, resuming into an undersized slot when possible.
    pub(crate) fn open(config: Arc<ResolvedConfig>) -> io::Result<Self> {
        let now = config.time_zone.now();
        let OpenedTargets {
            handles,
            file_date,
            size,
        } = WriteTargetResolver::new(&config).open(now, Resume::UnderThreshold { reserve: 0 })?;
        let queue = config
            .buffer_size
            .map(|_| Arc::new(PendingQueue::new(config.queue_capacity)));

        Ok(Self {
            policy: SplitPolicy::new(config.split),
            state: RwLock::new(RotationState {
                file_date,
                handles: Some(handles),
            }),
            size: AtomicU64::new(size),
            queue,
            config,
        })
    }

    pub(crate) fn queue(&self) -> Option<&Arc<PendingQueue>> {
        self.queue.as_ref()
    }

    pub(crate) fn accumulated_size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    pub(crate) fn normal_path(&self) -> Option<PathBuf> {
        let state = self.state.read();
        state
            .handles
            .as_ref()
            .map(|h| h.normal.path().to_path_buf())
    }

    pub(crate) fn error_path(&self) -> Option<PathBuf> {
        let state = self.state.read();
        state
            .handles
            .as_ref()
            .and_then(|h| h.error.as_ref())
            .map(|e| e.path().to_path_buf())
    }

    /// Lower-cased base names of the files currently open for writing.
    pub(crate) fn active_names(&self) -> Vec<String> {
        let state = self.state.read();
        state
            .handles
            .as_ref()
            .map(FileHandleSet::active_names)
            .unwrap_or_default()
    }

    /// Route one formatted, color-free line to the error and/or normal stream.
    pub(crate) fn write_line(&self, severity: Severity, line: Vec<u8>) -> io::Result<()> {
        self.check_split(self.config.time_zone.now(), line.len() as u64);

        let routed = self.route(severity, line);
        if severity.may_terminate() && self.queue.is_some() {
            // Flush on every path, the caller may exit right after this entry.
            return routed.and(self.sync_flush());
        }
        routed
    }

    fn route(&self, severity: Severity, line: Vec<u8>) -> io::Result<()> {
        let incoming = line.len() as u64;
        let to_error = self.config.error_separate && severity.is_error();
        let pending = {
            let state = self.state.read();
            let handles = state
                .handles
                .as_ref()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no log file is open"))?;

            let mut skip_normal = false;
            if to_error && let Some(error) = &handles.error {
                error.write_line(&line)?;
                if self.config.size_scope == SizeScope::Combined {
                    self.size.fetch_add(incoming, Ordering::SeqCst);
                }
                skip_normal = self.config.errors_not_in_normal;
            }

            match &handles.normal {
                _ if skip_normal => None,
                NormalWriter::Direct { file, .. } => {
                    let mut file: &File = file;
                    file.write_all(&line)?;
                    // Counted under the guard so a rotation cannot reset in between.
                    self.size.fetch_add(incoming, Ordering::SeqCst);
                    None
                }
                NormalWriter::Buffered { .. } => Some(line),
            }
        };

        if let Some(line) = pending
            && let Some(queue) = &self.queue
        {
            if !queue.push(line) {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "log sink is shut down",
                ));
            }
            self.size.fetch_add(incoming, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Decide under the shared lock, re-check and rotate under the exclusive one.
    fn check_split(&self, now: OffsetDateTime, incoming: u64) {
        if self.split_due(&self.state.read(), now, incoming).is_none() {
            return;
        }
        let mut state = self.state.write();
        if let Some(resume) = self.split_due(&state, now, incoming) {
            self.rotate(&mut state, now, resume);
        }
    }

    fn split_due(&self, state: &RotationState, now: OffsetDateTime, incoming: u64) -> Option<Resume> {
        if state.handles.is_none() {
            return Some(Resume::Never);
        }
        let accumulated = self.size.load(Ordering::SeqCst);
        match self
            .policy
            .should_split(&state.file_date, accumulated, incoming, now)
        {
            SplitDecision::None => None,
            SplitDecision::ByDate(_) => Some(Resume::UnderThreshold { reserve: 0 }),
            SplitDecision::BySize => Some(Resume::UnderThreshold { reserve: incoming }),
        }
    }

    /// Open the next slot, then swap it in. On failure the old handles stay.
    fn rotate(&self, state: &mut RotationState, now: OffsetDateTime, resume: Resume) {
        // Queued lines belong to the old file, and resume decisions need its real size.
        if let Some(old) = state.handles.as_mut()
            && let Err(e) = self.drain_pending(&mut old.normal)
        {
            eprintln!("splitlog: flush before split failed: {}", e);
        }
        match WriteTargetResolver::new(&self.config).open(now, resume) {
            Ok(opened) => {
                if let Some(old) = state.handles.take() {
                    if let Err(e) = old.close() {
                        eprintln!("splitlog: close of old log file failed: {}", e);
                    }
                }
                state.handles = Some(opened.handles);
                state.file_date = opened.file_date;
                self.size.store(opened.size, Ordering::SeqCst);
            }
            Err(e) => {
                let msg = format!("ERROR!!! split log file err: {}\n", e);
                eprintln!("{}", "!".repeat(60));
                eprint!("{}", msg);
                eprintln!("{}", "!".repeat(60));
                if let Some(handles) = state.handles.as_mut() {
                    let _ = handles.write_notice(&msg);
                }
                // Advance anyway so the next entry does not retry immediately.
                state.file_date = date_key(now);
                self.size.store(0, Ordering::SeqCst);
            }
        }
    }

    /// Write everything queued into `normal` and flush it. Caller holds the exclusive lock.
    fn drain_pending(&self, normal: &mut NormalWriter) -> io::Result<()> {
        if let Some(queue) = &self.queue {
            let batch = queue.take_all();
            for line in &batch {
                if let Err(e) = normal.write_exclusive(line) {
                    eprintln!("splitlog: write to {} failed: {}", normal.path().display(), e);
                }
            }
            queue.recycle(batch);
        }
        normal.flush()
    }

    /// One flusher pass: take the queue under the shared lock and write it out.
    pub(crate) fn drain(&self, queue: &PendingQueue) {
        let state = self.state.read();
        let batch = queue.take_all();
        if let Some(NormalWriter::Buffered { path, writer }) = state.handles.as_ref().map(|h| &h.normal) {
            let mut writer = writer.lock();
            for line in &batch {
                if let Err(e) = writer.write_all(line) {
                    eprintln!("splitlog: write to {} failed: {}", path.display(), e);
                }
            }
            // Leave the OS write for the last batch of a burst.
            if queue.is_empty()
                && let Err(e) = writer.flush()
            {
                eprintln!("splitlog: flush of {} failed: {}", path.display(), e);
            }
        }
        drop(state);
        queue.recycle(batch);
    }

    /// Write out everything queued before returning.
    pub(crate) fn sync_flush(&self) -> io::Result<()> {
        let mut state = self.state.write();
        match state.handles.as_mut() {
            Some(handles) => self.drain_pending(&mut handles.normal),
            None => Ok(()),
        }
    }

    /// Discard queued lines, delete the live files and open fresh ones.
    fn purge_and_reopen(&self) -> io::Result<()> {
        let now = self.config.time_zone.now();
        let mut state = self.state.write();
        if let Some(queue) = &self.queue {
            queue.recycle(queue.take_all());
        }
        if let Some(old) = state.handles.take() {
            let mut paths = vec![old.normal.path().to_path_buf()];
            if let Some(error) = &old.error {
                paths.push(error.path().to_path_buf());
            }
            if let Err(e) = old.close() {
                eprintln!("splitlog: close before purge failed: {}", e);
            }
            for path in paths {
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => eprintln!("splitlog: remove {} failed: {}", path.display(), e),
                }
            }
        }
        self.size.store(0, Ordering::SeqCst);

        let opened = WriteTargetResolver::new(&self.config).open(now, Resume::Never)?;
        state.handles = Some(opened.handles);
        state.file_date = opened.file_date;
        self.size.store(opened.size, Ordering::SeqCst);
        Ok(())
    }

    /// Remove data older than `max_age_days`; zero or less purges everything.
    ///
    /// Must not be called with the rotation lock held: the sweep logs its errors.
    pub(crate) fn sweep(&self, max_age_days: i64) -> SweepReport {
        let mut purge_failed = false;
        if max_age_days <= 0
            && let Err(e) = self.purge_and_reopen()
        {
            eprintln!("splitlog: reopen after purge failed: {}", e);
            purge_failed = true;
        }

        let active = self.active_names();
        let mut report = RetentionSweeper::new(
            &self.config.log_dir,
            &self.config.keep_suffix,
            self.config.time_zone,
        )
        .sweep(max_age_days, &active);
        if purge_failed {
            report.errors += 1;
        }
        tracing::debug!(
            "retention sweep of {}: {} files and {} folders removed, {} errors",
            self.config.log_dir.display(),
            report.removed_files.len(),
            report.removed_dirs.len(),
            report.errors
        );
        report
    }
}
