//! Locating or creating the files an entry is written to.

use std::io;
use std::path::{Path, PathBuf};
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::config::{ResolvedConfig, SizeScope};
use crate::lazy_file::LazyFile;
use crate::rotation::{
    DATE_KEY_LEN, STAMP_KEY_LEN, SplitMode, date_key, parse_date_prefix, parse_stamp_prefix,
    stamp_key,
};
use crate::writer::{FileHandleSet, NormalWriter};

const ERROR_MARKER: &str = "error";

/// Whether an existing undersized size-split slot may be reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resume {
    Never,
    /// Reuse the newest slot while its size plus `reserve` stays below the threshold.
    UnderThreshold { reserve: u64 },
}

/// Freshly opened handles plus the state they start from.
#[derive(Debug)]
pub(crate) struct OpenedTargets {
    pub(crate) handles: FileHandleSet,
    pub(crate) file_date: String,
    /// Bytes already present in the opened files.
    pub(crate) size: u64,
}

/// Replace characters that are illegal in file names on common filesystems.
pub fn make_file_name_legal(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

pub(crate) struct WriteTargetResolver<'a> {
    config: &'a ResolvedConfig,
}

impl<'a> WriteTargetResolver<'a> {
    pub(crate) fn new(config: &'a ResolvedConfig) -> Self {
        Self { config }
    }

    /// `<base>[_error][_<suffix>]<ext>`
    fn file_name(&self, base: &str, error: bool) -> String {
        let mut name = base.to_string();
        if error {
            name.push('_');
            name.push_str(ERROR_MARKER);
        }
        name.push_str(&self.tail());
        make_file_name_legal(&name)
    }

    /// The part of a normal file name after its base: `[_<suffix>]<ext>`.
    fn tail(&self) -> String {
        let suffix = &self.config.file_name_suffix;
        if suffix.is_empty() {
            self.config.log_ext.clone()
        } else {
            format!("_{}{}", suffix, self.config.log_ext)
        }
    }

    /// Open the handles for the current slot, creating directories as needed.
    pub(crate) fn open(&self, now: OffsetDateTime, resume: Resume) -> io::Result<OpenedTargets> {
        let log_dir = &self.config.log_dir;
        std::fs::create_dir_all(log_dir)?;

        let file_date = date_key(now);
        let (dir, base) = match self.config.split {
            SplitMode::None => (log_dir.clone(), self.config.default_log_name.clone()),
            SplitMode::Date => (log_dir.join(&file_date), file_date.clone()),
            SplitMode::Size { max_size } if self.config.error_separate => {
                self.size_pair_slot(now, &file_date, max_size, resume)?
            }
            SplitMode::Size { max_size } => {
                (log_dir.clone(), self.size_slot(log_dir, now, max_size, resume)?)
            }
        };
        std::fs::create_dir_all(&dir)?;

        let mut normal =
            NormalWriter::open(dir.join(self.file_name(&base, false)), self.config.buffer_size)?;
        let error = self
            .config
            .error_separate
            .then(|| LazyFile::new(dir.join(self.file_name(&base, true))));

        let mut size = normal.seek_end()?;
        if self.config.size_scope == SizeScope::Combined
            && let Some(error) = &error
        {
            size += error.seek_end()?;
        }

        Ok(OpenedTargets {
            handles: FileHandleSet { error, normal },
            file_date,
            size,
        })
    }

    /// Base name for a size-split file in `dir`: the newest undersized slot, or a fresh stamp.
    fn size_slot(
        &self,
        dir: &Path,
        now: OffsetDateTime,
        max_size: u64,
        resume: Resume,
    ) -> io::Result<String> {
        if let Resume::UnderThreshold { reserve } = resume
            && let Some((base, path)) = self.newest_stamp_file(dir)?
        {
            let len = std::fs::metadata(&path)?.len();
            if len.saturating_add(reserve) < max_size {
                return Ok(base);
            }
        }
        Ok(self.fresh_stamp(dir, now))
    }

    /// Folder and base name for size splitting with a separate error stream.
    ///
    /// Both files live in a date folder; the newest folder is reused while its total
    /// size stays below the threshold.
    fn size_pair_slot(
        &self,
        now: OffsetDateTime,
        file_date: &str,
        max_size: u64,
        resume: Resume,
    ) -> io::Result<(PathBuf, String)> {
        let log_dir = &self.config.log_dir;
        if let Resume::UnderThreshold { reserve } = resume
            && let Some(folder) = newest_date_folder(log_dir)?
        {
            let folder = log_dir.join(folder);
            if dir_size(&folder)?.saturating_add(reserve) < max_size {
                let base = match self.newest_stamp_file(&folder)? {
                    Some((base, _)) => base,
                    None => self.fresh_stamp(&folder, now),
                };
                return Ok((folder, base));
            }
        }
        let folder = log_dir.join(file_date);
        let base = self.fresh_stamp(&folder, now);
        Ok((folder, base))
    }

    /// A stamp base that no existing normal or error file in `dir` uses yet.
    fn fresh_stamp(&self, dir: &Path, now: OffsetDateTime) -> String {
        let stamp = stamp_key(now);
        let taken = |base: &str| {
            dir.join(self.file_name(base, false)).exists()
                || dir.join(self.file_name(base, true)).exists()
        };
        if !taken(&stamp) {
            return stamp;
        }
        (1u32..)
            .map(|seq| format!("{}-{}", stamp, seq))
            .find(|base| !taken(base))
            .unwrap_or(stamp)
    }

    /// Newest normal size-split file in `dir`, ordered by stamp then sequence number.
    fn newest_stamp_file(&self, dir: &Path) -> io::Result<Option<(String, PathBuf)>> {
        let tail = make_file_name_legal(&self.tail());
        let mut newest: Option<((PrimitiveDateTime, u32), String)> = None;
        for name in list_names(dir, false)? {
            let Some(base) = name.strip_suffix(&tail) else {
                continue;
            };
            let Some(key) = stamp_order(base) else {
                continue;
            };
            if newest.as_ref().is_none_or(|(best, _)| key > *best) {
                newest = Some((key, base.to_string()));
            }
        }
        Ok(newest.map(|(_, base)| {
            let path = dir.join(format!("{}{}", base, tail));
            (base, path)
        }))
    }
}

/// Sort key of a `<stamp>[-<seq>]` base name.
fn stamp_order(base: &str) -> Option<(PrimitiveDateTime, u32)> {
    let stamp = parse_stamp_prefix(base)?;
    let rest = &base[STAMP_KEY_LEN..];
    let seq = match rest.strip_prefix('-') {
        None if rest.is_empty() => 0,
        Some(seq) => seq.parse().ok()?,
        None => return None,
    };
    Some((stamp, seq))
}

fn newest_date_folder(dir: &Path) -> io::Result<Option<String>> {
    Ok(list_names(dir, true)?
        .into_iter()
        .filter(|name| name.len() == DATE_KEY_LEN)
        .filter_map(|name| parse_date_prefix(&name).map(|date| (date, name)))
        .max()
        .map(|(_, name)| name))
}

/// Names of the directories (`dirs == true`) or files directly inside `dir`.
pub(crate) fn list_names(dir: &Path, dirs: bool) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() == dirs {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Total size of all files below `dir`.
pub(crate) fn dir_size(dir: &Path) -> io::Result<u64> {
    let mut size = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        size += if meta.is_dir() {
            dir_size(&entry.path())?
        } else {
            meta.len()
        };
    }
    Ok(size)
}
