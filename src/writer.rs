use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::lazy_file::{LazyFile, open_append};

/// Writer for the normal (non-error) stream.
#[derive(Debug)]
pub(crate) enum NormalWriter {
    /// Unbuffered; `&File` writes are safe from many threads at once.
    Direct { path: PathBuf, file: File },
    /// Only the flusher thread, or a holder of the exclusive rotation lock, touches the buffer.
    Buffered {
        path: PathBuf,
        writer: Mutex<BufWriter<File>>,
    },
}

impl NormalWriter {
    /// Open `path` in append mode, buffered when `buffer_size` is set.
    pub(crate) fn open(path: PathBuf, buffer_size: Option<usize>) -> io::Result<Self> {
        let file = open_append(&path)?;
        Ok(match buffer_size {
            Some(capacity) => Self::Buffered {
                path,
                writer: Mutex::new(BufWriter::with_capacity(capacity, file)),
            },
            None => Self::Direct { path, file },
        })
    }

    pub(crate) fn path(&self) -> &Path {
        match self {
            Self::Direct { path, .. } | Self::Buffered { path, .. } => path,
        }
    }

    /// Bytes already in the file (not counting anything still buffered).
    pub(crate) fn seek_end(&mut self) -> io::Result<u64> {
        match self {
            Self::Direct { file, .. } => file.seek(SeekFrom::End(0)),
            Self::Buffered { writer, .. } => writer.get_mut().get_mut().seek(SeekFrom::End(0)),
        }
    }

    /// Write one line with exclusive access, whatever the variant.
    pub(crate) fn write_exclusive(&mut self, line: &[u8]) -> io::Result<()> {
        match self {
            Self::Direct { file, .. } => file.write_all(line),
            Self::Buffered { writer, .. } => writer.get_mut().write_all(line),
        }
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Direct { .. } => Ok(()),
            Self::Buffered { writer, .. } => writer.get_mut().flush(),
        }
    }
}

/// The open handles of one rotation slot.
#[derive(Debug)]
pub(crate) struct FileHandleSet {
    /// Present only with error separation; materialized by the first error.
    pub(crate) error: Option<LazyFile>,
    pub(crate) normal: NormalWriter,
}

impl FileHandleSet {
    /// Lower-cased base names of the files these handles write to.
    pub(crate) fn active_names(&self) -> Vec<String> {
        let mut paths = vec![self.normal.path()];
        if let Some(error) = &self.error {
            paths.push(error.path());
        }
        paths
            .into_iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_lowercase())
            .collect()
    }

    /// Best-effort write of an out-of-band message, preferring the error stream.
    pub(crate) fn write_notice(&mut self, msg: &str) -> io::Result<()> {
        match &self.error {
            Some(error) => error.write_line(msg.as_bytes()),
            None => self.normal.write_exclusive(msg.as_bytes()),
        }
    }

    /// Flush buffered data and release the files.
    pub(crate) fn close(mut self) -> io::Result<()> {
        if let Some(error) = self.error.as_mut() {
            error.close();
        }
        self.normal.flush()
    }
}
