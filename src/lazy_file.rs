use once_cell::sync::OnceCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Open `path` for appending, creating it if needed.
pub(crate) fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// A file that is only created on disk by its first write.
///
/// Writes through a shared reference are safe from many threads; the first one wins
/// the open and the rest reuse its handle.
#[derive(Debug)]
pub struct LazyFile {
    path: PathBuf,
    file: OnceCell<File>,
}

impl LazyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file has been opened by this handle.
    pub fn is_created(&self) -> bool {
        self.file.get().is_some()
    }

    fn handle(&self) -> io::Result<&File> {
        self.file.get_or_try_init(|| {
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            open_append(&self.path)
        })
    }

    /// Append a whole line, opening the file first if this is the first write.
    pub fn write_line(&self, line: &[u8]) -> io::Result<()> {
        let mut file = self.handle()?;
        file.write_all(line)
    }

    /// Current length of the file. An unopened file reports what is already on disk, if anything.
    pub fn seek_end(&self) -> io::Result<u64> {
        match self.file.get() {
            Some(mut file) => file.seek(SeekFrom::End(0)),
            None => match std::fs::metadata(&self.path) {
                Ok(meta) => Ok(meta.len()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
                Err(e) => Err(e),
            },
        }
    }

    /// Close the handle. Returns whether a file had been opened.
    pub fn close(&mut self) -> bool {
        self.file.take().is_some()
    }
}
