//! File-backed trace source.
//!
//! The envelope is loaded once on [`FileTrace::open`]. Writes update the
//! in-memory rows and mark the source dirty; [`FileTrace::flush`] persists
//! them back in the same format (picked by extension). A dirty source is
//! flushed on drop, best effort.

use crate::format::{TraceFile, TraceRow};
use crate::io::{display, read_trace_auto, write_trace_auto};
use anyhow::{Context, Result};
use scatrace_core::{Data, Samples, TraceError, TraceSource};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// `TraceSource` over a `.json` / `.cbor` / `.jsonl` trace file.
#[derive(Debug)]
pub struct FileTrace {
    path: PathBuf,
    file: TraceFile,
    dirty: bool,
}

impl FileTrace {
    /// Load the trace at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let file = read_trace_auto(&path)
            .with_context(|| format!("open trace {}", display(&path)))?;
        debug!(path = %path.display(), rows = file.len(), "trace file loaded");
        Ok(Self {
            path,
            file,
            dirty: false,
        })
    }

    /// Write `file` to `path` and open it.
    pub fn create<P: AsRef<Path>>(path: P, file: TraceFile) -> Result<Self> {
        let path = path.as_ref().to_owned();
        write_trace_auto(&path, &file)?;
        Ok(Self {
            path,
            file,
            dirty: false,
        })
    }

    /// Backing path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The loaded envelope.
    #[must_use]
    pub const fn envelope(&self) -> &TraceFile {
        &self.file
    }

    /// Unflushed writes pending.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist pending writes.
    pub fn flush(&mut self) -> Result<()> {
        if self.dirty {
            write_trace_auto(&self.path, &self.file)
                .with_context(|| format!("flush trace {}", display(&self.path)))?;
            self.dirty = false;
            debug!(path = %self.path.display(), "trace file flushed");
        }
        Ok(())
    }

    fn row(&self, index: usize) -> Result<&TraceRow> {
        self.file.rows.get(index).ok_or_else(|| {
            TraceError::IndexOutOfRange {
                index,
                len: self.file.len(),
            }
            .into()
        })
    }

    fn row_mut(&mut self, index: usize) -> Result<&mut TraceRow> {
        let len = self.file.len();
        self.file
            .rows
            .get_mut(index)
            .ok_or_else(|| TraceError::IndexOutOfRange { index, len }.into())
    }
}

impl TraceSource for FileTrace {
    fn len(&self) -> usize {
        self.file.len()
    }

    fn read_data(&mut self, index: usize) -> Result<Data> {
        Ok(self.row(index)?.data.clone())
    }

    fn read_samples(&mut self, index: usize) -> Result<Samples> {
        Ok(self.row(index)?.samples.clone())
    }

    fn write_data(&mut self, index: usize, data: &Data) -> Result<()> {
        let current = self.row(index)?.samples.clone();
        self.file.check_kinds(index, data, &current)?;
        self.row_mut(index)?.data = data.clone();
        self.dirty = true;
        Ok(())
    }

    fn write_samples(&mut self, index: usize, samples: &Samples) -> Result<()> {
        let current = self.row(index)?.data.clone();
        self.file.check_kinds(index, &current, samples)?;
        self.row_mut(index)?.samples = samples.clone();
        self.dirty = true;
        Ok(())
    }
}

impl Drop for FileTrace {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "dropping unflushed trace writes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scatrace_core::ElementKind;

    fn sample_file() -> TraceFile {
        let mut t = TraceFile::new(ElementKind::U8, ElementKind::F32);
        for i in 0..3u8 {
            t.push(Data::U8(vec![i]), Samples::F32(vec![f32::from(i); 4]))
                .unwrap();
        }
        t
    }

    #[test]
    fn writes_persist_after_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.cbor");
        let mut ft = FileTrace::create(&path, sample_file()).unwrap();
        ft.write_data(1, &Data::U8(vec![42])).unwrap();
        assert!(ft.is_dirty());
        ft.flush().unwrap();
        assert!(!ft.is_dirty());

        let mut again = FileTrace::open(&path).unwrap();
        assert_eq!(again.read_data(1).unwrap(), Data::U8(vec![42]));
        assert_eq!(again.len(), 3);
    }

    #[test]
    fn foreign_kind_write_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut ft = FileTrace::create(dir.path().join("t.json"), sample_file()).unwrap();
        assert!(ft.write_samples(0, &Samples::I16(vec![1])).is_err());
        assert!(!ft.is_dirty());
    }

    #[test]
    fn out_of_range_read_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let mut ft = FileTrace::create(dir.path().join("t.json"), sample_file()).unwrap();
        let err = ft.read_samples(3).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TraceError>(),
            Some(TraceError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }
}
