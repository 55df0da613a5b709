//! I/O helpers for the `TraceFile` envelope (format-level).
//!
//! Supports JSON/CBOR, JSON Lines and extension-based auto-detection. These
//! routines do not interpret rows; they only move the envelope across the
//! wire.
//!
//! # JSON Lines layout
//! Line 1 is a [`TraceHeader`]; each following line is one [`TraceRow`].
//! Both `.jsonl` and `.ndjson` are accepted.

use crate::format::{TraceFile, TraceHeader, TraceRow};
use anyhow::{anyhow, bail, Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/* ---------------- JSON ---------------- */

/// Read a `TraceFile` from **JSON**.
pub fn read_trace_json<P: AsRef<Path>>(path: P) -> Result<TraceFile> {
    let path_ref = path.as_ref();
    let f = File::open(path_ref).with_context(|| format!("open {}", display(path_ref)))?;
    let rdr = BufReader::new(f);
    let v: TraceFile =
        serde_json::from_reader(rdr).with_context(|| "deserialize JSON trace file")?;
    v.validate()?;
    Ok(v)
}

/// Write a `TraceFile` to **JSON** (pretty).
pub fn write_trace_json<P: AsRef<Path>>(path: P, v: &TraceFile) -> Result<()> {
    let path_ref = path.as_ref();
    ensure_parent_dir(path_ref)?;
    let f = File::create(path_ref).with_context(|| format!("create {}", display(path_ref)))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, v).with_context(|| "serialize JSON trace file")?;
    w.flush().with_context(|| "flush JSON writer")?;
    Ok(())
}

/* ---------------- CBOR ---------------- */

/// Read a `TraceFile` from **CBOR**.
pub fn read_trace_cbor<P: AsRef<Path>>(path: P) -> Result<TraceFile> {
    let path_ref = path.as_ref();
    let f = File::open(path_ref).with_context(|| format!("open {}", display(path_ref)))?;
    let mut rdr = BufReader::new(f);
    let v: TraceFile =
        ciborium::de::from_reader(&mut rdr).with_context(|| "deserialize CBOR trace file")?;
    v.validate()?;
    Ok(v)
}

/// Write a `TraceFile` to **CBOR**.
pub fn write_trace_cbor<P: AsRef<Path>>(path: P, v: &TraceFile) -> Result<()> {
    let path_ref = path.as_ref();
    ensure_parent_dir(path_ref)?;
    let f = File::create(path_ref).with_context(|| format!("create {}", display(path_ref)))?;
    let mut w = BufWriter::new(f);
    ciborium::ser::into_writer(v, &mut w).with_context(|| "serialize CBOR trace file")?;
    w.flush().with_context(|| "flush CBOR writer")?;
    Ok(())
}

/* ---------------- JSON Lines ---------------- */

/// Owning line iterator over the rows of a JSONL stream.
///
/// Holds the reader internally so it can be moved into a trace source.
pub struct JsonlRows<R> {
    rdr: R,
    buf: String,
    line_no: usize,
}

impl<R: BufRead> JsonlRows<R> {
    /// Consume the header line of `rdr` and return it with the row iterator.
    pub fn open(mut rdr: R) -> Result<(TraceHeader, Self)> {
        let mut buf = String::with_capacity(8 << 10);
        let n = rdr.read_line(&mut buf).context("read jsonl header")?;
        if n == 0 {
            bail!("jsonl stream is empty (expected a header line)");
        }
        let header: TraceHeader =
            serde_json::from_str(trim_eol(&buf)).context("parse jsonl header (line 1)")?;
        let it = Self {
            rdr,
            buf,
            line_no: 1,
        };
        Ok((header, it))
    }

    /// Line number of the last line read (1 = header).
    #[must_use]
    pub const fn line_no(&self) -> usize {
        self.line_no
    }
}

impl<R: BufRead> Iterator for JsonlRows<R> {
    type Item = Result<TraceRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.rdr.read_line(&mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                self.line_no += 1;
                let line = trim_eol(&self.buf);
                if line.is_empty() {
                    return Some(Err(anyhow!("parse jsonl line {}: empty line", self.line_no)));
                }
                Some(
                    serde_json::from_str(line)
                        .with_context(|| format!("parse jsonl line {}", self.line_no)),
                )
            }
            Err(e) => Some(Err(e).with_context(|| format!("read line {}", self.line_no + 1))),
        }
    }
}

/// Write `v` as JSON Lines to any writer.
pub fn write_trace_jsonl_to<W: Write>(mut w: W, v: &TraceFile) -> Result<()> {
    serde_json::to_writer(&mut w, &v.header()).context("serialize jsonl header")?;
    w.write_all(b"\n").context("write newline")?;
    for row in &v.rows {
        serde_json::to_writer(&mut w, row).context("serialize jsonl row")?;
        w.write_all(b"\n").context("write newline")?;
    }
    w.flush().context("flush writer")?;
    Ok(())
}

/// Write `v` as JSON Lines to `path`.
pub fn write_trace_jsonl<P: AsRef<Path>>(path: P, v: &TraceFile) -> Result<()> {
    let path_ref = path.as_ref();
    ensure_parent_dir(path_ref)?;
    let f = File::create(path_ref).with_context(|| format!("create {}", display(path_ref)))?;
    write_trace_jsonl_to(BufWriter::new(f), v)
}

/// Read a whole JSONL stream into memory.
pub fn read_trace_jsonl_from<R: BufRead>(rdr: R) -> Result<TraceFile> {
    let (header, rows) = JsonlRows::open(rdr)?;
    let mut out = TraceFile::new(header.data_kind, header.sample_kind);
    out.version = header.version;
    out.meta = header.meta;
    out.rows = rows.collect::<Result<_>>()?;
    if out.rows.len() != header.len {
        bail!(
            "jsonl header announces {} rows but {} were read",
            header.len,
            out.rows.len()
        );
    }
    out.validate()?;
    Ok(out)
}

/// Read a JSONL file into memory.
pub fn read_trace_jsonl<P: AsRef<Path>>(path: P) -> Result<TraceFile> {
    let path_ref = path.as_ref();
    let f = File::open(path_ref).with_context(|| format!("open {}", display(path_ref)))?;
    read_trace_jsonl_from(BufReader::new(f))
        .with_context(|| format!("read jsonl trace {}", display(path_ref)))
}

/* --------------- Auto-detect by extension --------------- */

/// Auto-detect **read** by extension (`.json` / `.cbor` / `.jsonl` / `.ndjson`).
pub fn read_trace_auto<P: AsRef<Path>>(path: P) -> Result<TraceFile> {
    match ext_lower(path.as_ref()).as_deref() {
        Some("json") => read_trace_json(path),
        Some("cbor") => read_trace_cbor(path),
        Some("jsonl" | "ndjson") => read_trace_jsonl(path),
        Some(other) => Err(anyhow!(
            "unsupported trace extension: {other} (supported: .json, .cbor, .jsonl, .ndjson)"
        )),
        None => Err(anyhow!(
            "path has no extension (expected .json, .cbor, .jsonl or .ndjson)"
        )),
    }
}

/// Auto-detect **write** (defaults to JSON if unknown/missing).
pub fn write_trace_auto<P: AsRef<Path>>(path: P, v: &TraceFile) -> Result<()> {
    match ext_lower(path.as_ref()).as_deref() {
        Some("cbor") => write_trace_cbor(path, v),
        Some("jsonl" | "ndjson") => write_trace_jsonl(path, v),
        _ => write_trace_json(path, v),
    }
}

/* ---------------- Small helpers ---------------- */

/// Ensure the parent directory for a file exists (no-op if none).
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating parent directory {}", display(path)))?;
        }
    }
    Ok(())
}

#[inline]
fn trim_eol(s: &str) -> &str {
    s.trim_end_matches(['\n', '\r'])
}

#[inline]
fn ext_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

#[inline]
pub(crate) fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scatrace_core::{Data, ElementKind, Samples};
    use std::io::Cursor;

    fn tiny() -> TraceFile {
        let mut t = TraceFile::new(ElementKind::U8, ElementKind::I16);
        t.push(Data::U8(vec![1, 2]), Samples::I16(vec![-3, 4, 5])).unwrap();
        t.push(Data::U8(vec![]), Samples::I16(vec![])).unwrap();
        t
    }

    #[test]
    fn jsonl_header_then_rows() {
        let mut buf = Vec::new();
        write_trace_jsonl_to(&mut buf, &tiny()).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert_eq!(text.lines().count(), 3);
        let back = read_trace_jsonl_from(Cursor::new(buf)).unwrap();
        assert_eq!(back, tiny());
    }

    #[test]
    fn jsonl_row_count_must_match_header() {
        let mut buf = Vec::new();
        write_trace_jsonl_to(&mut buf, &tiny()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let truncated: String = text.lines().take(2).map(|l| format!("{l}\n")).collect();
        assert!(read_trace_jsonl_from(Cursor::new(truncated)).is_err());
    }

    #[test]
    fn blank_line_reports_its_number() {
        let mut buf = Vec::new();
        write_trace_jsonl_to(&mut buf, &tiny()).unwrap();
        buf.extend_from_slice(b"\n");
        let (_, rows) = JsonlRows::open(Cursor::new(buf)).unwrap();
        let err = rows.last().unwrap().unwrap_err();
        assert!(err.to_string().contains("line 4"));
    }

    #[test]
    fn empty_stream_has_no_header() {
        assert!(JsonlRows::open(Cursor::new(Vec::<u8>::new())).is_err());
    }
}
