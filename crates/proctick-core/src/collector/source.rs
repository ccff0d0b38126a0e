//! Sampling-oriented reader for `/proc` pseudo-files.
//!
//! Pseudo-files are regenerated by the kernel on every read, are small and
//! keep roughly the same size from one sample to the next. `ProcFile`
//! therefore keeps the descriptor open for its whole lifetime, rewinds it
//! instead of reopening, and reuses one buffer whose capacity settles at the
//! size of the largest snapshot seen so far.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memchr::memchr;

use crate::collector::error::CollectError;

/// Initial capacity of the snapshot buffer.
const INITIAL_CAPACITY: usize = 64;

/// Persistent handle on a pseudo-file plus its reusable read buffer.
///
/// The whole content is pulled in one go on the first [`read_line`] after a
/// [`reset`], so every line handed out belongs to the same snapshot.
///
/// [`read_line`]: ProcFile::read_line
/// [`reset`]: ProcFile::reset
pub struct ProcFile<R = File> {
    path: PathBuf,
    reader: R,
    buf: Vec<u8>,
    cursor: usize,
    loaded: bool,
}

impl ProcFile<File> {
    /// Opens a pseudo-file for repeated sampling.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CollectError> {
        let path = path.as_ref().to_path_buf();
        match File::open(&path) {
            Ok(file) => Ok(Self::with_path(file, path)),
            Err(source) => Err(CollectError::Open { path, source }),
        }
    }
}

impl<R: Read + Seek> ProcFile<R> {
    /// Wraps an arbitrary seekable reader.
    pub fn from_reader(reader: R) -> Self {
        Self::with_path(reader, PathBuf::from("<reader>"))
    }

    /// Wraps a reader and records `path` for diagnostics.
    pub fn with_path(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader,
            buf: Vec::with_capacity(INITIAL_CAPACITY),
            cursor: 0,
            loaded: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Capacity of the internal buffer, retained across resets.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Rewinds to the start of the source and empties the buffer.
    pub fn reset(&mut self) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.buf.clear();
        self.cursor = 0;
        self.loaded = false;
        Ok(())
    }

    /// Returns the next line, terminator included, or `None` at end of input.
    ///
    /// The slice points into the internal buffer and is only valid until the
    /// next call; copy out anything that must outlive it.
    pub fn read_line(&mut self) -> io::Result<Option<&[u8]>> {
        if !self.loaded {
            if let Err(e) = self.reader.read_to_end(&mut self.buf) {
                self.buf.clear();
                return Err(e);
            }
            self.loaded = true;
        }

        let start = self.cursor;
        let rest = &self.buf[start..];
        if rest.is_empty() {
            return Ok(None);
        }

        let len = memchr(b'\n', rest).map_or(rest.len(), |i| i + 1);
        self.cursor = start + len;
        Ok(Some(&self.buf[start..start + len]))
    }

    /// Number of bytes not yet handed out by `read_line`.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }
}

impl<R> std::fmt::Debug for ProcFile<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcFile")
            .field("path", &self.path)
            .field("buffered", &self.buf.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockSource;
    use std::io::{Cursor, Write};

    fn collect_lines<R: Read + Seek>(file: &mut ProcFile<R>) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        while let Some(line) = file.read_line().unwrap() {
            lines.push(line.to_vec());
        }
        lines
    }

    #[test]
    fn test_read_lines_keep_terminator() {
        let mut file = ProcFile::from_reader(Cursor::new(b"a 1\nb 2\nc".to_vec()));
        let lines = collect_lines(&mut file);
        assert_eq!(lines, vec![b"a 1\n".to_vec(), b"b 2\n".to_vec(), b"c".to_vec()]);
        assert!(file.read_line().unwrap().is_none());
    }

    #[test]
    fn test_reset_rereads_from_start() {
        let mut file = ProcFile::from_reader(Cursor::new(b"x\ny\n".to_vec()));
        let first = collect_lines(&mut file);
        file.reset().unwrap();
        let second = collect_lines(&mut file);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut file = ProcFile::from_reader(Cursor::new(b"line one\nline two\n".to_vec()));
        file.read_line().unwrap();

        file.reset().unwrap();
        let once = (file.remaining(), file.cursor, file.loaded, file.capacity());
        file.reset().unwrap();
        let twice = (file.remaining(), file.cursor, file.loaded, file.capacity());

        assert_eq!(once, twice);
        assert_eq!(file.remaining(), 0);
        assert_eq!(file.read_line().unwrap(), Some(&b"line one\n"[..]));
    }

    #[test]
    fn test_capacity_retained_across_resets() {
        let content = "0123456789 ".repeat(40);
        let mut file = ProcFile::from_reader(Cursor::new(content.into_bytes()));
        collect_lines(&mut file);
        let grown = file.capacity();
        assert!(grown >= 440);

        for _ in 0..10 {
            file.reset().unwrap();
            collect_lines(&mut file);
            assert_eq!(file.capacity(), grown);
        }
    }

    #[test]
    fn test_open_sees_rewritten_content() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "first\n").unwrap();
        tmp.flush().unwrap();

        let mut file = ProcFile::open(tmp.path()).unwrap();
        assert_eq!(file.read_line().unwrap(), Some(&b"first\n"[..]));

        std::fs::write(tmp.path(), "second\n").unwrap();
        file.reset().unwrap();
        assert_eq!(file.read_line().unwrap(), Some(&b"second\n"[..]));
    }

    #[test]
    fn test_read_error_discards_partial_snapshot() {
        let source = MockSource::with_content("a 1\nb 2\n");
        source.fail_reads(1);
        let mut file = ProcFile::from_reader(source);

        assert!(file.read_line().is_err());
        assert_eq!(file.remaining(), 0);

        file.reset().unwrap();
        assert_eq!(collect_lines(&mut file), vec![b"a 1\n".to_vec(), b"b 2\n".to_vec()]);
    }

    #[test]
    fn test_open_missing_file() {
        let err = ProcFile::open("/nonexistent/path/12345").unwrap_err();
        assert!(matches!(err, CollectError::Open { .. }));
    }
}
