//! Buffered destination for trace lines.

use std::fs::File;
use std::io::{self, BufWriter, Stdout, Write};
use std::path::Path;

/// Default output buffer size (256KB).
pub const DEFAULT_OUTPUT_BUFFER: usize = 256 * 1024;

/// Where trace lines go.
///
/// Records are written whole, so lines are never split; the buffer is only
/// pushed out when full, on an explicit flush, or on drop.
pub enum OutputSink {
    Stdout(BufWriter<Stdout>),
    File(BufWriter<File>),
}

impl OutputSink {
    pub fn stdout(capacity: usize) -> Self {
        OutputSink::Stdout(BufWriter::with_capacity(capacity, io::stdout()))
    }

    /// Create (or truncate) `path`.
    pub fn create<P: AsRef<Path>>(path: P, capacity: usize) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(OutputSink::File(BufWriter::with_capacity(capacity, file)))
    }

    /// A file sink if `path` is given, stdout otherwise.
    pub fn open(path: Option<&Path>, capacity: usize) -> io::Result<Self> {
        match path {
            Some(path) => Self::create(path, capacity),
            None => Ok(Self::stdout(capacity)),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Stdout(w) => w.write(buf),
            OutputSink::File(w) => w.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            OutputSink::Stdout(w) => w.write_all(buf),
            OutputSink::File(w) => w.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Stdout(w) => w.flush(),
            OutputSink::File(w) => w.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_file_sink_buffers_until_flush() {
        let temp = NamedTempFile::new().unwrap();
        let mut sink = OutputSink::open(Some(temp.path()), DEFAULT_OUTPUT_BUFFER).unwrap();

        sink.write_all(b"1 50000 fe Sync 4\n").unwrap();
        assert_eq!(std::fs::read(temp.path()).unwrap(), b"");

        sink.flush().unwrap();
        assert_eq!(std::fs::read(temp.path()).unwrap(), b"1 50000 fe Sync 4\n");
    }

    #[test]
    fn test_create_fails_for_missing_directory() {
        assert!(OutputSink::create("/nonexistent/dir/trace.log", 1024).is_err());
    }
}
