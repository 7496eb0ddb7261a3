//! Output sink abstraction (component B): a character sink with file- and
//! fixed-buffer-backed implementations, used by the unparser so it doesn't
//! care whether it's writing to stdout or to an in-memory buffer for tests.

use std::fs::File;
use std::io::{self, BufWriter, Write};

/// A sink that C source text is written to, byte at a time or in chunks.
pub trait Sink {
    fn write_str(&mut self, s: &str) -> io::Result<()>;
    fn write_byte(&mut self, b: u8) -> io::Result<()> {
        self.write_str((b as char).encode_utf8(&mut [0u8; 4]))
    }
}

/// A sink backed by a file (or any `Write`, including stdout).
pub struct FileSink<W: Write> {
    inner: BufWriter<W>,
}

impl FileSink<File> {
    pub fn create(path: &std::path::Path) -> io::Result<Self> {
        Ok(Self {
            inner: BufWriter::new(File::create(path)?),
        })
    }
}

impl<W: Write> FileSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: BufWriter::new(writer),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Sink for FileSink<W> {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.inner.write_all(s.as_bytes())
    }
}

/// A sink backed by a growable in-memory buffer.
#[derive(Debug, Default)]
pub struct BufSink {
    buf: String,
}

impl BufSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_string(self) -> String {
        self.buf
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }
}

impl Sink for BufSink {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.buf.push_str(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buf_sink_accumulates() {
        let mut sink = BufSink::new();
        sink.write_str("hello").unwrap();
        sink.write_str(", world").unwrap();
        assert_eq!(sink.as_str(), "hello, world");
    }
}
