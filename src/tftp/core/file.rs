//! Local file access used by the transfer engine
//!
//! The engine only sees [`FileSource`] and [`FileSink`]. A responder opens
//! them through a [`FileStore`] once the request has been validated.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::convert::{Decoder, Encoder};
use super::packet::Mode;

/// Produces file content one block at a time.
pub trait FileSource: Send {
    /// Fills `buf` and returns the count; short (possibly zero) only at end of input.
    fn read_block(&mut self, buf: &mut [u8], mode: Mode) -> io::Result<usize>;
}

/// Consumes file content one block at a time.
pub trait FileSink: Send {
    fn write_block(&mut self, data: &[u8], mode: Mode) -> io::Result<()>;

    /// Called once after the final block.
    fn finish(&mut self) -> io::Result<()>;
}

/// Opens files on behalf of a responder.
pub trait FileStore: Send + Sync {
    fn open_read(&self, filename: &str) -> io::Result<Box<dyn FileSource>>;
    fn open_write(&self, filename: &str) -> io::Result<Box<dyn FileSink>>;
}

/// [`FileSource`] over any reader.
pub struct Source<R> {
    inner: BufReader<R>,
    encoder: Encoder,
}

impl Source<File> {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<R: Read> Source<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            encoder: Encoder::default(),
        }
    }
}

impl<R: Read + Send> FileSource for Source<R> {
    fn read_block(&mut self, buf: &mut [u8], mode: Mode) -> io::Result<usize> {
        match mode {
            Mode::Netascii => self.encoder.fill(&mut self.inner, buf),
            Mode::Octet => {
                // A single read() may come back short on pipes.
                let mut count = 0;
                while count < buf.len() {
                    match self.inner.read(&mut buf[count..]) {
                        Ok(0) => break,
                        Ok(n) => count += n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(count)
            }
        }
    }
}

/// [`FileSink`] over any writer.
pub struct Sink<W: Write> {
    inner: BufWriter<W>,
    decoder: Decoder,
    scratch: Vec<u8>,
}

impl Sink<File> {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> Sink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
            decoder: Decoder::default(),
            scratch: Vec::new(),
        }
    }
}

impl<W: Write + Send> FileSink for Sink<W> {
    fn write_block(&mut self, data: &[u8], mode: Mode) -> io::Result<()> {
        match mode {
            Mode::Octet => self.inner.write_all(data),
            Mode::Netascii => {
                self.scratch.clear();
                self.decoder.decode(data, &mut self.scratch)?;
                self.inner.write_all(&self.scratch)
            }
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        self.decoder.finish()?;
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that hands out at most `chunk` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn octet_source_fills_whole_blocks() {
        let data = vec![7u8; 700];
        let mut source = Source::new(Trickle {
            data: &data,
            chunk: 100,
        });
        let mut buf = [0u8; 512];
        assert_eq!(source.read_block(&mut buf, Mode::Octet).unwrap(), 512);
        assert_eq!(source.read_block(&mut buf, Mode::Octet).unwrap(), 188);
        assert_eq!(source.read_block(&mut buf, Mode::Octet).unwrap(), 0);
    }

    #[test]
    fn netascii_sink_restores_newlines() {
        let mut out = Vec::new();
        {
            let mut sink = Sink::new(&mut out);
            sink.write_block(b"one\r", Mode::Netascii).unwrap();
            sink.write_block(b"\ntwo\r\n", Mode::Netascii).unwrap();
            sink.finish().unwrap();
        }
        assert_eq!(out, b"one\ntwo\n");
    }
}
