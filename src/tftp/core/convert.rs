//! netascii conversion
//!
//! On the wire a newline is CR LF and a bare carriage return is CR NUL.
//! A translated pair may straddle two DATA blocks, so both directions keep
//! one byte of state between calls.

use std::io::{self, Read};

/// Local text -> netascii.
#[derive(Debug, Default)]
pub struct Encoder {
    pending: Option<u8>,
}

impl Encoder {
    /// Fills `out` with encoded bytes pulled from `src`.
    ///
    /// Returns fewer than `out.len()` bytes only at end of input.
    pub fn fill<R: Read>(&mut self, src: &mut R, out: &mut [u8]) -> io::Result<usize> {
        let mut count = 0;
        let mut byte = [0u8; 1];

        while count < out.len() {
            if let Some(next) = self.pending.take() {
                out[count] = next;
                count += 1;
                continue;
            }

            match src.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            out[count] = match byte[0] {
                b'\n' => {
                    self.pending = Some(b'\n');
                    b'\r'
                }
                b'\r' => {
                    self.pending = Some(0);
                    b'\r'
                }
                c => c,
            };
            count += 1;
        }

        Ok(count)
    }
}

/// netascii -> local text.
#[derive(Debug, Default)]
pub struct Decoder {
    last_cr: bool,
}

impl Decoder {
    pub fn decode(&mut self, input: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
        for &c in input {
            if self.last_cr {
                self.last_cr = false;
                match c {
                    b'\n' => out.push(b'\n'),
                    0 => out.push(b'\r'),
                    other => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("netascii CR followed by 0x{other:02x}"),
                        ));
                    }
                }
            } else if c == b'\r' {
                self.last_cr = true;
            } else {
                out.push(c);
            }
        }
        Ok(())
    }

    /// Checks the stream did not end in the middle of a CR pair.
    pub fn finish(&self) -> io::Result<()> {
        if self.last_cr {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "netascii stream ended with a bare CR",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(input: &[u8], block: usize) -> Vec<Vec<u8>> {
        let mut src = input;
        let mut encoder = Encoder::default();
        let mut blocks = Vec::new();
        loop {
            let mut buf = vec![0u8; block];
            let n = encoder.fill(&mut src, &mut buf).unwrap();
            buf.truncate(n);
            let last = n < block;
            blocks.push(buf);
            if last {
                break;
            }
        }
        blocks
    }

    #[test]
    fn encodes_line_endings() {
        let blocks = encode_all(b"a\nb\rc", 64);
        assert_eq!(blocks, vec![b"a\r\nb\r\0c".to_vec()]);
    }

    #[test]
    fn pair_straddles_blocks() {
        // "ab\n" encodes to 4 bytes; with 3-byte blocks the LF moves on.
        let blocks = encode_all(b"ab\n", 3);
        assert_eq!(blocks, vec![b"ab\r".to_vec(), b"\n".to_vec()]);
    }

    #[test]
    fn decodes_across_blocks() {
        let mut decoder = Decoder::default();
        let mut out = Vec::new();
        decoder.decode(b"x\r", &mut out).unwrap();
        decoder.decode(b"\ny\r", &mut out).unwrap();
        decoder.decode(b"\0", &mut out).unwrap();
        decoder.finish().unwrap();
        assert_eq!(out, b"x\ny\r");
    }

    #[test]
    fn rejects_bare_cr() {
        let mut decoder = Decoder::default();
        let mut out = Vec::new();
        let err = decoder.decode(b"\rz", &mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let mut decoder = Decoder::default();
        decoder.decode(b"end\r", &mut out).unwrap();
        assert!(decoder.finish().is_err());
    }
}
