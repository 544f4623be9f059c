#[cfg(test)]
#[path = "frames_test.rs"]
mod tests;

use std::io;

use bytes::Bytes;
use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

use crate::domain::models::ByteStream;

/// Longest line accepted before the stream is abandoned.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Lazy, finite stream of complete lines read from a transport.
pub type LineStream = FramedRead<StreamReader<ByteStream, Bytes>, FrameDecoder>;

/// Splits a byte stream into newline terminated lines.
///
/// The codec buffer is the carry-over: bytes after the last newline stay in
/// it until a later chunk completes the line. Text decoding happens per
/// complete line, so a multi-byte character split across two chunks is
/// decoded whole. A line longer than the maximum length fails the stream
/// with `InvalidData` instead of growing the carry-over without bound.
#[derive(Debug)]
pub struct FrameDecoder {
    // Bytes already scanned for a newline, so each read only scans new input.
    next_index: usize,
    max_length: usize,
}

impl Default for FrameDecoder {
    fn default() -> FrameDecoder {
        return FrameDecoder::with_max_length(MAX_LINE_LENGTH);
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    return String::from_utf8_lossy(bytes).to_string();
}

fn line_too_long(max_length: usize) -> io::Error {
    return io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Line exceeds the maximum length of {max_length} bytes"),
    );
}

impl FrameDecoder {
    pub fn with_max_length(max_length: usize) -> FrameDecoder {
        return FrameDecoder {
            next_index: 0,
            max_length,
        };
    }

    pub fn lines(stream: ByteStream) -> LineStream {
        return FramedRead::new(StreamReader::new(stream), FrameDecoder::default());
    }
}

impl Decoder for FrameDecoder {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        let newline = buf[self.next_index..]
            .iter()
            .position(|byte| return *byte == b'\n');

        match newline {
            Some(offset) => {
                let end = self.next_index + offset;
                if end > self.max_length {
                    return Err(line_too_long(self.max_length));
                }

                let line = buf.split_to(end + 1);
                self.next_index = 0;
                return Ok(Some(to_line(&line[..line.len() - 1])));
            }
            None => {
                if buf.len() > self.max_length {
                    return Err(line_too_long(self.max_length));
                }
                self.next_index = buf.len();
                return Ok(None);
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }

        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }

        let rest = buf.split_to(buf.len());
        let line = to_line(&rest);
        if line.trim().is_empty() {
            return Ok(None);
        }

        return Ok(Some(line));
    }
}
