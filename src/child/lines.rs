use std::io;

use tokio_util::{bytes::BytesMut, codec::Decoder};

/// Longest line kept before it is force-split.
const MAX_LINE_BYTES: usize = 8 * 1024;

/// Splits a diagnostic stream on `\n` and `\r`.
///
/// Encoders redraw their progress line with a bare carriage return, so
/// splitting on newlines alone would buffer progress output indefinitely.
/// Blank lines are skipped and invalid UTF-8 is replaced.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LineSplitter {
    max_len: usize,
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self {
            max_len: MAX_LINE_BYTES,
        }
    }
}

impl Decoder for LineSplitter {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        loop {
            match buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
                Some(pos) => {
                    let line = buf.split_to(pos + 1);
                    if let Some(text) = non_blank(&line[..pos]) {
                        return Ok(Some(text));
                    }
                }
                None if buf.len() >= self.max_len => {
                    let line = buf.split_to(self.max_len);
                    return Ok(non_blank(&line));
                }
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        let rest = buf.split();
        Ok(non_blank(&rest))
    }
}

fn non_blank(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
