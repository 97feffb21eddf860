//! SSE line framing.
//!
//! The upstream body arrives in arbitrary chunks; [`LineFramer`] reassembles
//! complete lines (`\n` or `\r\n` terminated) and [`event_payload`] extracts the
//! body of `data: ` lines. Every other line (comments, `event:`, `id:`, blanks) is ignored.

use postpulse_core::HubError;

/// Prefix of the lines that carry an event payload.
pub const EVENT_PREFIX: &[u8] = b"data: ";

/// Returns the payload of a `data: ` line, or `None` for any other line.
pub fn event_payload(line: &[u8]) -> Option<&[u8]> {
    line.strip_prefix(EVENT_PREFIX)
}

/// Incremental line splitter over a byte stream.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_line_bytes: usize,
}

impl LineFramer {
    pub fn new(max_line_bytes: usize) -> Self {
        Self { buf: Vec::new(), max_line_bytes }
    }

    /// Append `chunk` and hand every line it completes to `on_line`, terminator stripped.
    ///
    /// Fails on any line longer than `max_line_bytes`, terminated or not. Lines
    /// completed before the offending one have already been handed out.
    pub fn push(&mut self, chunk: &[u8], mut on_line: impl FnMut(&[u8])) -> Result<(), HubError> {
        self.buf.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = &self.buf[start..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.len() > self.max_line_bytes {
                return Err(self.overlong());
            }
            on_line(line);
            start = end + 1;
        }
        self.buf.drain(..start);

        if self.buf.len() > self.max_line_bytes {
            return Err(self.overlong());
        }
        Ok(())
    }

    fn overlong(&self) -> HubError {
        HubError::Read(format!("line exceeds {} bytes", self.max_line_bytes))
    }

    /// Bytes of the unterminated line still buffered.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
