//! Request framing.
//!
//! A connection delivers an unstructured byte stream; commands are the
//! `\r\n`-terminated segments of it. Chunk boundaries carry no meaning, a
//! command may arrive split across any number of reads and one read may
//! carry several commands.

/// Request terminator.
pub const DELIMITER: &[u8] = b"\r\n";

/// Accumulates bytes and yields complete lines.
#[derive(Debug, Default, Clone)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every line completed by them, in arrival
    /// order and without the terminator. A trailing partial line stays
    /// buffered.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        // The retained buffer holds no complete delimiter, so only its tail
        // can pair with the new bytes.
        let mut search_from = self.buffer.len().saturating_sub(DELIMITER.len() - 1);
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = find_delimiter(&self.buffer[search_from..]) {
            let end = search_from + pos;
            lines.push(String::from_utf8_lossy(&self.buffer[start..end]).into_owned());
            start = end + DELIMITER.len();
            search_from = start;
        }
        self.buffer.drain(..start);
        lines
    }

    /// Bytes received but not yet terminated.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

fn find_delimiter(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
}
